//! JSON-over-HTTP history backend.
//!
//! Endpoints, relative to the API base:
//!
//! - `GET rooms`, `GET users`
//! - `GET rooms/{id}/messages?limit=N`
//! - `POST rooms/{id}/messages` with `{"content": ...}`

use async_trait::async_trait;
use chatsync_core::{Message, Room, RoomId, User};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Serialize, de::DeserializeOwned};
use url::Url;

use crate::history::{FetchError, HistoryFetcher};

/// Default backlog window.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Serialize)]
struct SendBody<'a> {
    content: &'a str,
}

/// History backend over a JSON HTTP API.
#[derive(Debug, Clone)]
pub struct HttpHistory {
    base: Url,
    client: Client,
    token: Option<String>,
    limit: usize,
}

impl HttpHistory {
    /// Backend rooted at `base`.
    pub fn new(base: Url) -> Self {
        Self { base, client: Client::new(), token: None, limit: DEFAULT_HISTORY_LIMIT }
    }

    /// Send `token` as a bearer credential.
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Ask for at most `limit` messages per backlog request.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    fn url(&self, segments: &[&str]) -> Result<Url, FetchError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| FetchError::Request(format!("{} cannot be a base URL", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, FetchError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, FetchError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(FetchError::Status { status: status.as_u16(), message });
    }
    response.json().await.map_err(|e| FetchError::Decode(e.to_string()))
}

#[async_trait]
impl HistoryFetcher for HttpHistory {
    async fn list_rooms(&self) -> Result<Vec<Room>, FetchError> {
        let url = self.url(&["rooms"])?;
        self.fetch(self.client.get(url)).await
    }

    async fn list_users(&self) -> Result<Vec<User>, FetchError> {
        let url = self.url(&["users"])?;
        self.fetch(self.client.get(url)).await
    }

    async fn get_messages(&self, room_id: &RoomId) -> Result<Vec<Message>, FetchError> {
        let mut url = self.url(&["rooms", room_id.as_str(), "messages"])?;
        url.query_pairs_mut().append_pair("limit", &self.limit.to_string());

        self.fetch(self.client.get(url)).await.map_err(|e| match e {
            FetchError::Status { status: 404, .. } => FetchError::RoomNotFound(room_id.clone()),
            other => other,
        })
    }

    async fn send_message(&self, room_id: &RoomId, content: &str) -> Result<Message, FetchError> {
        let url = self.url(&["rooms", room_id.as_str(), "messages"])?;
        let request = self.client.post(url).json(&SendBody { content });

        let message: Message = self.fetch(request).await.map_err(|e| match e {
            FetchError::Status { status: 404, .. } => FetchError::RoomNotFound(room_id.clone()),
            FetchError::Status { status: 400 | 422, message } => FetchError::Rejected(message),
            other => other,
        })?;
        Ok(Message { mine: true, ..message })
    }
}
