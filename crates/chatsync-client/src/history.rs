//! Request/response access to rooms, users, and message backlog.

use async_trait::async_trait;
use chatsync_core::{Message, Room, RoomId, User};
use thiserror::Error;

/// Errors from a history backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Request never completed (connect, timeout, reset)
    #[error("request failed: {0}")]
    Request(String),

    /// Server answered with an error status
    #[error("server returned {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Response body did not have the expected shape
    #[error("invalid response: {0}")]
    Decode(String),

    /// Room does not exist on the backend
    #[error("room not found: {0}")]
    RoomNotFound(RoomId),

    /// Backend refused the message
    #[error("message rejected: {0}")]
    Rejected(String),
}

impl FetchError {
    /// Returns true if retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) | Self::RoomNotFound(_) | Self::Rejected(_) => false,
        }
    }
}

/// Backlog and submission backend.
///
/// All operations are independent requests; ordering between concurrent
/// calls is not guaranteed and callers guard against stale results.
#[async_trait]
pub trait HistoryFetcher: Send + Sync {
    /// All rooms visible to the user.
    async fn list_rooms(&self) -> Result<Vec<Room>, FetchError>;

    /// All users.
    async fn list_users(&self) -> Result<Vec<User>, FetchError>;

    /// Bounded window of a room's most recent messages, oldest first.
    async fn get_messages(&self, room_id: &RoomId) -> Result<Vec<Message>, FetchError>;

    /// Submit a message and return the saved, canonical form.
    async fn send_message(&self, room_id: &RoomId, content: &str) -> Result<Message, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(FetchError::Request("reset".into()).is_transient());
        assert!(FetchError::Status { status: 503, message: String::new() }.is_transient());
        assert!(FetchError::Status { status: 429, message: String::new() }.is_transient());
        assert!(!FetchError::Status { status: 404, message: String::new() }.is_transient());
        assert!(!FetchError::Decode("bad json".into()).is_transient());
        assert!(!FetchError::RoomNotFound("x".into()).is_transient());
    }
}
