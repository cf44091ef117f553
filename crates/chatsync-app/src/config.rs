//! Client configuration.

use chatsync_core::{ConnectionConfig, SendFailurePolicy, SyncError};
use thiserror::Error;
use url::Url;

/// Default history API base.
pub const DEFAULT_API_BASE: &str = "http://localhost:8080/api/";

/// Default push endpoint.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8080/ws";

/// Default backlog window.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// URL did not parse
    #[error("{field}: invalid URL {value:?}: {reason}")]
    InvalidUrl {
        /// Config field
        field: &'static str,
        /// Offending value
        value: String,
        /// Parser message
        reason: String,
    },

    /// URL parsed but uses the wrong scheme
    #[error("{field}: scheme {scheme:?} not allowed, expected one of {expected:?}")]
    Scheme {
        /// Config field
        field: &'static str,
        /// Scheme found
        scheme: String,
        /// Accepted schemes
        expected: &'static [&'static str],
    },

    /// History window of zero
    #[error("history limit must be at least 1")]
    HistoryLimit,

    /// Connection settings rejected
    #[error(transparent)]
    Connection(#[from] SyncError),
}

/// Where history and the push channel come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// JSON over HTTP plus a WebSocket push endpoint.
    #[default]
    Http,
    /// In-memory demo data, no server.
    Demo,
}

/// Settings for one client instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// History API base URL (`http` or `https`).
    pub api_base: String,
    /// Push endpoint (`ws` or `wss`).
    pub ws_url: String,
    /// Backend kind.
    pub backend: Backend,
    /// Bearer token for the API, also appended to the push URL.
    pub token: Option<String>,
    /// What a failed send does to its optimistic entry.
    pub send_failure_policy: SendFailurePolicy,
    /// Send subscribe/unsubscribe frames on room switches.
    pub topic_subscriptions: bool,
    /// Backlog window requested per room load.
    pub history_limit: usize,
    /// Reconnect and timeout settings.
    pub connection: ConnectionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            backend: Backend::default(),
            token: None,
            send_failure_policy: SendFailurePolicy::default(),
            topic_subscriptions: false,
            history_limit: DEFAULT_HISTORY_LIMIT,
            connection: ConnectionConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Check URLs, limits, and connection settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api_url()?;
        self.push_url()?;
        if self.history_limit == 0 {
            return Err(ConfigError::HistoryLimit);
        }
        self.connection.validate()?;
        Ok(())
    }

    /// Parsed history API base.
    pub fn api_url(&self) -> Result<Url, ConfigError> {
        parse("api_base", &self.api_base, &["http", "https"])
    }

    /// Parsed push endpoint.
    pub fn push_url(&self) -> Result<Url, ConfigError> {
        parse("ws_url", &self.ws_url, &["ws", "wss"])
    }

    /// Token, treating an empty string as none.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }
}

fn parse(field: &'static str, value: &str, expected: &'static [&'static str]) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    if !expected.contains(&url.scheme()) {
        return Err(ConfigError::Scheme { field, scheme: url.scheme().to_string(), expected });
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(ClientConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_http_push_url() {
        let config = ClientConfig { ws_url: "http://localhost/ws".into(), ..Default::default() };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Scheme { field: "ws_url", ref scheme, .. }) if scheme == "http"
        ));
    }

    #[test]
    fn rejects_unparseable_api_base() {
        let config = ClientConfig { api_base: "not a url".into(), ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUrl { field: "api_base", .. })));
    }

    #[test]
    fn accepts_secure_schemes() {
        let config = ClientConfig {
            api_base: "https://chat.example/api/".into(),
            ws_url: "wss://chat.example/ws".into(),
            ..Default::default()
        };
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn rejects_zero_history_limit() {
        let config = ClientConfig { history_limit: 0, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::HistoryLimit));
    }

    #[test]
    fn rejects_inverted_delays() {
        let mut config = ClientConfig::default();
        config.connection.reconnect.initial_delay = Duration::from_secs(30);
        config.connection.reconnect.max_delay = Duration::from_secs(5);
        assert!(matches!(config.validate(), Err(ConfigError::Connection(SyncError::InvalidConfig(_)))));
    }

    #[test]
    fn empty_token_is_none() {
        let config = ClientConfig { token: Some(String::new()), ..Default::default() };
        assert_eq!(config.token(), None);
    }
}
