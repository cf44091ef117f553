//! Command-line arguments.

use std::time::Duration;

use chatsync_app::{Backend, ClientConfig, DEFAULT_API_BASE, DEFAULT_HISTORY_LIMIT, DEFAULT_WS_URL};
use chatsync_core::{ConnectionConfig, ReconnectConfig, SendFailurePolicy};
use clap::{Parser, ValueEnum};

/// What a failed send does to its optimistic entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnSendFailure {
    /// Keep the entry as sent.
    Retain,
    /// Remove the entry.
    Rollback,
    /// Keep the entry, marked failed.
    Mark,
}

impl From<OnSendFailure> for SendFailurePolicy {
    fn from(value: OnSendFailure) -> Self {
        match value {
            OnSendFailure::Retain => Self::Retain,
            OnSendFailure::Rollback => Self::Rollback,
            OnSendFailure::Mark => Self::MarkFailed,
        }
    }
}

/// Headless chatsync client
#[derive(Parser, Debug)]
#[command(name = "chatsync")]
#[command(about = "Headless realtime chat client")]
#[command(version)]
pub struct Args {
    /// History API base URL
    #[arg(long, env = "CHATSYNC_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// Push endpoint
    #[arg(long, env = "CHATSYNC_WS_URL", default_value = DEFAULT_WS_URL)]
    pub ws_url: String,

    /// Use in-memory demo data instead of a server
    #[arg(long)]
    pub demo: bool,

    /// Access token
    #[arg(long, env = "CHATSYNC_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Room to open once the room list is loaded
    #[arg(short, long)]
    pub room: Option<String>,

    /// What a failed send does to the message shown
    #[arg(long, value_enum, default_value_t = OnSendFailure::Retain)]
    pub on_send_failure: OnSendFailure,

    /// Send subscribe/unsubscribe frames when switching rooms
    #[arg(long)]
    pub topic_subscriptions: bool,

    /// Messages loaded per room
    #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
    pub history_limit: usize,

    /// First reconnect delay in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub reconnect_initial_ms: u64,

    /// Reconnect delay cap in milliseconds
    #[arg(long, default_value_t = 15_000)]
    pub reconnect_max_ms: u64,

    /// Do not reconnect after the connection drops
    #[arg(long)]
    pub no_reconnect: bool,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Client configuration described by these arguments.
    pub fn to_config(&self) -> ClientConfig {
        let reconnect = ReconnectConfig {
            enabled: !self.no_reconnect,
            initial_delay: Duration::from_millis(self.reconnect_initial_ms),
            max_delay: Duration::from_millis(self.reconnect_max_ms),
        };

        ClientConfig {
            api_base: self.api_base.clone(),
            ws_url: self.ws_url.clone(),
            backend: if self.demo { Backend::Demo } else { Backend::Http },
            token: self.token.clone(),
            send_failure_policy: self.on_send_failure.into(),
            topic_subscriptions: self.topic_subscriptions,
            history_limit: self.history_limit,
            connection: ConnectionConfig { reconnect, ..ConnectionConfig::default() },
        }
    }
}
