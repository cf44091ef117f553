//! Application layer for chatsync
//!
//! A pure state machine and a generic runtime that tie the history backend
//! and the push connection to one room-scoped timeline. The same [`App`]
//! runs under the production runtime and in deterministic tests.
//!
//! # Components
//!
//! - [`App`]: state machine (room selection, sends, connection feedback)
//! - [`ClientConfig`]: validated settings for one client instance
//! - [`Runtime`]: async loop executing [`AppAction`]s against a
//!   [`chatsync_client::HistoryFetcher`] and a
//!   [`chatsync_client::ConnectionManager`]
//! - [`RuntimeHandle`]: host-side commands and the published [`TimelineView`]

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod action;
mod app;
mod config;
mod error;
mod event;
mod runtime;
mod view;

pub use action::AppAction;
pub use app::App;
pub use config::{
    Backend, ClientConfig, ConfigError, DEFAULT_API_BASE, DEFAULT_HISTORY_LIMIT, DEFAULT_WS_URL,
};
pub use error::RuntimeError;
pub use event::AppEvent;
pub use runtime::{Command, Notice, Runtime, RuntimeHandle};
pub use view::TimelineView;
