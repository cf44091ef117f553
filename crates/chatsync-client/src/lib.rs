//! Client
//!
//! Async plumbing around the sans-IO core: the connection manager that drives
//! a [`chatsync_core::Connection`] over a real transport, the history and
//! credential backends, and the production environment.
//!
//! # Components
//!
//! - [`ConnectionManager`]: executes connection actions, owns the socket and
//!   reconnect timer, and yields [`ConnectionEvent`]s in order
//! - [`HistoryFetcher`]: request/response access to rooms, users, and backlog
//! - [`CredentialProvider`]: async token source resolved before every open
//! - [`DemoBackend`]: in-memory history and push channel, no server needed
//! - [`SystemEnv`]: production clock and randomness
//!
//! # Optional backends
//!
//! - feature `http`: [`http::HttpHistory`], JSON over HTTP with reqwest
//! - feature `transport`: [`transport::ws::WsTransport`], WebSocket with
//!   tokio-tungstenite

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod credentials;
pub mod demo;
pub mod history;
#[cfg(feature = "http")]
pub mod http;
pub mod manager;
pub mod system_env;
pub mod transport;

pub use chatsync_core::{ConnectionEvent, Environment};
pub use credentials::{CredentialError, CredentialProvider, StaticToken};
pub use demo::{DemoBackend, DemoStore};
pub use history::{FetchError, HistoryFetcher};
pub use manager::ConnectionManager;
pub use system_env::SystemEnv;
pub use transport::{SignalSender, SocketCommand, SocketHandle, SocketSignal, Transport, TransportError};
