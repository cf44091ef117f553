//! Realtime synchronization core.
//!
//! Pure state machines that keep a room-scoped chat timeline consistent while
//! two unsynchronized sources feed it: a request/response history channel and
//! a long-lived push connection that may drop and reconnect at any time.
//!
//! # Components
//!
//! - [`connection::Connection`]: lifecycle of one logical streaming
//!   connection (connect, credentials, open, close, reconnect with backoff).
//! - [`reconciler::Reconciler`]: ordered, de-duplicated timeline for the
//!   active room.
//! - [`session::Session`]: active-room selection and stale-load guarding.
//!
//! Everything here follows the action pattern: methods take inputs (and time,
//! where it matters) and return actions for a driver to execute. Nothing in
//! this crate performs I/O.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod backoff;
pub mod connection;
pub mod env;
pub mod error;
pub mod event;
pub mod frame;
pub mod model;
pub mod reconciler;
pub mod session;

pub use backoff::Backoff;
pub use connection::{
    AttemptId, Connection, ConnectionAction, ConnectionConfig, ConnectionState, ReconnectConfig,
    SocketId,
};
pub use env::Environment;
pub use error::SyncError;
pub use event::{CloseInfo, ConnectionEvent, TransportErrorInfo};
pub use frame::{IncomingMessage, Inbound, Outbound};
pub use model::{DeliveryState, Message, MessageId, Room, RoomId, User, UserId};
pub use reconciler::{
    ApplyOutcome, ConfirmOutcome, FailOutcome, LoadOutcome, PendingSend, Reconciler,
    SendFailurePolicy,
};
pub use session::{LoadTicket, RoomSwitch, Session};
