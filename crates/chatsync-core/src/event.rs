//! Lifecycle events delivered by the connection to its single consumer.
//!
//! All events travel on one ordered stream. Every socket-originated event is
//! tagged with the [`SocketId`] of the connection instance that produced it.

use std::time::Duration;

use crate::{
    connection::{ConnectionState, SocketId},
    frame::Inbound,
};

/// A transport-level error. Reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportErrorInfo {
    /// Human-readable description from the transport.
    pub message: String,
}

/// Details of a connection termination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// Close code, when the transport reported one.
    pub code: Option<u16>,
    /// Close reason.
    pub reason: String,
    /// True when the close was requested through `disconnect()`.
    pub explicit: bool,
}

/// Events produced by the connection state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Connection state changed.
    StateChanged(ConnectionState),

    /// Socket opened.
    Open {
        /// Connection instance.
        socket: SocketId,
    },

    /// Frame received.
    Message {
        /// Connection instance.
        socket: SocketId,
        /// Decoded payload.
        inbound: Inbound,
    },

    /// Transport error observed. Does not close the connection.
    Error {
        /// Connection instance.
        socket: SocketId,
        /// Error details.
        info: TransportErrorInfo,
    },

    /// Connection terminated.
    Closed {
        /// Connection instance.
        socket: SocketId,
        /// Close details.
        info: CloseInfo,
    },

    /// Reconnect scheduled after an abnormal close.
    Reconnecting {
        /// Delay before the next attempt.
        delay: Duration,
        /// Consecutive abnormal closes since the backoff was last reset.
        failures: u32,
    },
}
