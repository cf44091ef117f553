//! Socket transports for the push connection.
//!
//! A [`Transport`] opens one socket per call and runs it on its own task. The
//! task reports what happens through [`SocketSignal`]s tagged with the
//! socket's id, and takes [`SocketCommand`]s through the returned
//! [`SocketHandle`]. Protocol decisions stay in the core state machine; the
//! transport only moves text.

#[cfg(feature = "transport")]
pub mod ws;

use chatsync_core::SocketId;
use thiserror::Error;
use tokio::{sync::mpsc, task::AbortHandle};
use url::Url;

/// Transport errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Socket could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Read or write on an established socket failed.
    #[error("stream error: {0}")]
    Stream(String),

    /// Peer sent something the transport cannot carry.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Returns true if a fresh socket may succeed where this one failed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Protocol(_))
    }
}

/// What a socket task observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketSignal {
    /// Handshake completed.
    Opened,
    /// Text frame received.
    Frame(String),
    /// Non-fatal error. A `Closed` follows if the socket is gone.
    Error(TransportError),
    /// Socket terminated. Always the last signal of a socket.
    Closed {
        /// Close code, when the peer sent one
        code: Option<u16>,
        /// Close reason
        reason: String,
    },
}

/// Instructions for a socket task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketCommand {
    /// Write a text frame.
    Send(String),
    /// Close the socket and stop the task without further signals.
    Close,
}

/// Channel socket tasks report on.
pub type SignalSender = mpsc::UnboundedSender<(SocketId, SocketSignal)>;

/// Handle to one running socket task.
#[derive(Debug)]
pub struct SocketHandle {
    commands: mpsc::UnboundedSender<SocketCommand>,
    task: Option<AbortHandle>,
}

impl SocketHandle {
    /// Handle over a command channel and, optionally, the task to abort on
    /// close.
    pub fn new(commands: mpsc::UnboundedSender<SocketCommand>, task: Option<AbortHandle>) -> Self {
        Self { commands, task }
    }

    /// Queue a text frame. False if the task is gone.
    pub fn send(&self, text: String) -> bool {
        self.commands.send(SocketCommand::Send(text)).is_ok()
    }

    /// Ask the task to close, then stop it.
    pub fn close(self) {
        let _ = self.commands.send(SocketCommand::Close);
        if let Some(task) = self.task {
            task.abort();
        }
    }
}

/// Opens sockets.
pub trait Transport: Send + Sync {
    /// Start a socket to `url` on its own task, reporting on `signals`.
    ///
    /// Must not block. Connection failures are reported as an `Error`
    /// followed by `Closed`.
    fn open(&self, socket: SocketId, url: Url, signals: SignalSender) -> SocketHandle;
}
