//! Streaming connection lifecycle state machine.
//!
//! Owns the lifecycle of one logical push connection: credential resolution,
//! opening, frame delivery, close detection, and reconnect with exponential
//! backoff. Uses the action pattern: methods take time and socket inputs and
//! return [`ConnectionAction`]s for the driver to execute. The driver owns the
//! real socket and timers; this type only decides.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────────┐ connect ┌────────────┐  open   ┌──────┐
//! │ Disconnected │────────>│ Connecting │────────>│ Open │
//! └──────────────┘         └────────────┘         └──────┘
//!        ^                    ^     │ timeout        │ abnormal close
//!        │ disconnect   timer │     ↓                ↓
//!        │               ┌──────────────┐      ┌──────────────┐
//!        └───────────────│ Reconnecting │<─────│    Closed    │
//!                        └──────────────┘      └──────────────┘
//! ```
//!
//! Reconnecting is entered directly when auto-reconnect is enabled; Closed is
//! terminal until the next `connect()` when it is not.
//!
//! # Instance tagging
//!
//! Every socket gets a fresh [`SocketId`]. Inputs carrying any id other than
//! the one currently held are stale and ignored, so late callbacks from a
//! superseded socket can never reach the consumer. Credential resolutions and
//! reconnect timers are tagged with an [`AttemptId`] the same way.

use std::{
    fmt,
    ops::Sub,
    time::{Duration, Instant},
};

use url::Url;

use crate::{
    backoff::Backoff,
    error::SyncError,
    event::{CloseInfo, ConnectionEvent, TransportErrorInfo},
    frame::{Inbound, Outbound},
};

/// First reconnect delay.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound on the reconnect delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(15_000);

/// Time allowed between starting an attempt and the socket opening.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Close code reported for a local `disconnect()`.
pub const NORMAL_CLOSE_CODE: u16 = 1000;

/// Identifies one connection instance (one socket).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(pub u64);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket#{}", self.0)
    }
}

/// Identifies one credential resolution or reconnect timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttemptId(pub u64);

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attempt#{}", self.0)
    }
}

/// Actions returned by the connection state machine.
///
/// The driver executes these in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionAction {
    /// Resolve the credential provider, then report back through
    /// [`Connection::credentials_resolved`].
    ResolveCredentials {
        /// Attempt the resolution belongs to
        attempt: AttemptId,
    },

    /// Open a socket to this URL.
    OpenSocket {
        /// Instance id for the new socket
        socket: SocketId,
        /// Target, with the credential appended when one was resolved
        url: Url,
    },

    /// Transmit this frame text.
    SendFrame {
        /// Socket to send on
        socket: SocketId,
        /// Encoded frame
        text: String,
    },

    /// Close and drop this socket.
    CloseSocket {
        /// Socket to close
        socket: SocketId,
    },

    /// Arm the reconnect timer, then report back through
    /// [`Connection::reconnect_due`].
    ScheduleReconnect {
        /// Timer generation
        attempt: AttemptId,
        /// Delay before firing
        delay: Duration,
    },

    /// Disarm any pending reconnect timer.
    CancelReconnect,

    /// Deliver this event to the consumer.
    Emit(ConnectionEvent),
}

/// Connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none wanted.
    Disconnected,
    /// Resolving credentials or waiting for the socket to open.
    Connecting,
    /// Socket open, frames flowing.
    Open,
    /// Terminated abnormally with auto-reconnect disabled.
    Closed {
        /// Close reason
        reason: String,
    },
    /// Waiting out the backoff delay before the next attempt.
    Reconnecting {
        /// Delay that was scheduled
        delay: Duration,
    },
}

/// Reconnect policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Reconnect after abnormal closes
    pub enabled: bool,
    /// First delay
    pub initial_delay: Duration,
    /// Delay cap
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self { enabled: true, initial_delay: DEFAULT_INITIAL_DELAY, max_delay: DEFAULT_MAX_DELAY }
    }
}

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Reconnect policy
    pub reconnect: ReconnectConfig,
    /// Abort an attempt that has not opened within this time
    pub connect_timeout: Option<Duration>,
    /// Drop an open connection that received nothing within this time
    pub idle_timeout: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            idle_timeout: None,
        }
    }
}

impl ConnectionConfig {
    /// Check delay ordering and non-zero timeouts.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.reconnect.initial_delay.is_zero() {
            return Err(SyncError::InvalidConfig("initial reconnect delay must be non-zero".into()));
        }
        if self.reconnect.max_delay < self.reconnect.initial_delay {
            return Err(SyncError::InvalidConfig(format!(
                "max reconnect delay {:?} is below initial delay {:?}",
                self.reconnect.max_delay, self.reconnect.initial_delay
            )));
        }
        if self.connect_timeout.is_some_and(|t| t.is_zero())
            || self.idle_timeout.is_some_and(|t| t.is_zero())
        {
            return Err(SyncError::InvalidConfig("timeouts must be non-zero".into()));
        }
        Ok(())
    }
}

/// Connection state machine
///
/// Pure: no I/O, no clock. Time is passed to the methods that need it.
/// Generic over `Instant` so simulation can drive it with virtual time.
#[derive(Debug, Clone)]
pub struct Connection<I = Instant>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    state: ConnectionState,
    config: ConnectionConfig,
    target: Url,
    /// A credential provider is configured
    credentials: bool,
    backoff: Backoff,
    /// The one live (or opening) socket
    socket: Option<SocketId>,
    next_socket: u64,
    next_attempt: u64,
    /// Credential resolution in flight
    resolving: Option<AttemptId>,
    /// Reconnect timer armed
    timer: Option<AttemptId>,
    state_since: I,
    last_activity: I,
}

impl<I> Connection<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Create a connection in [`ConnectionState::Disconnected`].
    pub fn new(target: Url, config: ConnectionConfig, now: I) -> Self {
        let backoff = Backoff::new(config.reconnect.initial_delay, config.reconnect.max_delay);
        Self {
            state: ConnectionState::Disconnected,
            config,
            target,
            credentials: false,
            backoff,
            socket: None,
            next_socket: 1,
            next_attempt: 1,
            resolving: None,
            timer: None,
            state_since: now,
            last_activity: now,
        }
    }

    /// Resolve credentials before every socket open.
    #[must_use]
    pub fn with_credentials(mut self) -> Self {
        self.credentials = true;
        self
    }

    /// Current connection state
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// True while a socket is open.
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// The socket currently held. `None` between sockets.
    pub fn current_socket(&self) -> Option<SocketId> {
        self.socket
    }

    /// Base target URL, without credentials.
    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Reconnect backoff state.
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Active configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Start connecting.
    ///
    /// No-op while an attempt is pending or a socket is open. From
    /// `Disconnected` or `Closed` this starts a fresh sequence and resets the
    /// backoff; from `Reconnecting` it cancels the timer and connects now,
    /// keeping the backoff.
    pub fn connect(&mut self, now: I) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();
        match self.state {
            ConnectionState::Connecting | ConnectionState::Open => {
                tracing::debug!("connect ignored: already {:?}", self.state);
                return actions;
            },
            ConnectionState::Reconnecting { .. } => {
                if self.timer.take().is_some() {
                    actions.push(ConnectionAction::CancelReconnect);
                }
            },
            ConnectionState::Disconnected | ConnectionState::Closed { .. } => {
                self.backoff.reset();
            },
        }

        self.begin_attempt(now, &mut actions);
        actions
    }

    /// Credential provider finished for `attempt`.
    ///
    /// A missing token still opens the socket, just without the parameter.
    pub fn credentials_resolved(
        &mut self,
        attempt: AttemptId,
        token: Option<&str>,
        now: I,
    ) -> Vec<ConnectionAction> {
        if self.resolving != Some(attempt) {
            tracing::debug!("discarding credentials for stale {attempt}");
            return Vec::new();
        }
        self.resolving = None;
        self.state_since = now;

        let mut actions = Vec::new();
        self.open_socket(token, &mut actions);
        actions
    }

    /// Socket reported open.
    pub fn handle_open(&mut self, socket: SocketId, now: I) -> Vec<ConnectionAction> {
        if !self.is_current(socket) || self.state != ConnectionState::Connecting {
            tracing::debug!("discarding open from stale {socket}");
            return Vec::new();
        }

        tracing::info!("connection open on {socket}");
        self.last_activity = now;

        let mut actions = Vec::new();
        self.transition(ConnectionState::Open, now, &mut actions);
        actions.push(ConnectionAction::Emit(ConnectionEvent::Open { socket }));
        actions
    }

    /// Socket delivered a text frame.
    pub fn handle_frame(&mut self, socket: SocketId, text: &str, now: I) -> Vec<ConnectionAction> {
        if !self.is_current(socket) {
            tracing::trace!("discarding frame from stale {socket}");
            return Vec::new();
        }
        self.last_activity = now;

        let inbound = Inbound::decode(text);
        vec![ConnectionAction::Emit(ConnectionEvent::Message { socket, inbound })]
    }

    /// Socket reported a transport error.
    ///
    /// Reported only: the close that usually follows decides what happens.
    pub fn handle_error(&mut self, socket: SocketId, message: &str) -> Vec<ConnectionAction> {
        if !self.is_current(socket) {
            tracing::debug!("discarding error from stale {socket}: {message}");
            return Vec::new();
        }

        tracing::warn!("transport error on {socket}: {message}");
        let info = TransportErrorInfo { message: message.to_owned() };
        vec![ConnectionAction::Emit(ConnectionEvent::Error { socket, info })]
    }

    /// Socket terminated. The authoritative end of a connection instance.
    pub fn handle_close(
        &mut self,
        socket: SocketId,
        code: Option<u16>,
        reason: &str,
        now: I,
    ) -> Vec<ConnectionAction> {
        if !self.is_current(socket) {
            tracing::debug!("discarding close from stale {socket}");
            return Vec::new();
        }
        self.socket = None;

        tracing::info!("connection {socket} closed (code {code:?}): {reason}");
        let info = CloseInfo { code, reason: reason.to_owned(), explicit: false };
        let mut actions = vec![ConnectionAction::Emit(ConnectionEvent::Closed { socket, info })];
        self.after_abnormal_close(reason, now, &mut actions);
        actions
    }

    /// Reconnect timer fired for `attempt`.
    pub fn reconnect_due(&mut self, attempt: AttemptId, now: I) -> Vec<ConnectionAction> {
        if self.timer != Some(attempt) {
            tracing::debug!("discarding stale reconnect timer {attempt}");
            return Vec::new();
        }
        self.timer = None;

        let mut actions = Vec::new();
        self.begin_attempt(now, &mut actions);
        actions
    }

    /// Frame for `payload` if a socket is open. `None` is not an error.
    pub fn send(&self, payload: &Outbound) -> Option<ConnectionAction> {
        match (self.is_open(), self.socket) {
            (true, Some(socket)) => {
                Some(ConnectionAction::SendFrame { socket, text: payload.encode() })
            },
            _ => None,
        }
    }

    /// Close on request. No reconnect follows, and late events from the
    /// closed socket are discarded. Safe to repeat.
    pub fn disconnect(&mut self, now: I) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();
        if self.timer.take().is_some() {
            actions.push(ConnectionAction::CancelReconnect);
        }
        self.resolving = None;

        if let Some(socket) = self.socket.take() {
            tracing::info!("disconnecting {socket}");
            actions.push(ConnectionAction::CloseSocket { socket });
            let info = CloseInfo {
                code: Some(NORMAL_CLOSE_CODE),
                reason: "client disconnect".to_owned(),
                explicit: true,
            };
            actions.push(ConnectionAction::Emit(ConnectionEvent::Closed { socket, info }));
        }

        self.transition(ConnectionState::Disconnected, now, &mut actions);
        actions
    }

    /// Periodic maintenance: connect and idle timeouts.
    ///
    /// A timeout counts as an abnormal close and follows the reconnect policy.
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        match self.state {
            ConnectionState::Connecting => {
                let elapsed = now - self.state_since;
                if let Some(timeout) = self.config.connect_timeout
                    && elapsed > timeout
                {
                    return self.abort(format!("connect timeout after {elapsed:?}"), now);
                }
            },
            ConnectionState::Open => {
                let elapsed = now - self.last_activity;
                if let Some(timeout) = self.config.idle_timeout
                    && elapsed > timeout
                {
                    return self.abort(format!("idle timeout after {elapsed:?}"), now);
                }
            },
            _ => {},
        }
        Vec::new()
    }

    fn is_current(&self, socket: SocketId) -> bool {
        self.socket == Some(socket)
    }

    fn next_attempt_id(&mut self) -> AttemptId {
        let id = AttemptId(self.next_attempt);
        self.next_attempt += 1;
        id
    }

    fn transition(&mut self, state: ConnectionState, now: I, actions: &mut Vec<ConnectionAction>) {
        if self.state == state {
            return;
        }
        self.state = state.clone();
        self.state_since = now;
        actions.push(ConnectionAction::Emit(ConnectionEvent::StateChanged(state)));
    }

    fn begin_attempt(&mut self, now: I, actions: &mut Vec<ConnectionAction>) {
        self.transition(ConnectionState::Connecting, now, actions);

        if self.credentials {
            let attempt = self.next_attempt_id();
            self.resolving = Some(attempt);
            actions.push(ConnectionAction::ResolveCredentials { attempt });
        } else {
            self.open_socket(None, actions);
        }
    }

    fn open_socket(&mut self, token: Option<&str>, actions: &mut Vec<ConnectionAction>) {
        let socket = SocketId(self.next_socket);
        self.next_socket += 1;
        self.socket = Some(socket);

        let mut url = self.target.clone();
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            url.query_pairs_mut().append_pair("token", token);
        }

        tracing::debug!("opening {socket} to {}", self.target);
        actions.push(ConnectionAction::OpenSocket { socket, url });
    }

    fn abort(&mut self, reason: String, now: I) -> Vec<ConnectionAction> {
        tracing::warn!("aborting connection: {reason}");
        self.resolving = None;

        let mut actions = Vec::new();
        if let Some(socket) = self.socket.take() {
            actions.push(ConnectionAction::CloseSocket { socket });
            let info = CloseInfo { code: None, reason: reason.clone(), explicit: false };
            actions.push(ConnectionAction::Emit(ConnectionEvent::Closed { socket, info }));
        }
        self.after_abnormal_close(&reason, now, &mut actions);
        actions
    }

    fn after_abnormal_close(&mut self, reason: &str, now: I, actions: &mut Vec<ConnectionAction>) {
        if !self.config.reconnect.enabled {
            self.transition(ConnectionState::Closed { reason: reason.to_owned() }, now, actions);
            return;
        }

        let delay = self.backoff.next_delay();
        let attempt = self.next_attempt_id();
        self.timer = Some(attempt);

        tracing::info!("reconnecting in {delay:?} ({attempt})");
        self.transition(ConnectionState::Reconnecting { delay }, now, actions);
        actions.push(ConnectionAction::ScheduleReconnect { attempt, delay });
        actions.push(ConnectionAction::Emit(ConnectionEvent::Reconnecting {
            delay,
            failures: self.backoff.attempts(),
        }));
    }
}
