//! Scripted socket driver for the connection state machine.
//!
//! `SimSocket` plays the role the async connection manager plays in
//! production: it executes [`ConnectionAction`]s, keeps the one reconnect
//! timer, and collects emitted events. The test plays the server, deciding
//! when the current socket opens, receives frames, errors, or drops.

use std::time::Duration;

use chatsync_core::{
    AttemptId, Connection, ConnectionAction, ConnectionConfig, ConnectionEvent, Environment,
    Outbound, SocketId,
};
use url::Url;

use crate::sim_env::{SimEnv, SimInstant};

/// Virtual-time driver of one [`Connection`].
#[derive(Debug)]
pub struct SimSocket {
    env: SimEnv,
    connection: Connection<SimInstant>,
    token: Option<String>,
    events: Vec<ConnectionEvent>,
    sent: Vec<(SocketId, String)>,
    live: Vec<SocketId>,
    opened_urls: Vec<Url>,
    timer: Option<(AttemptId, SimInstant)>,
    credentials: Option<AttemptId>,
    reconnect_delays: Vec<Duration>,
}

impl SimSocket {
    /// Driver for a fresh, disconnected connection.
    pub fn new(env: SimEnv, target: Url, config: ConnectionConfig) -> Self {
        let connection = Connection::new(target, config, env.now());
        Self {
            env,
            connection,
            token: None,
            events: Vec::new(),
            sent: Vec::new(),
            live: Vec::new(),
            opened_urls: Vec::new(),
            timer: None,
            credentials: None,
            reconnect_delays: Vec::new(),
        }
    }

    /// Resolve `token` before every open. Resolution waits for
    /// [`Self::resolve_credentials`].
    #[must_use]
    pub fn with_token(mut self, token: Option<&str>) -> Self {
        self.connection = self.connection.with_credentials();
        self.token = token.map(str::to_owned);
        self
    }

    /// The state machine under test.
    pub fn connection(&self) -> &Connection<SimInstant> {
        &self.connection
    }

    /// Environment driving the clock.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// All events emitted so far.
    pub fn events(&self) -> &[ConnectionEvent] {
        &self.events
    }

    /// Drain emitted events.
    pub fn take_events(&mut self) -> Vec<ConnectionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Frames handed to a socket, in order.
    pub fn sent(&self) -> &[(SocketId, String)] {
        &self.sent
    }

    /// Sockets opened and not yet closed by the driver.
    pub fn live_sockets(&self) -> &[SocketId] {
        &self.live
    }

    /// URL of every socket opened, in order.
    pub fn opened_urls(&self) -> &[Url] {
        &self.opened_urls
    }

    /// Every reconnect delay scheduled, in order.
    pub fn reconnect_delays(&self) -> &[Duration] {
        &self.reconnect_delays
    }

    /// True while a reconnect timer is armed.
    pub fn timer_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Socket the connection currently holds.
    pub fn socket(&self) -> Option<SocketId> {
        self.connection.current_socket()
    }

    /// Consumer calls `connect()`.
    pub fn connect(&mut self) {
        let actions = self.connection.connect(self.env.now());
        self.execute(actions);
    }

    /// Consumer calls `disconnect()`.
    pub fn disconnect(&mut self) {
        let actions = self.connection.disconnect(self.env.now());
        self.execute(actions);
    }

    /// Consumer calls `send()`. True if a frame reached a socket.
    pub fn send(&mut self, payload: &Outbound) -> bool {
        match self.connection.send(payload) {
            Some(action) => {
                self.execute(vec![action]);
                true
            },
            None => false,
        }
    }

    /// Provider answers the pending credential request.
    pub fn resolve_credentials(&mut self) {
        if let Some(attempt) = self.credentials.take() {
            let actions = self.connection.credentials_resolved(
                attempt,
                self.token.as_deref(),
                self.env.now(),
            );
            self.execute(actions);
        }
    }

    /// Server accepts the current socket.
    pub fn accept(&mut self) {
        if let Some(socket) = self.socket() {
            self.open_from(socket);
        }
    }

    /// Open signal from a specific socket, current or not.
    pub fn open_from(&mut self, socket: SocketId) {
        let actions = self.connection.handle_open(socket, self.env.now());
        self.execute(actions);
    }

    /// Server pushes `text` on the current socket.
    pub fn deliver(&mut self, text: &str) {
        if let Some(socket) = self.socket() {
            self.deliver_from(socket, text);
        }
    }

    /// Frame from a specific socket, current or not.
    pub fn deliver_from(&mut self, socket: SocketId, text: &str) {
        let actions = self.connection.handle_frame(socket, text, self.env.now());
        self.execute(actions);
    }

    /// Transport error on the current socket.
    pub fn fail(&mut self, message: &str) {
        if let Some(socket) = self.socket() {
            let actions = self.connection.handle_error(socket, message);
            self.execute(actions);
        }
    }

    /// Current socket drops abnormally.
    pub fn drop_connection(&mut self, code: Option<u16>, reason: &str) {
        if let Some(socket) = self.socket() {
            self.close_from(socket, code, reason);
        }
    }

    /// Close signal from a specific socket, current or not.
    pub fn close_from(&mut self, socket: SocketId, code: Option<u16>, reason: &str) {
        self.live.retain(|s| *s != socket);
        let actions = self.connection.handle_close(socket, code, reason, self.env.now());
        self.execute(actions);
    }

    /// Advance virtual time, firing the reconnect timer and timeouts that
    /// come due.
    pub fn advance(&mut self, duration: Duration) {
        self.env.advance(duration);
        let now = self.env.now();

        if let Some((attempt, due)) = self.timer
            && due <= now
        {
            self.timer = None;
            let actions = self.connection.reconnect_due(attempt, now);
            self.execute(actions);
        }

        let actions = self.connection.tick(now);
        self.execute(actions);
    }

    /// Advance exactly to the armed timer and fire it.
    pub fn fire_timer(&mut self) {
        if let Some((_, due)) = self.timer {
            let remaining = due - self.env.now();
            self.advance(remaining);
        }
    }

    fn execute(&mut self, actions: Vec<ConnectionAction>) {
        for action in actions {
            match action {
                ConnectionAction::ResolveCredentials { attempt } => {
                    self.credentials = Some(attempt);
                },
                ConnectionAction::OpenSocket { socket, url } => {
                    tracing::trace!("sim open {socket} -> {url}");
                    self.live.push(socket);
                    self.opened_urls.push(url);
                },
                ConnectionAction::SendFrame { socket, text } => {
                    self.sent.push((socket, text));
                },
                ConnectionAction::CloseSocket { socket } => {
                    self.live.retain(|s| *s != socket);
                },
                ConnectionAction::ScheduleReconnect { attempt, delay } => {
                    self.reconnect_delays.push(delay);
                    self.timer = Some((attempt, self.env.now() + delay));
                },
                ConnectionAction::CancelReconnect => {
                    self.timer = None;
                },
                ConnectionAction::Emit(event) => self.events.push(event),
            }
        }
    }
}
