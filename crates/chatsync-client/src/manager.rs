//! Async driver for the connection state machine.
//!
//! [`ConnectionManager`] owns what the sans-IO [`Connection`] cannot: the
//! socket task, the reconnect timer, and credential resolution. Each of these
//! reports back through channels tagged with the socket or attempt id it
//! belongs to; the state machine decides whether the report is still current.
//!
//! Consumers read one ordered stream with [`ConnectionManager::next_event`].

use std::{collections::VecDeque, sync::Arc, time::Duration};

use chatsync_core::{
    AttemptId, Connection, ConnectionAction, ConnectionConfig, ConnectionEvent, ConnectionState,
    Environment, Outbound, SocketId,
};
use tokio::{sync::mpsc, task::AbortHandle};
use url::Url;

use crate::{
    credentials::CredentialProvider,
    transport::{SocketHandle, SocketSignal, Transport},
};

/// How often connect and idle timeouts are evaluated.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Completions of work spawned by the manager.
#[derive(Debug)]
enum Completion {
    Timer(AttemptId),
    Credentials(AttemptId, Option<String>),
}

/// Owns one logical push connection and its reconnects.
///
/// Timers and credential lookups are spawned on the ambient tokio runtime, so
/// the mutating methods must be called from within one.
pub struct ConnectionManager<E: Environment> {
    env: E,
    connection: Connection<E::Instant>,
    transport: Arc<dyn Transport>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    socket: Option<(SocketId, SocketHandle)>,
    timer: Option<AbortHandle>,
    signals_tx: mpsc::UnboundedSender<(SocketId, SocketSignal)>,
    signals_rx: mpsc::UnboundedReceiver<(SocketId, SocketSignal)>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    ready: VecDeque<ConnectionEvent>,
    tick_interval: Duration,
    /// Last timeout evaluation. Kept here so a cancelled `next_event` does
    /// not restart the countdown.
    last_tick: E::Instant,
}

impl<E: Environment> std::fmt::Debug for ConnectionManager<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", self.connection.state())
            .field("socket", &self.socket.as_ref().map(|(id, _)| *id))
            .finish_non_exhaustive()
    }
}

impl<E: Environment> ConnectionManager<E> {
    /// Manager for `target`, disconnected until [`Self::connect`].
    pub fn new(env: E, target: Url, config: ConnectionConfig, transport: Arc<dyn Transport>) -> Self {
        let now = env.now();
        let connection = Connection::new(target, config, now);
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            env,
            connection,
            transport,
            credentials: None,
            socket: None,
            timer: None,
            signals_tx,
            signals_rx,
            completions_tx,
            completions_rx,
            ready: VecDeque::new(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            last_tick: now,
        }
    }

    /// Resolve `provider` before every socket open.
    #[must_use]
    pub fn with_credentials(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.connection = self.connection.with_credentials();
        self.credentials = Some(provider);
        self
    }

    /// Evaluate timeouts every `interval`.
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Current connection state.
    pub fn state(&self) -> &ConnectionState {
        self.connection.state()
    }

    /// True while a socket is open.
    pub fn is_open(&self) -> bool {
        self.connection.is_open()
    }

    /// Start connecting. See [`Connection::connect`].
    pub fn connect(&mut self) {
        let actions = self.connection.connect(self.env.now());
        self.execute(actions);
    }

    /// Close on request. No reconnect follows.
    pub fn disconnect(&mut self) {
        let actions = self.connection.disconnect(self.env.now());
        self.execute(actions);
    }

    /// Hand a frame to the open socket. False, not an error, when there is
    /// none.
    pub fn send(&mut self, payload: impl Into<Outbound>) -> bool {
        let Some(ConnectionAction::SendFrame { socket, text }) = self.connection.send(&payload.into())
        else {
            return false;
        };
        match &self.socket {
            Some((id, handle)) if *id == socket => handle.send(text),
            _ => false,
        }
    }

    /// Next lifecycle event, in order.
    ///
    /// Cancel-safe: dropping the future loses no event, so it can sit in a
    /// `tokio::select!` next to other work.
    pub async fn next_event(&mut self) -> ConnectionEvent {
        loop {
            self.tick_if_due();
            if let Some(event) = self.ready.pop_front() {
                return event;
            }

            let wait = self.tick_interval.saturating_sub(self.env.now() - self.last_tick);
            tokio::select! {
                Some((socket, signal)) = self.signals_rx.recv() => self.on_signal(socket, signal),
                Some(completion) = self.completions_rx.recv() => self.on_completion(completion),
                () = self.env.sleep(wait) => {},
            }
        }
    }

    fn tick_if_due(&mut self) {
        let now = self.env.now();
        if now - self.last_tick < self.tick_interval {
            return;
        }
        self.last_tick = now;
        let actions = self.connection.tick(now);
        self.execute(actions);
    }

    fn on_signal(&mut self, socket: SocketId, signal: SocketSignal) {
        let now = self.env.now();
        let actions = match signal {
            SocketSignal::Opened => self.connection.handle_open(socket, now),
            SocketSignal::Frame(text) => self.connection.handle_frame(socket, &text, now),
            SocketSignal::Error(error) => self.connection.handle_error(socket, &error.to_string()),
            SocketSignal::Closed { code, reason } => {
                if self.socket.as_ref().is_some_and(|(id, _)| *id == socket) {
                    self.socket = None;
                }
                self.connection.handle_close(socket, code, &reason, now)
            },
        };
        self.execute(actions);
    }

    fn on_completion(&mut self, completion: Completion) {
        let now = self.env.now();
        let actions = match completion {
            Completion::Timer(attempt) => self.connection.reconnect_due(attempt, now),
            Completion::Credentials(attempt, token) => {
                self.connection.credentials_resolved(attempt, token.as_deref(), now)
            },
        };
        self.execute(actions);
    }

    fn execute(&mut self, actions: Vec<ConnectionAction>) {
        for action in actions {
            match action {
                ConnectionAction::ResolveCredentials { attempt } => self.resolve(attempt),
                ConnectionAction::OpenSocket { socket, url } => {
                    let handle = self.transport.open(socket, url, self.signals_tx.clone());
                    if let Some((old, previous)) = self.socket.replace((socket, handle)) {
                        tracing::debug!("replacing lingering {old}");
                        previous.close();
                    }
                },
                ConnectionAction::SendFrame { socket, text } => {
                    if let Some((id, handle)) = &self.socket
                        && *id == socket
                    {
                        handle.send(text);
                    }
                },
                ConnectionAction::CloseSocket { socket } => {
                    if self.socket.as_ref().is_some_and(|(id, _)| *id == socket)
                        && let Some((_, handle)) = self.socket.take()
                    {
                        handle.close();
                    }
                },
                ConnectionAction::ScheduleReconnect { attempt, delay } => {
                    self.cancel_timer();
                    let env = self.env.clone();
                    let tx = self.completions_tx.clone();
                    let task = tokio::spawn(async move {
                        env.sleep(delay).await;
                        let _ = tx.send(Completion::Timer(attempt));
                    });
                    self.timer = Some(task.abort_handle());
                },
                ConnectionAction::CancelReconnect => self.cancel_timer(),
                ConnectionAction::Emit(event) => self.ready.push_back(event),
            }
        }
    }

    fn resolve(&mut self, attempt: AttemptId) {
        let tx = self.completions_tx.clone();
        let Some(provider) = self.credentials.clone() else {
            let _ = tx.send(Completion::Credentials(attempt, None));
            return;
        };

        tokio::spawn(async move {
            let token = match provider.token().await {
                Ok(token) => token,
                Err(e) => {
                    tracing::warn!("{e}; connecting without a token");
                    None
                },
            };
            let _ = tx.send(Completion::Credentials(attempt, token));
        });
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
