//! Generic runtime for application orchestration.
//!
//! The Runtime drives the application event loop, coordinating between:
//! - [`App`]: pure state machine
//! - [`HistoryFetcher`]: request/response backend, called from spawned tasks
//! - [`ConnectionManager`]: push connection and its reconnects
//! - [`RuntimeHandle`]: commands in, [`TimelineView`] snapshots and
//!   [`Notice`]s out
//!
//! One task owns the App. Fetches and sends run as spawned tasks whose
//! results re-enter the loop as [`AppEvent`]s, so the App never sees two
//! inputs at once.

use std::sync::Arc;

use chatsync_client::{ConnectionManager, FetchError, HistoryFetcher, StaticToken, Transport};
use chatsync_core::{Environment, MessageId, RoomId, SyncError};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::{App, AppAction, AppEvent, ClientConfig, RuntimeError, TimelineView};

const NOTICE_CAPACITY: usize = 64;

/// Host requests to the runtime.
#[derive(Debug)]
pub enum Command {
    /// Make a room active.
    SelectRoom {
        /// Room to select.
        room_id: RoomId,
        /// Outcome.
        reply: oneshot::Sender<Result<(), SyncError>>,
    },

    /// Reload the active room's backlog.
    Reload {
        /// Outcome.
        reply: oneshot::Sender<Result<(), SyncError>>,
    },

    /// Send a message.
    SendMessage {
        /// Target room. `None` means the active room.
        room_id: Option<RoomId>,
        /// Message text.
        content: String,
        /// Local id of the optimistic entry.
        reply: oneshot::Sender<Result<MessageId, SyncError>>,
    },

    /// Open the push connection again.
    Reconnect,

    /// Close the push connection.
    Disconnect,

    /// Stop the runtime.
    Quit,
}

/// Out-of-band notifications for the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A message could not be sent. `draft` can be put back in the input.
    SendFailed {
        /// Room the message was for.
        room_id: RoomId,
        /// Content of the failed message.
        draft: String,
        /// Backend error.
        error: FetchError,
    },
}

/// Host-side handle to a running [`Runtime`].
///
/// Cheap to clone. The runtime quits once every handle is dropped.
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<TimelineView>,
    notices: broadcast::Sender<Notice>,
}

impl RuntimeHandle {
    /// Make `room_id` active.
    pub async fn select_room(&self, room_id: impl Into<RoomId>) -> Result<(), RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::SelectRoom { room_id: room_id.into(), reply })?;
        rx.await.map_err(|_| RuntimeError::Stopped)?.map_err(RuntimeError::from)
    }

    /// Reload the active room's backlog.
    pub async fn reload(&self) -> Result<(), RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Reload { reply })?;
        rx.await.map_err(|_| RuntimeError::Stopped)?.map_err(RuntimeError::from)
    }

    /// Send `content` to the active room. Returns the optimistic entry's id.
    pub async fn send_message(&self, content: impl Into<String>) -> Result<MessageId, RuntimeError> {
        self.send(None, content.into()).await
    }

    /// Send `content` to `room_id`, which must be active.
    pub async fn send_to(
        &self,
        room_id: impl Into<RoomId>,
        content: impl Into<String>,
    ) -> Result<MessageId, RuntimeError> {
        self.send(Some(room_id.into()), content.into()).await
    }

    /// Open the push connection again after [`Self::disconnect`].
    pub fn reconnect(&self) -> Result<(), RuntimeError> {
        self.command(Command::Reconnect)
    }

    /// Close the push connection. No reconnect follows.
    pub fn disconnect(&self) -> Result<(), RuntimeError> {
        self.command(Command::Disconnect)
    }

    /// Stop the runtime.
    pub fn quit(&self) -> Result<(), RuntimeError> {
        self.command(Command::Quit)
    }

    /// Latest published view, updated after every change.
    pub fn view(&self) -> watch::Receiver<TimelineView> {
        self.view.clone()
    }

    /// Subscribe to notices published from now on.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    async fn send(&self, room_id: Option<RoomId>, content: String) -> Result<MessageId, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::SendMessage { room_id, content, reply })?;
        rx.await.map_err(|_| RuntimeError::Stopped)?.map_err(RuntimeError::from)
    }

    fn command(&self, command: Command) -> Result<(), RuntimeError> {
        self.commands.send(command).map_err(|_| RuntimeError::Stopped)
    }
}

/// Runtime that owns the App and executes its actions.
pub struct Runtime<E: Environment> {
    app: App<E>,
    history: Arc<dyn HistoryFetcher>,
    connection: ConnectionManager<E>,
    commands: mpsc::UnboundedReceiver<Command>,
    events_tx: mpsc::UnboundedSender<AppEvent>,
    events_rx: mpsc::UnboundedReceiver<AppEvent>,
    view: watch::Sender<TimelineView>,
    notices: broadcast::Sender<Notice>,
}

impl<E: Environment> std::fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("active_room", &self.app.active_room())
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

impl<E: Environment> Runtime<E> {
    /// Runtime over an existing App and connection manager.
    pub fn new(
        app: App<E>,
        history: Arc<dyn HistoryFetcher>,
        connection: ConnectionManager<E>,
    ) -> (Self, RuntimeHandle) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (view, view_rx) = watch::channel(app.view());
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        let handle = RuntimeHandle { commands: commands_tx, view: view_rx, notices: notices.clone() };
        let runtime =
            Self { app, history, connection, commands, events_tx, events_rx, view, notices };
        (runtime, handle)
    }

    /// Runtime built from a validated `config`.
    ///
    /// The push URL comes from the config; a configured token is appended to
    /// it on every open.
    pub fn from_config(
        env: E,
        config: &ClientConfig,
        history: Arc<dyn HistoryFetcher>,
        transport: Arc<dyn Transport>,
    ) -> Result<(Self, RuntimeHandle), RuntimeError> {
        config.validate()?;
        let target = config.push_url()?;

        let mut connection =
            ConnectionManager::new(env.clone(), target, config.connection.clone(), transport);
        if let Some(token) = config.token() {
            connection = connection.with_credentials(Arc::new(StaticToken::new(token)));
        }

        let app = App::from_config(env, config);
        Ok(Self::new(app, history, connection))
    }

    /// The App.
    pub fn app(&self) -> &App<E> {
        &self.app
    }

    /// Run until [`Command::Quit`] or until every handle is dropped.
    pub async fn run(mut self) {
        let actions = self.app.start();
        if self.execute(actions) {
            return;
        }

        loop {
            let actions = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => {
                        tracing::info!("all handles dropped, stopping");
                        self.app.quit()
                    },
                },
                Some(event) = self.events_rx.recv() => self.app.handle(event),
                event = self.connection.next_event() => {
                    tracing::trace!("connection event {event:?}");
                    self.app.handle(AppEvent::Connection(event))
                },
            };

            if self.execute(actions) {
                break;
            }
        }
        tracing::info!("runtime stopped");
    }

    fn on_command(&mut self, command: Command) -> Vec<AppAction> {
        match command {
            Command::SelectRoom { room_id, reply } => reply_with(reply, self.app.select_room(&room_id)),
            Command::Reload { reply } => reply_with(reply, self.app.reload()),
            Command::SendMessage { room_id, content, reply } => {
                let result = match room_id {
                    Some(room_id) => self.app.send_message(&room_id, &content),
                    None => self.app.send_to_active(&content),
                };
                match result {
                    Ok((local_id, actions)) => {
                        let _ = reply.send(Ok(local_id));
                        actions
                    },
                    Err(e) => {
                        let _ = reply.send(Err(e));
                        vec![]
                    },
                }
            },
            Command::Reconnect => self.app.reconnect(),
            Command::Disconnect => self.app.disconnect(),
            Command::Quit => self.app.quit(),
        }
    }

    /// Execute actions. Returns `true` if the runtime should stop.
    fn execute(&mut self, actions: Vec<AppAction>) -> bool {
        let mut render = false;
        let mut quit = false;

        for action in actions {
            match action {
                AppAction::Render => render = true,
                AppAction::Quit => quit = true,
                AppAction::Connect => self.connection.connect(),
                AppAction::Disconnect => self.connection.disconnect(),
                AppAction::FetchRooms => {
                    self.spawn(|history| async move { AppEvent::RoomsLoaded(history.list_rooms().await) });
                },
                AppAction::FetchUsers => {
                    self.spawn(|history| async move { AppEvent::UsersLoaded(history.list_users().await) });
                },
                AppAction::FetchHistory { ticket, room_id } => {
                    self.spawn(move |history| async move {
                        let result = history.get_messages(&room_id).await;
                        AppEvent::HistoryLoaded { ticket, room_id, result }
                    });
                },
                AppAction::SubmitMessage(pending) => {
                    self.spawn(move |history| async move {
                        let result = history.send_message(&pending.room_id, &pending.content).await;
                        AppEvent::SendCompleted { pending, result }
                    });
                },
                AppAction::SendFrame(outbound) => {
                    if !self.connection.send(outbound) {
                        tracing::debug!("push connection not open, frame dropped");
                    }
                },
                AppAction::SendFailed { room_id, draft, error } => {
                    // No subscribers is fine
                    let _ = self.notices.send(Notice::SendFailed { room_id, draft, error });
                },
            }
        }

        if render {
            self.view.send_replace(self.app.view());
        }
        quit
    }

    fn spawn<F, Fut>(&self, request: F)
    where
        F: FnOnce(Arc<dyn HistoryFetcher>) -> Fut,
        Fut: std::future::Future<Output = AppEvent> + Send + 'static,
    {
        let future = request(Arc::clone(&self.history));
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(future.await);
        });
    }
}

fn reply_with(
    reply: oneshot::Sender<Result<(), SyncError>>,
    result: Result<Vec<AppAction>, SyncError>,
) -> Vec<AppAction> {
    match result {
        Ok(actions) => {
            let _ = reply.send(Ok(()));
            actions
        },
        Err(e) => {
            let _ = reply.send(Err(e));
            vec![]
        },
    }
}
