//! Application state machine.
//!
//! [`App`] owns the [`Session`] (room list, active room, timeline) and the
//! last known connection state. It consumes [`AppEvent`]s and host requests
//! and produces [`AppAction`]s; it never performs I/O.
//!
//! # Responsibilities
//!
//! - Loads rooms and users at startup and selects the first room.
//! - Turns every room switch into exactly one history fetch, plus topic
//!   rescoping when enabled.
//! - Merges pushed messages and send completions into the timeline.
//! - Surfaces failed sends so the host can restore the draft.

use chatsync_client::FetchError;
use chatsync_core::{
    ApplyOutcome, ConfirmOutcome, ConnectionEvent, ConnectionState, Environment, FailOutcome,
    LoadOutcome, LoadTicket, Message, MessageId, Outbound, PendingSend, Room, RoomId, RoomSwitch,
    SendFailurePolicy, Session, SyncError,
};

use crate::{AppAction, AppEvent, ClientConfig, TimelineView};

/// Application state machine.
///
/// Pure: processes events and returns actions, so it runs unchanged under
/// the production runtime and in tests.
#[derive(Debug, Clone)]
pub struct App<E: Environment> {
    /// Rooms, active room, and timeline.
    session: Session<E>,
    /// Push connection state as last reported.
    connection: ConnectionState,
    /// Send subscribe/unsubscribe frames on room switches.
    topic_subscriptions: bool,
    /// Transient status message. `None` if no message.
    status: Option<String>,
}

impl<E: Environment> App<E> {
    /// App with no rooms, disconnected.
    pub fn new(env: E, policy: SendFailurePolicy) -> Self {
        Self {
            session: Session::new(env, policy),
            connection: ConnectionState::Disconnected,
            topic_subscriptions: false,
            status: None,
        }
    }

    /// App configured from `config`.
    pub fn from_config(env: E, config: &ClientConfig) -> Self {
        Self::new(env, config.send_failure_policy).with_topic_subscriptions(config.topic_subscriptions)
    }

    /// Rescope the push connection with subscribe frames on room switches.
    #[must_use]
    pub fn with_topic_subscriptions(mut self, enabled: bool) -> Self {
        self.topic_subscriptions = enabled;
        self
    }

    /// Initial actions: load rooms and users, open the push connection.
    pub fn start(&mut self) -> Vec<AppAction> {
        self.status = Some("Loading rooms...".to_string());
        vec![AppAction::FetchRooms, AppAction::FetchUsers, AppAction::Connect, AppAction::Render]
    }

    /// Process an event and return actions.
    pub fn handle(&mut self, event: AppEvent) -> Vec<AppAction> {
        match event {
            AppEvent::RoomsLoaded(Ok(rooms)) => self.rooms_loaded(rooms),
            AppEvent::RoomsLoaded(Err(e)) => {
                tracing::warn!("failed to load rooms: {e}");
                self.status = Some(format!("Failed to load rooms: {e}"));
                vec![AppAction::Render]
            },
            AppEvent::UsersLoaded(Ok(users)) => {
                self.session.set_users(users);
                vec![AppAction::Render]
            },
            AppEvent::UsersLoaded(Err(e)) => {
                tracing::warn!("failed to load users: {e}");
                vec![]
            },
            AppEvent::HistoryLoaded { ticket, room_id, result } => {
                self.history_loaded(ticket, &room_id, result)
            },
            AppEvent::Connection(event) => self.connection_event(event),
            AppEvent::SendCompleted { pending, result } => self.send_completed(pending, result),
        }
    }

    /// Make `room_id` active. Empty when it already is.
    pub fn select_room(&mut self, room_id: &RoomId) -> Result<Vec<AppAction>, SyncError> {
        match self.session.select_room(room_id)? {
            Some(switch) => Ok(self.switch_actions(switch)),
            None => Ok(vec![]),
        }
    }

    /// Reload the active room's backlog.
    pub fn reload(&mut self) -> Result<Vec<AppAction>, SyncError> {
        let switch = self.session.reload_active()?;
        Ok(self.switch_actions(switch))
    }

    /// Optimistically send `content` to `room_id`, which must be active.
    ///
    /// Returns the local id of the optimistic entry.
    pub fn send_message(
        &mut self,
        room_id: &RoomId,
        content: &str,
    ) -> Result<(MessageId, Vec<AppAction>), SyncError> {
        let pending = self.session.submit_local(room_id, content)?;
        let local_id = pending.local_id.clone();
        Ok((local_id, vec![AppAction::SubmitMessage(pending), AppAction::Render]))
    }

    /// Send `content` to the active room.
    pub fn send_to_active(&mut self, content: &str) -> Result<(MessageId, Vec<AppAction>), SyncError> {
        let room_id = self.session.active_room().cloned().ok_or(SyncError::NoActiveRoom)?;
        self.send_message(&room_id, content)
    }

    /// Open the push connection again after a disconnect.
    pub fn reconnect(&mut self) -> Vec<AppAction> {
        vec![AppAction::Connect]
    }

    /// Close the push connection. It stays closed until [`Self::reconnect`].
    pub fn disconnect(&mut self) -> Vec<AppAction> {
        vec![AppAction::Disconnect]
    }

    /// Quit the application.
    pub fn quit(&self) -> Vec<AppAction> {
        vec![AppAction::Disconnect, AppAction::Quit]
    }

    /// Set a status message.
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some(message.into());
    }

    /// Session behind the app.
    pub fn session(&self) -> &Session<E> {
        &self.session
    }

    /// Push connection state.
    pub fn connection_state(&self) -> &ConnectionState {
        &self.connection
    }

    /// Active room.
    pub fn active_room(&self) -> Option<&RoomId> {
        self.session.active_room()
    }

    /// Timeline of the active room.
    pub fn timeline(&self) -> &[Message] {
        self.session.timeline()
    }

    /// Transient status message. `None` if no message.
    pub fn status_message(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Snapshot for rendering.
    pub fn view(&self) -> TimelineView {
        TimelineView {
            connection: self.connection.clone(),
            rooms: self.session.rooms().to_vec(),
            users: self.session.users().to_vec(),
            active_room: self.session.active_room().cloned(),
            messages: self.session.timeline().to_vec(),
            loading: self.session.in_flight().is_some(),
            status: self.status.clone(),
        }
    }

    fn rooms_loaded(&mut self, rooms: Vec<Room>) -> Vec<AppAction> {
        self.session.set_rooms(rooms);
        self.status = None;

        if self.session.active_room().is_none()
            && let Some(first) = self.session.rooms().first().map(|r| r.id.clone())
        {
            match self.select_room(&first) {
                Ok(actions) => return actions,
                Err(e) => tracing::warn!("could not select {first}: {e}"),
            }
        }
        vec![AppAction::Render]
    }

    fn switch_actions(&self, switch: RoomSwitch) -> Vec<AppAction> {
        let mut actions = Vec::new();
        if self.topic_subscriptions && switch.is_rescope() {
            if let Some(previous) = &switch.previous {
                actions.push(AppAction::SendFrame(Outbound::unsubscribe(previous)));
            }
            actions.push(AppAction::SendFrame(Outbound::subscribe(&switch.room_id)));
        }
        actions.push(AppAction::FetchHistory { ticket: switch.ticket, room_id: switch.room_id });
        actions.push(AppAction::Render);
        actions
    }

    fn history_loaded(
        &mut self,
        ticket: LoadTicket,
        room_id: &RoomId,
        result: Result<Vec<Message>, FetchError>,
    ) -> Vec<AppAction> {
        match result {
            Ok(messages) => match self.session.history_loaded(ticket, messages) {
                LoadOutcome::Applied { .. } => vec![AppAction::Render],
                LoadOutcome::Stale => vec![],
            },
            Err(e) if self.session.history_failed(ticket) => {
                tracing::warn!("history for {room_id} failed: {e}");
                self.status = Some(format!("Failed to load {room_id}: {e}"));
                vec![AppAction::Render]
            },
            Err(e) => {
                tracing::debug!("ignoring stale history failure {ticket} for {room_id}: {e}");
                vec![]
            },
        }
    }

    fn connection_event(&mut self, event: ConnectionEvent) -> Vec<AppAction> {
        match event {
            ConnectionEvent::StateChanged(state) => {
                self.connection = state;
                vec![AppAction::Render]
            },
            ConnectionEvent::Open { .. } => {
                self.status = None;
                match self.session.active_room() {
                    Some(room_id) if self.topic_subscriptions => {
                        vec![AppAction::SendFrame(Outbound::subscribe(room_id)), AppAction::Render]
                    },
                    _ => vec![AppAction::Render],
                }
            },
            ConnectionEvent::Message { inbound, .. } => {
                let Some(incoming) = inbound.as_message() else {
                    tracing::debug!("ignoring non-message frame");
                    return vec![];
                };
                match self.session.apply_incoming(incoming) {
                    ApplyOutcome::Appended | ApplyOutcome::OtherRoom => vec![AppAction::Render],
                    ApplyOutcome::Duplicate => vec![],
                }
            },
            ConnectionEvent::Error { info, .. } => {
                self.status = Some(format!("Connection error: {}", info.message));
                vec![AppAction::Render]
            },
            ConnectionEvent::Closed { .. } => vec![],
            ConnectionEvent::Reconnecting { delay, failures } => {
                self.status =
                    Some(format!("Reconnecting in {}ms (attempt {failures})", delay.as_millis()));
                vec![AppAction::Render]
            },
        }
    }

    fn send_completed(
        &mut self,
        pending: PendingSend,
        result: Result<Message, FetchError>,
    ) -> Vec<AppAction> {
        match result {
            Ok(message) => match self.session.confirm_send(&pending, message) {
                ConfirmOutcome::Replaced | ConfirmOutcome::MergedWithEcho => vec![AppAction::Render],
                ConfirmOutcome::Stale => vec![],
            },
            Err(error) => {
                tracing::warn!("send {} failed: {error}", pending.local_id);
                let outcome = self.session.fail_send(&pending);
                self.status = Some(format!("Failed to send: {error}"));

                let mut actions = vec![AppAction::SendFailed {
                    room_id: pending.room_id,
                    draft: pending.content,
                    error,
                }];
                if outcome != FailOutcome::Stale {
                    actions.push(AppAction::Render);
                }
                actions
            },
        }
    }
}
