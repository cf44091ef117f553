//! Active-room selection and stale-load guarding.
//!
//! The session is the single source of truth for which room is active. Every
//! switch issues a new [`LoadTicket`]; a history response is applied only when
//! it carries the latest ticket and its room is still active. Responses for
//! earlier switches are dropped, so rapid A→B→A selection shows only the last
//! load.

use std::fmt;

use crate::{
    env::Environment,
    error::SyncError,
    frame::IncomingMessage,
    model::{Message, Room, RoomId, User},
    reconciler::{
        ApplyOutcome, ConfirmOutcome, FailOutcome, LoadOutcome, PendingSend, Reconciler,
        SendFailurePolicy,
    },
};

/// Generation number of one room switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadTicket(pub u64);

impl fmt::Display for LoadTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "load#{}", self.0)
    }
}

/// A room switch the caller must follow with exactly one history load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSwitch {
    /// Ticket the history response must carry.
    pub ticket: LoadTicket,
    /// Room active before the switch. Equals `room_id` for a reload.
    pub previous: Option<RoomId>,
    /// Newly active room.
    pub room_id: RoomId,
}

impl RoomSwitch {
    /// True when the active room actually changed.
    pub fn is_rescope(&self) -> bool {
        self.previous.as_ref() != Some(&self.room_id)
    }
}

/// Room list, active room, and the timeline behind it.
#[derive(Debug, Clone)]
pub struct Session<E: Environment> {
    reconciler: Reconciler<E>,
    rooms: Vec<Room>,
    users: Vec<User>,
    rooms_known: bool,
    next_ticket: u64,
    in_flight: Option<(LoadTicket, RoomId)>,
}

impl<E: Environment> Session<E> {
    /// Session with no rooms and no active room.
    pub fn new(env: E, policy: SendFailurePolicy) -> Self {
        Self {
            reconciler: Reconciler::new(env, policy),
            rooms: Vec::new(),
            users: Vec::new(),
            rooms_known: false,
            next_ticket: 1,
            in_flight: None,
        }
    }

    /// Known rooms, in server order.
    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    /// Room by id.
    pub fn room(&self, room_id: &RoomId) -> Option<&Room> {
        self.rooms.iter().find(|r| &r.id == room_id)
    }

    /// Known users.
    pub fn users(&self) -> &[User] {
        &self.users
    }

    /// True once a room list has been loaded.
    pub fn rooms_known(&self) -> bool {
        self.rooms_known
    }

    /// Active room.
    pub fn active_room(&self) -> Option<&RoomId> {
        self.reconciler.active_room()
    }

    /// Timeline of the active room.
    pub fn timeline(&self) -> &[Message] {
        self.reconciler.timeline()
    }

    /// Underlying reconciler.
    pub fn reconciler(&self) -> &Reconciler<E> {
        &self.reconciler
    }

    /// Ticket of the history load still awaited, if any.
    pub fn in_flight(&self) -> Option<LoadTicket> {
        self.in_flight.as_ref().map(|(ticket, _)| *ticket)
    }

    /// Replace the room list. Local unread counts survive for rooms that
    /// remain.
    pub fn set_rooms(&mut self, rooms: Vec<Room>) {
        let previous = std::mem::take(&mut self.rooms);
        self.rooms = rooms
            .into_iter()
            .map(|mut room| {
                if let Some(old) = previous.iter().find(|r| r.id == room.id) {
                    room.unread = room.unread.max(old.unread);
                }
                room
            })
            .collect();
        self.rooms_known = true;

        if let Some(active) = self.active_room()
            && self.room(active).is_none()
        {
            tracing::warn!("active room {active} missing from room list");
        }
    }

    /// Replace the user list.
    pub fn set_users(&mut self, users: Vec<User>) {
        self.users = users;
    }

    /// Make `room_id` active.
    ///
    /// Returns `None` when it already is. Unknown ids are rejected once the
    /// room list is known.
    pub fn select_room(&mut self, room_id: &RoomId) -> Result<Option<RoomSwitch>, SyncError> {
        if self.rooms_known && self.room(room_id).is_none() {
            return Err(SyncError::UnknownRoom(room_id.clone()));
        }
        if self.active_room() == Some(room_id) {
            return Ok(None);
        }

        let previous = self.reconciler.switch_active_room(room_id.clone());
        let ticket = self.issue_ticket(room_id);
        tracing::info!("switched to room {room_id} ({ticket})");

        Ok(Some(RoomSwitch { ticket, previous, room_id: room_id.clone() }))
    }

    /// Reload the active room's history without switching.
    pub fn reload_active(&mut self) -> Result<RoomSwitch, SyncError> {
        let room_id = self.active_room().cloned().ok_or(SyncError::NoActiveRoom)?;
        let ticket = self.issue_ticket(&room_id);
        tracing::debug!("reloading room {room_id} ({ticket})");

        Ok(RoomSwitch { ticket, previous: Some(room_id.clone()), room_id })
    }

    /// Apply a history response if `ticket` is still the one awaited.
    pub fn history_loaded(&mut self, ticket: LoadTicket, messages: Vec<Message>) -> LoadOutcome {
        let room_id = match self.in_flight.take() {
            Some((awaited, room_id)) if awaited == ticket => room_id,
            other => {
                self.in_flight = other;
                tracing::debug!("discarding stale history response {ticket}");
                return LoadOutcome::Stale;
            },
        };

        let outcome = self.reconciler.load_history(&room_id, messages);
        if let LoadOutcome::Applied { .. } = outcome
            && let Some(room) = self.rooms.iter_mut().find(|r| r.id == room_id)
        {
            room.unread = 0;
        }
        outcome
    }

    /// Record a failed history load. True if it was the one awaited.
    pub fn history_failed(&mut self, ticket: LoadTicket) -> bool {
        match self.in_flight {
            Some((awaited, _)) if awaited == ticket => {
                self.in_flight = None;
                true
            },
            _ => false,
        }
    }

    /// Merge a pushed message, counting it as unread if it targets a known
    /// room that is not active.
    pub fn apply_incoming(&mut self, incoming: IncomingMessage) -> ApplyOutcome {
        let room_id = incoming.room_id.clone();
        let outcome = self.reconciler.apply_incoming(incoming);

        if outcome == ApplyOutcome::OtherRoom
            && let Some(room) = self.rooms.iter_mut().find(|r| r.id == room_id)
        {
            room.unread = room.unread.saturating_add(1);
        }
        outcome
    }

    /// Optimistically send `content` to the active room.
    pub fn submit_local(&mut self, room_id: &RoomId, content: &str) -> Result<PendingSend, SyncError> {
        self.reconciler.submit_local(room_id, content)
    }

    /// See [`Reconciler::confirm_send`].
    pub fn confirm_send(&mut self, pending: &PendingSend, canonical: Message) -> ConfirmOutcome {
        self.reconciler.confirm_send(pending, canonical)
    }

    /// See [`Reconciler::fail_send`].
    pub fn fail_send(&mut self, pending: &PendingSend) -> FailOutcome {
        self.reconciler.fail_send(pending)
    }

    fn issue_ticket(&mut self, room_id: &RoomId) -> LoadTicket {
        let ticket = LoadTicket(self.next_ticket);
        self.next_ticket += 1;
        self.in_flight = Some((ticket, room_id.clone()));
        ticket
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::model::DeliveryState;

    #[derive(Clone)]
    struct TestEnv;

    impl Environment for TestEnv {
        type Instant = Instant;

        fn now(&self) -> Self::Instant {
            Instant::now()
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            async {}
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            buffer.fill(3);
        }

        fn wall_clock_millis(&self) -> i64 {
            0
        }
    }

    fn session() -> Session<TestEnv> {
        let mut session = Session::new(TestEnv, SendFailurePolicy::Retain);
        session.set_rooms(vec![Room::new("general", "General"), Room::new("dev", "Dev")]);
        session
    }

    fn message(id: &str, room: &str) -> Message {
        Message {
            id: id.into(),
            room_id: room.into(),
            author: "ana".into(),
            mine: false,
            content: "hi".into(),
            timestamp_ms: 0,
            delivery: DeliveryState::Confirmed,
        }
    }

    #[test]
    fn tickets_increase_per_switch() {
        let mut session = session();

        let first = session.select_room(&"general".into()).unwrap().unwrap();
        let second = session.select_room(&"dev".into()).unwrap().unwrap();

        assert!(second.ticket > first.ticket);
        assert_eq!(second.previous, Some("general".into()));
        assert!(second.is_rescope());
    }

    #[test]
    fn selecting_active_room_is_noop() {
        let mut session = session();
        session.select_room(&"general".into()).unwrap();

        assert_eq!(session.select_room(&"general".into()), Ok(None));
    }

    #[test]
    fn unknown_room_rejected_once_list_known() {
        let mut fresh = Session::new(TestEnv, SendFailurePolicy::Retain);
        assert!(fresh.select_room(&"anything".into()).unwrap().is_some());

        let mut session = session();
        assert_eq!(
            session.select_room(&"nope".into()),
            Err(SyncError::UnknownRoom("nope".into()))
        );
    }

    #[test]
    fn rapid_switches_apply_only_last_load() {
        let mut session = session();
        let a1 = session.select_room(&"general".into()).unwrap().unwrap();
        let b = session.select_room(&"dev".into()).unwrap().unwrap();
        let a2 = session.select_room(&"general".into()).unwrap().unwrap();

        assert_eq!(session.history_loaded(b.ticket, vec![message("d1", "dev")]), LoadOutcome::Stale);
        assert_eq!(
            session.history_loaded(a1.ticket, vec![message("old", "general")]),
            LoadOutcome::Stale
        );
        assert_eq!(
            session.history_loaded(a2.ticket, vec![message("g1", "general")]),
            LoadOutcome::Applied { count: 1 }
        );
        assert_eq!(session.timeline().len(), 1);
        assert_eq!(session.timeline()[0].id.as_str(), "g1");
    }

    #[test]
    fn reload_issues_new_ticket_without_rescope() {
        let mut session = session();
        let switch = session.select_room(&"general".into()).unwrap().unwrap();

        let reload = session.reload_active().unwrap();
        assert!(reload.ticket > switch.ticket);
        assert!(!reload.is_rescope());
        assert_eq!(session.history_loaded(switch.ticket, Vec::new()), LoadOutcome::Stale);
    }

    #[test]
    fn reload_without_active_room_fails() {
        let mut session = session();
        assert_eq!(session.reload_active(), Err(SyncError::NoActiveRoom));
    }

    #[test]
    fn unread_counts_pushes_to_other_rooms() {
        let mut session = session();
        let switch = session.select_room(&"general".into()).unwrap().unwrap();
        session.history_loaded(switch.ticket, Vec::new());

        let push = IncomingMessage {
            id: "p1".into(),
            room_id: "dev".into(),
            author: "bo".into(),
            content: "psst".into(),
            timestamp_ms: None,
        };
        assert_eq!(session.apply_incoming(push), ApplyOutcome::OtherRoom);
        assert_eq!(session.room(&"dev".into()).map(|r| r.unread), Some(1));
        assert!(session.timeline().is_empty());

        let switch = session.select_room(&"dev".into()).unwrap().unwrap();
        session.history_loaded(switch.ticket, vec![message("p1", "dev")]);
        assert_eq!(session.room(&"dev".into()).map(|r| r.unread), Some(0));
    }

    #[test]
    fn history_failure_clears_in_flight() {
        let mut session = session();
        let switch = session.select_room(&"general".into()).unwrap().unwrap();

        assert!(session.history_failed(switch.ticket));
        assert!(!session.history_failed(switch.ticket));
        assert_eq!(session.in_flight(), None);
        assert!(session.timeline().is_empty());
    }

    #[test]
    fn set_rooms_keeps_local_unread() {
        let mut session = session();
        session.select_room(&"general".into()).unwrap();
        session.apply_incoming(IncomingMessage {
            id: "p1".into(),
            room_id: "dev".into(),
            author: "bo".into(),
            content: "psst".into(),
            timestamp_ms: None,
        });

        session.set_rooms(vec![Room::new("general", "General"), Room::new("dev", "Dev")]);
        assert_eq!(session.room(&"dev".into()).map(|r| r.unread), Some(1));
    }
}
