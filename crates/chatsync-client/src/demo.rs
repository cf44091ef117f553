//! In-memory demo backend.
//!
//! Serves history from an owned [`DemoStore`] and acts as its own push
//! channel: every saved message is echoed to all open demo sockets, the way a
//! real server broadcasts to subscribers. Useful without a server and as a
//! fully scriptable backend in tests.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use chatsync_core::{DeliveryState, Environment, Message, MessageId, Room, RoomId, SocketId, User, UserId};
use tokio::sync::{broadcast, mpsc};
use url::Url;

use crate::{
    history::{FetchError, HistoryFetcher},
    transport::{SignalSender, SocketCommand, SocketHandle, SocketSignal, Transport, TransportError},
};

/// Messages returned per history request.
pub const DEMO_HISTORY_WINDOW: usize = 50;

/// Author label the demo backend gives to messages sent through it.
pub const DEMO_SELF_AUTHOR: &str = "me";

const PUSH_CAPACITY: usize = 256;

/// Rooms, users, and messages of one demo backend.
#[derive(Debug, Clone, Default)]
pub struct DemoStore {
    rooms: Vec<Room>,
    users: Vec<User>,
    messages: HashMap<RoomId, Vec<Message>>,
    next_id: u64,
}

impl DemoStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with three rooms, a few users, and some backlog.
    pub fn seeded(now_ms: i64) -> Self {
        let mut store = Self::new();
        store.add_room(Room::new("general", "General"));
        store.add_room(Room::new("dev", "Development"));
        store.add_room(Room::new("random", "Random"));

        for (id, name, online) in [("ana", "Ana", true), ("bo", "Bo", true), ("cy", "Cy", false)] {
            store.add_user(User { id: UserId::from(id), name: name.to_owned(), online });
        }

        let backlog = [
            ("general", "ana", "Welcome to general!"),
            ("general", "bo", "Morning all"),
            ("dev", "cy", "CI is green again"),
            ("random", "bo", "Anyone up for lunch?"),
        ];
        for (offset, (room, author, content)) in backlog.into_iter().enumerate() {
            let ts = now_ms - 60_000 * (backlog.len() - offset) as i64;
            store.insert(&RoomId::from(room), author, content, ts);
        }
        store
    }

    /// Add a room. Replaces a room with the same id.
    pub fn add_room(&mut self, room: Room) {
        self.messages.entry(room.id.clone()).or_default();
        match self.rooms.iter_mut().find(|r| r.id == room.id) {
            Some(existing) => *existing = room,
            None => self.rooms.push(room),
        }
    }

    /// Add a user.
    pub fn add_user(&mut self, user: User) {
        self.users.push(user);
    }

    /// Known rooms.
    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    /// True if the room exists.
    pub fn has_room(&self, room_id: &RoomId) -> bool {
        self.rooms.iter().any(|r| &r.id == room_id)
    }

    /// Every saved message of a room, oldest first.
    pub fn messages(&self, room_id: &RoomId) -> &[Message] {
        self.messages.get(room_id).map_or(&[], Vec::as_slice)
    }

    /// Save a message under a fresh server id.
    pub fn insert(&mut self, room_id: &RoomId, author: &str, content: &str, ts: i64) -> Message {
        self.next_id += 1;
        let message = Message {
            id: MessageId::new(format!("msg-{}", self.next_id)),
            room_id: room_id.clone(),
            author: author.to_owned(),
            mine: false,
            content: content.to_owned(),
            timestamp_ms: ts,
            delivery: DeliveryState::Confirmed,
        };
        self.messages.entry(room_id.clone()).or_default().push(message.clone());
        message
    }
}

#[derive(Debug, Clone)]
enum DemoPush {
    Frame(String),
    Drop,
}

/// In-memory history backend and push transport.
///
/// Clones share the same store and push channel.
#[derive(Clone)]
pub struct DemoBackend<E: Environment> {
    env: E,
    store: Arc<Mutex<DemoStore>>,
    push: broadcast::Sender<DemoPush>,
    received: Arc<Mutex<Vec<String>>>,
    opened: Arc<Mutex<Vec<Url>>>,
    reject_sends: Arc<AtomicBool>,
    refuse_connections: Arc<AtomicBool>,
}

impl<E: Environment> std::fmt::Debug for DemoBackend<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DemoBackend").finish_non_exhaustive()
    }
}

impl<E: Environment> DemoBackend<E> {
    /// Backend over `store`, stamping new messages with `env`'s wall clock.
    pub fn new(env: E, store: DemoStore) -> Self {
        let (push, _) = broadcast::channel(PUSH_CAPACITY);
        Self {
            env,
            store: Arc::new(Mutex::new(store)),
            push,
            received: Arc::new(Mutex::new(Vec::new())),
            opened: Arc::new(Mutex::new(Vec::new())),
            reject_sends: Arc::new(AtomicBool::new(false)),
            refuse_connections: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Copy of the current store.
    pub fn store(&self) -> DemoStore {
        self.lock_store().clone()
    }

    /// Another user posts a message: saved and pushed to open sockets.
    pub fn post_as(&self, room_id: &RoomId, author: &str, content: &str) -> Message {
        let ts = self.env.wall_clock_millis();
        let message = self.lock_store().insert(room_id, author, content, ts);
        self.broadcast(&message);
        message
    }

    /// Push arbitrary frame text to open sockets.
    pub fn push_raw(&self, text: impl Into<String>) {
        let _ = self.push.send(DemoPush::Frame(text.into()));
    }

    /// Drop every open socket abnormally (code 1006).
    pub fn drop_connections(&self) {
        let _ = self.push.send(DemoPush::Drop);
    }

    /// Make `send_message` fail until reset.
    pub fn set_reject_sends(&self, reject: bool) {
        self.reject_sends.store(reject, Ordering::SeqCst);
    }

    /// Make new sockets fail to open until reset.
    pub fn set_refuse_connections(&self, refuse: bool) {
        self.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    /// Frames clients sent over demo sockets, in order.
    pub fn received_frames(&self) -> Vec<String> {
        self.received.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// URL of every socket opened, in order.
    pub fn opened_urls(&self) -> Vec<Url> {
        self.opened.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn lock_store(&self) -> std::sync::MutexGuard<'_, DemoStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn broadcast(&self, message: &Message) {
        match serde_json::to_string(message) {
            Ok(text) => {
                // No receivers just means no open sockets
                let _ = self.push.send(DemoPush::Frame(text));
            },
            Err(e) => tracing::warn!("demo backend failed to encode {}: {e}", message.id),
        }
    }
}

#[async_trait]
impl<E: Environment> HistoryFetcher for DemoBackend<E> {
    async fn list_rooms(&self) -> Result<Vec<Room>, FetchError> {
        Ok(self.lock_store().rooms.clone())
    }

    async fn list_users(&self) -> Result<Vec<User>, FetchError> {
        Ok(self.lock_store().users.clone())
    }

    async fn get_messages(&self, room_id: &RoomId) -> Result<Vec<Message>, FetchError> {
        let store = self.lock_store();
        if !store.has_room(room_id) {
            return Err(FetchError::RoomNotFound(room_id.clone()));
        }
        let messages = store.messages(room_id);
        let start = messages.len().saturating_sub(DEMO_HISTORY_WINDOW);
        Ok(messages[start..].to_vec())
    }

    async fn send_message(&self, room_id: &RoomId, content: &str) -> Result<Message, FetchError> {
        if self.reject_sends.load(Ordering::SeqCst) {
            return Err(FetchError::Rejected("demo backend is rejecting sends".into()));
        }
        if content.trim().is_empty() {
            return Err(FetchError::Rejected("empty message".into()));
        }

        let ts = self.env.wall_clock_millis();
        let message = {
            let mut store = self.lock_store();
            if !store.has_room(room_id) {
                return Err(FetchError::RoomNotFound(room_id.clone()));
            }
            store.insert(room_id, DEMO_SELF_AUTHOR, content, ts)
        };

        self.broadcast(&message);
        Ok(Message { mine: true, ..message })
    }
}

impl<E: Environment> Transport for DemoBackend<E> {
    fn open(&self, socket: SocketId, url: Url, signals: SignalSender) -> SocketHandle {
        self.opened.lock().unwrap_or_else(PoisonError::into_inner).push(url);

        let (tx, mut commands) = mpsc::unbounded_channel();
        if self.refuse_connections.load(Ordering::SeqCst) {
            let reason = "demo backend refused connection".to_owned();
            let _ = signals.send((socket, SocketSignal::Error(TransportError::Connect(reason.clone()))));
            let _ = signals.send((socket, SocketSignal::Closed { code: None, reason }));
            return SocketHandle::new(tx, None);
        }

        let mut push = self.push.subscribe();
        let received = Arc::clone(&self.received);
        let task = tokio::spawn(async move {
            let signal = |s: SocketSignal| {
                let _ = signals.send((socket, s));
            };
            signal(SocketSignal::Opened);

            loop {
                tokio::select! {
                    command = commands.recv() => match command {
                        Some(SocketCommand::Send(text)) => {
                            received.lock().unwrap_or_else(PoisonError::into_inner).push(text);
                        },
                        Some(SocketCommand::Close) | None => return,
                    },
                    pushed = push.recv() => match pushed {
                        Ok(DemoPush::Frame(text)) => signal(SocketSignal::Frame(text)),
                        Ok(DemoPush::Drop) => {
                            signal(SocketSignal::Closed {
                                code: Some(1006),
                                reason: "demo connection dropped".to_owned(),
                            });
                            return;
                        },
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!("{socket}: demo push lagged, {skipped} frames skipped");
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            signal(SocketSignal::Closed {
                                code: None,
                                reason: "demo backend shut down".to_owned(),
                            });
                            return;
                        },
                    },
                }
            }
        });

        SocketHandle::new(tx, Some(task.abort_handle()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system_env::SystemEnv;

    fn backend() -> DemoBackend<SystemEnv> {
        DemoBackend::new(SystemEnv::new(), DemoStore::seeded(1_700_000_000_000))
    }

    #[tokio::test]
    async fn seeded_store_serves_history() {
        let backend = backend();

        let rooms = backend.list_rooms().await.unwrap();
        assert_eq!(rooms.len(), 3);

        let general = backend.get_messages(&"general".into()).await.unwrap();
        assert_eq!(general.len(), 2);
        assert!(general[0].timestamp_ms < general[1].timestamp_ms);
    }

    #[tokio::test]
    async fn unknown_room_is_an_error() {
        let err = backend().get_messages(&"nope".into()).await.unwrap_err();
        assert_eq!(err, FetchError::RoomNotFound("nope".into()));
    }

    #[tokio::test]
    async fn send_returns_canonical_and_echoes() {
        let backend = backend();
        let (signals, mut rx) = mpsc::unbounded_channel();
        let _handle = backend.open(SocketId(1), Url::parse("ws://demo/ws").unwrap(), signals);
        assert_eq!(rx.recv().await, Some((SocketId(1), SocketSignal::Opened)));

        let saved = backend.send_message(&"dev".into(), "ship it").await.unwrap();
        assert!(saved.mine);
        assert!(saved.id.as_str().starts_with("msg-"));

        match rx.recv().await {
            Some((SocketId(1), SocketSignal::Frame(text))) => assert!(text.contains(saved.id.as_str())),
            other => panic!("expected echo, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejecting_backend_fails_sends() {
        let backend = backend();
        backend.set_reject_sends(true);

        let err = backend.send_message(&"general".into(), "hi").await.unwrap_err();
        assert!(matches!(err, FetchError::Rejected(_)));
        assert_eq!(backend.store().messages(&"general".into()).len(), 2);
    }

    #[test]
    fn stores_are_independent() {
        let a = DemoBackend::new(SystemEnv::new(), DemoStore::new());
        let b = DemoBackend::new(SystemEnv::new(), DemoStore::new());
        a.lock_store().add_room(Room::new("only-a", "A"));

        assert!(a.store().has_room(&"only-a".into()));
        assert!(!b.store().has_room(&"only-a".into()));
    }
}
