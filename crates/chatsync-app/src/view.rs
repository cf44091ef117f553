//! Snapshot of what a host renders.

use chatsync_core::{ConnectionState, Message, Room, RoomId, User};

/// Everything a frontend needs to draw the chat, captured at one point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineView {
    /// Push connection state.
    pub connection: ConnectionState,
    /// Known rooms with unread counts.
    pub rooms: Vec<Room>,
    /// Known users.
    pub users: Vec<User>,
    /// Active room.
    pub active_room: Option<RoomId>,
    /// Timeline of the active room, oldest first.
    pub messages: Vec<Message>,
    /// True while the active room's backlog is loading.
    pub loading: bool,
    /// Transient status line.
    pub status: Option<String>,
}

impl TimelineView {
    /// Number of optimistic entries still awaiting the server.
    pub fn pending(&self) -> usize {
        self.messages.iter().filter(|m| m.is_pending()).count()
    }

    /// Sum of unread counters across rooms.
    pub fn total_unread(&self) -> u32 {
        self.rooms.iter().map(|r| r.unread).sum()
    }
}
