//! Turns successive views into loggable changes.

use std::{collections::HashSet, fmt};

use chatsync_app::TimelineView;
use chatsync_core::{ConnectionState, DeliveryState, Message, MessageId, RoomId};

/// One observable difference between two views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Push connection state changed.
    Connection(ConnectionState),
    /// A different room became active.
    RoomSelected(RoomId),
    /// The active room's backlog finished loading.
    HistoryLoaded {
        /// Room loaded.
        room_id: RoomId,
        /// Messages now shown.
        count: usize,
    },
    /// A message appeared in the active room.
    Message(Message),
    /// An optimistic entry was confirmed under a server id.
    Delivered(MessageId),
    /// An optimistic entry was marked failed.
    Failed(MessageId),
    /// A background room gained unread messages.
    Unread {
        /// Room with new messages.
        room_id: RoomId,
        /// Unread count.
        count: u32,
    },
    /// New status line.
    Status(String),
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(state) => write!(f, "connection: {state:?}"),
            Self::RoomSelected(room_id) => write!(f, "joined #{room_id}"),
            Self::HistoryLoaded { room_id, count } => write!(f, "#{room_id}: {count} messages"),
            Self::Message(m) if m.is_pending() => write!(f, "<{}> {} (sending)", m.author, m.content),
            Self::Message(m) => write!(f, "<{}> {}", m.author, m.content),
            Self::Delivered(id) => write!(f, "delivered as {id}"),
            Self::Failed(id) => write!(f, "{id} failed"),
            Self::Unread { room_id, count } => write!(f, "#{room_id}: {count} unread"),
            Self::Status(status) => f.write_str(status),
        }
    }
}

/// Changes from `prev` to `next`, in display order.
pub fn changes(prev: &TimelineView, next: &TimelineView) -> Vec<Change> {
    let mut out = Vec::new();

    if prev.connection != next.connection {
        out.push(Change::Connection(next.connection.clone()));
    }

    let same_room = prev.active_room == next.active_room;
    if !same_room && let Some(room_id) = &next.active_room {
        out.push(Change::RoomSelected(room_id.clone()));
    }

    if let Some(room_id) = &next.active_room
        && (prev.loading || !same_room)
        && !next.loading
    {
        out.push(Change::HistoryLoaded { room_id: room_id.clone(), count: next.messages.len() });
    } else if same_room {
        message_changes(prev, next, &mut out);
    }

    for room in &next.rooms {
        let before = prev.rooms.iter().find(|r| r.id == room.id).map_or(0, |r| r.unread);
        if room.unread > before {
            out.push(Change::Unread { room_id: room.id.clone(), count: room.unread });
        }
    }

    if next.status != prev.status
        && let Some(status) = &next.status
    {
        out.push(Change::Status(status.clone()));
    }
    out
}

fn message_changes(prev: &TimelineView, next: &TimelineView, out: &mut Vec<Change>) {
    let before: HashSet<&MessageId> = prev.messages.iter().map(|m| &m.id).collect();
    let after: HashSet<&MessageId> = next.messages.iter().map(|m| &m.id).collect();

    // Pending entries that disappeared were either confirmed or rolled back
    let mut resolved: Vec<&Message> = prev
        .messages
        .iter()
        .filter(|m| m.is_pending() && !after.contains(&m.id))
        .collect();

    for message in next.messages.iter().filter(|m| !before.contains(&m.id)) {
        let confirmed = (message.mine && message.delivery == DeliveryState::Confirmed)
            .then(|| resolved.iter().position(|p| p.content == message.content))
            .flatten();
        match confirmed {
            Some(i) => {
                resolved.remove(i);
                out.push(Change::Delivered(message.id.clone()));
            },
            None => out.push(Change::Message(message.clone())),
        }
    }

    for message in &next.messages {
        let was_pending = prev.messages.iter().any(|p| p.id == message.id && p.is_pending());
        if was_pending && message.delivery == DeliveryState::Failed {
            out.push(Change::Failed(message.id.clone()));
        }
    }
}
