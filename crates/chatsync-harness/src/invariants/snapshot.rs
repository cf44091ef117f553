//! Observable state snapshots for invariant checking.
//!
//! Invariants operate on snapshots rather than live state so every check sees
//! one consistent point in time.

use std::time::Duration;

use chatsync_core::{Environment, Message, Room, RoomId, Session};

/// Snapshot of one client's observable state.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Room whose timeline is materialized.
    pub active_room: Option<RoomId>,
    /// Timeline of the active room.
    pub timeline: Vec<Message>,
    /// Known rooms.
    pub rooms: Vec<Room>,
    /// Reconnect delays scheduled so far, in order.
    pub reconnect_delays: Vec<Duration>,
    /// Configured `(initial, max)` reconnect delays.
    pub delay_bounds: Option<(Duration, Duration)>,
}

impl SystemSnapshot {
    /// Create an empty snapshot.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Capture a session's rooms and timeline.
    pub fn from_session<E: Environment>(session: &Session<E>) -> Self {
        Self {
            active_room: session.active_room().cloned(),
            timeline: session.timeline().to_vec(),
            rooms: session.rooms().to_vec(),
            ..Self::default()
        }
    }

    /// Attach observed reconnect delays and the bounds they must respect.
    pub fn with_reconnect_delays(
        mut self,
        delays: impl IntoIterator<Item = Duration>,
        initial: Duration,
        max: Duration,
    ) -> Self {
        self.reconnect_delays = delays.into_iter().collect();
        self.delay_bounds = Some((initial, max));
        self
    }
}
