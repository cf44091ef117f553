//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold.
//! They verify WHAT must be true, not specific test scenarios.

use std::collections::HashSet;

use chatsync_core::DeliveryState;

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// Every message id appears at most once in the timeline.
pub struct UniqueMessageIds;

impl Invariant for UniqueMessageIds {
    fn name(&self) -> &'static str {
        "unique_message_ids"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let mut seen = HashSet::new();
        for message in &state.timeline {
            if !seen.insert(&message.id) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("message {} appears more than once", message.id),
                });
            }
        }
        Ok(())
    }
}

/// The timeline only holds messages of the active room.
///
/// With no active room the timeline must be empty.
pub struct TimelineScopedToActiveRoom;

impl Invariant for TimelineScopedToActiveRoom {
    fn name(&self) -> &'static str {
        "timeline_scoped_to_active_room"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let stray = state.timeline.iter().find(|m| state.active_room.as_ref() != Some(&m.room_id));

        match stray {
            Some(message) => Err(Violation {
                invariant: self.name(),
                message: format!(
                    "message {} of room {} in timeline of {:?}",
                    message.id, message.room_id, state.active_room
                ),
            }),
            None => Ok(()),
        }
    }
}

/// Pending and failed entries are local sends.
pub struct PendingEntriesAreMine;

impl Invariant for PendingEntriesAreMine {
    fn name(&self) -> &'static str {
        "pending_entries_are_mine"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for message in &state.timeline {
            if message.delivery != DeliveryState::Confirmed && !message.mine {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "message {} is {:?} but not locally originated",
                        message.id, message.delivery
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Reconnect delays stay within `[initial, max]`.
pub struct BackoffBounded;

impl Invariant for BackoffBounded {
    fn name(&self) -> &'static str {
        "backoff_bounded"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let Some((initial, max)) = state.delay_bounds else {
            return Ok(());
        };

        for (i, delay) in state.reconnect_delays.iter().enumerate() {
            if *delay < initial || *delay > max {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("delay #{i} is {delay:?}, outside [{initial:?}, {max:?}]"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chatsync_core::{Message, RoomId};

    use super::*;

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

    fn snapshot(messages: Vec<Message>) -> SystemSnapshot {
        SystemSnapshot {
            active_room: Some(RoomId::from("general")),
            timeline: messages,
            ..SystemSnapshot::empty()
        }
    }

    #[test]
    fn duplicate_id_violates() {
        let state = snapshot(vec![message("a", "general"), message("a", "general")]);
        assert!(UniqueMessageIds.check(&state).is_err());
    }

    #[test]
    fn foreign_room_violates() {
        let state = snapshot(vec![message("a", "general"), message("b", "dev")]);
        assert!(TimelineScopedToActiveRoom.check(&state).is_err());
    }

    #[test]
    fn pending_foreign_entry_violates() {
        let mut entry = message("a", "general");
        entry.delivery = DeliveryState::Pending;
        assert!(PendingEntriesAreMine.check(&snapshot(vec![entry])).is_err());
    }

    #[test]
    fn delay_above_cap_violates() {
        let state = SystemSnapshot::empty().with_reconnect_delays(
            [Duration::from_secs(1), Duration::from_secs(20)],
            Duration::from_secs(1),
            Duration::from_secs(15),
        );
        assert!(BackoffBounded.check(&state).is_err());
    }
}
