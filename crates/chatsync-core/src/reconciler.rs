//! Timeline reconciliation for the active room.
//!
//! Merges three sources into one ordered, de-duplicated timeline: the history
//! backlog, live push events, and optimistic local sends. Order is arrival
//! order as observed here. Timestamps are display data and never re-sort.
//!
//! The reconciler holds at most one room's timeline. Anything addressed to
//! another room is dropped, not buffered.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    env::Environment,
    error::SyncError,
    frame::IncomingMessage,
    model::{DeliveryState, Message, MessageId, RoomId},
};

/// Author label for locally originated messages.
pub const LOCAL_AUTHOR: &str = "me";

/// What happens to an optimistic entry when its send fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SendFailurePolicy {
    /// Keep the entry as `Pending`.
    #[default]
    Retain,
    /// Remove the entry.
    Rollback,
    /// Keep the entry, marked `Failed`.
    MarkFailed,
}

/// Ticket for an optimistic send awaiting the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    /// Local id of the optimistic entry.
    pub local_id: MessageId,
    /// Room the message was submitted to.
    pub room_id: RoomId,
    /// Draft text, returned to the caller on failure.
    pub content: String,
}

/// Result of [`Reconciler::load_history`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Timeline replaced.
    Applied {
        /// Entries from the batch kept after de-duplication.
        count: usize,
    },
    /// Room is no longer active. Nothing changed.
    Stale,
}

/// Result of [`Reconciler::apply_incoming`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Appended to the timeline.
    Appended,
    /// Id already present. Nothing changed.
    Duplicate,
    /// Event is for a room that is not active. Dropped.
    OtherRoom,
}

/// Result of [`Reconciler::confirm_send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// Optimistic entry replaced in place.
    Replaced,
    /// Push echo had already arrived. Echo removed, optimistic position kept.
    MergedWithEcho,
    /// Optimistic entry no longer present. Nothing changed.
    Stale,
}

/// Result of [`Reconciler::fail_send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Entry left pending.
    Retained,
    /// Entry removed.
    RolledBack,
    /// Entry marked failed.
    MarkedFailed,
    /// Optimistic entry no longer present. Nothing changed.
    Stale,
}

/// Authoritative timeline of the active room.
#[derive(Debug, Clone)]
pub struct Reconciler<E: Environment> {
    env: E,
    policy: SendFailurePolicy,
    active_room: Option<RoomId>,
    timeline: Vec<Message>,
    ids: HashSet<MessageId>,
    /// Entries that arrived after the last history load and no batch has
    /// covered yet.
    live: HashSet<MessageId>,
    next_local: u64,
}

impl<E: Environment> Reconciler<E> {
    /// Empty reconciler with no active room.
    pub fn new(env: E, policy: SendFailurePolicy) -> Self {
        Self {
            env,
            policy,
            active_room: None,
            timeline: Vec::new(),
            ids: HashSet::new(),
            live: HashSet::new(),
            next_local: 1,
        }
    }

    /// Ordered timeline of the active room.
    pub fn timeline(&self) -> &[Message] {
        &self.timeline
    }

    /// Room whose timeline is materialized.
    pub fn active_room(&self) -> Option<&RoomId> {
        self.active_room.as_ref()
    }

    /// Send-failure policy in effect.
    pub fn policy(&self) -> SendFailurePolicy {
        self.policy
    }

    /// True if `id` is present in the timeline.
    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    /// Number of optimistic entries still awaiting confirmation.
    pub fn pending_count(&self) -> usize {
        self.timeline.iter().filter(|m| m.is_pending()).count()
    }

    /// Make `room_id` active, clearing the previous room's timeline and
    /// pending sends. Returns the previous room.
    pub fn switch_active_room(&mut self, room_id: RoomId) -> Option<RoomId> {
        self.timeline.clear();
        self.ids.clear();
        self.live.clear();
        self.active_room.replace(room_id)
    }

    /// Replace the timeline with a history batch.
    ///
    /// Unconfirmed local entries and messages that arrived since the last
    /// load survive, after the batch, unless the batch already holds their
    /// id. Duplicate ids within the batch keep their first occurrence.
    pub fn load_history(&mut self, room_id: &RoomId, messages: Vec<Message>) -> LoadOutcome {
        if self.active_room.as_ref() != Some(room_id) {
            tracing::debug!("discarding history for inactive room {room_id}");
            return LoadOutcome::Stale;
        }

        let live = std::mem::take(&mut self.live);
        let carried: Vec<Message> = std::mem::take(&mut self.timeline)
            .into_iter()
            .filter(|m| is_unconfirmed_local(m) || live.contains(&m.id))
            .collect();
        self.ids.clear();

        for message in messages {
            if self.ids.insert(message.id.clone()) {
                self.timeline.push(message);
            }
        }
        let count = self.timeline.len();

        for message in carried {
            if self.ids.insert(message.id.clone()) {
                if live.contains(&message.id) {
                    self.live.insert(message.id.clone());
                }
                self.timeline.push(message);
            }
        }

        tracing::debug!("loaded {count} history messages for {room_id}");
        LoadOutcome::Applied { count }
    }

    /// Merge one pushed message.
    pub fn apply_incoming(&mut self, incoming: IncomingMessage) -> ApplyOutcome {
        if self.active_room.as_ref() != Some(&incoming.room_id) {
            tracing::trace!("dropping push for inactive room {}", incoming.room_id);
            return ApplyOutcome::OtherRoom;
        }
        if self.ids.contains(&incoming.id) {
            tracing::trace!("duplicate push {}", incoming.id);
            return ApplyOutcome::Duplicate;
        }

        let message = incoming.into_message(self.env.wall_clock_millis());
        self.ids.insert(message.id.clone());
        self.live.insert(message.id.clone());
        self.timeline.push(message);
        ApplyOutcome::Appended
    }

    /// Append an optimistic entry and return the ticket for the real send.
    pub fn submit_local(&mut self, room_id: &RoomId, content: &str) -> Result<PendingSend, SyncError> {
        if content.trim().is_empty() {
            return Err(SyncError::EmptyMessage);
        }
        match &self.active_room {
            None => return Err(SyncError::NoActiveRoom),
            Some(active) if active != room_id => {
                return Err(SyncError::InactiveRoom { room_id: room_id.clone() });
            },
            Some(_) => {},
        }

        let local_id = self.next_local_id();
        self.ids.insert(local_id.clone());
        self.timeline.push(Message {
            id: local_id.clone(),
            room_id: room_id.clone(),
            author: LOCAL_AUTHOR.to_owned(),
            mine: true,
            content: content.to_owned(),
            timestamp_ms: self.env.wall_clock_millis(),
            delivery: DeliveryState::Pending,
        });

        Ok(PendingSend { local_id, room_id: room_id.clone(), content: content.to_owned() })
    }

    /// Replace the optimistic entry with the server's saved message.
    pub fn confirm_send(&mut self, pending: &PendingSend, canonical: Message) -> ConfirmOutcome {
        let Some(position) = self.position_of_local(pending) else {
            tracing::debug!("ignoring confirmation for stale send {}", pending.local_id);
            return ConfirmOutcome::Stale;
        };

        let mut outcome = ConfirmOutcome::Replaced;
        let mut position = position;
        if canonical.id != pending.local_id
            && let Some(echo) = self.timeline.iter().position(|m| m.id == canonical.id)
        {
            self.timeline.remove(echo);
            if echo < position {
                position -= 1;
            }
            outcome = ConfirmOutcome::MergedWithEcho;
        }

        self.ids.remove(&pending.local_id);
        self.ids.insert(canonical.id.clone());
        self.live.insert(canonical.id.clone());
        self.timeline[position] = Message {
            room_id: pending.room_id.clone(),
            mine: true,
            delivery: DeliveryState::Confirmed,
            ..canonical
        };
        outcome
    }

    /// Apply the send-failure policy to the optimistic entry.
    pub fn fail_send(&mut self, pending: &PendingSend) -> FailOutcome {
        let Some(position) = self.position_of_local(pending) else {
            tracing::debug!("ignoring failure for stale send {}", pending.local_id);
            return FailOutcome::Stale;
        };

        match self.policy {
            SendFailurePolicy::Retain => FailOutcome::Retained,
            SendFailurePolicy::Rollback => {
                self.timeline.remove(position);
                self.ids.remove(&pending.local_id);
                FailOutcome::RolledBack
            },
            SendFailurePolicy::MarkFailed => {
                self.timeline[position].delivery = DeliveryState::Failed;
                FailOutcome::MarkedFailed
            },
        }
    }

    fn position_of_local(&self, pending: &PendingSend) -> Option<usize> {
        if self.active_room.as_ref() != Some(&pending.room_id) {
            return None;
        }
        self.timeline.iter().position(|m| m.id == pending.local_id && m.mine)
    }

    fn next_local_id(&mut self) -> MessageId {
        loop {
            let id = MessageId::new(format!("local-{}", self.next_local));
            self.next_local += 1;
            if !self.ids.contains(&id) {
                return id;
            }
        }
    }
}

/// A local send the server has not saved yet, pending or failed.
fn is_unconfirmed_local(message: &Message) -> bool {
    message.mine && message.delivery != DeliveryState::Confirmed
}
