//! Error types for the synchronization core.
//!
//! Only caller-facing failures live here. Stale responses and late socket
//! events are not errors: the state machines report them through outcome
//! enums and drop them.

use thiserror::Error;

use crate::model::RoomId;

/// Errors returned by timeline and session operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Operation targeted a room that is not the active room
    #[error("room {room_id} is not the active room")]
    InactiveRoom {
        /// Room the caller asked for
        room_id: RoomId,
    },

    /// Room id is not in the known room list
    #[error("unknown room: {0}")]
    UnknownRoom(RoomId),

    /// No room has been selected yet
    #[error("no active room")]
    NoActiveRoom,

    /// Outgoing message has no visible content
    #[error("message content is empty")]
    EmptyMessage,

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SyncError {
    /// Returns true if the caller can reasonably retry after a state change.
    ///
    /// Selecting a room fixes `InactiveRoom` and `NoActiveRoom`; the rest
    /// need different input.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::InactiveRoom { .. } | Self::NoActiveRoom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_scoping_errors_are_transient() {
        assert!(SyncError::InactiveRoom { room_id: "dev".into() }.is_transient());
        assert!(SyncError::NoActiveRoom.is_transient());
    }

    #[test]
    fn input_errors_are_not_transient() {
        assert!(!SyncError::EmptyMessage.is_transient());
        assert!(!SyncError::UnknownRoom("nope".into()).is_transient());
        assert!(!SyncError::InvalidConfig("bad".into()).is_transient());
    }

    #[test]
    fn display_names_the_room() {
        let err = SyncError::InactiveRoom { room_id: "dev".into() };
        assert_eq!(err.to_string(), "room dev is not the active room");
    }
}
