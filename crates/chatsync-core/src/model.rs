//! Domain types shared by every layer: rooms, users, and messages.
//!
//! The JSON shape matches the history API (`roomId`, `ts` in milliseconds).

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Stable, unique room identifier.
    RoomId
);

string_id!(
    /// Message identifier, unique within a room timeline.
    MessageId
);

string_id!(
    /// User identifier.
    UserId
);

/// A chat room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// Room identifier.
    pub id: RoomId,
    /// Display name.
    pub name: String,
    /// Messages received while the room was not active.
    #[serde(default)]
    pub unread: u32,
}

impl Room {
    /// Room with no unread messages.
    pub fn new(id: impl Into<RoomId>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into(), unread: 0 }
    }
}

/// A chat participant. Presentational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User identifier.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Whether the user is currently online.
    #[serde(default)]
    pub online: bool,
}

/// Delivery state of a timeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeliveryState {
    /// Known to the server (history, push, or confirmed send).
    #[default]
    Confirmed,
    /// Optimistic local send awaiting confirmation.
    Pending,
    /// Local send the server rejected, kept visible under `MarkFailed`.
    Failed,
}

/// A timeline entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// De-duplication key within the room.
    pub id: MessageId,
    /// Room this message belongs to.
    pub room_id: RoomId,
    /// Author label.
    pub author: String,
    /// True for locally originated sends.
    #[serde(default)]
    pub mine: bool,
    /// Text content.
    pub content: String,
    /// Milliseconds since the Unix epoch. Display only, never used to order.
    #[serde(rename = "ts", default)]
    pub timestamp_ms: i64,
    /// Delivery state. Not part of the wire format.
    #[serde(skip)]
    pub delivery: DeliveryState,
}

impl Message {
    /// True while an optimistic send awaits confirmation.
    pub fn is_pending(&self) -> bool {
        self.delivery == DeliveryState::Pending
    }
}
