//! Wire frames of the push channel.
//!
//! Inbound frames are UTF-8 text that may or may not be JSON. Decoding never
//! fails: text that does not parse is handed to the consumer unchanged as
//! [`Inbound::Raw`], so the consumer chooses what to do with it instead of
//! catching a parse error.

use serde::Deserialize;
use serde_json::Value;

use crate::model::{DeliveryState, Message, MessageId, RoomId};

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Frame text parsed as JSON.
    Structured(Value),
    /// Frame text that is not JSON, unchanged.
    Raw(String),
}

impl Inbound {
    /// Decode frame text, falling back to the raw text.
    pub fn decode(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => Self::Structured(value),
            Err(_) => Self::Raw(text.to_owned()),
        }
    }

    /// Message-shaped payload, if the frame carries one.
    ///
    /// Requires a JSON object with string `id` (or a number), a non-empty
    /// `roomId`, `author`, and `content`. Anything else yields `None`.
    pub fn as_message(&self) -> Option<IncomingMessage> {
        match self {
            Self::Structured(value) => IncomingMessage::from_value(value),
            Self::Raw(_) => None,
        }
    }
}

/// An outbound payload: pre-formed text or a structured value.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Sent as-is.
    Text(String),
    /// JSON-encoded before sending.
    Structured(Value),
}

impl Outbound {
    /// Frame text for this payload.
    pub fn encode(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(value) => value.to_string(),
        }
    }

    /// Topic subscription request for a room.
    pub fn subscribe(room_id: &RoomId) -> Self {
        Self::Structured(serde_json::json!({ "type": "subscribe", "roomId": room_id }))
    }

    /// Topic unsubscription request for a room.
    pub fn unsubscribe(room_id: &RoomId) -> Self {
        Self::Structured(serde_json::json!({ "type": "unsubscribe", "roomId": room_id }))
    }
}

impl From<String> for Outbound {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Outbound {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Value> for Outbound {
    fn from(value: Value) -> Self {
        Self::Structured(value)
    }
}

/// A message pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Server-assigned id.
    pub id: MessageId,
    /// Target room.
    pub room_id: RoomId,
    /// Author label.
    pub author: String,
    /// Text content.
    pub content: String,
    /// Milliseconds since the Unix epoch. `None` when missing or malformed.
    pub timestamp_ms: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    id: Value,
    room_id: String,
    author: String,
    content: String,
    #[serde(default)]
    ts: Option<Value>,
}

impl IncomingMessage {
    /// Extract a message from a decoded JSON value.
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        let wire = WireMessage::deserialize(value).ok()?;
        if wire.room_id.is_empty() {
            return None;
        }
        let id = match wire.id {
            Value::String(id) if !id.is_empty() => id,
            Value::Number(n) => n.to_string(),
            _ => return None,
        };

        Some(Self {
            id: MessageId::new(id),
            room_id: RoomId::new(wire.room_id),
            author: wire.author,
            content: wire.content,
            timestamp_ms: wire.ts.as_ref().and_then(parse_timestamp),
        })
    }

    /// Timeline entry for this event, stamped with `fallback_ms` when the
    /// event carried no usable timestamp.
    pub fn into_message(self, fallback_ms: i64) -> Message {
        Message {
            id: self.id,
            room_id: self.room_id,
            author: self.author,
            mine: false,
            content: self.content,
            timestamp_ms: self.timestamp_ms.unwrap_or(fallback_ms),
            delivery: DeliveryState::Confirmed,
        }
    }
}

/// Accepts integer or float milliseconds and numeric strings.
fn parse_timestamp(value: &Value) -> Option<i64> {
    let ms = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    (ms >= 0).then_some(ms)
}
