//! Fuzz target for inbound frame decoding
//!
//! # Strategy
//!
//! - Raw text: arbitrary UTF-8 as received from the socket
//! - Shaped JSON: message-like objects with fuzzed field types
//!
//! # Invariants
//!
//! - Decoding never panics
//! - Non-JSON text decodes to `Inbound::Raw` holding the exact input
//! - A decoded message always carries non-empty id and room
//! - Missing timestamps fall back to the supplied clock

#![no_main]

use arbitrary::Arbitrary;
use chatsync_core::Inbound;
use libfuzzer_sys::fuzz_target;

const FALLBACK_MS: i64 = 1_700_000_000_000;

#[derive(Debug, Arbitrary)]
enum FrameInput {
    Raw(String),
    Shaped { id: Field, room_id: Field, author: Field, content: Field, ts: Option<Field> },
}

#[derive(Debug, Arbitrary)]
enum Field {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl Field {
    fn json(&self) -> String {
        match self {
            Self::Str(s) => format!("{s:?}"),
            Self::Int(n) => n.to_string(),
            Self::Float(f) if f.is_finite() => f.to_string(),
            Self::Float(_) => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Null => "null".to_string(),
        }
    }
}

fuzz_target!(|input: FrameInput| {
    let text = match &input {
        FrameInput::Raw(text) => text.clone(),
        FrameInput::Shaped { id, room_id, author, content, ts } => {
            let ts = ts.as_ref().map(|t| format!(r#","ts":{}"#, t.json())).unwrap_or_default();
            format!(
                r#"{{"id":{},"roomId":{},"author":{},"content":{}{ts}}}"#,
                id.json(),
                room_id.json(),
                author.json(),
                content.json()
            )
        },
    };

    let inbound = Inbound::decode(&text);
    if let Inbound::Raw(raw) = &inbound {
        assert_eq!(raw, &text, "raw frames must be preserved");
    }

    if let Some(incoming) = inbound.as_message() {
        assert!(!incoming.id.as_str().is_empty(), "message without id");
        assert!(!incoming.room_id.as_str().is_empty(), "message without room");

        let had_ts = incoming.timestamp_ms.is_some();
        let message = incoming.into_message(FALLBACK_MS);
        if !had_ts {
            assert_eq!(message.timestamp_ms, FALLBACK_MS);
        }
    }
});
