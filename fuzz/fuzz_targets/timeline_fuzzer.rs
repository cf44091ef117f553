//! Fuzz target for timeline reconciliation
//!
//! # Strategy
//!
//! - Arbitrary room switches, reloads, pushes, and sends against a fixed room
//!   list
//! - History and send responses answered out of order, succeeding or
//!   failing, including answers for requests that have been superseded
//! - Every send failure policy
//!
//! # Invariants
//!
//! - NEVER panic
//! - Timeline ids are unique
//! - The timeline only holds messages of the active room
//! - Pending entries are the user's own
//! - A superseded history response never replaces the timeline

#![no_main]

use arbitrary::Arbitrary;
use chatsync_core::{
    DeliveryState, IncomingMessage, LoadTicket, Message, MessageId, PendingSend, Room, RoomId,
    SendFailurePolicy, Session,
};
use chatsync_harness::{InvariantRegistry, SimEnv, SystemSnapshot};
use libfuzzer_sys::fuzz_target;

const ROOMS: [&str; 3] = ["general", "dev", "random"];

#[derive(Debug, Clone, Copy, Arbitrary)]
enum Policy {
    Retain,
    Rollback,
    MarkFailed,
}

impl From<Policy> for SendFailurePolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Retain => Self::Retain,
            Policy::Rollback => Self::Rollback,
            Policy::MarkFailed => Self::MarkFailed,
        }
    }
}

#[derive(Debug, Arbitrary)]
enum Op {
    Select(u8),
    Reload,
    Push { id: u8, room: u8, ts: Option<i64> },
    Send(String),
    AnswerHistory { pick: u8, ok: bool },
    AnswerSend { pick: u8, ok: bool, echo_first: bool },
}

#[derive(Debug, Arbitrary)]
struct Script {
    seed: u64,
    policy: Policy,
    ops: Vec<Op>,
}

fn room(n: u8) -> RoomId {
    RoomId::from(ROOMS[usize::from(n) % ROOMS.len()])
}

fn backlog(room_id: &RoomId, ticket: LoadTicket) -> Vec<Message> {
    (0..2)
        .map(|n| Message {
            id: MessageId::new(format!("{room_id}-{}-{n}", ticket.0)),
            room_id: room_id.clone(),
            author: "ana".into(),
            mine: false,
            content: format!("backlog {n}"),
            timestamp_ms: 1_000 + n,
            delivery: DeliveryState::Confirmed,
        })
        .collect()
}

fn canonical(pending: &PendingSend, n: u32) -> Message {
    Message {
        id: MessageId::new(format!("srv-{n}")),
        room_id: pending.room_id.clone(),
        author: "me".into(),
        mine: true,
        content: pending.content.clone(),
        timestamp_ms: 5_000,
        delivery: DeliveryState::Confirmed,
    }
}

fn echo(message: &Message) -> IncomingMessage {
    IncomingMessage {
        id: message.id.clone(),
        room_id: message.room_id.clone(),
        author: message.author.clone(),
        content: message.content.clone(),
        timestamp_ms: Some(message.timestamp_ms),
    }
}

fuzz_target!(|script: Script| {
    let invariants = InvariantRegistry::standard();
    let mut session = Session::new(SimEnv::with_seed(script.seed), script.policy.into());
    session.set_rooms(ROOMS.iter().map(|id| Room::new(*id, id.to_uppercase())).collect());

    let mut histories: Vec<(LoadTicket, RoomId)> = Vec::new();
    let mut sends: Vec<PendingSend> = Vec::new();
    let mut sent = 0u32;

    for (step, op) in script.ops.into_iter().take(256).enumerate() {
        match op {
            Op::Select(n) => {
                if let Ok(Some(switch)) = session.select_room(&room(n)) {
                    histories.push((switch.ticket, switch.room_id));
                }
            },
            Op::Reload => {
                if let Ok(switch) = session.reload_active() {
                    histories.push((switch.ticket, switch.room_id));
                }
            },
            Op::Push { id, room: n, ts } => {
                let room_id = room(n);
                session.apply_incoming(IncomingMessage {
                    id: MessageId::new(format!("p{id}")),
                    room_id,
                    author: "bo".into(),
                    content: "live".into(),
                    timestamp_ms: ts,
                });
            },
            Op::Send(content) => {
                if let Some(active) = session.active_room().cloned()
                    && let Ok(pending) = session.submit_local(&active, &content)
                {
                    sends.push(pending);
                }
            },
            Op::AnswerHistory { pick, ok } => {
                if histories.is_empty() {
                    continue;
                }
                let (ticket, room_id) = histories.remove(usize::from(pick) % histories.len());
                let current = session.in_flight() == Some(ticket);
                let before = session.timeline().to_vec();

                if ok {
                    let messages = backlog(&room_id, ticket);
                    session.history_loaded(ticket, messages);
                } else {
                    session.history_failed(ticket);
                }

                if !current {
                    assert_eq!(session.timeline(), before.as_slice(), "step {step}: stale history applied");
                }
            },
            Op::AnswerSend { pick, ok, echo_first } => {
                if sends.is_empty() {
                    continue;
                }
                let pending = sends.remove(usize::from(pick) % sends.len());
                if ok {
                    sent += 1;
                    let message = canonical(&pending, sent);
                    if echo_first {
                        session.apply_incoming(echo(&message));
                    }
                    session.confirm_send(&pending, message.clone());
                    if !echo_first {
                        session.apply_incoming(echo(&message));
                    }
                    let copies = session.timeline().iter().filter(|m| m.id == message.id).count();
                    assert!(copies <= 1, "step {step}: {} shown {copies} times", message.id);
                } else {
                    session.fail_send(&pending);
                }
            },
        }

        let snapshot = SystemSnapshot::from_session(&session);
        invariants.assert_all(&snapshot, &format!("step {step}"));
    }
});
