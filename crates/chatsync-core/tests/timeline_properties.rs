//! Property tests for timeline reconciliation and room selection.
//!
//! These tests verify critical invariants:
//! - Repeated pushes of the same id leave exactly one entry
//! - History for a room that is no longer active has no effect
//! - The timeline only ever holds the active room's messages
//! - Only the latest room switch's history load is applied
//! - Pushes that arrive while a load is in flight survive it

use chatsync_core::{
    ApplyOutcome, DeliveryState, Inbound, IncomingMessage, LoadOutcome, Message, Room, RoomId,
    SendFailurePolicy, Session,
};
use chatsync_harness::{InvariantRegistry, SimEnv, SystemSnapshot};
use proptest::prelude::*;

const ROOMS: [&str; 3] = ["general", "dev", "random"];

fn session(policy: SendFailurePolicy) -> Session<SimEnv> {
    let mut session = Session::new(SimEnv::with_seed(42), policy);
    session.set_rooms(ROOMS.iter().map(|id| Room::new(*id, id.to_uppercase())).collect());
    session
}

fn history(room: &str, ids: &[&str]) -> Vec<Message> {
    ids.iter()
        .map(|id| Message {
            id: (*id).into(),
            room_id: room.into(),
            author: "ana".into(),
            mine: false,
            content: format!("backlog {id}"),
            timestamp_ms: 1_000,
            delivery: DeliveryState::Confirmed,
        })
        .collect()
}

fn push(id: &str, room: &str) -> IncomingMessage {
    let frame = format!(r#"{{"id":"{id}","roomId":"{room}","author":"bo","content":"live"}}"#);
    Inbound::decode(&frame).as_message().unwrap()
}

fn select_and_load(session: &mut Session<SimEnv>, room: &str, ids: &[&str]) {
    let switch = session.select_room(&room.into()).unwrap().unwrap();
    session.history_loaded(switch.ticket, history(room, ids));
}

/// Scenario: "general" with two history messages, then a local send.
#[test]
fn local_send_appends_third_entry_synchronously() {
    let mut session = session(SendFailurePolicy::Retain);
    select_and_load(&mut session, "general", &["h1", "h2"]);

    let pending = session.submit_local(&"general".into(), "hi").unwrap();

    let timeline = session.timeline();
    assert_eq!(timeline.len(), 3);
    assert_eq!(timeline[2].id, pending.local_id);
    assert!(timeline[2].mine);
    assert_eq!(timeline[2].delivery, DeliveryState::Pending);
}

/// Scenario: a push for "dev" while "general" is active is dropped.
#[test]
fn push_for_inactive_room_is_dropped() {
    let mut session = session(SendFailurePolicy::Retain);
    select_and_load(&mut session, "general", &["h1", "h2"]);

    assert_eq!(session.apply_incoming(push("d1", "dev")), ApplyOutcome::OtherRoom);
    assert_eq!(session.timeline().len(), 2);
}

/// Scenario: an event whose id is already present creates no duplicate.
#[test]
fn known_id_creates_no_duplicate() {
    let mut session = session(SendFailurePolicy::Retain);
    select_and_load(&mut session, "general", &["h1", "h2"]);

    assert_eq!(session.apply_incoming(push("h2", "general")), ApplyOutcome::Duplicate);
    assert_eq!(session.timeline().len(), 2);
}

#[test]
fn push_during_history_load_survives_the_batch() {
    let mut session = session(SendFailurePolicy::Retain);
    let switch = session.select_room(&"general".into()).unwrap().unwrap();

    assert_eq!(session.apply_incoming(push("p1", "general")), ApplyOutcome::Appended);
    session.history_loaded(switch.ticket, history("general", &["h1", "h2"]));

    let ids: Vec<&str> = session.timeline().iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["h1", "h2", "p1"]);
}

#[test]
fn push_already_in_batch_is_not_repeated() {
    let mut session = session(SendFailurePolicy::Retain);
    let switch = session.select_room(&"general".into()).unwrap().unwrap();

    session.apply_incoming(push("h2", "general"));
    session.history_loaded(switch.ticket, history("general", &["h1", "h2"]));

    let ids: Vec<&str> = session.timeline().iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["h1", "h2"]);
}

#[test]
fn late_history_after_switch_has_no_effect() {
    let mut session = session(SendFailurePolicy::Retain);
    let general = session.select_room(&"general".into()).unwrap().unwrap();
    select_and_load(&mut session, "dev", &["d1"]);

    let outcome = session.history_loaded(general.ticket, history("general", &["h1", "h2"]));

    assert_eq!(outcome, LoadOutcome::Stale);
    assert_eq!(session.active_room(), Some(&RoomId::from("dev")));
    assert_eq!(session.timeline().len(), 1);
}

#[test]
fn failed_send_under_each_policy() {
    for (policy, expected_len, expected_state) in [
        (SendFailurePolicy::Retain, 3, Some(DeliveryState::Pending)),
        (SendFailurePolicy::Rollback, 2, None),
        (SendFailurePolicy::MarkFailed, 3, Some(DeliveryState::Failed)),
    ] {
        let mut session = session(policy);
        select_and_load(&mut session, "general", &["h1", "h2"]);
        let pending = session.submit_local(&"general".into(), "hi").unwrap();

        session.fail_send(&pending);

        assert_eq!(session.timeline().len(), expected_len, "{policy:?}");
        let entry = session.timeline().iter().find(|m| m.id == pending.local_id);
        assert_eq!(entry.map(|m| m.delivery), expected_state, "{policy:?}");
    }
}

/// Timeline operations a user and a server can interleave.
#[derive(Debug, Clone)]
enum Op {
    Select(usize),
    Reload,
    LoadLatest(Vec<u8>),
    LoadStale(usize, Vec<u8>),
    Push(usize, u8),
    Submit(usize),
    ConfirmOldest(u8),
    FailOldest,
}

fn room_index() -> impl Strategy<Value = usize> {
    0..ROOMS.len()
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        2 => room_index().prop_map(Op::Select),
        1 => Just(Op::Reload),
        2 => prop::collection::vec(0u8..20, 0..6).prop_map(Op::LoadLatest),
        1 => (room_index(), prop::collection::vec(0u8..20, 0..6))
            .prop_map(|(r, ids)| Op::LoadStale(r, ids)),
        4 => (room_index(), 0u8..20).prop_map(|(r, id)| Op::Push(r, id)),
        2 => room_index().prop_map(Op::Submit),
        1 => (0u8..20).prop_map(Op::ConfirmOldest),
        1 => Just(Op::FailOldest),
    ]
}

fn policy_strategy() -> impl Strategy<Value = SendFailurePolicy> {
    prop_oneof![
        Just(SendFailurePolicy::Retain),
        Just(SendFailurePolicy::Rollback),
        Just(SendFailurePolicy::MarkFailed),
    ]
}

proptest! {
    #[test]
    fn prop_timeline_invariants_hold(
        ops in prop::collection::vec(op_strategy(), 1..60),
        policy in policy_strategy(),
    ) {
        let mut session = session(policy);
        let registry = InvariantRegistry::standard();
        let mut latest = None;
        let mut stale = Vec::new();
        let mut pending = Vec::new();

        for op in ops {
            match op {
                Op::Select(r) => {
                    if let Ok(Some(switch)) = session.select_room(&ROOMS[r].into()) {
                        stale.extend(latest.replace((switch.ticket, switch.room_id)));
                        pending.clear();
                    }
                },
                Op::Reload => {
                    if let Ok(switch) = session.reload_active() {
                        stale.extend(latest.replace((switch.ticket, switch.room_id)));
                    }
                },
                Op::LoadLatest(ids) => {
                    if let Some((ticket, room)) = latest.take() {
                        let ids: Vec<String> = ids.iter().map(|i| format!("m{i}")).collect();
                        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
                        let outcome = session.history_loaded(ticket, history(room.as_str(), &refs));
                        prop_assert!(matches!(outcome, LoadOutcome::Applied { .. }), "expected Applied, got {:?}", outcome);
                    }
                },
                Op::LoadStale(r, ids) => {
                    if let Some((ticket, _)) = stale.pop() {
                        let before = session.timeline().to_vec();
                        let ids: Vec<String> = ids.iter().map(|i| format!("s{i}")).collect();
                        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
                        let outcome = session.history_loaded(ticket, history(ROOMS[r], &refs));
                        prop_assert_eq!(outcome, LoadOutcome::Stale);
                        prop_assert_eq!(session.timeline(), before.as_slice());
                    }
                },
                Op::Push(r, id) => {
                    session.apply_incoming(push(&format!("m{id}"), ROOMS[r]));
                },
                Op::Submit(r) => {
                    if let Ok(ticket) = session.submit_local(&ROOMS[r].into(), "draft") {
                        pending.push(ticket);
                    }
                },
                Op::ConfirmOldest(id) => {
                    if !pending.is_empty() {
                        let ticket = pending.remove(0);
                        let mut canonical = history(ticket.room_id.as_str(), &["x"]).remove(0);
                        canonical.id = format!("m{id}").into();
                        session.confirm_send(&ticket, canonical);
                    }
                },
                Op::FailOldest => {
                    if !pending.is_empty() {
                        let ticket = pending.remove(0);
                        session.fail_send(&ticket);
                    }
                },
            }

            let snapshot = SystemSnapshot::from_session(&session);
            if let Err(violations) = registry.check_all(&snapshot) {
                prop_assert!(false, "violations: {:?}", violations);
            }
        }
    }

    /// Every push accepted while a load is in flight is shown exactly once
    /// after the load, whatever the batch holds.
    #[test]
    fn prop_pushes_during_load_are_kept(
        pushed in prop::collection::vec(0u8..12, 0..8),
        batch in prop::collection::vec(0u8..12, 0..8),
        reload in any::<bool>(),
    ) {
        let mut session = session(SendFailurePolicy::Retain);
        select_and_load(&mut session, "general", &["h0"]);
        let switch = if reload {
            session.reload_active().unwrap()
        } else {
            select_and_load(&mut session, "dev", &[]);
            session.select_room(&"general".into()).unwrap().unwrap()
        };

        let pushed: Vec<String> = pushed.iter().map(|i| format!("m{i}")).collect();
        for id in &pushed {
            session.apply_incoming(push(id, "general"));
        }
        let batch: Vec<String> = batch.iter().map(|i| format!("m{i}")).collect();
        let refs: Vec<&str> = batch.iter().map(String::as_str).collect();
        session.history_loaded(switch.ticket, history("general", &refs));

        for id in pushed.iter().chain(&batch) {
            let copies = session.timeline().iter().filter(|m| m.id.as_str() == id).count();
            prop_assert_eq!(copies, 1, "{}", id);
        }
    }

    #[test]
    fn prop_repeated_push_appears_once(repeats in 1usize..10, room in room_index()) {
        let mut session = session(SendFailurePolicy::Retain);
        select_and_load(&mut session, ROOMS[room], &[]);

        for _ in 0..repeats {
            session.apply_incoming(push("same", ROOMS[room]));
        }

        prop_assert_eq!(session.timeline().len(), 1);
    }
}
