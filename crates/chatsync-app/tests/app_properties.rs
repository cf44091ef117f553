//! Property-based tests for the App state machine.
//!
//! A scripted backend answers the App's fetches and sends in arbitrary order,
//! interleaved with pushes and room switches. Invariants must hold after
//! every step.

use chatsync_app::{App, AppAction, AppEvent};
use chatsync_client::FetchError;
use chatsync_core::{
    ConnectionEvent, DeliveryState, Inbound, LoadTicket, Message, PendingSend, Room, RoomId,
    SendFailurePolicy, SocketId,
};
use chatsync_harness::{InvariantRegistry, SimEnv, SystemSnapshot};
use proptest::prelude::*;

const ROOMS: [&str; 3] = ["general", "dev", "random"];

#[derive(Debug, Clone)]
enum Step {
    Select(usize),
    Reload,
    Push { id: u8, room: usize },
    Send,
    /// Answer the outstanding request at this index (modulo).
    Answer(usize),
    /// Fail the outstanding request at this index (modulo).
    Fail(usize),
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        2 => (0..ROOMS.len()).prop_map(Step::Select),
        1 => Just(Step::Reload),
        3 => (0u8..12, 0..ROOMS.len()).prop_map(|(id, room)| Step::Push { id, room }),
        2 => Just(Step::Send),
        4 => any::<usize>().prop_map(Step::Answer),
        1 => any::<usize>().prop_map(Step::Fail),
    ]
}

fn policy_strategy() -> impl Strategy<Value = SendFailurePolicy> {
    prop_oneof![
        Just(SendFailurePolicy::Retain),
        Just(SendFailurePolicy::Rollback),
        Just(SendFailurePolicy::MarkFailed),
    ]
}

/// Requests the App issued that the backend has not answered yet.
#[derive(Debug)]
enum Outstanding {
    History { ticket: LoadTicket, room_id: RoomId },
    Send(PendingSend),
}

fn backlog(room: &RoomId) -> Vec<Message> {
    (0..3)
        .map(|n| Message {
            id: format!("{room}-h{n}").into(),
            room_id: room.clone(),
            author: "ana".into(),
            mine: false,
            content: format!("backlog {n}"),
            timestamp_ms: 1_000,
            delivery: DeliveryState::Confirmed,
        })
        .collect()
}

fn push(id: u8, room: &str) -> AppEvent {
    let text = format!(r#"{{"id":"p{id}","roomId":"{room}","author":"bo","content":"live"}}"#);
    AppEvent::Connection(ConnectionEvent::Message { socket: SocketId(1), inbound: Inbound::decode(&text) })
}

fn collect(outstanding: &mut Vec<Outstanding>, actions: Vec<AppAction>) {
    for action in actions {
        match action {
            AppAction::FetchHistory { ticket, room_id } => {
                outstanding.push(Outstanding::History { ticket, room_id });
            },
            AppAction::SubmitMessage(pending) => outstanding.push(Outstanding::Send(pending)),
            _ => {},
        }
    }
}

fn answer(request: Outstanding, succeed: bool, sent: &mut u32) -> AppEvent {
    match request {
        Outstanding::History { ticket, room_id } => {
            let result = if succeed {
                Ok(backlog(&room_id))
            } else {
                Err(FetchError::Request("reset".into()))
            };
            AppEvent::HistoryLoaded { ticket, room_id, result }
        },
        Outstanding::Send(pending) => {
            *sent += 1;
            let result = if succeed {
                Ok(Message {
                    id: format!("srv-{sent}").into(),
                    room_id: pending.room_id.clone(),
                    author: "me".into(),
                    mine: true,
                    content: pending.content.clone(),
                    timestamp_ms: 2_000,
                    delivery: DeliveryState::Confirmed,
                })
            } else {
                Err(FetchError::Rejected("no".into()))
            };
            AppEvent::SendCompleted { pending, result }
        },
    }
}

fn loaded_app(policy: SendFailurePolicy, outstanding: &mut Vec<Outstanding>) -> App<SimEnv> {
    let mut app = App::new(SimEnv::with_seed(7), policy);
    let rooms = ROOMS.iter().map(|id| Room::new(*id, id.to_uppercase())).collect();
    let actions = app.handle(AppEvent::RoomsLoaded(Ok(rooms)));
    collect(outstanding, actions);
    app
}

proptest! {
    #[test]
    fn prop_app_invariants_hold(
        policy in policy_strategy(),
        steps in prop::collection::vec(step_strategy(), 0..80),
    ) {
        let invariants = InvariantRegistry::standard();
        let mut outstanding = Vec::new();
        let mut app = loaded_app(policy, &mut outstanding);
        let mut sent = 0;

        for (i, step) in steps.into_iter().enumerate() {
            let actions = match step {
                Step::Select(room) => app.select_room(&ROOMS[room].into()).unwrap_or_default(),
                Step::Reload => app.reload().unwrap_or_default(),
                Step::Push { id, room } => app.handle(push(id, ROOMS[room])),
                Step::Send => app.send_to_active("hi").map(|(_, a)| a).unwrap_or_default(),
                Step::Answer(_) | Step::Fail(_) if outstanding.is_empty() => vec![],
                Step::Answer(n) => {
                    let request = outstanding.remove(n % outstanding.len());
                    app.handle(answer(request, true, &mut sent))
                },
                Step::Fail(n) => {
                    let request = outstanding.remove(n % outstanding.len());
                    app.handle(answer(request, false, &mut sent))
                },
            };
            collect(&mut outstanding, actions);

            let snapshot = SystemSnapshot::from_session(app.session());
            invariants.assert_all(&snapshot, &format!("step {i}"));

            let view = app.view();
            prop_assert_eq!(view.active_room.as_ref(), app.active_room());
            prop_assert_eq!(view.loading, app.session().in_flight().is_some());
        }
    }

    /// Only the last switch's backlog is ever shown, whatever order the
    /// responses arrive in.
    #[test]
    fn prop_last_switch_wins(
        switches in prop::collection::vec(0..ROOMS.len(), 1..8),
        order in any::<u64>(),
    ) {
        let mut outstanding = Vec::new();
        let mut app = loaded_app(SendFailurePolicy::Retain, &mut outstanding);
        for room in &switches {
            let actions = app.select_room(&ROOMS[*room].into()).unwrap();
            collect(&mut outstanding, actions);
        }

        let mut seed = order;
        let mut sent = 0;
        while !outstanding.is_empty() {
            seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            let request = outstanding.remove((seed >> 33) as usize % outstanding.len());
            app.handle(answer(request, true, &mut sent));
        }

        let active = app.active_room().cloned().unwrap();
        prop_assert_eq!(app.timeline().to_vec(), backlog(&active));
    }
}

#[test]
fn answered_history_for_first_room_is_shown() {
    let mut outstanding = Vec::new();
    let mut app = loaded_app(SendFailurePolicy::Retain, &mut outstanding);
    let mut sent = 0;

    let request = outstanding.remove(0);
    app.handle(answer(request, true, &mut sent));

    assert_eq!(app.active_room().map(RoomId::as_str), Some("general"));
    assert_eq!(app.timeline().len(), 3);
}
