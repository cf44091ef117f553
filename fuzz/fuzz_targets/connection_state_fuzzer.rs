//! Fuzz target for the connection lifecycle state machine
//!
//! # Strategy
//!
//! - Arbitrary interleavings of consumer calls (connect, disconnect, send)
//!   and socket signals (open, frame, error, close), including signals from
//!   sockets the connection no longer holds
//! - Arbitrary virtual-time advances that fire reconnect timers and
//!   connect/idle timeouts
//!
//! # Invariants
//!
//! - NEVER panic
//! - At most one socket is live at a time
//! - Reconnect delays stay within the configured bounds
//! - After `disconnect()`, nothing reopens until the next `connect()`
//! - Signals from stale sockets never reach the consumer

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use chatsync_core::{ConnectionConfig, ConnectionEvent, Outbound, SocketId};
use chatsync_harness::{InvariantRegistry, SimEnv, SimSocket, SystemSnapshot};
use libfuzzer_sys::fuzz_target;
use url::Url;

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    Connect,
    Disconnect,
    Send(String),
    ResolveCredentials,
    Accept,
    Deliver(String),
    Fail,
    Drop { code: Option<u16> },
    /// Signal from an earlier socket.
    Stale { pick: u8, kind: StaleKind },
    Advance { millis: u16 },
    FireTimer,
}

#[derive(Debug, Clone, Arbitrary)]
enum StaleKind {
    Open,
    Frame,
    Close,
}

#[derive(Debug, Arbitrary)]
struct Script {
    seed: u64,
    with_token: bool,
    ops: Vec<Op>,
}

fn socket_of(event: &ConnectionEvent) -> Option<SocketId> {
    match event {
        ConnectionEvent::Open { socket }
        | ConnectionEvent::Message { socket, .. }
        | ConnectionEvent::Error { socket, .. }
        | ConnectionEvent::Closed { socket, .. } => Some(*socket),
        _ => None,
    }
}

fuzz_target!(|script: Script| {
    let Ok(target) = Url::parse("ws://fuzz.local/ws") else {
        return;
    };
    let config = ConnectionConfig { idle_timeout: Some(Duration::from_secs(30)), ..Default::default() };
    let (initial, max) = (config.reconnect.initial_delay, config.reconnect.max_delay);
    let invariants = InvariantRegistry::standard();

    let mut sim = SimSocket::new(SimEnv::with_seed(script.seed), target, config);
    if script.with_token {
        sim = sim.with_token(Some("t0k"));
    }

    let mut disconnected = true;
    let mut seen: Vec<SocketId> = Vec::new();

    for (step, op) in script.ops.into_iter().take(256).enumerate() {
        let opened_before = sim.opened_urls().len();
        let events_before = sim.events().len();
        let mut stale = None;

        match op {
            Op::Connect => {
                disconnected = false;
                sim.connect();
            },
            Op::Disconnect => {
                disconnected = true;
                sim.disconnect();
            },
            Op::Send(text) => {
                sim.send(&Outbound::from(text));
            },
            Op::ResolveCredentials => sim.resolve_credentials(),
            Op::Accept => sim.accept(),
            Op::Deliver(text) => sim.deliver(&text),
            Op::Fail => sim.fail("fuzz error"),
            Op::Drop { code } => sim.drop_connection(code, "fuzz drop"),
            Op::Stale { pick, kind } => {
                let old: Vec<SocketId> =
                    seen.iter().copied().filter(|s| Some(*s) != sim.socket()).collect();
                if old.is_empty() {
                    continue;
                }
                let socket = old[usize::from(pick) % old.len()];
                stale = Some(socket);
                match kind {
                    StaleKind::Open => sim.open_from(socket),
                    StaleKind::Frame => sim.deliver_from(socket, r#"{"late":true}"#),
                    StaleKind::Close => sim.close_from(socket, Some(1006), "late close"),
                }
            },
            Op::Advance { millis } => sim.advance(Duration::from_millis(u64::from(millis))),
            Op::FireTimer => sim.fire_timer(),
        }

        if let Some(socket) = sim.socket()
            && !seen.contains(&socket)
        {
            seen.push(socket);
        }

        assert!(sim.live_sockets().len() <= 1, "step {step}: live sockets {:?}", sim.live_sockets());

        if disconnected {
            assert_eq!(sim.opened_urls().len(), opened_before, "step {step}: reopened after disconnect");
            assert!(!sim.timer_armed(), "step {step}: reconnect armed after disconnect");
        }

        if let Some(socket) = stale {
            for event in &sim.events()[events_before..] {
                assert_ne!(socket_of(event), Some(socket), "step {step}: stale {socket} surfaced {event:?}");
            }
        }

        let snapshot =
            SystemSnapshot::empty().with_reconnect_delays(sim.reconnect_delays().iter().copied(), initial, max);
        invariants.assert_all(&snapshot, &format!("step {step}"));
    }
});
