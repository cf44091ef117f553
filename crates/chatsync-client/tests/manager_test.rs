//! Connection manager behavior against the demo backend.
//!
//! Runs on a paused tokio clock: reconnect timers fire as soon as the runtime
//! is otherwise idle, so backoff sequences complete instantly and exactly.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chatsync_client::{
    ConnectionManager, CredentialError, CredentialProvider, DemoBackend, DemoStore, SignalSender,
    SocketHandle, StaticToken, SystemEnv, Transport,
};
use chatsync_core::{ConnectionConfig, ConnectionEvent, ConnectionState, Inbound, RoomId, SocketId};
use tokio::sync::mpsc;
use url::Url;

const WAIT: Duration = Duration::from_secs(120);

fn target() -> Url {
    Url::parse("ws://demo.local/ws").unwrap()
}

fn demo() -> DemoBackend<SystemEnv> {
    DemoBackend::new(SystemEnv::new(), DemoStore::seeded(1_700_000_000_000))
}

fn manager(demo: &DemoBackend<SystemEnv>) -> ConnectionManager<SystemEnv> {
    ConnectionManager::new(SystemEnv::new(), target(), ConnectionConfig::default(), Arc::new(demo.clone()))
}

/// Collect events until one matches, failing after `WAIT` of virtual time.
async fn until<F>(manager: &mut ConnectionManager<SystemEnv>, mut done: F) -> Vec<ConnectionEvent>
where
    F: FnMut(&ConnectionEvent) -> bool,
{
    let mut seen = Vec::new();
    let result = tokio::time::timeout(WAIT, async {
        loop {
            let event = manager.next_event().await;
            let finished = done(&event);
            seen.push(event);
            if finished {
                break;
            }
        }
    })
    .await;
    assert!(result.is_ok(), "timed out; saw {seen:?}");
    seen
}

fn is_open(event: &ConnectionEvent) -> bool {
    matches!(event, ConnectionEvent::Open { .. })
}

#[tokio::test(start_paused = true)]
async fn connects_and_delivers_pushed_messages() {
    let demo = demo();
    let mut manager = manager(&demo);

    manager.connect();
    let events = until(&mut manager, is_open).await;
    assert_eq!(events[0], ConnectionEvent::StateChanged(ConnectionState::Connecting));
    assert!(manager.is_open());

    let posted = demo.post_as(&RoomId::from("general"), "bo", "hello there");
    let events = until(&mut manager, |e| matches!(e, ConnectionEvent::Message { .. })).await;

    match events.last() {
        Some(ConnectionEvent::Message { inbound, .. }) => {
            let message = inbound.as_message().unwrap();
            assert_eq!(message.id, posted.id);
            assert_eq!(message.content, "hello there");
        },
        other => panic!("expected message, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn non_json_frames_arrive_raw() {
    let demo = demo();
    let mut manager = manager(&demo);
    manager.connect();
    until(&mut manager, is_open).await;

    demo.push_raw("maintenance at noon");
    let events = until(&mut manager, |e| matches!(e, ConnectionEvent::Message { .. })).await;

    assert!(matches!(
        events.last(),
        Some(ConnectionEvent::Message { inbound: Inbound::Raw(text), .. }) if text == "maintenance at noon"
    ));
}

#[tokio::test(start_paused = true)]
async fn token_is_appended_to_target() {
    let demo = demo();
    let mut manager = manager(&demo).with_credentials(Arc::new(StaticToken::new("s3cret")));

    manager.connect();
    until(&mut manager, is_open).await;

    assert_eq!(demo.opened_urls()[0].as_str(), "ws://demo.local/ws?token=s3cret");
}

struct BrokenProvider;

#[async_trait]
impl CredentialProvider for BrokenProvider {
    async fn token(&self) -> Result<Option<String>, CredentialError> {
        Err(CredentialError("keychain locked".into()))
    }
}

#[tokio::test(start_paused = true)]
async fn provider_failure_still_connects() {
    let demo = demo();
    let mut manager = manager(&demo).with_credentials(Arc::new(BrokenProvider));

    manager.connect();
    until(&mut manager, is_open).await;

    assert_eq!(demo.opened_urls()[0].query(), None);
}

#[tokio::test(start_paused = true)]
async fn repeated_connect_opens_one_socket() {
    let demo = demo();
    let mut manager = manager(&demo);

    manager.connect();
    manager.connect();
    until(&mut manager, is_open).await;
    manager.connect();

    assert_eq!(demo.opened_urls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn abnormal_drop_reconnects_after_backoff() {
    let demo = demo();
    let mut manager = manager(&demo);
    manager.connect();
    until(&mut manager, is_open).await;

    let dropped_at = tokio::time::Instant::now();
    demo.drop_connections();
    let events = until(&mut manager, is_open).await;

    assert!(events.iter().any(|e| matches!(
        e,
        ConnectionEvent::Closed { info, .. } if !info.explicit && info.code == Some(1006)
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        ConnectionEvent::Reconnecting { delay, failures: 1 } if *delay == Duration::from_millis(1000)
    )));
    assert!(dropped_at.elapsed() >= Duration::from_millis(1000));
    assert_eq!(demo.opened_urls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn refused_connections_back_off_exponentially() {
    let demo = demo();
    demo.set_refuse_connections(true);
    let mut manager = manager(&demo);
    manager.connect();

    let mut delays = Vec::new();
    while delays.len() < 4 {
        let events = until(&mut manager, |e| matches!(e, ConnectionEvent::Reconnecting { .. })).await;
        assert!(events.iter().any(|e| matches!(e, ConnectionEvent::Error { .. })));
        if let Some(ConnectionEvent::Reconnecting { delay, .. }) = events.last() {
            delays.push(delay.as_millis());
        }
    }
    assert_eq!(delays, vec![1000, 2000, 4000, 8000]);

    demo.set_refuse_connections(false);
    until(&mut manager, is_open).await;
}

#[tokio::test(start_paused = true)]
async fn disconnect_is_final() {
    let demo = demo();
    let mut manager = manager(&demo);
    manager.connect();
    until(&mut manager, is_open).await;

    manager.disconnect();
    manager.disconnect();
    let events = until(&mut manager, |e| {
        matches!(e, ConnectionEvent::StateChanged(ConnectionState::Disconnected))
    })
    .await;
    let closes: Vec<bool> = events
        .iter()
        .filter_map(|e| match e {
            ConnectionEvent::Closed { info, .. } => Some(info.explicit),
            _ => None,
        })
        .collect();
    assert_eq!(closes, vec![true]);

    // Nothing further: no reconnect, no second close
    demo.drop_connections();
    let quiet = tokio::time::timeout(Duration::from_secs(60), manager.next_event()).await;
    assert!(quiet.is_err(), "unexpected event {quiet:?}");
    assert_eq!(manager.state(), &ConnectionState::Disconnected);
    assert_eq!(demo.opened_urls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn send_requires_open_connection() {
    let demo = demo();
    let mut manager = manager(&demo);
    assert!(!manager.send("too early"));

    manager.connect();
    until(&mut manager, is_open).await;
    assert!(manager.send(serde_json::json!({ "type": "subscribe", "roomId": "dev" })));

    tokio::time::sleep(Duration::from_millis(10)).await;
    let received = demo.received_frames();
    assert_eq!(received.len(), 1);
    let frame: serde_json::Value = serde_json::from_str(&received[0]).unwrap();
    assert_eq!(frame["type"], "subscribe");
    assert_eq!(frame["roomId"], "dev");
}

/// Sockets that never open, never report, and never close.
#[derive(Default)]
struct HangingTransport {
    opened: AtomicUsize,
}

impl Transport for HangingTransport {
    fn open(&self, _socket: SocketId, _url: Url, _signals: SignalSender) -> SocketHandle {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let (commands, _) = mpsc::unbounded_channel();
        SocketHandle::new(commands, None)
    }
}

#[tokio::test(start_paused = true)]
async fn connect_timeout_fires_when_polls_are_cut_short() {
    let transport = Arc::new(HangingTransport::default());
    let mut manager =
        ConnectionManager::new(SystemEnv::new(), target(), ConnectionConfig::default(), transport.clone());
    manager.connect();

    // Another select branch winning every 400ms drops each poll early
    let mut seen = Vec::new();
    for _ in 0..150 {
        if let Ok(event) = tokio::time::timeout(Duration::from_millis(400), manager.next_event()).await {
            seen.push(event);
        }
        if seen.iter().any(|e| matches!(e, ConnectionEvent::Reconnecting { .. })) {
            break;
        }
    }

    assert!(
        seen.iter().any(|e| matches!(e, ConnectionEvent::Closed { info, .. } if !info.explicit)),
        "no timeout close; saw {seen:?}"
    );
    assert!(matches!(manager.state(), ConnectionState::Reconnecting { .. }), "{:?}", manager.state());
    assert_eq!(transport.opened.load(Ordering::SeqCst), 1);
}
