//! WebSocket transport on tokio-tungstenite.

use chatsync_core::SocketId;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

use super::{SignalSender, SocketCommand, SocketHandle, SocketSignal, Transport, TransportError};

/// WebSocket transport. One spawned task per socket.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl WsTransport {
    /// Create a transport.
    pub fn new() -> Self {
        Self
    }
}

impl Transport for WsTransport {
    fn open(&self, socket: SocketId, url: Url, signals: SignalSender) -> SocketHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        // No abort handle: close goes through the command so the peer sees a
        // close frame, and the task ends on its own, even mid-handshake
        tokio::spawn(run_socket(socket, url, rx, signals));
        SocketHandle::new(tx, None)
    }
}

/// Bridge one WebSocket to the signal and command channels.
async fn run_socket(
    socket: SocketId,
    url: Url,
    mut commands: mpsc::UnboundedReceiver<SocketCommand>,
    signals: SignalSender,
) {
    let signal = |s: SocketSignal| {
        let _ = signals.send((socket, s));
    };

    let handshake = connect_async(url.as_str());
    tokio::pin!(handshake);
    let stream = loop {
        tokio::select! {
            result = &mut handshake => match result {
                Ok((stream, _response)) => break stream,
                Err(e) => {
                    let reason = e.to_string();
                    signal(SocketSignal::Error(TransportError::Connect(reason.clone())));
                    signal(SocketSignal::Closed { code: None, reason });
                    return;
                },
            },
            command = commands.recv() => match command {
                Some(SocketCommand::Send(_)) => {
                    tracing::debug!("{socket}: dropping frame sent before open");
                },
                Some(SocketCommand::Close) | None => {
                    tracing::debug!("{socket}: closed during handshake");
                    return;
                },
            },
        }
    };
    signal(SocketSignal::Opened);

    let (mut sink, mut stream) = stream.split();
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(SocketCommand::Send(text)) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        signal(SocketSignal::Error(TransportError::Stream(e.to_string())));
                    }
                },
                Some(SocketCommand::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    return;
                },
            },

            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => signal(SocketSignal::Frame(text.to_string())),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => signal(SocketSignal::Frame(text)),
                    Err(_) => {
                        tracing::warn!("{socket}: dropping {} byte non-UTF-8 binary frame", data.len());
                    },
                },
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(f) => (Some(u16::from(f.code)), f.reason.to_string()),
                        None => (None, "server closed connection".to_owned()),
                    };
                    signal(SocketSignal::Closed { code, reason });
                    return;
                },
                // Ping replies are queued by tungstenite itself
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {},
                Some(Err(e)) => {
                    let reason = e.to_string();
                    signal(SocketSignal::Error(TransportError::Stream(reason.clone())));
                    signal(SocketSignal::Closed { code: None, reason });
                    return;
                },
                None => {
                    signal(SocketSignal::Closed { code: None, reason: "stream ended".to_owned() });
                    return;
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn close_during_handshake_ends_task() {
        // Accepts TCP but never answers the upgrade request
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(stream);
        });

        let (signals, mut rx) = mpsc::unbounded_channel();
        let url = Url::parse(&format!("ws://{addr}/ws")).unwrap();
        let handle = WsTransport::new().open(SocketId(1), url, signals);

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.close();

        let ended = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert_eq!(ended.ok(), Some(None), "socket task still running or signalled");
        server.abort();
    }
}
