// src/transport.rs
//! The duplex channel to the game server, seen from the session.
//!
//! Only the outbound half lives behind the trait: inbound frames are pushed
//! into [`crate::session::GameSession::on_frame`] by whoever owns the socket,
//! in arrival order.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::error::TransportError;

pub trait Transport {
    fn open(&mut self) -> Result<(), TransportError>;

    /// Fire-and-forget; no acknowledgement is awaited.
    fn send(&mut self, frame: &str) -> Result<(), TransportError>;

    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// In-process transport that records every frame sent through it.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    open: bool,
    refuse_connections: bool,
    fail_sends: bool,
    sent: Vec<String>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `open` calls fail, as if the server were unreachable.
    pub fn refusing() -> Self {
        MemoryTransport { refuse_connections: true, ..Self::default() }
    }

    pub fn set_refuse_connections(&mut self, refuse: bool) {
        self.refuse_connections = refuse;
    }

    /// Simulates the socket dropping under the next sends.
    pub fn set_fail_sends(&mut self, fail: bool) {
        self.fail_sends = fail;
    }

    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    pub fn last_sent(&self) -> Option<&str> {
        self.sent.last().map(String::as_str)
    }

    pub fn take_sent(&mut self) -> Vec<String> {
        std::mem::take(&mut self.sent)
    }
}

impl Transport for MemoryTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        if self.refuse_connections {
            return Err(TransportError::Refused("memory transport is refusing connections".into()));
        }
        self.open = true;
        Ok(())
    }

    fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        if !self.open { return Err(TransportError::Closed); }
        if self.fail_sends {
            self.open = false;
            return Err(TransportError::Closed);
        }
        self.sent.push(frame.to_string());
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

// ── WebSocket transport ─────────────────────────────────────────────

/// What the socket task reports back to the owner of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// A text frame from the server, to be passed to `on_frame`.
    Frame(String),
    /// The server or the network ended the connection.
    Closed(String),
}

type EventSink = Arc<dyn Fn(SocketEvent) + Send + Sync>;
type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client. The connection runs on a small tokio runtime owned by the
/// transport; inbound frames and closure are delivered through `on_event`,
/// which is called from the runtime's worker thread.
pub struct WsTransport {
    url: String,
    runtime: Runtime,
    on_event: EventSink,
    outbound: Option<mpsc::UnboundedSender<Message>>,
}

impl WsTransport {
    pub fn new<F>(url: impl Into<String>, on_event: F) -> Result<Self, TransportError>
    where
        F: Fn(SocketEvent) + Send + Sync + 'static,
    {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("chess-socket")
            .enable_all()
            .build()?;
        Ok(WsTransport { url: url.into(), runtime, on_event: Arc::new(on_event), outbound: None })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for WsTransport {
    /// Blocks until the handshake completes or fails.
    fn open(&mut self) -> Result<(), TransportError> {
        if self.is_open() {
            return Ok(());
        }
        let (socket, _) = self.runtime
            .block_on(tokio_tungstenite::connect_async(self.url.as_str()))
            .map_err(|e| TransportError::Refused(format!("{}: {}", self.url, e)))?;
        info!(url = %self.url, "websocket connected");

        let (tx, rx) = mpsc::unbounded_channel();
        self.runtime.spawn(socket_loop(socket, rx, Arc::clone(&self.on_event)));
        self.outbound = Some(tx);
        Ok(())
    }

    fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::Closed)?;
        if outbound.send(Message::text(frame)).is_err() {
            // The socket task has exited
            self.outbound = None;
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    /// Dropping the sender makes the socket task send a close frame and exit.
    fn close(&mut self) {
        self.outbound = None;
    }

    fn is_open(&self) -> bool {
        self.outbound.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

/// Multiplexes outbound frames and inbound messages until either side ends.
///
/// A close requested locally is not reported through the sink; the session
/// has already recorded it.
async fn socket_loop(socket: Socket, mut outbound: mpsc::UnboundedReceiver<Message>, on_event: EventSink) {
    let (mut sink, mut stream) = socket.split();
    debug!("socket loop started");

    loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(msg) => {
                    if let Err(e) = sink.send(msg).await {
                        error!(%e, "websocket send failed");
                        on_event(SocketEvent::Closed(format!("send failed: {e}")));
                        break;
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    debug!("closed by client");
                    break;
                }
            },

            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => on_event(SocketEvent::Frame(text)),
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "closed by server".to_string());
                    on_event(SocketEvent::Closed(reason));
                    break;
                }
                // Pings are answered by tungstenite; binary frames are not part of the protocol
                Some(Ok(other)) => debug!(kind = ?std::mem::discriminant(&other), "ignoring non-text message"),
                Some(Err(e)) => {
                    warn!(%e, "websocket receive failed");
                    on_event(SocketEvent::Closed(e.to_string()));
                    break;
                }
                None => {
                    on_event(SocketEvent::Closed("closed by server".to_string()));
                    break;
                }
            },
        }
    }

    debug!("socket loop exited");
}
