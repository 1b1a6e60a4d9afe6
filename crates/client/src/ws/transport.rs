//! Transport capability behind the realtime connection.
//!
//! The connection core only needs "open a duplex text-frame link": a writer
//! half and a stream of inbound events. Production uses tokio-tungstenite;
//! tests plug in an in-memory fake.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_channel::mpsc::{unbounded, UnboundedReceiver};
use futures_util::{SinkExt, StreamExt};
use linnet_shared::RealtimeError;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Notification from an open transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One inbound text frame.
    Frame(String),
    /// The link is gone: remote close, read error, or a local `close()`.
    Closed,
}

/// Writer half of an open link.
pub trait FrameSink: Send + Sync {
    /// Queue one text frame for transmission. Sends are fire-and-forget; an
    /// error means the link is no longer open.
    fn send_text(&self, frame: &str) -> Result<(), RealtimeError>;

    /// Whether the link is currently open. Pure query.
    fn is_open(&self) -> bool;

    /// Close the link. The event stream yields [`TransportEvent::Closed`].
    fn close(&self);
}

/// An opened link: the writer half and the inbound event stream.
pub struct TransportLink {
    pub sink: Box<dyn FrameSink>,
    pub events: UnboundedReceiver<TransportEvent>,
}

/// Capability to open a duplex text-frame connection to a URL.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Resolves once the transport reports open; errors if it fails first.
    async fn open(&self, url: &str) -> Result<TransportLink, RealtimeError>;
}

/// tokio-tungstenite transport.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransport;

enum SinkCmd {
    Frame(String),
    Close,
}

struct WsSink {
    tx: tokio::sync::mpsc::UnboundedSender<SinkCmd>,
    open: Arc<AtomicBool>,
}

impl FrameSink for WsSink {
    fn send_text(&self, frame: &str) -> Result<(), RealtimeError> {
        if !self.is_open() {
            return Err(RealtimeError::Transport("link is not open".into()));
        }
        self.tx
            .send(SinkCmd::Frame(frame.to_owned()))
            .map_err(|_| RealtimeError::Transport("write task stopped".into()))
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.tx.is_closed()
    }

    fn close(&self) {
        // Mark closed immediately so is_open() reflects the disconnect even
        // before the close frame drains.
        self.open.store(false, Ordering::SeqCst);
        let _ = self.tx.send(SinkCmd::Close);
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: &str) -> Result<TransportLink, RealtimeError> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| RealtimeError::Transport(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let (event_tx, events) = unbounded();
        let (cmd_tx, mut cmd_rx) = tokio::sync::mpsc::unbounded_channel::<SinkCmd>();
        let open = Arc::new(AtomicBool::new(true));

        // Write task: drain queued frames onto the socket.
        let open_for_write = open.clone();
        tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                match cmd {
                    SinkCmd::Frame(text) => {
                        if let Err(e) = write.send(Message::text(text)).await {
                            tracing::error!(error = %e, "websocket send failed");
                            break;
                        }
                    }
                    SinkCmd::Close => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            open_for_write.store(false, Ordering::SeqCst);
        });

        // Read task: forward text frames, signal close once.
        let open_for_read = open.clone();
        tokio::spawn(async move {
            while let Some(item) = read.next().await {
                match item {
                    Ok(Message::Text(text)) => {
                        if event_tx
                            .unbounded_send(TransportEvent::Frame(text.as_str().to_owned()))
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    // Ping/pong are handled by tungstenite; binary is ignored.
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "websocket read error");
                        break;
                    }
                }
            }
            open_for_read.store(false, Ordering::SeqCst);
            let _ = event_tx.unbounded_send(TransportEvent::Closed);
        });

        Ok(TransportLink {
            sink: Box::new(WsSink { tx: cmd_tx, open }),
            events,
        })
    }
}
