//! WebSocket transport: one JSON message per text frame.
//!
//! Each connection runs two pumps. The reader pump enforces a read deadline
//! that every incoming frame (pongs included) pushes forward; when it expires
//! or the peer goes away the reader stops and the connection is over. The
//! writer pump is the only task touching the sink: it drains the outbound
//! queue and sends a ping every 90% of the read deadline.

use super::{next_connection_id, ConnectionId, Transport, TransportError, TransportKind};
use crate::config::TransportSettings;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::AbortHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, trace};

type Inbound = Result<String, TransportError>;

enum Outbound {
    Line(String),
    /// Sent by `close`; everything queued before it is still delivered
    Close,
}

/// Transport for WebSocket clients.
pub struct WebSocketTransport {
    id: ConnectionId,
    inbound: Mutex<mpsc::Receiver<Inbound>>,
    outbound: mpsc::Sender<Outbound>,
    closed: Arc<AtomicBool>,
    reader_task: AbortHandle,
    write_wait: Duration,
}

impl WebSocketTransport {
    /// Takes over an upgraded WebSocket and starts both pumps.
    pub fn spawn<S>(ws: WebSocketStream<S>, settings: &TransportSettings) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let id = next_connection_id();
        let (sink, stream) = ws.split();
        let (inbound_tx, inbound_rx) = mpsc::channel(1);
        let (outbound_tx, outbound_rx) = mpsc::channel(settings.outbound_buffer.max(1));
        let closed = Arc::new(AtomicBool::new(false));
        let reader_done = Arc::new(Notify::new());

        let reader = tokio::spawn(read_pump(
            id,
            stream,
            inbound_tx,
            settings.read_wait(),
            reader_done.clone(),
        ));
        tokio::spawn(write_pump(
            id,
            sink,
            outbound_rx,
            *settings,
            reader_done,
            closed.clone(),
        ));

        Self {
            id,
            inbound: Mutex::new(inbound_rx),
            outbound: outbound_tx,
            closed,
            reader_task: reader.abort_handle(),
            write_wait: settings.write_wait(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

async fn read_pump<S>(
    id: ConnectionId,
    mut stream: SplitStream<WebSocketStream<S>>,
    inbound: mpsc::Sender<Inbound>,
    read_wait: Duration,
    reader_done: Arc<Notify>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut deadline = Instant::now() + read_wait;

    loop {
        let frame = match timeout_at(deadline, stream.next()).await {
            Err(_) => {
                debug!("Connection {} missed its read deadline", id);
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!("Connection {} read failed: {}", id, e);
                let _ = inbound.send(Err(e.into())).await;
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };
        deadline = Instant::now() + read_wait;

        let line = match frame {
            Message::Text(text) => text.as_str().to_owned(),
            Message::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Message::Close(_) => {
                debug!("Connection {} sent a close frame", id);
                break;
            }
            // Pongs only refresh the deadline; pings are answered by tungstenite.
            _ => continue,
        };

        trace!("⬅️ [{}] {} byte frame", id, line.len());
        if inbound.send(Ok(line)).await.is_err() {
            break;
        }
    }

    reader_done.notify_one();
}

async fn write_pump<S>(
    id: ConnectionId,
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut outbound: mpsc::Receiver<Outbound>,
    settings: TransportSettings,
    reader_done: Arc<Notify>,
    closed: Arc<AtomicBool>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let write_wait = settings.write_wait();
    let period = settings.ping_period();
    let mut ping = tokio::time::interval_at(Instant::now() + period, period);

    loop {
        let frame = tokio::select! {
            next = outbound.recv() => match next {
                Some(Outbound::Line(line)) => Message::Text(line.into()),
                Some(Outbound::Close) | None => break,
            },
            _ = ping.tick() => Message::Ping(Vec::new().into()),
            _ = reader_done.notified() => break,
        };

        match timeout(write_wait, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!("Connection {} write failed: {}", id, e);
                break;
            }
            Err(_) => {
                debug!("Connection {} write timed out after {:?}", id, write_wait);
                break;
            }
        }
    }

    closed.store(true, Ordering::Release);
    // Sends the close frame, then closes the socket.
    let _ = timeout(write_wait, sink.close()).await;
    debug!("Connection {} websocket closed", id);
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn read_line(&self) -> Result<String, TransportError> {
        let mut inbound = self.inbound.lock().await;
        match inbound.recv().await {
            Some(line) => line,
            None => Err(TransportError::Closed),
        }
    }

    async fn write_line(&self, line: &str) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        match timeout(self.write_wait, self.outbound.send(Outbound::Line(line.to_owned()))).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::WriteTimeout(self.write_wait)),
        }
    }

    async fn close(&self) {
        self.reader_task.abort();
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = timeout(self.write_wait, self.outbound.send(Outbound::Close)).await;
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}
