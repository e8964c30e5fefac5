//! Newline-delimited transport over any byte stream.

use super::{next_connection_id, ConnectionId, Transport, TransportError, TransportKind};
use crate::config::TransportSettings;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::{mpsc, Mutex};
use tokio::task::AbortHandle;
use tracing::{debug, trace};

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type SharedWriter = Arc<Mutex<Option<BoxedWriter>>>;
type Inbound = Result<String, TransportError>;

/// Transport for the line-delimited TCP protocol.
///
/// A reader task pulls lines off the stream and hands them over one at a
/// time; writes go straight to the stream under a lock, so a reply and a
/// push never interleave within a line.
pub struct SocketTransport {
    id: ConnectionId,
    inbound: Mutex<mpsc::Receiver<Inbound>>,
    writer: SharedWriter,
    reader_task: AbortHandle,
    write_wait: Duration,
}

impl SocketTransport {
    /// Wraps `stream` and starts its reader task.
    ///
    /// # Arguments
    ///
    /// * `stream` - A connected TCP stream, or any in-memory stand-in
    /// * `settings` - Line limit and write deadline
    pub fn spawn<S>(stream: S, settings: &TransportSettings) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let id = next_connection_id();
        let (read_half, write_half) = tokio::io::split(stream);
        let writer: SharedWriter = Arc::new(Mutex::new(Some(Box::new(write_half))));

        // One line in flight is enough: the receive loop handles lines
        // strictly one after another.
        let (sender, receiver) = mpsc::channel(1);
        let reader = tokio::spawn(read_lines(
            id,
            BufReader::new(read_half),
            sender,
            writer.clone(),
            settings.max_line_bytes,
        ));

        Self {
            id,
            inbound: Mutex::new(receiver),
            writer,
            reader_task: reader.abort_handle(),
            write_wait: settings.write_wait(),
        }
    }
}

async fn read_lines<R>(
    id: ConnectionId,
    mut reader: BufReader<R>,
    inbound: mpsc::Sender<Inbound>,
    writer: SharedWriter,
    max_line_bytes: usize,
) where
    R: AsyncRead + Unpin,
{
    // Room for the line plus a "\r\n" terminator.
    let limit = max_line_bytes as u64 + 2;
    let mut buf = Vec::new();

    let failure = loop {
        buf.clear();
        let read = (&mut reader).take(limit).read_until(b'\n', &mut buf).await;
        match read {
            Ok(0) => break None,
            Ok(_) => {}
            Err(e) => break Some(TransportError::Io(e)),
        }

        let terminated = buf.last() == Some(&b'\n');
        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        if buf.len() > max_line_bytes || (!terminated && buf.len() as u64 == limit) {
            break Some(TransportError::LineTooLong(max_line_bytes));
        }

        let line = String::from_utf8_lossy(&buf).into_owned();
        trace!("⬅️ [{}] {} byte line", id, line.len());
        if inbound.send(Ok(line)).await.is_err() {
            // Transport dropped.
            return;
        }
    };

    match failure {
        Some(e) => {
            debug!("Connection {} read failed: {}", id, e);
            let _ = inbound.send(Err(e)).await;
        }
        None => debug!("Connection {} reached end of stream", id),
    }

    if let Some(mut half) = writer.lock().await.take() {
        let _ = half.shutdown().await;
    }
}

#[async_trait]
impl Transport for SocketTransport {
    async fn read_line(&self) -> Result<String, TransportError> {
        let mut inbound = self.inbound.lock().await;
        match inbound.recv().await {
            Some(line) => line,
            None => Err(TransportError::Closed),
        }
    }

    async fn write_line(&self, line: &str) -> Result<(), TransportError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::Closed)?;

        let write = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        };
        match tokio::time::timeout(self.write_wait, write).await {
            Ok(result) => result.map_err(TransportError::from),
            Err(_) => Err(TransportError::WriteTimeout(self.write_wait)),
        }
    }

    async fn close(&self) {
        self.reader_task.abort();
        let writer = self.writer.lock().await.take();
        if let Some(mut half) = writer {
            let _ = tokio::time::timeout(self.write_wait, half.shutdown()).await;
            debug!("Connection {} socket closed", self.id);
        }
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};

    fn settings(max_line_bytes: usize) -> TransportSettings {
        TransportSettings {
            write_wait_ms: 500,
            max_line_bytes,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_reads_lines_without_terminators() {
        let (client, server) = duplex(1024);
        let transport = SocketTransport::spawn(server, &settings(1024));
        let (_client_read, mut client_write) = tokio::io::split(client);

        client_write
            .write_all(b"{\"teamId\":\"T1\"}\r\n{\"gameId\":\"G1\"}\n\n")
            .await
            .unwrap();

        assert_eq!(transport.read_line().await.unwrap(), "{\"teamId\":\"T1\"}");
        assert_eq!(transport.read_line().await.unwrap(), "{\"gameId\":\"G1\"}");
        assert_eq!(transport.read_line().await.unwrap(), "");
        assert_eq!(transport.kind(), TransportKind::Socket);
    }

    #[tokio::test]
    async fn test_end_of_stream_is_closed() {
        let (client, server) = duplex(1024);
        let transport = SocketTransport::spawn(server, &settings(1024));
        drop(client);

        assert!(matches!(
            transport.read_line().await,
            Err(TransportError::Closed)
        ));
        // The reader shut the write half down on its way out.
        assert!(matches!(
            transport.write_line("late").await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_overlong_line_is_a_failure() {
        let (client, server) = duplex(4096);
        let transport = SocketTransport::spawn(server, &settings(8));
        let (_client_read, mut client_write) = tokio::io::split(client);

        client_write.write_all(b"12345678\nthis line is too long\n").await.unwrap();

        assert_eq!(transport.read_line().await.unwrap(), "12345678");
        assert!(matches!(
            transport.read_line().await,
            Err(TransportError::LineTooLong(8))
        ));
        assert!(matches!(
            transport.read_line().await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_writes_are_newline_terminated() {
        let (client, server) = duplex(1024);
        let transport = SocketTransport::spawn(server, &settings(1024));
        let mut lines = BufReader::new(client).lines();

        transport.write_line("{\"type\":\"reply\"}").await.unwrap();
        transport.write_line("{\"type\":\"gameState\"}").await.unwrap();

        assert_eq!(lines.next_line().await.unwrap().unwrap(), "{\"type\":\"reply\"}");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "{\"type\":\"gameState\"}");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_writers_never_interleave() {
        let (client, server) = duplex(64 * 1024);
        let transport = Arc::new(SocketTransport::spawn(server, &settings(1024)));
        let mut lines = BufReader::new(client).lines();

        let mut writers = Vec::new();
        for w in 0..4 {
            let transport = transport.clone();
            writers.push(tokio::spawn(async move {
                for i in 0..25 {
                    let line = format!("{{\"writer\":{w},\"seq\":{i},\"pad\":\"{}\"}}", "x".repeat(200));
                    transport.write_line(&line).await.unwrap();
                }
            }));
        }

        for _ in 0..100 {
            let line = lines.next_line().await.unwrap().unwrap();
            let value: serde_json::Value = serde_json::from_str(&line).expect("whole JSON line");
            assert!(value["writer"].is_number());
        }
        for writer in writers {
            writer.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (client, server) = duplex(1024);
        let transport = SocketTransport::spawn(server, &settings(1024));
        let mut lines = BufReader::new(client).lines();

        transport.close().await;
        transport.close().await;

        assert!(matches!(
            transport.write_line("x").await,
            Err(TransportError::Closed)
        ));
        assert!(matches!(
            transport.read_line().await,
            Err(TransportError::Closed)
        ));
        // Peer observes end of stream.
        assert!(lines.next_line().await.unwrap().is_none());
    }
}
