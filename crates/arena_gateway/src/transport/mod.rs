//! Line-oriented transports over TCP sockets and WebSockets.
//!
//! The connection state machine only ever sees a [`Transport`]: something it
//! can read whole lines from, write whole lines to, and close. Both
//! implementations run their own pump tasks so the state machine and the bus
//! callbacks can write concurrently.

pub mod socket;
pub mod websocket;

pub use socket::SocketTransport;
pub use websocket::WebSocketTransport;

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Type alias for connection identifiers.
///
/// Connection IDs uniquely identify a transport, and the session running on
/// it, for the lifetime of the process.
pub type ConnectionId = usize;

static NEXT_CONNECTION_ID: AtomicUsize = AtomicUsize::new(1);

/// Allocates a process-wide unique connection ID.
pub fn next_connection_id() -> ConnectionId {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Which wire a transport speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Socket,
    WebSocket,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Socket => "socket",
            TransportKind::WebSocket => "websocket",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer went away or the transport was closed locally
    #[error("transport closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("write did not complete within {0:?}")]
    WriteTimeout(std::time::Duration),

    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),
}

/// A bidirectional, line-oriented, text connection.
///
/// `write_line` may be called from several tasks at once; implementations
/// serialize whole lines so two writers never interleave. `read_line` has a
/// single caller, the connection's receive loop.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Waits for the next complete line, without its terminator.
    async fn read_line(&self) -> Result<String, TransportError>;

    /// Writes one line; the terminator or framing is added by the transport.
    async fn write_line(&self, line: &str) -> Result<(), TransportError>;

    /// Closes the transport. Calling it again has no effect.
    async fn close(&self);

    fn id(&self) -> ConnectionId;

    fn kind(&self) -> TransportKind;
}
