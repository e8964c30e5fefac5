//! Connection handling logic for socket and WebSocket clients.
//!
//! Each accepted connection gets its own transport and [`BotSession`]; the
//! handler registers it, runs the session to completion and deregisters it.

use crate::config::GatewayConfig;
use crate::connection::{BotSession, ConnectionRegistry, SessionSummary};
use crate::error::GatewayError;
use crate::transport::{SocketTransport, Transport, WebSocketTransport};
use arena_bus::MessageBus;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::accept_async;
use tracing::{debug, trace};

/// Handles a line-delimited TCP client from accept to teardown.
pub async fn handle_socket_connection(
    stream: TcpStream,
    addr: SocketAddr,
    bus: Arc<dyn MessageBus>,
    registry: Arc<ConnectionRegistry>,
    config: &GatewayConfig,
) -> Result<SessionSummary, GatewayError> {
    if let Err(e) = stream.set_nodelay(true) {
        trace!("Could not disable Nagle for {}: {}", addr, e);
    }
    let transport = Arc::new(SocketTransport::spawn(stream, &config.transport));
    Ok(run_session(transport, addr, bus, registry, config).await)
}

/// Handles a WebSocket client from accept to teardown.
///
/// # Arguments
///
/// * `stream` - The TCP stream for the client connection
/// * `addr` - The remote address of the client
/// * `bus` - Bus used for every backend interaction of the session
/// * `registry` - Live connection registry
/// * `config` - Gateway configuration; the handshake is bounded by the write wait
///
/// # Returns
///
/// The session summary, or a `GatewayError` if the handshake failed.
pub async fn handle_websocket_connection(
    stream: TcpStream,
    addr: SocketAddr,
    bus: Arc<dyn MessageBus>,
    registry: Arc<ConnectionRegistry>,
    config: &GatewayConfig,
) -> Result<SessionSummary, GatewayError> {
    let write_wait = config.transport.write_wait();
    let ws_stream = match tokio::time::timeout(write_wait, accept_async(stream)).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            return Err(GatewayError::Network(format!(
                "WebSocket handshake with {addr} failed: {e}"
            )))
        }
        Err(_) => {
            return Err(GatewayError::Network(format!(
                "WebSocket handshake with {addr} timed out after {write_wait:?}"
            )))
        }
    };

    let transport = Arc::new(WebSocketTransport::spawn(ws_stream, &config.transport));
    Ok(run_session(transport, addr, bus, registry, config).await)
}

async fn run_session(
    transport: Arc<dyn Transport>,
    addr: SocketAddr,
    bus: Arc<dyn MessageBus>,
    registry: Arc<ConnectionRegistry>,
    config: &GatewayConfig,
) -> SessionSummary {
    registry.add(transport.id(), addr, transport.kind()).await;

    let summary = BotSession::new(transport, bus, config.session).run().await;

    registry.remove(summary.connection_id).await;
    debug!("Session summary: {:?}", summary);
    summary
}
