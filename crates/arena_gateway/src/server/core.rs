//! Core gateway server implementation.
//!
//! The `GatewayServer` owns the listeners and the accept loops. Every accepted
//! connection is handed to its own task; the only thing connections share is
//! the message bus.

use crate::config::GatewayConfig;
use crate::connection::ConnectionRegistry;
use crate::error::GatewayError;
use crate::server::handlers::{handle_socket_connection, handle_websocket_connection};
use crate::transport::TransportKind;
use arena_bus::MessageBus;
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Listeners bound by [`GatewayServer::bind`], ready to be served.
#[derive(Debug)]
pub struct Listeners {
    socket: Option<TcpListener>,
    websocket: Option<TcpListener>,
}

impl Listeners {
    /// Actual address of the socket listener (useful with port 0).
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn websocket_addr(&self) -> Option<SocketAddr> {
        self.websocket.as_ref().and_then(|l| l.local_addr().ok())
    }
}

/// The bot gateway server.
///
/// Accepts bots over a line-delimited TCP socket and over WebSockets and runs
/// one [`BotSession`](crate::connection::BotSession) per connection against
/// the shared bus.
pub struct GatewayServer {
    /// Gateway configuration settings
    config: GatewayConfig,

    /// Bus used by every session
    bus: Arc<dyn MessageBus>,

    /// Live connections
    registry: Arc<ConnectionRegistry>,

    /// Channel for coordinating server shutdown
    shutdown_sender: broadcast::Sender<()>,

    /// Set once shutdown was requested, for loops that start late
    shutdown_requested: AtomicBool,
}

impl GatewayServer {
    /// Creates a new gateway server.
    ///
    /// # Arguments
    ///
    /// * `config` - Listener addresses, timeouts and buffer sizes
    /// * `bus` - The bus connecting sessions to the backend
    pub fn new(config: GatewayConfig, bus: Arc<dyn MessageBus>) -> Self {
        let (shutdown_sender, _) = broadcast::channel(1);
        Self {
            config,
            bus,
            registry: Arc::new(ConnectionRegistry::new()),
            shutdown_sender,
            shutdown_requested: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn bus(&self) -> Arc<dyn MessageBus> {
        self.bus.clone()
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        self.registry.clone()
    }

    /// Binds every configured listener.
    ///
    /// # Returns
    ///
    /// The bound listeners, or `GatewayError::Network` naming the address
    /// that could not be bound. A configuration without any listener is an
    /// `GatewayError::Internal`.
    pub async fn bind(&self) -> Result<Listeners, GatewayError> {
        if self.config.socket_address.is_none() && self.config.websocket_address.is_none() {
            return Err(GatewayError::Internal("no listener configured".to_string()));
        }

        let socket = match self.config.socket_address {
            Some(addr) => Some(bind_listener(addr, TransportKind::Socket).await?),
            None => None,
        };
        let websocket = match self.config.websocket_address {
            Some(addr) => Some(bind_listener(addr, TransportKind::WebSocket).await?),
            None => None,
        };

        Ok(Listeners { socket, websocket })
    }

    /// Binds the listeners and serves until [`shutdown`](Self::shutdown) is
    /// called. Failed accepts are logged and retried.
    pub async fn start(&self) -> Result<(), GatewayError> {
        let listeners = self.bind().await?;
        self.serve(listeners).await
    }

    /// Like [`start`](Self::start), additionally stopping when `shutdown`
    /// completes.
    pub async fn start_with_shutdown<F>(&self, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()>,
    {
        let listeners = self.bind().await?;
        tokio::select! {
            result = self.serve(listeners) => result,
            _ = shutdown => {
                info!("🛑 Shutdown requested, accept loops stopping");
                Ok(())
            }
        }
    }

    /// Runs the accept loops on already bound listeners.
    pub async fn serve(&self, listeners: Listeners) -> Result<(), GatewayError> {
        let mut shutdown_receiver = self.shutdown_sender.subscribe();
        if self.shutdown_requested.load(Ordering::Acquire) {
            return Ok(());
        }

        let mut accept_futures = [
            (listeners.socket, TransportKind::Socket),
            (listeners.websocket, TransportKind::WebSocket),
        ]
        .into_iter()
        .filter_map(|(listener, kind)| listener.map(|l| (l, kind)))
        .map(|(listener, kind)| {
            accept_loop(
                listener,
                kind,
                self.bus.clone(),
                self.registry.clone(),
                self.config.clone(),
            )
        })
        .collect::<FuturesUnordered<_>>();

        if accept_futures.is_empty() {
            return Err(GatewayError::Internal("no listener bound".to_string()));
        }

        tokio::select! {
            _ = accept_futures.next() => {
                Err(GatewayError::Network("accept loop stopped".to_string()))
            }
            _ = shutdown_receiver.recv() => {
                info!("Internal shutdown signal received");
                Ok(())
            }
        }
    }

    /// Stops the accept loops. Live sessions keep running until their
    /// transports close.
    pub fn shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::Release);
        let _ = self.shutdown_sender.send(());
    }
}

async fn bind_listener(addr: SocketAddr, kind: TransportKind) -> Result<TcpListener, GatewayError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| GatewayError::Network(format!("failed to bind {kind} listener on {addr}: {e}")))?;
    let local = listener.local_addr().unwrap_or(addr);
    info!("🚀 {} listener on {}", kind, local);
    Ok(listener)
}

/// Retries `accept` until it yields a connection, pausing after each error.
async fn accept_with_backoff<F, Fut, T>(mut accept: F, kind: TransportKind) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    loop {
        match accept().await {
            Ok(accepted) => return accepted,
            Err(e) => {
                error!("Failed to accept {} connection: {}", kind, e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    kind: TransportKind,
    bus: Arc<dyn MessageBus>,
    registry: Arc<ConnectionRegistry>,
    config: GatewayConfig,
) {
    let config = Arc::new(config);
    loop {
        let (stream, addr) = accept_with_backoff(|| listener.accept(), kind).await;

        let bus = bus.clone();
        let registry = registry.clone();
        let config = config.clone();

        // Spawn individual connection handler
        tokio::spawn(async move {
            let result = match kind {
                TransportKind::Socket => {
                    handle_socket_connection(stream, addr, bus, registry, &config).await
                }
                TransportKind::WebSocket => {
                    handle_websocket_connection(stream, addr, bus, registry, &config).await
                }
            };
            match result {
                Ok(summary) => debug!(
                    "Connection {} finished in state {}",
                    summary.connection_id, summary.final_state
                ),
                Err(e) => warn!("Connection from {} failed: {}", addr, e),
            }
        });
    }
}
