//! Registry of live connections.
//!
//! Connections share nothing with each other; the registry exists so the
//! server can report how many bots are attached and who they are, both in
//! the heartbeat and in the shutdown statistics.

use crate::transport::{ConnectionId, TransportKind};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;
use tracing::info;

/// Metadata recorded for each live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub remote_addr: SocketAddr,
    pub kind: TransportKind,
    pub connected_at: SystemTime,
}

/// Central registry of all live connections.
///
/// Uses `RwLock<HashMap>` for thread-safe storage; it is written twice per
/// connection and read by monitoring.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<ConnectionId, ConnectionInfo>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a freshly accepted connection.
    ///
    /// # Arguments
    ///
    /// * `id` - The transport's connection ID
    /// * `remote_addr` - The network address of the connecting client
    /// * `kind` - Which listener accepted it
    pub async fn add(&self, id: ConnectionId, remote_addr: SocketAddr, kind: TransportKind) {
        let info = ConnectionInfo {
            id,
            remote_addr,
            kind,
            connected_at: SystemTime::now(),
        };
        self.connections.write().await.insert(id, info);
        info!("🔗 Connection {} from {} ({})", id, remote_addr, kind);
    }

    /// Forgets a connection, returning its record if it was known.
    pub async fn remove(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        let removed = self.connections.write().await.remove(&id);
        if let Some(info) = &removed {
            let lifetime = info.connected_at.elapsed().unwrap_or_default();
            info!(
                "👋 Connection {} from {} left after {:.1}s",
                id,
                info.remote_addr,
                lifetime.as_secs_f64()
            );
        }
        removed
    }

    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Live connections per transport kind: `(socket, websocket)`.
    pub async fn count_by_kind(&self) -> (usize, usize) {
        let connections = self.connections.read().await;
        let sockets = connections
            .values()
            .filter(|c| c.kind == TransportKind::Socket)
            .count();
        (sockets, connections.len() - sockets)
    }

    /// Copy of every live connection, oldest first.
    pub async fn snapshot(&self) -> Vec<ConnectionInfo> {
        let mut all: Vec<_> = self.connections.read().await.values().cloned().collect();
        all.sort_by_key(|c| (c.connected_at, c.id));
        all
    }
}
