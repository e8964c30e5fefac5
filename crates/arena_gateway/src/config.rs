//! Gateway configuration types and defaults.
//!
//! Timeouts are stored as milliseconds so the structures map one-to-one onto
//! the application's TOML file; the accessors return [`Duration`]s.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration structure for the gateway.
///
/// Each listener is optional; a gateway with neither listener accepts nothing
/// but is still valid for embedding in tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Line-delimited TCP listener
    pub socket_address: Option<SocketAddr>,

    /// WebSocket listener
    pub websocket_address: Option<SocketAddr>,

    /// Per-connection protocol settings
    pub session: SessionSettings,

    /// Transport timing and buffering
    pub transport: TransportSettings,
}

/// Settings of the per-connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Timeout of every bus request made on behalf of a client
    pub request_timeout_ms: u64,
}

/// Settings shared by both transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportSettings {
    /// WebSocket read deadline; refreshed by every frame and pong
    pub read_wait_ms: u64,

    /// Upper bound for a single write (and for the WebSocket handshake)
    pub write_wait_ms: u64,

    /// Outbound frames queued per WebSocket connection
    pub outbound_buffer: usize,

    /// Longest accepted socket line, terminator excluded
    pub max_line_bytes: usize,
}

impl SessionSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl TransportSettings {
    pub fn read_wait(&self) -> Duration {
        Duration::from_millis(self.read_wait_ms)
    }

    pub fn write_wait(&self) -> Duration {
        Duration::from_millis(self.write_wait_ms)
    }

    /// Ping interval: 90% of the read deadline, so a healthy peer's pong
    /// always lands before the deadline.
    pub fn ping_period(&self) -> Duration {
        let millis = self.read_wait_ms.saturating_mul(9) / 10;
        Duration::from_millis(millis.max(1))
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            socket_address: Some(SocketAddr::from(([0, 0, 0, 0], 2000))),
            websocket_address: Some(SocketAddr::from(([0, 0, 0, 0], 2001))),
            session: SessionSettings::default(),
            transport: TransportSettings::default(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
        }
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            read_wait_ms: 10_000,
            write_wait_ms: 10_000,
            outbound_buffer: 64,
            max_line_bytes: 64 * 1024, // 64KB
        }
    }
}
