//! Factory functions for creating gateway instances.

use crate::{config::GatewayConfig, server::GatewayServer};
use arena_bus::MessageBus;
use std::sync::Arc;

/// Creates a gateway with default configuration on top of `bus`.
///
/// # Example
///
/// ```rust
/// use arena_bus::LocalBus;
/// use arena_gateway::create_server;
/// use std::sync::Arc;
///
/// let server = create_server(Arc::new(LocalBus::new()));
/// assert_eq!(server.config().socket_address.map(|a| a.port()), Some(2000));
/// ```
pub fn create_server(bus: Arc<dyn MessageBus>) -> GatewayServer {
    GatewayServer::new(GatewayConfig::default(), bus)
}

/// Creates a gateway with custom configuration.
///
/// # Example
///
/// ```rust
/// use arena_bus::LocalBus;
/// use arena_gateway::{create_server_with_config, GatewayConfig};
/// use std::sync::Arc;
///
/// let config = GatewayConfig {
///     websocket_address: None,
///     ..Default::default()
/// };
/// let server = create_server_with_config(config, Arc::new(LocalBus::new()));
/// assert!(server.config().websocket_address.is_none());
/// ```
pub fn create_server_with_config(config: GatewayConfig, bus: Arc<dyn MessageBus>) -> GatewayServer {
    GatewayServer::new(config, bus)
}
