//! Listeners, accept loops and per-connection handlers.

pub mod core;
pub mod handlers;

pub use core::{GatewayServer, Listeners};
pub use handlers::{handle_socket_connection, handle_websocket_connection};
