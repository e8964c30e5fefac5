//! # Arena Gateway
//!
//! The front door of the Arena game platform for bots. Bots connect over a
//! line-delimited TCP socket or a WebSocket, speak a small JSON protocol, and
//! the gateway relays everything to the game backend over a message bus.
//!
//! ## Protocol
//!
//! Every connection walks through the same states:
//!
//! 1. **Unregistered** - the bot sends `{"type":"registerAi","teamId":..}`; the
//!    gateway requests `registerAI` and, on success, replies with the bot id
//!    assigned by the backend.
//! 2. **Registered** - the bot sends `{"gameId":..}`; the gateway requests
//!    `<gameId>.join`.
//! 3. **Joined** - every `{"direction":{"x":..,"y":..}}` is requested on
//!    `<gameId>.action`.
//!
//! Each client line gets exactly one `{"type":"reply",...}` answer. Backend
//! pushes published on `<botId>.gameState` and `<botId>.joinRequest` are
//! forwarded to the bot verbatim; a `gameEnd` push closes the connection.
//! When a registered bot leaves, `unregisterAI` is published.
//!
//! ## Components
//!
//! * [`transport`] - socket and WebSocket transports behind one trait
//! * [`connection`] - the per-connection state machine and live registry
//! * [`messaging`] - wire messages and bus subjects
//! * [`server`] - listeners and accept loops
//!
//! ## Error Handling
//!
//! [`GatewayError`] covers start-up failures. Rejected client lines never end
//! a connection; the [`ProtocolError`] text is sent back in an error reply.

pub use config::{GatewayConfig, SessionSettings, TransportSettings};
pub use connection::{BotSession, ConnectionRegistry, ConnectionState, SessionSummary};
pub use error::{GatewayError, ProtocolError};
pub use server::{GatewayServer, Listeners};
pub use transport::{Transport, TransportError, TransportKind};
pub use utils::{create_server, create_server_with_config};

pub mod config;
pub mod connection;
pub mod error;
pub mod messaging;
pub mod server;
pub mod transport;
pub mod utils;
