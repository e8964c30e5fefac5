//! Connection lifecycle: states, the per-connection session and the registry
//! of live connections.

pub mod registry;
pub mod session;
pub mod state;

pub use registry::{ConnectionInfo, ConnectionRegistry};
pub use session::{BotSession, SessionSummary};
pub use state::{ConnectionState, Phase};
