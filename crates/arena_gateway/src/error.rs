//! Error types and handling for the gateway.
//!
//! Server start-up failures are reported through [`GatewayError`]. Problems
//! with a single client line never end the connection; they are described by a
//! [`ProtocolError`] whose text is written back in an error reply.

use arena_bus::BusError;

/// Enumeration of possible server errors.
///
/// Categorizes errors into network-related and internal server errors
/// to help with debugging and error handling.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Binding failures or accept loop failures
    #[error("Network error: {0}")]
    Network(String),

    /// Misconfiguration or bus failures during start-up
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Reasons a client line is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("unexpected message type '{found}' (expected '{expected}')")]
    UnexpectedType {
        expected: &'static str,
        found: String,
    },

    #[error("field '{0}' must not be empty")]
    EmptyField(&'static str),

    #[error("invalid game id '{0}'")]
    InvalidGameId(String),

    #[error("backend unavailable: {0}")]
    Backend(#[from] BusError),

    #[error("invalid backend reply: {0}")]
    BadBackendReply(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("connection is closed")]
    Closed,
}
