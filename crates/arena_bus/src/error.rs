//! Error types for bus operations.

use std::time::Duration;

/// Errors returned by [`MessageBus`](crate::MessageBus) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// No reply arrived before the request deadline
    #[error("request to '{subject}' timed out after {timeout:?}")]
    Timeout { subject: String, timeout: Duration },

    /// A request was published but nobody is subscribed to the subject
    #[error("no responders available for '{0}'")]
    NoResponders(String),

    /// The subject or subscription pattern is not well formed
    #[error("invalid subject '{subject}': {reason}")]
    InvalidSubject { subject: String, reason: &'static str },

    /// The subscription id is not (or no longer) registered
    #[error("unknown subscription {0}")]
    UnknownSubscription(u64),

    /// The bus has been closed and accepts no further operations
    #[error("bus connection closed")]
    Closed,

    /// The connection to a remote bus server failed
    #[error("bus connection error: {0}")]
    Connection(String),
}

impl BusError {
    /// Returns true for failures caused by the remote side not answering in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, BusError::Timeout { .. })
    }
}
