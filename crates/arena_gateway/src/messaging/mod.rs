//! Wire messages exchanged with bots and with the backend.
//!
//! This module defines the JSON envelopes bots send and receive, the payloads
//! the gateway forwards onto the bus, and the subjects they travel on.

pub mod subjects;
pub mod types;

pub use types::{
    ActionRequest, BackendReply, JoinGame, PushKind, RegisterMessage, Reply, ReplyStatus,
};
