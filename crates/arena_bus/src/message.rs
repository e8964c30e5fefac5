//! Message and handler types shared by every bus implementation.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A message delivered to a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// The literal subject the message was published on
    pub subject: String,
    /// Subject the publisher expects an answer on, if any
    pub reply_to: Option<String>,
    /// Raw payload bytes (JSON for everything the gateway sends)
    pub payload: Vec<u8>,
}

impl BusMessage {
    pub fn new(subject: impl Into<String>, reply_to: Option<String>, payload: Vec<u8>) -> Self {
        Self {
            subject: subject.into(),
            reply_to,
            payload,
        }
    }

    /// Payload interpreted as UTF-8 text, replacing invalid sequences.
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Identifier handed out by `subscribe` and consumed by `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Callback invoked for every message matching a subscription.
///
/// Handlers run on tasks owned by the bus, never on the subscriber's task.
/// A single subscription's handler is never invoked concurrently with itself.
pub type MessageHandler = Arc<dyn Fn(BusMessage) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wraps an async closure into a [`MessageHandler`].
pub fn handler_fn<F, Fut>(f: F) -> MessageHandler
where
    F: Fn(BusMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |msg| Box::pin(f(msg)))
}
