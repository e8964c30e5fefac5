//! The bus contract consumed by the gateway.

use crate::error::BusError;
use crate::message::{MessageHandler, SubscriptionId};
use crate::system::BusStats;
use async_trait::async_trait;
use std::time::Duration;

/// A subject-addressed message bus offering request/reply and
/// publish/subscribe.
///
/// Implementations must be safe for concurrent use from many connections at
/// once; the gateway shares a single `Arc<dyn MessageBus>` across every
/// connection and never serialises access to it.
#[async_trait]
pub trait MessageBus: Send + Sync + 'static {
    /// Sends `payload` to `subject` and waits for the first reply.
    ///
    /// Fails with [`BusError::Timeout`] when nothing answers within `timeout`
    /// and with [`BusError::NoResponders`] when nobody listens on the subject.
    async fn request(
        &self,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, BusError>;

    /// Fire-and-forget publish.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Publishes with a reply subject the receiver may answer on.
    async fn publish_with_reply(
        &self,
        subject: &str,
        reply_to: &str,
        payload: Vec<u8>,
    ) -> Result<(), BusError>;

    /// Registers `handler` for every message whose subject matches `pattern`.
    async fn subscribe(
        &self,
        pattern: &str,
        handler: MessageHandler,
    ) -> Result<SubscriptionId, BusError>;

    /// Removes a subscription. Messages already queued for it are dropped.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), BusError>;

    /// Snapshot of the bus activity counters.
    fn stats(&self) -> BusStats;

    /// Drops every subscription and refuses further operations. Pending
    /// outgoing messages are flushed first where the bus buffers them.
    async fn shutdown(&self);
}
