//! NATS-backed bus used when the gateway talks to a real backend.

use crate::error::BusError;
use crate::message::{BusMessage, MessageHandler, SubscriptionId};
use crate::subject;
use crate::system::{BusStats, Counters};
use crate::traits::MessageBus;
use async_nats::client::RequestErrorKind;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// A [`MessageBus`] over a NATS connection.
///
/// Each subscription is drained by its own task that awaits the handler
/// before taking the next message, so delivery order per subscription is
/// the order the server sends in.
pub struct NatsBus {
    client: async_nats::Client,
    subscriptions: DashMap<SubscriptionId, JoinHandle<()>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    counters: Counters,
}

impl std::fmt::Debug for NatsBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsBus")
            .field("subscriptions", &self.subscriptions.len())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl NatsBus {
    /// Connects to the NATS server at `url`, announcing `name` as the
    /// client connection name.
    ///
    /// # Returns
    ///
    /// The connected bus, or `BusError::Connection` when the server cannot
    /// be reached.
    pub async fn connect(url: &str, name: &str) -> Result<Self, BusError> {
        let client = async_nats::ConnectOptions::new()
            .name(name)
            .connect(url)
            .await
            .map_err(|e| BusError::Connection(format!("{url}: {e}")))?;
        info!("🔌 Connected to NATS at {}", url);
        Ok(Self::with_client(client))
    }

    /// Wraps an already connected client.
    pub fn with_client(client: async_nats::Client) -> Self {
        Self {
            client,
            subscriptions: DashMap::new(),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), BusError> {
        if self.is_closed() {
            Err(BusError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn request(
        &self,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, BusError> {
        subject::validate_literal(subject)?;
        self.ensure_open()?;
        Counters::bump(&self.counters.requests_sent, 1);
        Counters::bump(&self.counters.messages_published, 1);

        let request = async_nats::Request::new()
            .payload(payload.into())
            .timeout(Some(timeout));
        match self.client.send_request(subject.to_string(), request).await {
            Ok(reply) => Ok(reply.payload.to_vec()),
            Err(e) => match e.kind() {
                RequestErrorKind::TimedOut => {
                    Counters::bump(&self.counters.requests_timed_out, 1);
                    warn!("⏰ Request to '{}' timed out after {:?}", subject, timeout);
                    Err(BusError::Timeout {
                        subject: subject.to_string(),
                        timeout,
                    })
                }
                RequestErrorKind::NoResponders => Err(BusError::NoResponders(subject.to_string())),
                _ => Err(BusError::Connection(e.to_string())),
            },
        }
    }

    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError> {
        subject::validate_literal(subject)?;
        self.ensure_open()?;
        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        Counters::bump(&self.counters.messages_published, 1);
        Ok(())
    }

    async fn publish_with_reply(
        &self,
        subject: &str,
        reply_to: &str,
        payload: Vec<u8>,
    ) -> Result<(), BusError> {
        subject::validate_literal(subject)?;
        subject::validate_literal(reply_to)?;
        self.ensure_open()?;
        self.client
            .publish_with_reply(subject.to_string(), reply_to.to_string(), payload.into())
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        Counters::bump(&self.counters.messages_published, 1);
        Ok(())
    }

    async fn subscribe(
        &self,
        pattern: &str,
        handler: MessageHandler,
    ) -> Result<SubscriptionId, BusError> {
        subject::validate_pattern(pattern)?;
        self.ensure_open()?;

        let mut subscriber = self
            .client
            .subscribe(pattern.to_string())
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let dispatcher = tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                let message = BusMessage::new(
                    message.subject.to_string(),
                    message.reply.map(|reply| reply.to_string()),
                    message.payload.to_vec(),
                );
                handler(message).await;
            }
            trace!("NATS dispatcher for {} stopped", id);
        });
        self.subscriptions.insert(id, dispatcher);

        trace!("📝 {} subscribed to '{}'", id, pattern);
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), BusError> {
        self.ensure_open()?;
        match self.subscriptions.remove(&id) {
            // Dropping the subscriber inside the task unsubscribes on the server.
            Some((_, dispatcher)) => {
                dispatcher.abort();
                Ok(())
            }
            None => Err(BusError::UnknownSubscription(id.0)),
        }
    }

    fn stats(&self) -> BusStats {
        let mut stats = self.counters.snapshot(self.subscriptions.len());
        stats.messages_delivered = self.client.statistics().in_messages.load(Ordering::Relaxed);
        stats
    }

    async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let dropped = self.subscriptions.len();
        self.subscriptions.retain(|_, dispatcher| {
            dispatcher.abort();
            false
        });
        if let Err(e) = self.client.flush().await {
            warn!("Failed to flush NATS connection: {}", e);
        }
        debug!("🔌 NATS bus closed, {} subscription(s) dropped", dropped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler_fn;
    use tokio::sync::mpsc;

    /// Server used by the round-trip tests; they are skipped when unset.
    const NATS_URL_VAR: &str = "ARENA_TEST_NATS_URL";

    async fn connect_from_env() -> Option<NatsBus> {
        let url = std::env::var(NATS_URL_VAR).ok()?;
        Some(NatsBus::connect(&url, "arena-bus-tests").await.expect("NATS server"))
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let result = NatsBus::connect("nats://127.0.0.1:1", "arena-bus-tests").await;
        match result {
            Err(BusError::Connection(reason)) => assert!(reason.contains("127.0.0.1:1")),
            other => panic!("unexpected connect outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_request_reply_over_nats() {
        let Some(bus) = connect_from_env().await else {
            return;
        };
        let bus = std::sync::Arc::new(bus);
        let subject = format!("arena.test.{}", uuid::Uuid::new_v4().simple());

        let responder = bus.clone();
        bus.subscribe(
            &subject,
            handler_fn(move |msg: BusMessage| {
                let responder = responder.clone();
                async move {
                    if let Some(reply_to) = msg.reply_to {
                        let _ = responder.publish(&reply_to, msg.payload).await;
                    }
                }
            }),
        )
        .await
        .unwrap();

        let reply = bus
            .request(&subject, b"echo".to_vec(), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(reply, b"echo".to_vec());

        let missing = format!("{subject}.nobody");
        assert_eq!(
            bus.request(&missing, Vec::new(), Duration::from_millis(500)).await,
            Err(BusError::NoResponders(missing.clone()))
        );

        bus.shutdown().await;
        assert_eq!(
            bus.publish(&subject, Vec::new()).await,
            Err(BusError::Closed)
        );
    }

    #[tokio::test]
    async fn test_unsubscribe_over_nats() {
        let Some(bus) = connect_from_env().await else {
            return;
        };
        let subject = format!("arena.test.{}", uuid::Uuid::new_v4().simple());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let id = bus
            .subscribe(
                &subject,
                handler_fn(move |msg: BusMessage| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(msg.payload);
                    }
                }),
            )
            .await
            .unwrap();
        bus.publish(&subject, b"one".to_vec()).await.unwrap();
        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap();
        assert_eq!(first, Some(b"one".to_vec()));

        bus.unsubscribe(id).await.unwrap();
        assert_eq!(
            bus.unsubscribe(id).await,
            Err(BusError::UnknownSubscription(id.0))
        );
        assert_eq!(bus.stats().active_subscriptions, 0);
    }
}
