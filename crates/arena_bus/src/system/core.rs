/// Core LocalBus implementation
use super::stats::{BusStats, Counters};
use crate::error::BusError;
use crate::message::{handler_fn, BusMessage, MessageHandler, SubscriptionId};
use crate::subject;
use crate::traits::MessageBus;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Prefix of the private subjects replies are routed to.
const INBOX_PREFIX: &str = "_INBOX";

struct Subscription {
    pattern: String,
    queue: mpsc::UnboundedSender<BusMessage>,
}

/// An in-process message bus.
///
/// Every subscription owns an unbounded queue drained by a dedicated
/// dispatcher task, so messages reach a given subscription in publish order
/// and handlers run on bus-owned tasks rather than on the publisher's task.
///
/// Uses DashMap for concurrent subscription bookkeeping so publishers on many
/// connections never contend on a single lock.
pub struct LocalBus {
    subscriptions: DashMap<SubscriptionId, Subscription>,
    next_id: AtomicU64,
    closed: AtomicBool,
    counters: Counters,
}

impl std::fmt::Debug for LocalBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBus")
            .field("subscriptions", &self.subscriptions.len())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl LocalBus {
    /// Creates an empty, open bus.
    pub fn new() -> Self {
        Self {
            subscriptions: DashMap::new(),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    /// Closes the bus. Every subscription is dropped and later operations
    /// fail with [`BusError::Closed`]. Closing twice is a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let dropped = self.subscriptions.len();
        self.subscriptions.clear();
        debug!("🔌 Local bus closed, {} subscription(s) dropped", dropped);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of live subscriptions, reply inboxes included.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Gets the current bus statistics
    pub fn stats(&self) -> BusStats {
        self.counters.snapshot(self.subscriptions.len())
    }

    fn ensure_open(&self) -> Result<(), BusError> {
        if self.is_closed() {
            Err(BusError::Closed)
        } else {
            Ok(())
        }
    }

    /// Queues a message to every matching subscription and returns how many
    /// subscriptions received it.
    fn deliver(
        &self,
        subject: &str,
        reply_to: Option<String>,
        payload: Vec<u8>,
    ) -> Result<usize, BusError> {
        subject::validate_literal(subject)?;
        self.ensure_open()?;
        Counters::bump(&self.counters.messages_published, 1);

        let mut delivered = 0usize;
        for entry in self.subscriptions.iter() {
            if !subject::matches(&entry.pattern, subject) {
                continue;
            }
            let message = BusMessage::new(subject, reply_to.clone(), payload.clone());
            if entry.queue.send(message).is_ok() {
                delivered += 1;
            } else {
                trace!("Subscription {} dispatcher is gone", entry.key());
            }
        }

        Counters::bump(&self.counters.messages_delivered, delivered as u64);
        trace!("📨 '{}' delivered to {} subscription(s)", subject, delivered);
        Ok(delivered)
    }

    fn register(&self, pattern: &str, handler: MessageHandler) -> Result<SubscriptionId, BusError> {
        subject::validate_pattern(pattern)?;
        self.ensure_open()?;

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (queue, mut receiver) = mpsc::unbounded_channel::<BusMessage>();

        self.subscriptions.insert(
            id,
            Subscription {
                pattern: pattern.to_string(),
                queue,
            },
        );

        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                handler(message).await;
            }
            trace!("Dispatcher for {} stopped", id);
        });

        trace!("📝 {} registered for '{}'", id, pattern);
        Ok(id)
    }

    fn remove(&self, id: SubscriptionId) -> Result<(), BusError> {
        self.ensure_open()?;
        match self.subscriptions.remove(&id) {
            Some(_) => Ok(()),
            None => Err(BusError::UnknownSubscription(id.0)),
        }
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for LocalBus {
    async fn request(
        &self,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, BusError> {
        subject::validate_literal(subject)?;
        self.ensure_open()?;

        let inbox = format!("{INBOX_PREFIX}.{}", Uuid::new_v4().simple());
        let (reply_sender, reply_receiver) = oneshot::channel::<Vec<u8>>();
        let slot = Arc::new(Mutex::new(Some(reply_sender)));

        let inbox_id = self.register(
            &inbox,
            handler_fn(move |message: BusMessage| {
                let slot = slot.clone();
                async move {
                    let sender = slot.lock().ok().and_then(|mut slot| slot.take());
                    if let Some(sender) = sender {
                        let _ = sender.send(message.payload);
                    }
                }
            }),
        )?;

        Counters::bump(&self.counters.requests_sent, 1);

        let outcome = match self.deliver(subject, Some(inbox), payload) {
            Ok(0) => Err(BusError::NoResponders(subject.to_string())),
            Err(e) => Err(e),
            Ok(_) => match tokio::time::timeout(timeout, reply_receiver).await {
                Ok(Ok(reply)) => Ok(reply),
                Ok(Err(_)) => Err(BusError::Closed),
                Err(_) => {
                    Counters::bump(&self.counters.requests_timed_out, 1);
                    warn!("⏰ Request to '{}' timed out after {:?}", subject, timeout);
                    Err(BusError::Timeout {
                        subject: subject.to_string(),
                        timeout,
                    })
                }
            },
        };

        // The inbox is gone already when the bus was closed mid-request.
        let _ = self.remove(inbox_id);
        outcome
    }

    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError> {
        self.deliver(subject, None, payload).map(|_| ())
    }

    async fn publish_with_reply(
        &self,
        subject: &str,
        reply_to: &str,
        payload: Vec<u8>,
    ) -> Result<(), BusError> {
        subject::validate_literal(reply_to)?;
        self.deliver(subject, Some(reply_to.to_string()), payload)
            .map(|_| ())
    }

    async fn subscribe(
        &self,
        pattern: &str,
        handler: MessageHandler,
    ) -> Result<SubscriptionId, BusError> {
        self.register(pattern, handler)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), BusError> {
        self.remove(id)
    }

    fn stats(&self) -> BusStats {
        LocalBus::stats(self)
    }

    async fn shutdown(&self) {
        self.close();
    }
}
