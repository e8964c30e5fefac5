/// Statistics tracking for the local bus
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time snapshot of bus activity counters
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStats {
    /// Messages accepted for publishing (requests included)
    pub messages_published: u64,
    /// Individual deliveries queued to subscriptions
    pub messages_delivered: u64,
    /// Requests issued through `request`
    pub requests_sent: u64,
    /// Requests that hit their deadline without a reply
    pub requests_timed_out: u64,
    /// Subscriptions currently registered, reply inboxes included
    pub active_subscriptions: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub messages_published: AtomicU64,
    pub messages_delivered: AtomicU64,
    pub requests_sent: AtomicU64,
    pub requests_timed_out: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub fn snapshot(&self, active_subscriptions: usize) -> BusStats {
        BusStats {
            messages_published: self.messages_published.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            requests_timed_out: self.requests_timed_out.load(Ordering::Relaxed),
            active_subscriptions,
        }
    }
}
