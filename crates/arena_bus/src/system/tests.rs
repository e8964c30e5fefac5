//! Tests for the local bus

#[cfg(test)]
mod tests {
    use crate::{handler_fn, BusError, BusMessage, LocalBus, MessageBus};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Subscribes a handler that forwards every message into a channel.
    async fn collect(bus: &LocalBus, pattern: &str) -> mpsc::UnboundedReceiver<BusMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        bus.subscribe(
            pattern,
            handler_fn(move |msg| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(msg);
                }
            }),
        )
        .await
        .expect("subscribe should succeed");
        rx
    }

    /// Answers every request on `subject` with a fixed payload.
    async fn responder(bus: &Arc<LocalBus>, subject: &str, answer: &'static [u8]) {
        let replier = bus.clone();
        bus.subscribe(
            subject,
            handler_fn(move |msg: BusMessage| {
                let replier = replier.clone();
                async move {
                    if let Some(reply_to) = msg.reply_to {
                        replier
                            .publish(&reply_to, answer.to_vec())
                            .await
                            .expect("reply publish");
                    }
                }
            }),
        )
        .await
        .expect("responder subscribe");
    }

    #[tokio::test]
    async fn test_publish_reaches_matching_subscriptions_only() {
        let bus = LocalBus::new();
        let mut exact = collect(&bus, "bot-1.gameState").await;
        let mut wildcard = collect(&bus, "*.gameState").await;
        let mut other = collect(&bus, "bot-2.gameState").await;

        bus.publish("bot-1.gameState", b"{\"type\":\"gameState\"}".to_vec())
            .await
            .unwrap();

        let got = exact.recv().await.unwrap();
        assert_eq!(got.subject, "bot-1.gameState");
        assert_eq!(got.reply_to, None);
        assert_eq!(got.payload_str(), "{\"type\":\"gameState\"}");
        assert_eq!(wildcard.recv().await.unwrap().subject, "bot-1.gameState");

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_delivery_order_is_preserved_per_subscription() {
        let bus = LocalBus::new();
        let mut rx = collect(&bus, "bot-1.gameState").await;

        for i in 0..100u32 {
            bus.publish("bot-1.gameState", i.to_string().into_bytes())
                .await
                .unwrap();
        }

        for i in 0..100u32 {
            let msg = rx.recv().await.unwrap();
            assert_eq!(msg.payload, i.to_string().into_bytes());
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_request_reply() {
        let bus = Arc::new(LocalBus::new());
        responder(&bus, "registerAI", br#"{"status":"ok","id":"bot-42"}"#).await;

        let reply = bus
            .request("registerAI", b"{}".to_vec(), Duration::from_secs(2))
            .await
            .expect("request should be answered");
        assert_eq!(reply, br#"{"status":"ok","id":"bot-42"}"#.to_vec());

        let stats = bus.stats();
        assert_eq!(stats.requests_sent, 1);
        assert_eq!(stats.requests_timed_out, 0);
        // Only the responder remains; the reply inbox is removed.
        assert_eq!(stats.active_subscriptions, 1);
    }

    #[tokio::test]
    async fn test_request_without_responders() {
        let bus = LocalBus::new();
        let err = bus
            .request("registerAI", b"{}".to_vec(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, BusError::NoResponders("registerAI".to_string()));
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let bus = LocalBus::new();
        // Subscribed but never answers.
        let _silent = collect(&bus, "G1.join").await;

        let err = bus
            .request("G1.join", b"{}".to_vec(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(bus.stats().requests_timed_out, 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let bus = LocalBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = bus
            .subscribe(
                "bot-1.joinRequest",
                handler_fn(move |msg| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(msg);
                    }
                }),
            )
            .await
            .unwrap();

        bus.unsubscribe(id).await.unwrap();
        bus.publish("bot-1.joinRequest", b"{}".to_vec()).await.unwrap();

        // The handler (and its sender) is dropped together with the dispatcher.
        assert!(rx.recv().await.is_none());
        assert_eq!(
            bus.unsubscribe(id).await.unwrap_err(),
            BusError::UnknownSubscription(id.0)
        );
    }

    #[tokio::test]
    async fn test_invalid_subjects_are_rejected() {
        let bus = LocalBus::new();
        assert!(matches!(
            bus.publish("log.*", b"x".to_vec()).await,
            Err(BusError::InvalidSubject { .. })
        ));
        assert!(matches!(
            bus.request("G1..join", b"x".to_vec(), Duration::from_millis(10))
                .await,
            Err(BusError::InvalidSubject { .. })
        ));
        assert!(matches!(
            bus.subscribe("log.>.x", handler_fn(|_msg| async {})).await,
            Err(BusError::InvalidSubject { .. })
        ));
    }

    #[tokio::test]
    async fn test_closed_bus_rejects_everything() {
        let bus = LocalBus::new();
        let mut rx = collect(&bus, "ping").await;
        bus.close();
        bus.close();

        assert!(bus.is_closed());
        assert_eq!(bus.subscription_count(), 0);
        assert!(rx.recv().await.is_none());
        assert_eq!(
            bus.publish("unregisterAI", b"{}".to_vec()).await,
            Err(BusError::Closed)
        );
        assert_eq!(
            bus.request("registerAI", b"{}".to_vec(), Duration::from_millis(10))
                .await,
            Err(BusError::Closed)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_requests_get_their_own_replies() {
        let bus = Arc::new(LocalBus::new());
        let echo = bus.clone();
        bus.subscribe(
            "echo",
            handler_fn(move |msg: BusMessage| {
                let echo = echo.clone();
                async move {
                    if let Some(reply_to) = msg.reply_to {
                        let _ = echo.publish(&reply_to, msg.payload).await;
                    }
                }
            }),
        )
        .await
        .unwrap();

        let mut tasks = Vec::new();
        for i in 0..32u32 {
            let bus = bus.clone();
            tasks.push(tokio::spawn(async move {
                let payload = format!("req-{i}").into_bytes();
                let reply = bus
                    .request("echo", payload.clone(), Duration::from_secs(2))
                    .await
                    .unwrap();
                assert_eq!(reply, payload);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
    }
}
