//! Message fan-out to all live connections.

use std::sync::{Arc, Weak};

use metrics::counter;
use relay_core::{ConnectionId, HubError};
use tracing::{debug, warn};

use crate::registry::ConnectionRegistry;

/// Outcome of one delivery attempt within a fanout.
#[derive(Clone, Debug)]
pub struct Delivery {
    /// The target connection.
    pub connection_id: ConnectionId,
    /// Whether the handoff to the target's write task succeeded.
    pub delivered: bool,
}

/// Per-recipient record of one `publish` call.
///
/// An observability aid, not a guarantee: failed deliveries are not retried
/// and nothing is queued for later.
#[derive(Clone, Debug, Default)]
pub struct DeliveryReport {
    /// One entry per connection in the fanout snapshot.
    pub outcomes: Vec<Delivery>,
}

impl DeliveryReport {
    /// Number of successful handoffs.
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|d| d.delivered).count()
    }

    /// Number of failed handoffs.
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|d| !d.delivered).count()
    }

    /// Number of connections the fanout attempted.
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }
}

/// Fans each published message out to every connection in the registry.
///
/// Holds the registry weakly: the registry (via the hub) owns the
/// connections, and the bus only borrows a snapshot for the duration of one
/// fanout. Once the hub is torn down, `publish` fails whole with
/// [`HubError::RegistryUnavailable`] rather than reporting a partial result.
pub struct BroadcastBus {
    registry: Weak<ConnectionRegistry>,
}

impl BroadcastBus {
    /// Create a bus fanning out over the given registry.
    pub fn new(registry: &Arc<ConnectionRegistry>) -> Self {
        Self {
            registry: Arc::downgrade(registry),
        }
    }

    /// Deliver `payload` to every connection currently in the registry,
    /// including the sender (echo-to-self).
    ///
    /// Delivery is best-effort per recipient: a failed handoff (recipient
    /// channel full or closed) is counted and logged, never retried, and
    /// never aborts delivery to the remaining connections. Messages
    /// published in sequence by one sender reach any single recipient in
    /// publish order, because each recipient channel preserves enqueue
    /// order.
    pub async fn publish(
        &self,
        payload: Arc<String>,
        sender: &ConnectionId,
    ) -> Result<DeliveryReport, HubError> {
        let registry = self
            .registry
            .upgrade()
            .ok_or(HubError::RegistryUnavailable)?;
        let snapshot = registry.snapshot().await;

        counter!("broadcast_messages_total").increment(1);

        let mut report = DeliveryReport::default();
        for conn in &snapshot {
            let delivered = conn.send(Arc::clone(&payload));
            if delivered {
                counter!("broadcast_deliveries_total").increment(1);
            } else {
                counter!("broadcast_drops_total").increment(1);
                warn!(
                    conn_id = %conn.id,
                    sender = %sender,
                    total_drops = conn.drop_count(),
                    "failed to hand message to client (channel full or closed)"
                );
            }
            report.outcomes.push(Delivery {
                connection_id: conn.id.clone(),
                delivered,
            });
        }

        debug!(
            sender = %sender,
            recipients = report.attempted(),
            delivered = report.delivered(),
            failed = report.failed(),
            "broadcast message"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ClientConnection;
    use tokio::sync::mpsc;

    fn make_connection(id: &str) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(32);
        (
            Arc::new(ClientConnection::new(ConnectionId::from(id), tx)),
            rx,
        )
    }

    fn make_bus() -> (Arc<ConnectionRegistry>, BroadcastBus) {
        let registry = Arc::new(ConnectionRegistry::new());
        let bus = BroadcastBus::new(&registry);
        (registry, bus)
    }

    #[tokio::test]
    async fn broadcast_includes_sender() {
        let (registry, bus) = make_bus();
        let (a, mut rx_a) = make_connection("a");
        let (b, mut rx_b) = make_connection("b");
        registry.register(a.clone()).await.unwrap();
        registry.register(b).await.unwrap();

        let report = bus.publish(Arc::new("hello".into()), &a.id).await.unwrap();
        assert_eq!(report.delivered(), 2);
        assert_eq!(report.failed(), 0);

        // The sender gets its own message back
        assert_eq!(&*rx_a.try_recv().unwrap(), "hello");
        assert_eq!(&*rx_b.try_recv().unwrap(), "hello");
    }

    #[tokio::test]
    async fn each_recipient_receives_exactly_once() {
        let (registry, bus) = make_bus();
        let (a, mut rx_a) = make_connection("a");
        registry.register(a.clone()).await.unwrap();

        let _ = bus.publish(Arc::new("once".into()), &a.id).await.unwrap();
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnected_connection_not_attempted() {
        let (registry, bus) = make_bus();
        let (a, mut rx_a) = make_connection("a");
        let (b, _rx_b) = make_connection("b");
        registry.register(a.clone()).await.unwrap();
        registry.register(b.clone()).await.unwrap();
        registry.unregister(&b.id).await;

        let report = bus.publish(Arc::new("hi".into()), &a.id).await.unwrap();
        assert_eq!(report.attempted(), 1);
        assert_eq!(report.delivered(), 1);
        assert!(report.outcomes.iter().all(|d| d.connection_id == a.id));
        assert_eq!(&*rx_a.try_recv().unwrap(), "hi");
    }

    #[tokio::test]
    async fn per_sender_order_preserved() {
        let (registry, bus) = make_bus();
        let (a, mut rx_a) = make_connection("a");
        registry.register(a.clone()).await.unwrap();

        let _ = bus.publish(Arc::new("m1".into()), &a.id).await.unwrap();
        let _ = bus.publish(Arc::new("m2".into()), &a.id).await.unwrap();

        assert_eq!(&*rx_a.recv().await.unwrap(), "m1");
        assert_eq!(&*rx_a.recv().await.unwrap(), "m2");
    }

    #[tokio::test]
    async fn empty_registry_publishes_nothing() {
        let (_registry, bus) = make_bus();
        // Sender already gone by fanout time: empty snapshot, no error
        let report = bus
            .publish(Arc::new("ghost".into()), &ConnectionId::from("ghost"))
            .await
            .unwrap();
        assert_eq!(report.attempted(), 0);
        assert_eq!(report.delivered(), 0);
        assert_eq!(report.failed(), 0);
    }

    #[tokio::test]
    async fn one_failed_recipient_does_not_abort_fanout() {
        let (registry, bus) = make_bus();
        let (a, mut rx_a) = make_connection("a");
        // A recipient whose write task is gone
        let (dead_tx, dead_rx) = mpsc::channel(32);
        let dead = Arc::new(ClientConnection::new(ConnectionId::from("dead"), dead_tx));
        drop(dead_rx);
        registry.register(dead).await.unwrap();
        registry.register(a.clone()).await.unwrap();

        let report = bus.publish(Arc::new("hello".into()), &a.id).await.unwrap();
        assert_eq!(report.attempted(), 2);
        assert_eq!(report.delivered(), 1);
        assert_eq!(report.failed(), 1);
        // The healthy recipient still got the message
        assert_eq!(&*rx_a.try_recv().unwrap(), "hello");
    }

    #[tokio::test]
    async fn publish_after_registry_teardown_fails_whole() {
        let registry = Arc::new(ConnectionRegistry::new());
        let bus = BroadcastBus::new(&registry);
        drop(registry);

        let err = bus
            .publish(Arc::new("late".into()), &ConnectionId::from("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::RegistryUnavailable));
    }

    #[tokio::test]
    async fn concurrent_register_never_double_delivers() {
        let (registry, bus) = make_bus();
        let (a, _rx_a) = make_connection("a");
        registry.register(a.clone()).await.unwrap();

        // Race a registration against a burst of publishes. The newcomer may
        // catch any suffix of the burst, but never the same message twice.
        let (x, mut rx_x) = make_connection("x");
        let reg = registry.clone();
        let x2 = x.clone();
        let register = tokio::spawn(async move { reg.register(x2).await });

        for i in 0..100 {
            let report = bus
                .publish(Arc::new(format!("m{i}")), &a.id)
                .await
                .unwrap();
            let to_x = report
                .outcomes
                .iter()
                .filter(|d| d.connection_id == x.id)
                .count();
            assert!(to_x <= 1, "message m{i} fanned out to x {to_x} times");
        }
        register.await.unwrap().unwrap();

        // Whatever x received is a dedup-free suffix of the burst
        let mut seen = std::collections::HashSet::new();
        while let Ok(msg) = rx_x.try_recv() {
            assert!(seen.insert(msg.to_string()), "duplicate delivery to x");
        }
    }
}
