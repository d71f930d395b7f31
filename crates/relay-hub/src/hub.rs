//! Hub facade — the surface the transport layer drives.

use std::sync::Arc;

use relay_core::{ConnectionId, HubError};

use crate::bus::{BroadcastBus, DeliveryReport};
use crate::connection::ClientConnection;
use crate::registry::ConnectionRegistry;

/// Owns the connection registry and the broadcast bus.
///
/// One instance exists per process, created at startup and dropped at
/// shutdown; the connection set is never ambient global state. The
/// transport layer reports lifecycle events ([`connect`](Self::connect),
/// [`disconnect`](Self::disconnect)) and inbound messages
/// ([`publish`](Self::publish)); the hub pushes outbound bytes back through
/// each connection's send channel.
pub struct RelayHub {
    registry: Arc<ConnectionRegistry>,
    bus: BroadcastBus,
}

impl RelayHub {
    /// Create a hub with an empty registry.
    pub fn new() -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let bus = BroadcastBus::new(&registry);
        Self { registry, bus }
    }

    /// Register a newly connected client.
    pub async fn connect(&self, connection: Arc<ClientConnection>) -> Result<(), HubError> {
        self.registry.register(connection).await
    }

    /// Remove a connection on disconnect. Idempotent.
    pub async fn disconnect(&self, connection_id: &ConnectionId) {
        self.registry.unregister(connection_id).await;
    }

    /// Fan `payload` out to every live connection, including the sender.
    pub async fn publish(
        &self,
        payload: Arc<String>,
        sender: &ConnectionId,
    ) -> Result<DeliveryReport, HubError> {
        self.bus.publish(payload, sender).await
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.registry.connection_count()
    }
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new()
    }
}
