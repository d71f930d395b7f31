//! Connection registry — single source of truth for who is connected.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use relay_core::{ConnectionId, HubError};
use tokio::sync::RwLock;
use tracing::debug;

use crate::connection::ClientConnection;

/// Tracks the set of currently open connections.
///
/// Membership mutations (`register`/`unregister`) take the write lock and
/// `snapshot` the read lock, so a snapshot always reflects some
/// serialization of the membership operations that happened before it.
pub struct ConnectionRegistry {
    /// Live connections indexed by connection ID.
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
    /// Atomic counter tracking live connections (avoids read-locking for
    /// count queries).
    active_count: AtomicUsize,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
        }
    }

    /// Add a newly connected client and mark it `Open`.
    ///
    /// The transport guarantees identifier uniqueness; a duplicate is a
    /// contract violation and returns [`HubError::DuplicateConnection`]
    /// without touching the existing entry.
    pub async fn register(&self, connection: Arc<ClientConnection>) -> Result<(), HubError> {
        let mut conns = self.connections.write().await;
        if conns.contains_key(&connection.id) {
            return Err(HubError::DuplicateConnection {
                id: connection.id.clone(),
            });
        }
        connection.mark_open();
        debug!(conn_id = %connection.id, "connection registered");
        let _ = conns.insert(connection.id.clone(), connection);
        let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Remove a connection on disconnect and mark it `Closed`.
    ///
    /// Idempotent: disconnect notifications may race with other removal
    /// paths, so unregistering an absent identifier is a no-op.
    pub async fn unregister(&self, connection_id: &ConnectionId) {
        let mut conns = self.connections.write().await;
        if let Some(conn) = conns.remove(connection_id) {
            conn.mark_closed();
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
            debug!(conn_id = %connection_id, "connection unregistered");
        }
    }

    /// Point-in-time view of the live connection set.
    ///
    /// The returned `Arc` clones bound one fanout operation: a connection
    /// removed after the snapshot stays safely iterable, and one added
    /// after it is not observed.
    pub async fn snapshot(&self) -> Vec<Arc<ClientConnection>> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
