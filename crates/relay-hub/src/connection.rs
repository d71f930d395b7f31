//! Per-client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use relay_core::ConnectionId;
use tokio::sync::mpsc;

/// Lifecycle state of a connection.
///
/// Transitions are `Connecting -> Open -> Closed`. `Closed` is terminal; a
/// reconnecting client is a brand-new connection with a new identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Transport has reported the connection but it is not yet registered.
    Connecting = 0,
    /// Registered and eligible for fanout.
    Open = 1,
    /// Unregistered. Terminal.
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Connecting,
            1 => Self::Open,
            _ => Self::Closed,
        }
    }
}

/// Represents one live client session.
pub struct ClientConnection {
    /// Unique connection ID, assigned at connect time.
    pub id: ConnectionId,
    /// Send channel to the connection's write task.
    tx: mpsc::Sender<Arc<String>>,
    /// Lifecycle state (`ConnectionState` as u8).
    state: AtomicU8,
    /// When this connection was established.
    pub connected_at: Instant,
    /// When the last Pong (or any liveness signal) was received.
    last_pong: Mutex<Instant>,
    /// Count of messages dropped due to a full or closed channel.
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection in the `Connecting` state.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            connected_at: now,
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the connection is eligible for fanout.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Transition `Connecting -> Open`. No effect once `Closed`.
    pub(crate) fn mark_open(&self) {
        let _ = self.state.compare_exchange(
            ConnectionState::Connecting as u8,
            ConnectionState::Open as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Transition to `Closed`. Terminal and idempotent.
    pub(crate) fn mark_closed(&self) {
        self.state
            .store(ConnectionState::Closed as u8, Ordering::Release);
    }

    /// Hand a message off to the write task.
    ///
    /// Non-blocking: returns `false` if the channel is full or closed, and
    /// increments the dropped-message counter. The caller does not retry.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record a liveness signal (pong received).
    pub fn mark_alive(&self) {
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection() -> (ClientConnection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(32);
        (ClientConnection::new(ConnectionId::from("conn_1"), tx), rx)
    }

    #[test]
    fn starts_connecting() {
        let (conn, _rx) = make_connection();
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert!(!conn.is_open());
    }

    #[test]
    fn open_transition() {
        let (conn, _rx) = make_connection();
        conn.mark_open();
        assert_eq!(conn.state(), ConnectionState::Open);
        assert!(conn.is_open());
    }

    #[test]
    fn closed_is_terminal() {
        let (conn, _rx) = make_connection();
        conn.mark_open();
        conn.mark_closed();
        assert_eq!(conn.state(), ConnectionState::Closed);
        // No transition back to Open
        conn.mark_open();
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn mark_closed_idempotent() {
        let (conn, _rx) = make_connection();
        conn.mark_closed();
        conn.mark_closed();
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn send_delivers_to_channel() {
        let (conn, mut rx) = make_connection();
        assert!(conn.send(Arc::new("hello".into())));
        let msg = rx.recv().await.unwrap();
        assert_eq!(&*msg, "hello");
    }

    #[tokio::test]
    async fn send_to_closed_channel_returns_false() {
        let (tx, rx) = mpsc::channel(32);
        let conn = ClientConnection::new(ConnectionId::from("conn_2"), tx);
        drop(rx);
        assert!(!conn.send(Arc::new("hello".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[tokio::test]
    async fn send_to_full_channel_returns_false() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = ClientConnection::new(ConnectionId::from("conn_3"), tx);
        assert!(conn.send(Arc::new("msg1".into())));
        assert!(!conn.send(Arc::new("msg2".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[tokio::test]
    async fn send_preserves_order() {
        let (conn, mut rx) = make_connection();
        for i in 0..5 {
            assert!(conn.send(Arc::new(format!("msg_{i}"))));
        }
        for i in 0..5 {
            let msg = rx.recv().await.unwrap();
            assert_eq!(&*msg, &format!("msg_{i}"));
        }
    }

    #[test]
    fn mark_alive_resets_elapsed() {
        let (conn, _rx) = make_connection();
        std::thread::sleep(Duration::from_millis(10));
        let before = conn.last_pong_elapsed();
        conn.mark_alive();
        assert!(conn.last_pong_elapsed() < before);
    }

    #[test]
    fn age_increases() {
        let (conn, _rx) = make_connection();
        let age1 = conn.age();
        std::thread::sleep(Duration::from_millis(10));
        assert!(conn.age() > age1);
    }
}
