//! # relay-hub
//!
//! The broadcast hub core: tracks which connections are live and fans each
//! published message out to all of them.
//!
//! - [`connection`] — per-client connection state and send handoff
//! - [`registry`] — single source of truth for the live connection set
//! - [`bus`] — snapshot-bounded fanout with per-recipient delivery report
//! - [`hub`] — the facade the transport layer drives
//!
//! Nothing in this crate touches the network; delivery is a non-blocking
//! channel handoff to the transport's per-connection write task, which makes
//! the whole core testable without a live WebSocket.

#![deny(unsafe_code)]

pub mod bus;
pub mod connection;
pub mod hub;
pub mod registry;

pub use bus::{BroadcastBus, Delivery, DeliveryReport};
pub use connection::{ClientConnection, ConnectionState};
pub use hub::RelayHub;
pub use registry::ConnectionRegistry;
