//! # relay-server
//!
//! Axum HTTP + `WebSocket` transport around the relay hub.
//!
//! - HTTP endpoints: static chat page, health check, Prometheus metrics
//! - `WebSocket` gateway: upgrade, per-connection read/write loops, heartbeat
//! - Graceful shutdown via `CancellationToken`
//!
//! The transport is a thin collaborator: every lifecycle event and inbound
//! frame is forwarded to [`relay_hub::RelayHub`], and outbound bytes flow
//! back through each connection's send channel.

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;
