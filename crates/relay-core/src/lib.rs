//! # relay-core
//!
//! Foundation types for the relay broadcast hub.
//!
//! This crate provides the shared vocabulary the hub and server crates
//! depend on:
//!
//! - **Branded IDs**: [`ConnectionId`] as a newtype for type safety
//! - **Wire envelope**: [`Envelope`] for server-pushed control events
//! - **Errors**: [`HubError`] hierarchy via `thiserror`

#![deny(unsafe_code)]

pub mod envelope;
pub mod errors;
pub mod ids;

pub use envelope::Envelope;
pub use errors::HubError;
pub use ids::ConnectionId;
