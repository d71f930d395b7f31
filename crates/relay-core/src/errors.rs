//! Hub error taxonomy.

use crate::ids::ConnectionId;

/// Errors surfaced by the hub core.
///
/// Per-recipient delivery failures are deliberately absent: they are
/// recovered locally during fanout and reported through the delivery
/// report, never as a call-level error.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// A connection was registered under an identifier that is already
    /// present. The transport guarantees uniqueness, so this is a contract
    /// violation and is never silently resolved by overwriting.
    #[error("duplicate connection registration: {id}")]
    DuplicateConnection {
        /// The offending identifier.
        id: ConnectionId,
    },

    /// The registry can no longer be enumerated (it was torn down while a
    /// publish was still referencing it). Fails the whole publish call.
    #[error("connection registry unavailable")]
    RegistryUnavailable,
}
