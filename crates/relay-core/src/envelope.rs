//! Wire-format envelope for server-pushed control events.
//!
//! Chat payloads themselves are opaque and broadcast verbatim; the envelope
//! is only used for control events such as `connection.established`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event type sent to a client right after the WebSocket upgrade.
pub const CONNECTION_ESTABLISHED: &str = "connection.established";

/// Server-pushed control event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    /// Event type (e.g. `connection.established`).
    #[serde(rename = "type")]
    pub event_type: String,
    /// ISO-8601 timestamp.
    pub timestamp: String,
    /// Event payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    /// Create a new envelope with the current UTC timestamp.
    pub fn new(event_type: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            data,
        }
    }

    /// The `connection.established` greeting carrying the assigned ID.
    pub fn connection_established(connection_id: &crate::ConnectionId) -> Self {
        Self::new(
            CONNECTION_ESTABLISHED,
            Some(serde_json::json!({ "connectionId": connection_id })),
        )
    }
}
