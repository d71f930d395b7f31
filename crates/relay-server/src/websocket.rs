//! WebSocket session lifecycle — handles a single connected client from
//! upgrade through disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use relay_core::{ConnectionId, Envelope};
use relay_hub::{ClientConnection, RelayHub};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::config::ServerConfig;

/// Run a WebSocket session for a connected client.
///
/// 1. Registers the connection with the hub and sends a
///    `connection.established` envelope carrying the assigned ID
/// 2. Publishes every inbound text frame through the hub (fanned out
///    verbatim to all connections, the sender included)
/// 3. Forwards broadcast messages out via the connection's send channel
/// 4. Sends periodic Ping frames and disconnects unresponsive clients
/// 5. Unregisters on disconnect
#[instrument(skip_all, fields(conn_id = %connection_id))]
pub async fn run_session(
    ws: WebSocket,
    connection_id: ConnectionId,
    hub: Arc<RelayHub>,
    config: Arc<ServerConfig>,
    cancel: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(config.channel_capacity);
    let connection = Arc::new(ClientConnection::new(connection_id.clone(), send_tx));

    if let Err(e) = hub.connect(connection.clone()).await {
        // Duplicate IDs mean a broken transport contract; close loudly.
        error!(error = %e, "failed to register connection");
        let _ = ws_tx.close().await;
        return;
    }

    let session_start = Instant::now();
    info!("client connected");
    counter!("ws_connections_total").increment(1);
    gauge!("ws_connections_active").increment(1.0);

    // Greet the client with its assigned connection ID.
    let greeting = Envelope::connection_established(&connection_id);
    if let Ok(json) = serde_json::to_string(&greeting) {
        let _ = ws_tx.send(Message::Text(json.into())).await;
    }

    // Cancelled by the outbound task when the socket dies or the client
    // misses its pong window; ends the inbound loop so the session is
    // actually torn down and unregistered.
    let session_cancel = CancellationToken::new();

    // Outbound forwarder with periodic Ping frames.
    let ping_interval = Duration::from_secs(config.heartbeat_interval_secs);
    let pong_timeout = Duration::from_secs(config.heartbeat_timeout_secs);
    let outbound_conn = connection.clone();
    let outbound_cancel = session_cancel.clone();
    let outbound = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ping_interval);
        // Skip the immediate first tick
        let _ = ticker.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    if outbound_conn.last_pong_elapsed() > pong_timeout {
                        warn!(
                            conn_id = %outbound_conn.id,
                            timeout_secs = pong_timeout.as_secs(),
                            "client unresponsive, disconnecting"
                        );
                        break;
                    }
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        outbound_cancel.cancel();
    });

    // Inbound loop: every text frame is an opaque payload, broadcast verbatim.
    loop {
        let msg = tokio::select! {
            msg = ws_rx.next() => msg,
            () = cancel.cancelled() => {
                info!("server shutting down, closing session");
                break;
            }
            () = session_cancel.cancelled() => {
                info!("write side ended, closing session");
                break;
            }
        };
        let Some(Ok(msg)) = msg else { break };

        let text = match msg {
            Message::Text(ref t) => Some(t.to_string()),
            Message::Binary(ref data) => match std::str::from_utf8(data) {
                Ok(s) => Some(s.to_string()),
                Err(_) => {
                    info!(len = data.len(), "dropping non-UTF8 binary frame");
                    None
                }
            },
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                connection.mark_alive();
                None
            }
        };

        let Some(text) = text else { continue };

        match hub.publish(Arc::new(text), &connection_id).await {
            Ok(report) => {
                if report.failed() > 0 {
                    warn!(
                        delivered = report.delivered(),
                        failed = report.failed(),
                        "partial fanout"
                    );
                }
            }
            Err(e) => {
                // Registry unavailable means the hub is gone; stop the session.
                error!(error = %e, "publish failed");
                break;
            }
        }
    }

    info!("client disconnected");
    counter!("ws_disconnections_total").increment(1);
    gauge!("ws_connections_active").decrement(1.0);
    histogram!("ws_connection_duration_seconds").record(session_start.elapsed().as_secs_f64());
    outbound.abort();
    hub.disconnect(&connection_id).await;
}
