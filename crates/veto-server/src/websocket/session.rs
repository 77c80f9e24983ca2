//! WebSocket connection lifecycle: handles a single client from upgrade
//! through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use veto_core::ConnectionId;

use super::connection::ClientConnection;
use super::handler::handle_message;
use super::protocol::ServerEvent;
use crate::config::ServerConfig;
use crate::gateway::{ConnectionPermit, SyncGateway};
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Time the writer gets to flush a close frame after the reader stops.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Per-connection limits taken from [`ServerConfig`].
#[derive(Clone, Copy, Debug)]
pub struct ConnectionLimits {
    /// Outbound queue length.
    pub send_queue_capacity: usize,
    /// Interval between server pings.
    pub ping_interval: Duration,
    /// Disconnect after this long without a pong.
    pub pong_timeout: Duration,
}

impl From<&ServerConfig> for ConnectionLimits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            send_queue_capacity: config.send_queue_capacity.max(1),
            ping_interval: config.heartbeat_interval().max(Duration::from_millis(1)),
            pong_timeout: config.heartbeat_timeout(),
        }
    }
}

/// Run a WebSocket session for a connected client.
///
/// 1. Sends `connection.established` with the client ID
/// 2. Dispatches inbound text (or UTF-8 binary) frames
/// 3. Forwards queued events through a writer task that also pings
/// 4. Drops the client after `pong_timeout` without a pong
/// 5. Removes every session membership on disconnect
#[instrument(skip_all, fields(client_id = %client_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    client_id: ConnectionId,
    gateway: Arc<SyncGateway>,
    limits: ConnectionLimits,
    shutdown: CancellationToken,
    permit: ConnectionPermit,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(limits.send_queue_capacity);
    let connection = Arc::new(ClientConnection::new(client_id.clone(), send_tx));

    info!(connections = gateway.connection_count(), "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let established = ServerEvent::ConnectionEstablished {
        client_id: client_id.clone(),
    };
    if let Ok(json) = established.encode() {
        let _ = ws_tx.send(Message::Text(String::clone(&json).into())).await;
    }

    let closing = shutdown.child_token();
    let writer_closing = closing.clone();
    let outbound_conn = Arc::clone(&connection);
    let mut outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(limits.ping_interval);
        // First tick completes immediately.
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                () = writer_closing.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(String::clone(&text).into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if !outbound_conn.check_alive()
                        && outbound_conn.last_pong_elapsed() > limits.pong_timeout
                    {
                        warn!(timeout = ?limits.pong_timeout, "client unresponsive, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });
    let mut outbound_done = false;

    loop {
        let next = tokio::select! {
            () = shutdown.cancelled() => {
                info!("server shutting down, closing connection");
                break;
            }
            _ = &mut outbound => {
                outbound_done = true;
                break;
            }
            next = ws_rx.next() => next,
        };

        let Some(Ok(msg)) = next else { break };
        let text = match msg {
            Message::Text(ref t) => Some(t.as_str()),
            Message::Binary(ref data) => {
                if let Ok(s) = std::str::from_utf8(data) {
                    Some(s)
                } else {
                    debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                    None
                }
            }
            Message::Close(_) => {
                debug!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                connection.mark_alive();
                None
            }
        };

        let Some(text) = text else { continue };
        // Any inbound traffic counts as liveness.
        connection.mark_alive();

        let result = handle_message(text, &connection, &gateway);
        if let Some(reply) = result.reply {
            if !connection.send_event(&reply) {
                debug!(event = reply.name(), "failed to enqueue reply (queue full or closed)");
            }
        }
    }

    let sessions = gateway.on_disconnect(&connection.id);
    closing.cancel();
    if !outbound_done && tokio::time::timeout(CLOSE_GRACE, &mut outbound).await.is_err() {
        outbound.abort();
    }
    drop(permit);

    info!(
        sessions = sessions.len(),
        dropped = connection.drop_count(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
}
