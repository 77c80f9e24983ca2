//! WebSocket message dispatch: parses an inbound frame as a [`ClientEvent`]
//! and routes it to the [`SyncGateway`].

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, instrument, warn};
use veto_core::SessionState;

use super::connection::ClientConnection;
use super::protocol::{ClientEvent, ServerEvent};
use crate::gateway::SyncGateway;
use crate::metrics::{WS_MESSAGES_RECEIVED_TOTAL, WS_PROTOCOL_ERRORS_TOTAL};

/// Result of handling one inbound frame.
#[derive(Debug)]
pub struct HandleResult {
    /// Event name, `None` when the frame could not be parsed.
    pub event: Option<&'static str>,
    /// Direct reply for the sender, if any.
    pub reply: Option<ServerEvent>,
}

/// Handle an inbound WebSocket text frame.
///
/// `logon` bootstraps through the gateway, which queues `session_data`
/// itself. `update` replies with an `ack`; a malformed frame replies with an
/// `error` event and leaves the connection open.
#[instrument(skip_all, fields(client_id = %connection.id, event))]
pub fn handle_message(
    text: &str,
    connection: &Arc<ClientConnection>,
    gateway: &SyncGateway,
) -> HandleResult {
    let event = match ClientEvent::parse(text) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "rejected inbound frame");
            counter!(WS_PROTOCOL_ERRORS_TOTAL).increment(1);
            return HandleResult {
                event: None,
                reply: Some(ServerEvent::error(e.code(), e.to_string())),
            };
        }
    };

    let name = event.name();
    let _ = tracing::Span::current().record("event", name);
    counter!(WS_MESSAGES_RECEIVED_TOTAL, "event" => name).increment(1);
    debug!(session_id = event.session_id(), "dispatching event");

    let reply = match event {
        ClientEvent::Logon { session_id } => {
            let _ = gateway.on_join(connection, &session_id);
            None
        }
        ClientEvent::Leave { session_id } => {
            let _ = gateway.on_leave(&connection.id, &session_id);
            None
        }
        ClientEvent::Update { session_id, data } => {
            let report = gateway.on_member_submit(&connection.id, &session_id, SessionState::new(data));
            Some(ServerEvent::Ack {
                session_id,
                recipients: report.recipients,
            })
        }
    };

    HandleResult {
        event: Some(name),
        reply,
    }
}
