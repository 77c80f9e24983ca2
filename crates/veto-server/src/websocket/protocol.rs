//! WebSocket wire format.
//!
//! Every frame is a JSON envelope `{"event": <name>, "data": <payload>}`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use veto_core::{ConnectionId, SessionState};

use crate::errors::ProtocolError;

/// Inbound client event.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    /// Attach to a session and receive its current state.
    Logon {
        /// Session to join.
        session_id: String,
    },
    /// Detach from a session without closing the socket.
    Leave {
        /// Session to leave.
        session_id: String,
    },
    /// Replace a session's state and relay it to the other members.
    Update {
        /// Target session.
        session_id: String,
        /// Replacement document, stored as-is.
        data: Value,
    },
}

impl ClientEvent {
    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(ProtocolError::InvalidJson)?;
        let Some(name) = value.get("event").and_then(Value::as_str) else {
            return Err(ProtocolError::MissingEvent);
        };
        if !matches!(name, "logon" | "leave" | "update") {
            return Err(ProtocolError::UnknownEvent(name.to_string()));
        }
        serde_json::from_value(value).map_err(ProtocolError::InvalidPayload)
    }

    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Logon { .. } => "logon",
            Self::Leave { .. } => "leave",
            Self::Update { .. } => "update",
        }
    }

    /// Session the event targets.
    pub fn session_id(&self) -> &str {
        match self {
            Self::Logon { session_id }
            | Self::Leave { session_id }
            | Self::Update { session_id, .. } => session_id,
        }
    }
}

/// Payload of a `mapban` event.
///
/// The nested `event` field mirrors the envelope; overlay clients read the
/// session from `data.data`.
#[derive(Clone, Debug, Serialize)]
pub struct MapbanPayload {
    /// Always `"mapban"`.
    pub event: &'static str,
    /// The session as stored.
    pub data: Arc<SessionState>,
}

/// Outbound server event.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// First frame on every connection.
    #[serde(rename = "connection.established", rename_all = "camelCase")]
    ConnectionEstablished {
        /// Server-assigned connection ID.
        client_id: ConnectionId,
    },
    /// Bootstrap sent once to a joining client.
    #[serde(rename = "session_data")]
    SessionData(Arc<SessionState>),
    /// Session replaced; sent to session members.
    #[serde(rename = "mapban")]
    Mapban(MapbanPayload),
    /// Acknowledges a client `update`.
    #[serde(rename = "ack", rename_all = "camelCase")]
    Ack {
        /// Session that was updated.
        session_id: String,
        /// Number of other members the update was relayed to.
        recipients: usize,
    },
    /// Rejected inbound frame.
    #[serde(rename = "error")]
    Error {
        /// Machine-readable error code.
        code: String,
        /// Human-readable description.
        message: String,
    },
}

impl ServerEvent {
    /// `mapban` event carrying `state`.
    pub fn mapban(state: Arc<SessionState>) -> Self {
        Self::Mapban(MapbanPayload {
            event: "mapban",
            data: state,
        })
    }

    /// `error` event.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConnectionEstablished { .. } => "connection.established",
            Self::SessionData(_) => "session_data",
            Self::Mapban(_) => "mapban",
            Self::Ack { .. } => "ack",
            Self::Error { .. } => "error",
        }
    }

    /// Serialize into a shareable text frame.
    pub fn encode(&self) -> serde_json::Result<Arc<String>> {
        serde_json::to_string(self).map(Arc::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn encoded(event: &ServerEvent) -> Value {
        serde_json::from_str(&event.encode().unwrap()).unwrap()
    }

    #[test]
    fn parse_logon() {
        let event = ClientEvent::parse(r#"{"event":"logon","data":{"sessionId":"match42"}}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::Logon {
                session_id: "match42".into()
            }
        );
        assert_eq!(event.name(), "logon");
        assert_eq!(event.session_id(), "match42");
    }

    #[test]
    fn parse_leave() {
        let event = ClientEvent::parse(r#"{"event":"leave","data":{"sessionId":"a"}}"#).unwrap();
        assert_matches!(event, ClientEvent::Leave { session_id } if session_id == "a");
    }

    #[test]
    fn parse_update_keeps_document_verbatim() {
        let event = ClientEvent::parse(
            r#"{"event":"update","data":{"sessionId":"a","data":{"format":"bo5","extra":[1,2]}}}"#,
        )
        .unwrap();
        assert_matches!(event, ClientEvent::Update { session_id, data } => {
            assert_eq!(session_id, "a");
            assert_eq!(data, json!({"format": "bo5", "extra": [1, 2]}));
        });
    }

    #[test]
    fn parse_rejects_non_json() {
        assert_matches!(ClientEvent::parse("not json"), Err(ProtocolError::InvalidJson(_)));
    }

    #[test]
    fn parse_rejects_missing_event() {
        assert_matches!(
            ClientEvent::parse(r#"{"data":{"sessionId":"a"}}"#),
            Err(ProtocolError::MissingEvent)
        );
    }

    #[test]
    fn parse_rejects_unknown_event() {
        assert_matches!(
            ClientEvent::parse(r#"{"event":"explode","data":{}}"#),
            Err(ProtocolError::UnknownEvent(name)) if name == "explode"
        );
    }

    #[test]
    fn parse_rejects_missing_session_id() {
        assert_matches!(
            ClientEvent::parse(r#"{"event":"logon","data":{}}"#),
            Err(ProtocolError::InvalidPayload(_))
        );
    }

    #[test]
    fn parse_accepts_any_session_id_string() {
        for id in ["", " ", "match 42", "ünïcode"] {
            let frame = json!({"event": "logon", "data": {"sessionId": id}}).to_string();
            let event = ClientEvent::parse(&frame).unwrap();
            assert_eq!(event.session_id(), id);
        }
    }

    #[test]
    fn connection_established_shape() {
        let event = ServerEvent::ConnectionEstablished {
            client_id: ConnectionId::from("client_1"),
        };
        assert_eq!(
            encoded(&event),
            json!({"event": "connection.established", "data": {"clientId": "client_1"}})
        );
    }

    #[test]
    fn session_data_carries_document() {
        let state = Arc::new(SessionState::new(json!({"format": "bo3"})));
        let event = ServerEvent::SessionData(state);
        assert_eq!(
            encoded(&event),
            json!({"event": "session_data", "data": {"format": "bo3"}})
        );
    }

    #[test]
    fn mapban_nests_session_under_data() {
        let state = Arc::new(SessionState::new(json!({"selectedMaps": [{"name": "Bind"}]})));
        let json = encoded(&ServerEvent::mapban(state));
        assert_eq!(json["event"], "mapban");
        assert_eq!(json["data"]["event"], "mapban");
        assert_eq!(json["data"]["data"]["selectedMaps"][0]["name"], "Bind");
    }

    #[test]
    fn ack_shape() {
        let event = ServerEvent::Ack {
            session_id: "s".into(),
            recipients: 2,
        };
        assert_eq!(
            encoded(&event),
            json!({"event": "ack", "data": {"sessionId": "s", "recipients": 2}})
        );
    }

    #[test]
    fn error_shape() {
        let json = encoded(&ServerEvent::error("INVALID_PARAMS", "missing sessionId"));
        assert_eq!(json["event"], "error");
        assert_eq!(json["data"]["code"], "INVALID_PARAMS");
        assert_eq!(json["data"]["message"], "missing sessionId");
    }

    #[test]
    fn names_match_wire_tags() {
        let events = [
            ServerEvent::ConnectionEstablished {
                client_id: ConnectionId::from("c"),
            },
            ServerEvent::SessionData(Arc::new(SessionState::new(json!({})))),
            ServerEvent::mapban(Arc::new(SessionState::new(json!({})))),
            ServerEvent::Ack {
                session_id: "s".into(),
                recipients: 0,
            },
            ServerEvent::error("X", "y"),
        ];
        for event in &events {
            assert_eq!(encoded(event)["event"], event.name());
        }
    }
}
