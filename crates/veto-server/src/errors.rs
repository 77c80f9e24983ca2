//! Error codes and error types for the admin API and the WebSocket protocol.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

// ── Error code constants ────────────────────────────────────────────

/// Invalid or missing parameters.
pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
/// Session does not exist.
pub const SESSION_NOT_FOUND: &str = "SESSION_NOT_FOUND";
/// Concurrent connection limit reached.
pub const CONNECTION_LIMIT: &str = "CONNECTION_LIMIT";

/// Admin HTTP API error.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No session is registered under the requested ID.
    #[error("session '{0}' not found")]
    SessionNotFound(String),

    /// The server is at `maxConnections`.
    #[error("connection limit of {0} reached")]
    ConnectionLimit(usize),
}

impl ApiError {
    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => SESSION_NOT_FOUND,
            Self::ConnectionLimit(_) => CONNECTION_LIMIT,
        }
    }

    /// HTTP status for this variant.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::ConnectionLimit(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (self.status(), Json(body)).into_response()
    }
}

/// Malformed inbound WebSocket frame.
///
/// Reported to the sender as an `error` event; the connection stays open.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Frame is not JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// Envelope has no string `event` field.
    #[error("missing 'event' field")]
    MissingEvent,

    /// Event name is not one the server handles.
    #[error("unknown event '{0}'")]
    UnknownEvent(String),

    /// Known event with a payload of the wrong shape.
    #[error("invalid payload: {0}")]
    InvalidPayload(#[source] serde_json::Error),
}

impl ProtocolError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        INVALID_PARAMS
    }
}
