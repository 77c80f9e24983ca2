//! Admin HTTP API for the control panel.
//!
//! | Route | Effect |
//! |---|---|
//! | `GET /api/sessions` | every session, in order of first creation |
//! | `GET /api/sessions/{id}` | one session, 404 if absent |
//! | `POST`/`PUT /api/sessions/{id}` | replace and broadcast `mapban` |
//! | `GET /api/sessions/{id}/next` | sequencer lookup for the stored session |
//! | `GET /api/formats` | registered format tables |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use veto_core::{FORMATS, SessionState, VetoStep};

use crate::errors::ApiError;
use crate::server::AppState;

/// One entry of `GET /api/sessions`.
#[derive(Debug, Serialize)]
pub struct SessionEntry {
    /// Session identifier.
    pub id: String,
    /// Stored document.
    pub data: Arc<SessionState>,
}

/// Body returned after a replace.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    /// Always `true`.
    pub success: bool,
    /// Members the `mapban` event was addressed to.
    pub recipients: usize,
}

/// Body of `GET /api/sessions/{id}/next`.
#[derive(Debug, Serialize)]
pub struct NextActionResponse {
    /// The stored `format`, if it is a string.
    pub format: Option<String>,
    /// Whether the format has a step table.
    pub supported: bool,
    /// Length of `selectedMaps` (0 when missing).
    pub selections: usize,
    /// Every step of a supported format has been taken.
    pub complete: bool,
    /// Next required action.
    pub step: Option<VetoStep>,
}

impl NextActionResponse {
    fn for_state(state: &SessionState) -> Self {
        let format = state.format().map(str::to_string);
        let supported = format.as_deref().and_then(veto_core::steps).is_some();
        let step = state.next_action();
        Self {
            format,
            supported,
            selections: state.selected_count().unwrap_or(0),
            complete: supported && step.is_none(),
            step,
        }
    }
}

/// One entry of `GET /api/formats`.
#[derive(Debug, Serialize)]
pub struct FormatEntry {
    /// Format identifier.
    pub format: &'static str,
    /// Ordered steps.
    pub steps: &'static [VetoStep],
}

/// GET /api/sessions
pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionEntry>> {
    let sessions = state
        .gateway
        .list_sessions()
        .into_iter()
        .map(|(id, data)| SessionEntry { id, data })
        .collect();
    Json(sessions)
}

/// GET /api/sessions/{id}
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Arc<SessionState>>, ApiError> {
    state
        .gateway
        .session(&id)
        .map(Json)
        .ok_or(ApiError::SessionNotFound(id))
}

/// POST|PUT /api/sessions/{id}
///
/// Any JSON body is stored verbatim; non-JSON bodies are rejected by the
/// extractor before reaching the store.
pub async fn submit_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Json<SubmitResponse> {
    debug!(session_id = %id, "admin submit");
    let report = state.gateway.on_state_submit(&id, SessionState::new(body));
    Json(SubmitResponse {
        success: true,
        recipients: report.recipients,
    })
}

/// GET /api/sessions/{id}/next
pub async fn next_action(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<NextActionResponse>, ApiError> {
    let session = state
        .gateway
        .session(&id)
        .ok_or(ApiError::SessionNotFound(id))?;
    Ok(Json(NextActionResponse::for_state(&session)))
}

/// GET /api/formats
pub async fn list_formats() -> Json<Vec<FormatEntry>> {
    Json(
        FORMATS
            .iter()
            .map(|&(format, steps)| FormatEntry { format, steps })
            .collect(),
    )
}
