//! `VetoServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use chrono::{DateTime, Utc};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use veto_core::{ConnectionId, SessionStore};

use crate::api;
use crate::config::ServerConfig;
use crate::errors::ApiError;
use crate::gateway::SyncGateway;
use crate::health::{self, HealthResponse};
use crate::metrics::WS_CONNECTIONS_REJECTED_TOTAL;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::{ConnectionLimits, run_ws_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Store, hub, and connection accounting.
    pub gateway: Arc<SyncGateway>,
    /// Runtime configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown signal and connection tracking.
    pub shutdown: ShutdownCoordinator,
    /// When the server started (monotonic).
    pub start_time: Instant,
    /// When the server started (wall clock).
    pub started_at: DateTime<Utc>,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The veto session server.
pub struct VetoServer {
    config: Arc<ServerConfig>,
    gateway: Arc<SyncGateway>,
    shutdown: ShutdownCoordinator,
    start_time: Instant,
    started_at: DateTime<Utc>,
    metrics: Option<PrometheusHandle>,
}

impl VetoServer {
    /// Create a server over `store`.
    pub fn new(config: ServerConfig, store: Arc<SessionStore>) -> Self {
        Self {
            config: Arc::new(config),
            gateway: Arc::new(SyncGateway::new(store)),
            shutdown: ShutdownCoordinator::new(),
            start_time: Instant::now(),
            started_at: Utc::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            gateway: Arc::clone(&self.gateway),
            config: Arc::clone(&self.config),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            started_at: self.started_at,
            metrics: self.metrics.clone(),
        };

        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .route("/api/sessions", get(api::list_sessions))
            .route(
                "/api/sessions/{id}",
                get(api::get_session)
                    .post(api::submit_session)
                    .put(api::submit_session),
            )
            .route("/api/sessions/{id}/next", get(api::next_action))
            .route("/api/formats", get(api::list_formats));

        if let Some(dir) = &self.config.static_dir {
            router = router.fallback_service(ServeDir::new(dir));
        }

        let router = router.with_state(state).layer(TraceLayer::new_for_http());
        if self.config.cors_permissive {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Bind and serve in a background task until shutdown is signalled.
    ///
    /// Returns the bound address (useful with port `0`) and the server task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        info!(%addr, "veto server listening");
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server error");
            }
        });
        Ok((addr, handle))
    }

    /// The sync gateway.
    pub fn gateway(&self) -> &Arc<SyncGateway> {
        &self.gateway
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let gateway = &state.gateway;
    Json(health::health_check(
        state.started_at,
        state.start_time,
        gateway.connection_count(),
        gateway.store().len(),
        gateway.hub().attended_sessions(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            crate::metrics::render(handle),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let limit = state.config.max_connections;
    let Some(permit) = state.gateway.try_connect(limit) else {
        warn!(limit, "connection limit reached, rejecting upgrade");
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        return ApiError::ConnectionLimit(limit).into_response();
    };

    let client_id = ConnectionId::new();
    let limits = ConnectionLimits::from(state.config.as_ref());
    let gateway = Arc::clone(&state.gateway);
    let token = state.shutdown.token();
    let shutdown = state.shutdown.clone();

    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| {
            shutdown.track(run_ws_session(socket, client_id, gateway, limits, token, permit))
        })
}
