//! # veto-server
//!
//! Axum HTTP + `WebSocket` server that keeps every client attached to a veto
//! session in sync.
//!
//! - `WebSocket` gateway: connection lifecycle, heartbeat, `logon`/`leave`/`update` dispatch
//! - [`websocket::hub::SubscriptionHub`]: per-session membership with a reverse index for disconnect cleanup
//! - [`gateway::SyncGateway`]: join bootstrap, state submission, and fan-out over the session store
//! - Admin HTTP API: list, read, and replace sessions; sequencer lookups
//! - Health, Prometheus metrics, static assets, graceful shutdown

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;
