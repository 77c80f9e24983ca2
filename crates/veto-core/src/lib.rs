//! # veto-core
//!
//! Foundation types and the session state engine for map veto sessions.
//!
//! - **Session model**: `Session`, `Team`, `MapEntry`, `Stage`, `ActingSide`
//! - **Stored state**: `SessionState`, an immutable JSON document shared via `Arc`
//! - **Sequencer**: per-format ban/pick/side tables and `next_action`
//! - **Store**: `SessionStore`, the authoritative id → state registry
//! - **IDs**: `ConnectionId` newtype for attached clients
//! - **Logging**: `tracing` subscriber initialization

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod sequencer;
pub mod session;
pub mod store;

pub use errors::{CoreError, Result};
pub use ids::ConnectionId;
pub use sequencer::{FORMATS, VetoStep, next_action, steps};
pub use session::{ActingSide, MapEntry, Session, SessionState, SessionTemplate, Stage, Team};
pub use store::SessionStore;
