//! `/health` endpoint body.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server is running.
    pub status: &'static str,
    /// Crate version.
    pub version: &'static str,
    /// Wall-clock start time (RFC 3339).
    pub started_at: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open WebSocket connections.
    pub connections: usize,
    /// Sessions in the store.
    pub sessions: usize,
    /// Sessions with at least one attached client.
    pub attended_sessions: usize,
}

/// Build a health response from live counters.
pub fn health_check(
    started_at: DateTime<Utc>,
    start_time: Instant,
    connections: usize,
    sessions: usize,
    attended_sessions: usize,
) -> HealthResponse {
    HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        started_at: started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        sessions,
        attended_sessions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_ok() {
        let resp = health_check(Utc::now(), Instant::now(), 0, 0, 0);
        assert_eq!(resp.status, "ok");
        assert!(!resp.version.is_empty());
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        assert!(health_check(Utc::now(), start, 0, 0, 0).uptime_secs >= 59);
    }

    #[test]
    fn serialization() {
        let resp = health_check(Utc::now(), Instant::now(), 3, 2, 1);
        let parsed = serde_json::to_value(&resp).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 3);
        assert_eq!(parsed["sessions"], 2);
        assert_eq!(parsed["attended_sessions"], 1);
        assert!(parsed["uptime_secs"].is_number());
        assert!(parsed["started_at"].as_str().unwrap().ends_with('Z'));
    }
}
