//! Graceful shutdown via `CancellationToken`.
//!
//! Upgraded WebSocket connections are detached from the HTTP server, so each
//! one is tracked here and shutdown waits for every socket to close.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TrackedFuture;
use tracing::{info, warn};

/// Default time allowed for open connections to drain.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared shutdown signal plus the set of tasks that must drain.
#[derive(Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a coordinator with no tracked tasks.
    pub fn new() -> Self {
        Self::default()
    }

    /// A clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wrap `future` so shutdown waits for it to finish.
    pub fn track<F: Future>(&self, future: F) -> TrackedFuture<F> {
        self.tracker.track_future(future)
    }

    /// Tracked futures still running.
    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Signal shutdown without waiting.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been signalled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signal shutdown, then wait for `server` and every tracked task.
    ///
    /// Anything still running after `timeout` is left to be dropped with the
    /// runtime.
    pub async fn graceful_shutdown(&self, server: Option<JoinHandle<()>>, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        let _ = self.tracker.close();
        info!(
            connections = self.tracker.len(),
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "waiting for connections to drain"
        );

        let drain = async {
            if let Some(server) = server {
                let _ = server.await;
            }
            self.tracker.wait().await;
        };

        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!(
                remaining = self.tracker.len(),
                "shutdown timed out after {timeout:?}"
            );
        } else {
            info!("shutdown complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_not_shutting_down() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
        assert_eq!(coord.active_tasks(), 0);
    }

    #[test]
    fn shutdown_cancels_all_tokens() {
        let coord = ShutdownCoordinator::new();
        let t1 = coord.token();
        let t2 = coord.clone().token();
        coord.shutdown();
        coord.shutdown();
        assert!(t1.is_cancelled());
        assert!(t2.is_cancelled());
    }

    #[tokio::test]
    async fn tracked_tasks_are_awaited() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let _ = tokio::spawn(coord.track(async move {
            token.cancelled().await;
        }));
        assert_eq!(coord.active_tasks(), 1);

        coord.graceful_shutdown(None, None).await;
        assert!(coord.is_shutting_down());
        assert_eq!(coord.active_tasks(), 0);
    }

    #[tokio::test]
    async fn server_handle_is_awaited() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let server = tokio::spawn(async move {
            token.cancelled().await;
        });
        coord
            .graceful_shutdown(Some(server), Some(Duration::from_secs(5)))
            .await;
        assert!(coord.is_shutting_down());
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_shutdown_times_out() {
        let coord = ShutdownCoordinator::new();
        let _ = tokio::spawn(coord.track(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        }));
        coord
            .graceful_shutdown(None, Some(Duration::from_millis(100)))
            .await;
        assert_eq!(coord.active_tasks(), 1);
    }
}
