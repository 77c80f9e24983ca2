//! Authoritative session registry.
//!
//! Constructed once at startup and shared by `Arc`. Each session is held as an
//! `Arc<SessionState>`: readers get a cheap snapshot and a replace swaps the
//! whole document, so no partially updated session is ever observable.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::session::{SessionState, SessionTemplate};

/// In-memory id → session mapping with lazy creation.
pub struct SessionStore {
    /// Sessions in order of first creation.
    sessions: RwLock<IndexMap<String, Arc<SessionState>>>,
    /// Placeholder values for lazily created sessions.
    template: SessionTemplate,
    /// Number of default sessions built so far.
    defaults_created: AtomicU64,
}

impl SessionStore {
    /// Create an empty store using `template` for new sessions.
    pub fn new(template: SessionTemplate) -> Self {
        Self {
            sessions: RwLock::new(IndexMap::new()),
            template,
            defaults_created: AtomicU64::new(0),
        }
    }

    /// Return the session for `id`, creating the default session if absent.
    ///
    /// Concurrent first access builds exactly one default; every caller gets
    /// the same `Arc`.
    pub fn get_or_create(&self, id: &str) -> Arc<SessionState> {
        if let Some(existing) = self.sessions.read().get(id) {
            return Arc::clone(existing);
        }

        let mut sessions = self.sessions.write();
        let state = sessions.entry(id.to_string()).or_insert_with(|| {
            let _ = self.defaults_created.fetch_add(1, Ordering::Relaxed);
            info!(session_id = id, "created default session");
            Arc::new(self.template.build(id).to_state())
        });
        Arc::clone(state)
    }

    /// Overwrite the session at `id` with `state`.
    ///
    /// Last write wins. No shape, legality, or monotonicity checks are made
    /// against the previous value.
    pub fn replace(&self, id: &str, state: SessionState) -> Arc<SessionState> {
        let state = Arc::new(state);
        let previous = self
            .sessions
            .write()
            .insert(id.to_string(), Arc::clone(&state));
        debug!(session_id = id, existed = previous.is_some(), "replaced session");
        state
    }

    /// Current session at `id` without creating one.
    pub fn get(&self, id: &str) -> Option<Arc<SessionState>> {
        self.sessions.read().get(id).cloned()
    }

    /// Snapshot of every session in order of first creation.
    pub fn get_all(&self) -> Vec<(String, Arc<SessionState>)> {
        self.sessions
            .read()
            .iter()
            .map(|(id, state)| (id.clone(), Arc::clone(state)))
            .collect()
    }

    /// Number of known sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether no session exists yet.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// How many default sessions have been built.
    #[cfg(test)]
    pub(crate) fn defaults_created(&self) -> u64 {
        self.defaults_created.load(Ordering::Relaxed)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionTemplate::default())
    }
}
