//! Session membership and fan-out.
//!
//! Membership is a bidirectional index: session → members for publishing and
//! connection → sessions so a disconnect removes every membership without
//! scanning all sessions. Both directions live under one lock so they never
//! disagree.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use metrics::counter;
use parking_lot::RwLock;
use tracing::{debug, warn};
use veto_core::ConnectionId;

use super::connection::ClientConnection;
use super::protocol::ServerEvent;
use crate::metrics::{BROADCAST_DELIVERED_TOTAL, BROADCAST_DROPS_TOTAL};

/// Outcome of one [`SubscriptionHub::publish`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Members the event was addressed to (after exclusion).
    pub recipients: usize,
    /// Copies queued successfully.
    pub delivered: usize,
    /// Copies dropped on a full or closed queue.
    pub dropped: usize,
}

#[derive(Default)]
struct Index {
    members: HashMap<String, IndexMap<ConnectionId, Arc<ClientConnection>>>,
    memberships: HashMap<ConnectionId, HashSet<String>>,
}

/// Tracks which connections are attached to which sessions.
#[derive(Default)]
pub struct SubscriptionHub {
    index: RwLock<Index>,
}

impl SubscriptionHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `connection` to `session_id`.
    ///
    /// Idempotent. Returns the member count afterwards.
    pub fn join(&self, session_id: &str, connection: &Arc<ClientConnection>) -> usize {
        let mut index = self.index.write();
        let members = index.members.entry(session_id.to_string()).or_default();
        let _ = members.insert(connection.id.clone(), Arc::clone(connection));
        let count = members.len();
        let _ = index
            .memberships
            .entry(connection.id.clone())
            .or_default()
            .insert(session_id.to_string());
        count
    }

    /// Detach one connection from one session.
    ///
    /// Returns `true` if it was a member.
    pub fn leave(&self, session_id: &str, connection_id: &ConnectionId) -> bool {
        let mut index = self.index.write();
        let removed = match index.members.get_mut(session_id) {
            Some(members) => {
                let removed = members.shift_remove(connection_id).is_some();
                if members.is_empty() {
                    let _ = index.members.remove(session_id);
                }
                removed
            }
            None => false,
        };
        if let Some(sessions) = index.memberships.get_mut(connection_id) {
            let _ = sessions.remove(session_id);
            if sessions.is_empty() {
                let _ = index.memberships.remove(connection_id);
            }
        }
        removed
    }

    /// Remove every membership of `connection_id`.
    ///
    /// Returns the sessions it was attached to.
    pub fn leave_all(&self, connection_id: &ConnectionId) -> Vec<String> {
        let mut index = self.index.write();
        let Some(sessions) = index.memberships.remove(connection_id) else {
            return Vec::new();
        };
        for session_id in &sessions {
            if let Some(members) = index.members.get_mut(session_id) {
                let _ = members.shift_remove(connection_id);
                if members.is_empty() {
                    let _ = index.members.remove(session_id);
                }
            }
        }
        let mut sessions: Vec<String> = sessions.into_iter().collect();
        sessions.sort_unstable();
        sessions
    }

    /// Number of connections attached to `session_id`.
    pub fn member_count(&self, session_id: &str) -> usize {
        self.index
            .read()
            .members
            .get(session_id)
            .map_or(0, IndexMap::len)
    }

    /// Whether `connection_id` is attached to `session_id`.
    #[cfg(test)]
    pub(crate) fn is_member(&self, session_id: &str, connection_id: &ConnectionId) -> bool {
        self.index
            .read()
            .members
            .get(session_id)
            .is_some_and(|members| members.contains_key(connection_id))
    }

    /// Sessions `connection_id` is attached to, sorted.
    #[cfg(test)]
    pub(crate) fn memberships(&self, connection_id: &ConnectionId) -> Vec<String> {
        let mut sessions: Vec<String> = self
            .index
            .read()
            .memberships
            .get(connection_id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        sessions.sort_unstable();
        sessions
    }

    /// Number of sessions with at least one member.
    pub fn attended_sessions(&self) -> usize {
        self.index.read().members.len()
    }

    /// Send `event` to every member of `session_id`, skipping `exclude`.
    ///
    /// Encodes once. Never blocks: a member whose queue is full or closed
    /// loses this copy and the rest still receive theirs. Publishing to a
    /// session with no members is a no-op.
    pub fn publish(
        &self,
        session_id: &str,
        event: &ServerEvent,
        exclude: Option<&ConnectionId>,
    ) -> PublishReport {
        let targets: Vec<Arc<ClientConnection>> = match self.index.read().members.get(session_id) {
            Some(members) => members
                .values()
                .filter(|c| exclude != Some(&c.id))
                .cloned()
                .collect(),
            None => return PublishReport::default(),
        };
        if targets.is_empty() {
            return PublishReport::default();
        }

        let json = match event.encode() {
            Ok(json) => json,
            Err(e) => {
                warn!(event = event.name(), session_id, error = %e, "failed to serialize event");
                return PublishReport::default();
            }
        };

        let mut report = PublishReport {
            recipients: targets.len(),
            ..PublishReport::default()
        };
        for conn in &targets {
            if conn.send(Arc::clone(&json)) {
                report.delivered += 1;
            } else {
                report.dropped += 1;
                warn!(client_id = %conn.id, session_id, event = event.name(), "dropped event for slow or closed client");
            }
        }

        counter!(BROADCAST_DELIVERED_TOTAL).increment(report.delivered as u64);
        if report.dropped > 0 {
            counter!(BROADCAST_DROPS_TOTAL).increment(report.dropped as u64);
        }
        debug!(
            event = event.name(),
            session_id,
            recipients = report.recipients,
            dropped = report.dropped,
            "published event to session"
        );
        report
    }
}
