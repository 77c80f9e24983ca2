//! Session synchronization gateway.
//!
//! Binds the session store to the subscription hub: joins get a bootstrap of
//! the current state, submissions replace the stored state and fan it out.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use metrics::{counter, gauge};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use veto_core::{ConnectionId, SessionState, SessionStore};

use crate::metrics::{
    BOOTSTRAP_DROPS_TOTAL, SESSION_JOINS_TOTAL, SESSION_UPDATES_TOTAL, SESSIONS_KNOWN,
};
use crate::websocket::connection::ClientConnection;
use crate::websocket::hub::{PublishReport, SubscriptionHub};
use crate::websocket::protocol::ServerEvent;

/// Coordinates the store, the hub, and the open connection count.
pub struct SyncGateway {
    store: Arc<SessionStore>,
    hub: SubscriptionHub,
    /// Per-session ordering locks. Replace + publish and join + bootstrap for
    /// one session run under its lock; other sessions are unaffected.
    session_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    connections: AtomicUsize,
}

impl SyncGateway {
    /// Create a gateway over `store`.
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self {
            store,
            hub: SubscriptionHub::new(),
            session_locks: Mutex::new(HashMap::new()),
            connections: AtomicUsize::new(0),
        }
    }

    /// The session store.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// The subscription hub.
    pub fn hub(&self) -> &SubscriptionHub {
        &self.hub
    }

    /// Reserve a connection slot if fewer than `limit` are open.
    ///
    /// The slot is released when the returned permit is dropped.
    pub fn try_connect(self: &Arc<Self>, limit: usize) -> Option<ConnectionPermit> {
        self.connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < limit).then_some(n + 1))
            .ok()
            .map(|_| ConnectionPermit {
                gateway: Arc::clone(self),
            })
    }

    /// Open WebSocket connections.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }

    /// The ordering lock for `session_id`, created on first use.
    fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.session_locks.lock();
        if let Some(lock) = locks.get(session_id) {
            return Arc::clone(lock);
        }
        let lock = Arc::new(Mutex::new(()));
        let _ = locks.insert(session_id.to_string(), Arc::clone(&lock));
        lock
    }

    /// Attach `connection` to `session_id` and send it the current state.
    ///
    /// Creates the default session on first access. Exactly one
    /// `session_data` event is queued for the joiner.
    pub fn on_join(&self, connection: &Arc<ClientConnection>, session_id: &str) -> Arc<SessionState> {
        let lock = self.session_lock(session_id);
        let guard = lock.lock();
        let members = self.hub.join(session_id, connection);
        let state = self.store.get_or_create(session_id);
        let sent = connection.send_event(&ServerEvent::SessionData(Arc::clone(&state)));
        drop(guard);

        if !sent {
            counter!(BOOTSTRAP_DROPS_TOTAL).increment(1);
            warn!(client_id = %connection.id, session_id, "failed to queue session_data for joiner");
        }

        counter!(SESSION_JOINS_TOTAL).increment(1);
        gauge!(SESSIONS_KNOWN).set(self.store.len() as f64);
        info!(client_id = %connection.id, session_id, members, "client joined session");
        state
    }

    /// Detach `connection_id` from one session.
    pub fn on_leave(&self, connection_id: &ConnectionId, session_id: &str) -> bool {
        let was_member = self.hub.leave(session_id, connection_id);
        debug!(
            client_id = %connection_id,
            session_id,
            was_member,
            members = self.hub.member_count(session_id),
            "client left session"
        );
        was_member
    }

    /// Drop every membership of a terminated connection.
    pub fn on_disconnect(&self, connection_id: &ConnectionId) -> Vec<String> {
        let sessions = self.hub.leave_all(connection_id);
        if !sessions.is_empty() {
            debug!(client_id = %connection_id, ?sessions, "removed memberships");
        }
        sessions
    }

    /// Replace the session and broadcast `mapban` to every member.
    ///
    /// The state is stored as given; no schema or legality check is made.
    pub fn on_state_submit(&self, session_id: &str, state: SessionState) -> PublishReport {
        self.submit(session_id, state, None, "admin")
    }

    /// Replace the session on behalf of a member and relay it to the others.
    pub fn on_member_submit(
        &self,
        sender: &ConnectionId,
        session_id: &str,
        state: SessionState,
    ) -> PublishReport {
        self.submit(session_id, state, Some(sender), "member")
    }

    fn submit(
        &self,
        session_id: &str,
        state: SessionState,
        exclude: Option<&ConnectionId>,
        source: &'static str,
    ) -> PublishReport {
        let lock = self.session_lock(session_id);
        let report = {
            let _guard = lock.lock();
            let stored = self.store.replace(session_id, state);
            self.hub.publish(session_id, &ServerEvent::mapban(stored), exclude)
        };

        counter!(SESSION_UPDATES_TOTAL, "source" => source).increment(1);
        gauge!(SESSIONS_KNOWN).set(self.store.len() as f64);
        info!(
            session_id,
            source,
            recipients = report.recipients,
            dropped = report.dropped,
            "session updated"
        );
        report
    }

    /// Every session in order of first creation.
    pub fn list_sessions(&self) -> Vec<(String, Arc<SessionState>)> {
        self.store.get_all()
    }

    /// One session without creating it.
    pub fn session(&self, session_id: &str) -> Option<Arc<SessionState>> {
        self.store.get(session_id)
    }
}

/// An occupied connection slot.
pub struct ConnectionPermit {
    gateway: Arc<SyncGateway>,
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        let _ = self.gateway.connections.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn gateway() -> Arc<SyncGateway> {
        Arc::new(SyncGateway::new(Arc::new(SessionStore::default())))
    }

    fn make_connection(id: &str) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(16);
        (Arc::new(ClientConnection::new(ConnectionId::from(id), tx)), rx)
    }

    fn next_frame(rx: &mut mpsc::Receiver<Arc<String>>) -> Value {
        let msg = rx.try_recv().unwrap();
        serde_json::from_str(&msg).unwrap()
    }

    #[test]
    fn join_sends_single_bootstrap() {
        let gw = gateway();
        let (c1, mut rx) = make_connection("c1");
        let state = gw.on_join(&c1, "match42");

        let frame = next_frame(&mut rx);
        assert_eq!(frame["event"], "session_data");
        assert_eq!(frame["data"]["sessionIdentifier"], "match42");
        assert_eq!(frame["data"]["format"], "bo3");
        assert_eq!(frame["data"]["availableMaps"].as_array().unwrap().len(), 7);
        assert_eq!(frame["data"]["actingTeam"], 0);
        assert!(rx.try_recv().is_err());

        assert_eq!(state.typed().unwrap().session_identifier, "match42");
        assert_eq!(gw.hub().member_count("match42"), 1);
    }

    #[test]
    fn join_existing_session_sends_stored_state() {
        let gw = gateway();
        let _ = gw.on_state_submit("s", SessionState::new(json!({"custom": true})));
        let (c1, mut rx) = make_connection("c1");
        let _ = gw.on_join(&c1, "s");
        assert_eq!(next_frame(&mut rx)["data"], json!({"custom": true}));
        assert_eq!(gw.store().len(), 1);
    }

    #[test]
    fn state_submit_reaches_every_member() {
        let gw = gateway();
        let (c1, mut rx1) = make_connection("c1");
        let (c2, mut rx2) = make_connection("c2");
        let _ = gw.on_join(&c1, "m");
        let _ = gw.on_join(&c2, "m");
        let _ = next_frame(&mut rx1);
        let _ = next_frame(&mut rx2);

        let report = gw.on_state_submit("m", SessionState::new(json!({"selectedMaps": [{"name": "Bind"}]})));
        assert_eq!(report.recipients, 2);
        for rx in [&mut rx1, &mut rx2] {
            let frame = next_frame(rx);
            assert_eq!(frame["event"], "mapban");
            assert_eq!(frame["data"]["data"]["selectedMaps"].as_array().unwrap().len(), 1);
        }
    }

    #[test]
    fn member_submit_skips_sender() {
        let gw = gateway();
        let (c1, mut rx1) = make_connection("c1");
        let (c2, mut rx2) = make_connection("c2");
        let _ = gw.on_join(&c1, "m");
        let _ = gw.on_join(&c2, "m");
        let _ = next_frame(&mut rx1);
        let _ = next_frame(&mut rx2);

        let report = gw.on_member_submit(&c1.id, "m", SessionState::new(json!({"stage": "pick"})));
        assert_eq!(report.recipients, 1);
        assert_eq!(next_frame(&mut rx2)["data"]["data"]["stage"], "pick");
        assert!(rx1.try_recv().is_err());
        assert_eq!(gw.session("m").unwrap().as_value(), &json!({"stage": "pick"}));
    }

    #[test]
    fn submit_without_members_still_stores() {
        let gw = gateway();
        let report = gw.on_state_submit("empty", SessionState::new(json!({"a": 1})));
        assert_eq!(report, PublishReport::default());
        assert_eq!(gw.session("empty").unwrap().as_value(), &json!({"a": 1}));
        assert_eq!(gw.list_sessions().len(), 1);
    }

    #[test]
    fn disconnect_removes_memberships() {
        let gw = gateway();
        let (c1, _rx) = make_connection("c1");
        let _ = gw.on_join(&c1, "A");
        let _ = gw.on_join(&c1, "B");
        assert_eq!(gw.on_disconnect(&c1.id), ["A", "B"]);
        assert_eq!(gw.hub().member_count("A"), 0);
        assert_eq!(gw.hub().member_count("B"), 0);
        // Sessions outlive their members.
        assert!(gw.session("A").is_some());
    }

    #[test]
    fn leave_stops_delivery() {
        let gw = gateway();
        let (c1, mut rx) = make_connection("c1");
        let _ = gw.on_join(&c1, "A");
        let _ = next_frame(&mut rx);
        assert!(gw.on_leave(&c1.id, "A"));
        let _ = gw.on_state_submit("A", SessionState::new(json!({})));
        assert!(rx.try_recv().is_err());
    }

    /// Runs `on_join` on a worker thread and reports completion.
    fn join_in_background(
        gw: &Arc<SyncGateway>,
        connection: Arc<ClientConnection>,
        session_id: &'static str,
    ) -> (std::sync::mpsc::Receiver<()>, std::thread::JoinHandle<()>) {
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let gw = Arc::clone(gw);
        let worker = std::thread::spawn(move || {
            let _ = gw.on_join(&connection, session_id);
            let _ = done_tx.send(());
        });
        (done_rx, worker)
    }

    #[test]
    fn join_is_not_blocked_by_another_session() {
        let gw = gateway();
        let lock_a = gw.session_lock("A");
        let held = lock_a.lock();

        let (c1, mut rx) = make_connection("c1");
        let (done, worker) = join_in_background(&gw, c1, "B");
        assert!(done.recv_timeout(Duration::from_secs(5)).is_ok());
        worker.join().unwrap();
        assert_eq!(next_frame(&mut rx)["event"], "session_data");
        drop(held);
    }

    #[test]
    fn join_waits_for_same_session_lock() {
        let gw = gateway();
        let lock_a = gw.session_lock("A");
        let held = lock_a.lock();

        let (c1, mut rx) = make_connection("c1");
        let (done, worker) = join_in_background(&gw, c1, "A");
        assert!(done.recv_timeout(Duration::from_millis(100)).is_err());
        assert!(rx.try_recv().is_err());

        drop(held);
        assert!(done.recv_timeout(Duration::from_secs(5)).is_ok());
        worker.join().unwrap();
        assert_eq!(next_frame(&mut rx)["event"], "session_data");
    }

    #[test]
    fn session_lock_is_shared_per_session() {
        let gw = gateway();
        assert!(Arc::ptr_eq(&gw.session_lock("A"), &gw.session_lock("A")));
        assert!(!Arc::ptr_eq(&gw.session_lock("A"), &gw.session_lock("B")));
    }

    #[test]
    fn full_queue_on_join_is_counted_not_fatal() {
        let gw = gateway();
        let (tx, _rx) = mpsc::channel(1);
        let conn = Arc::new(ClientConnection::new(ConnectionId::from("slow"), tx));
        assert!(conn.send(Arc::new("filler".to_string())));

        let state = gw.on_join(&conn, "m");
        assert_eq!(state.typed().unwrap().session_identifier, "m");
        assert_eq!(conn.drop_count(), 1);
        assert!(gw.hub().is_member("m", &conn.id));
    }

    #[test]
    fn connection_permits_respect_limit() {
        let gw = gateway();
        let p1 = gw.try_connect(2).unwrap();
        let p2 = gw.try_connect(2).unwrap();
        assert!(gw.try_connect(2).is_none());
        assert_eq!(gw.connection_count(), 2);
        drop(p1);
        assert_eq!(gw.connection_count(), 1);
        let _p3 = gw.try_connect(2).unwrap();
        drop(p2);
        assert_eq!(gw.connection_count(), 1);
    }
}
