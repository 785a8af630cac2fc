//! Connection hub: per-session duplex connection sets and fan-out broadcast.

use dashmap::DashMap;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

use super::types::ServerEvent;

/// Size of the per-connection outbound event queue.
///
/// REST handlers and the controller enqueue here; the connection's send task
/// drains the queue onto the socket.
const CONNECTION_BUFFER_SIZE: usize = 64;

/// How long a send may block on a full connection queue before the peer is
/// treated as dead.
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Identifier of one registered connection, unique across the hub's lifetime.
pub type ConnectionId = u64;

struct Connection {
    id: ConnectionId,
    tx: mpsc::Sender<ServerEvent>,
}

/// Hub managing, per session, the set of currently reachable connections.
///
/// Membership here is the sole authority for "is this socket deliverable":
/// a failed send is conclusive evidence of a dead peer and removes the
/// connection permanently. Broadcast is best-effort and never raises;
/// partial delivery is expected and only logged.
#[derive(Default)]
pub struct ConnectionHub {
    /// Session ID -> registered connections.
    connections: DashMap<String, Vec<Connection>>,
    next_id: AtomicU64,
}

impl ConnectionHub {
    /// Create a new hub.
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register a new connection for a session.
    ///
    /// Returns the connection id and the receiver its send task drains.
    pub fn register(&self, session_id: &str) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER_SIZE);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections
            .entry(session_id.to_string())
            .or_default()
            .push(Connection { id, tx });
        info!("Registered connection {} on session {}", id, session_id);
        (id, rx)
    }

    /// Unregister a connection. No-op when either key is absent.
    pub fn unregister(&self, session_id: &str, connection_id: ConnectionId) {
        if let Some(mut conns) = self.connections.get_mut(session_id) {
            let before = conns.len();
            conns.retain(|c| c.id != connection_id);
            if conns.len() < before {
                info!(
                    "Unregistered connection {} from session {}",
                    connection_id, session_id
                );
            }
        }

        // Clean up empty entries
        self.connections.retain(|_, v| !v.is_empty());
    }

    /// Deliver an event to every connection registered for the session.
    ///
    /// Connections whose send fails or times out are removed; delivery order
    /// across connections is unspecified.
    pub async fn broadcast(&self, session_id: &str, event: ServerEvent) {
        let targets = self.senders(session_id);
        let mut dead = Vec::new();
        for (id, tx) in targets {
            if tx.send_timeout(event.clone(), SEND_TIMEOUT).await.is_err() {
                dead.push(id);
            }
        }
        self.prune(session_id, &dead);
    }

    /// Deliver an event to a single connection (error replies, snapshots).
    pub async fn send_to(&self, session_id: &str, connection_id: ConnectionId, event: ServerEvent) {
        let target = self
            .senders(session_id)
            .into_iter()
            .find(|(id, _)| *id == connection_id);
        if let Some((id, tx)) = target {
            if tx.send_timeout(event, SEND_TIMEOUT).await.is_err() {
                self.prune(session_id, &[id]);
            }
        }
    }

    /// Close and remove every connection for a session.
    ///
    /// Dropping the senders terminates the send tasks, which close the
    /// underlying sockets.
    pub fn close_all(&self, session_id: &str) {
        if let Some((_, conns)) = self.connections.remove(session_id) {
            info!(
                "Closed {} connection(s) for session {}",
                conns.len(),
                session_id
            );
        }
    }

    /// Number of live connections on a session.
    pub fn connection_count(&self, session_id: &str) -> usize {
        self.connections
            .get(session_id)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    /// Snapshot the session's senders so no map lock is held across sends.
    fn senders(&self, session_id: &str) -> Vec<(ConnectionId, mpsc::Sender<ServerEvent>)> {
        self.connections
            .get(session_id)
            .map(|conns| conns.iter().map(|c| (c.id, c.tx.clone())).collect())
            .unwrap_or_default()
    }

    fn prune(&self, session_id: &str, dead: &[ConnectionId]) {
        if dead.is_empty() {
            return;
        }
        warn!(
            "Removing {} dead connection(s) from session {}",
            dead.len(),
            session_id
        );
        if let Some(mut conns) = self.connections.get_mut(session_id) {
            conns.retain(|c| !dead.contains(&c.id));
        }
        self.connections.retain(|_, v| !v.is_empty());
        debug!(
            "Session {} now has {} connection(s)",
            session_id,
            self.connection_count(session_id)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn left_event(participant_id: &str) -> ServerEvent {
        ServerEvent::ParticipantLeft {
            participant_id: participant_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_connection() {
        let hub = ConnectionHub::new();
        let (_, mut rx_a) = hub.register("s1");
        let (_, mut rx_b) = hub.register("s1");
        let (_, mut rx_other) = hub.register("s2");

        hub.broadcast("s1", left_event("p1")).await;

        assert!(matches!(
            rx_a.recv().await,
            Some(ServerEvent::ParticipantLeft { .. })
        ));
        assert!(matches!(
            rx_b.recv().await,
            Some(ServerEvent::ParticipantLeft { .. })
        ));
        // Connections on other sessions receive nothing.
        assert!(rx_other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_send_removes_connection() {
        let hub = ConnectionHub::new();
        let (_, rx_dead) = hub.register("s1");
        let (_, mut rx_live) = hub.register("s1");
        assert_eq!(hub.connection_count("s1"), 2);

        // Dropping the receiver makes the next send fail.
        drop(rx_dead);
        hub.broadcast("s1", left_event("p1")).await;

        assert_eq!(hub.connection_count("s1"), 1);
        assert!(rx_live.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_unregister_is_noop_when_absent() {
        let hub = ConnectionHub::new();
        hub.unregister("nope", 42);

        let (id, _rx) = hub.register("s1");
        hub.unregister("s1", id);
        assert_eq!(hub.connection_count("s1"), 0);
        hub.unregister("s1", id);
    }

    #[tokio::test]
    async fn test_close_all_terminates_receivers() {
        let hub = ConnectionHub::new();
        let (_, mut rx_a) = hub.register("s1");
        let (_, mut rx_b) = hub.register("s1");

        hub.close_all("s1");

        assert_eq!(hub.connection_count("s1"), 0);
        assert!(rx_a.recv().await.is_none());
        assert!(rx_b.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_to_targets_one_connection() {
        let hub = ConnectionHub::new();
        let (id_a, mut rx_a) = hub.register("s1");
        let (_, mut rx_b) = hub.register("s1");

        hub.send_to(
            "s1",
            id_a,
            ServerEvent::Error {
                message: "bad".to_string(),
            },
        )
        .await;

        assert!(matches!(rx_a.recv().await, Some(ServerEvent::Error { .. })));
        assert!(rx_b.try_recv().is_err());
    }
}
