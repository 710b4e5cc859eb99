//! Session registry: which client identity is bound to which local connection.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use courier_shared::ClientId;

use crate::connection::{ConnId, Connection};

/// A client identity bound to a live connection on this node.
#[derive(Debug, Clone)]
pub struct Session {
    pub client: ClientId,
    pub conn: Arc<Connection>,
    pub alive: bool,
    pub last_alive: DateTime<Utc>,
}

/// At most one session per client identity.
///
/// The map is only reachable through these methods; every method takes the
/// lock for the duration of one operation and never across an await point.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<ClientId, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `client` to `conn`, replacing any previous session.
    ///
    /// Returns the displaced connection when the identity was bound to a
    /// different connection. The caller notifies and closes it.
    pub async fn insert(
        &self,
        client: ClientId,
        conn: Arc<Connection>,
        now: DateTime<Utc>,
    ) -> Option<Arc<Connection>> {
        let session = Session {
            client: client.clone(),
            conn: conn.clone(),
            alive: true,
            last_alive: now,
        };
        let previous = self.sessions.write().await.insert(client.clone(), session);
        match previous {
            Some(prev) if prev.conn.id() != conn.id() => {
                info!(client = %client, old = %prev.conn.id(), new = %conn.id(), "Session displaced");
                Some(prev.conn)
            }
            _ => None,
        }
    }

    pub async fn lookup(&self, client: &ClientId) -> Option<Arc<Connection>> {
        self.sessions
            .read()
            .await
            .get(client)
            .map(|s| s.conn.clone())
    }

    pub async fn get(&self, client: &ClientId) -> Option<Session> {
        self.sessions.read().await.get(client).cloned()
    }

    /// Whether `client` is currently bound to exactly this connection.
    pub async fn is_bound_to(&self, client: &ClientId, conn: ConnId) -> bool {
        self.sessions
            .read()
            .await
            .get(client)
            .is_some_and(|s| s.conn.id() == conn)
    }

    /// The identity bound to `conn`, if any.
    pub async fn client_of(&self, conn: ConnId) -> Option<ClientId> {
        self.sessions
            .read()
            .await
            .values()
            .find(|s| s.conn.id() == conn)
            .map(|s| s.client.clone())
    }

    /// Refresh liveness. Returns false when the session is already gone.
    pub async fn mark_alive(&self, client: &ClientId, now: DateTime<Utc>) -> bool {
        match self.sessions.write().await.get_mut(client) {
            Some(session) => {
                session.alive = true;
                session.last_alive = now;
                true
            }
            None => false,
        }
    }

    /// Remove the session of `client` only if it is still bound to `conn`.
    ///
    /// A stale eviction racing a newer bind leaves the newer session alone.
    pub async fn evict_if(&self, client: &ClientId, conn: ConnId) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        if sessions.get(client).is_some_and(|s| s.conn.id() == conn) {
            sessions.remove(client)
        } else {
            debug!(client = %client, conn = %conn, "Skipping eviction of superseded session");
            None
        }
    }

    /// Remove the session of `client` whatever connection it is bound to.
    pub async fn remove(&self, client: &ClientId) -> Option<Session> {
        self.sessions.write().await.remove(client)
    }

    /// One liveness pass.
    ///
    /// Sessions already demoted are removed and returned. Live sessions not
    /// confirmed within `expiry` are demoted and get one more window.
    pub async fn scan(&self, now: DateTime<Utc>, expiry: Duration) -> Vec<Session> {
        let mut sessions = self.sessions.write().await;
        let dead: Vec<ClientId> = sessions
            .values()
            .filter(|s| !s.alive)
            .map(|s| s.client.clone())
            .collect();
        let evicted = dead
            .iter()
            .filter_map(|client| sessions.remove(client))
            .collect();
        for session in sessions.values_mut() {
            if now - session.last_alive >= expiry {
                session.alive = false;
            }
        }
        evicted
    }

    /// The subset of `clients` that have a session here.
    pub async fn bound_among<'a, I>(&self, clients: I) -> HashSet<ClientId>
    where
        I: IntoIterator<Item = &'a ClientId>,
    {
        let sessions = self.sessions.read().await;
        clients
            .into_iter()
            .filter(|c| sessions.contains_key(*c))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Arc<Connection> {
        Connection::new("test", 8).0
    }

    #[tokio::test]
    async fn test_binding_twice_keeps_one_session() {
        let registry = SessionRegistry::new();
        let alice = ClientId::from("alice");
        let (first, second) = (conn(), conn());
        let now = Utc::now();

        assert!(registry.insert(alice.clone(), first.clone(), now).await.is_none());
        let displaced = registry.insert(alice.clone(), second.clone(), now).await;

        assert_eq!(displaced.map(|c| c.id()), Some(first.id()));
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.lookup(&alice).await.map(|c| c.id()), Some(second.id()));
    }

    #[tokio::test]
    async fn test_rebinding_same_connection_displaces_nothing() {
        let registry = SessionRegistry::new();
        let c = conn();
        registry.insert(ClientId::from("alice"), c.clone(), Utc::now()).await;
        assert!(registry
            .insert(ClientId::from("alice"), c, Utc::now())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_stale_evict_spares_newer_session() {
        let registry = SessionRegistry::new();
        let alice = ClientId::from("alice");
        let (old, new) = (conn(), conn());
        registry.insert(alice.clone(), old.clone(), Utc::now()).await;
        registry.insert(alice.clone(), new.clone(), Utc::now()).await;

        assert!(registry.evict_if(&alice, old.id()).await.is_none());
        assert!(registry.is_bound_to(&alice, new.id()).await);
        assert!(registry.evict_if(&alice, new.id()).await.is_some());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_mark_alive_tolerates_missing_session() {
        let registry = SessionRegistry::new();
        assert!(!registry.mark_alive(&ClientId::from("ghost"), Utc::now()).await);
    }

    #[tokio::test]
    async fn test_scan_tolerates_one_missed_window() {
        let registry = SessionRegistry::new();
        let alice = ClientId::from("alice");
        let t0 = Utc::now();
        let expiry = Duration::seconds(60);
        registry.insert(alice.clone(), conn(), t0).await;

        // Confirmed recently: untouched.
        assert!(registry.scan(t0 + Duration::seconds(30), expiry).await.is_empty());
        assert!(registry.get(&alice).await.unwrap().alive);

        // First missed window: demoted, not evicted.
        assert!(registry.scan(t0 + Duration::seconds(60), expiry).await.is_empty());
        assert!(!registry.get(&alice).await.unwrap().alive);

        // Heartbeat in between restores it.
        registry.mark_alive(&alice, t0 + Duration::seconds(70)).await;
        assert!(registry.scan(t0 + Duration::seconds(90), expiry).await.is_empty());

        // Two consecutive misses: evicted.
        assert!(registry.scan(t0 + Duration::seconds(130), expiry).await.is_empty());
        let evicted = registry.scan(t0 + Duration::seconds(190), expiry).await;
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].client, alice);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_client_of_and_bound_among() {
        let registry = SessionRegistry::new();
        let c = conn();
        registry.insert(ClientId::from("alice"), c.clone(), Utc::now()).await;

        assert_eq!(registry.client_of(c.id()).await, Some(ClientId::from("alice")));
        let wanted = [ClientId::from("alice"), ClientId::from("bob")];
        let local = registry.bound_among(wanted.iter()).await;
        assert_eq!(local.len(), 1);
        assert!(local.contains(&ClientId::from("alice")));
    }
}
