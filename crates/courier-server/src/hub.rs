//! Connection control loop.
//!
//! A single task owns the set of open connections. Registration and
//! unregistration are serialized through its queue; the cleanup that touches
//! the store runs in a spawned task so a slow store never stalls the loop.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::connection::{ConnId, Connection};
use crate::router::Router;

enum HubEvent {
    Register(Arc<Connection>),
    Unregister(ConnId),
    Count(oneshot::Sender<usize>),
}

/// Cheap handle for talking to the hub loop.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubEvent>,
}

impl HubHandle {
    pub fn register(&self, conn: Arc<Connection>) {
        if self.tx.send(HubEvent::Register(conn)).is_err() {
            warn!("Hub stopped, registration lost");
        }
    }

    pub fn unregister(&self, conn: ConnId) {
        if self.tx.send(HubEvent::Unregister(conn)).is_err() {
            debug!(conn = %conn, "Hub stopped, unregistration lost");
        }
    }

    /// Number of open connections; 0 when the hub is gone.
    pub async fn connection_count(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(HubEvent::Count(tx)).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

pub struct Hub {
    router: Arc<Router>,
    rx: mpsc::UnboundedReceiver<HubEvent>,
    connections: HashMap<ConnId, Arc<Connection>>,
}

impl Hub {
    pub fn new(router: Arc<Router>) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = Self {
            router,
            rx,
            connections: HashMap::new(),
        };
        (hub, HubHandle { tx })
    }

    /// Run until every handle is dropped, then close what is still open.
    pub async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            match event {
                HubEvent::Register(conn) => {
                    debug!(conn = %conn.id(), peer = %conn.peer(), "Connection registered");
                    self.connections.insert(conn.id(), conn);
                }
                HubEvent::Unregister(id) => {
                    let Some(conn) = self.connections.remove(&id) else {
                        continue;
                    };
                    debug!(conn = %id, "Connection unregistered");
                    conn.close();
                    let router = self.router.clone();
                    tokio::spawn(async move {
                        router.connection_closed(&conn).await;
                    });
                }
                HubEvent::Count(reply) => {
                    let _ = reply.send(self.connections.len());
                }
            }
        }

        info!(open = self.connections.len(), "Hub stopping, closing connections");
        for conn in self.connections.values() {
            conn.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ack::AckPolicy;
    use crate::router::RouterConfig;
    use chrono::Utc;
    use courier_shared::{ClientId, NodeAddr};
    use courier_store::SqliteStore;

    fn router() -> Arc<Router> {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let config = RouterConfig {
            local: NodeAddr::from("n1"),
            ack: AckPolicy::default(),
            directory_ttl: chrono::Duration::seconds(10),
        };
        Arc::new(Router::new(config, store))
    }

    #[tokio::test]
    async fn test_unregister_evicts_bound_session() {
        let router = router();
        let (hub, handle) = Hub::new(router.clone());
        let task = tokio::spawn(hub.run());

        let (conn, _rx) = Connection::new("test", 8);
        handle.register(conn.clone());
        router
            .sessions
            .insert(ClientId::from("alice"), conn.clone(), Utc::now())
            .await;
        assert_eq!(handle.connection_count().await, 1);

        handle.unregister(conn.id());
        assert_eq!(handle.connection_count().await, 0);
        assert!(conn.is_closed());

        // Cleanup runs off the loop; give it a moment.
        for _ in 0..50 {
            if router.sessions.is_empty().await {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(router.sessions.is_empty().await);

        drop(handle);
        task.await.unwrap();
    }
}
