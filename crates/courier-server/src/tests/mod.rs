//! Multi-node routing scenarios.
//!
//! Every node in a test cluster shares one in-memory store. Peer links are
//! plain connections subscribed to a node's dispatch channel; tests pump
//! their queued envelopes into the target router by hand.

mod mutual;
mod topics;

use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::mpsc;

use courier_shared::constants::SEND_CLIENT_ID_CMD;
use courier_shared::{Frame, RoutedEnvelope, Response};
use courier_store::SqliteStore;

use crate::ack::AckPolicy;
use crate::channel::ChannelName;
use crate::connection::Connection;
use crate::peer;
use crate::router::{ConnState, Flow, Router, RouterConfig};

pub(crate) fn shared_store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open_in_memory().unwrap())
}

/// A registered node backed by `store`.
pub(crate) async fn node(addr: &str, store: &Arc<SqliteStore>) -> Arc<Router> {
    let router = Arc::new(Router::new(
        RouterConfig {
            local: addr.into(),
            ack: AckPolicy::default(),
            directory_ttl: Duration::seconds(10),
        },
        store.clone(),
    ));
    router.register_self(addr, Utc::now()).await;
    router
}

/// A client connection that has not logged in yet.
pub(crate) struct TestClient {
    pub state: ConnState,
    pub rx: mpsc::Receiver<String>,
}

impl TestClient {
    pub fn connect(peer: &str) -> Self {
        let (conn, rx) = Connection::new(peer, 64);
        Self {
            state: ConnState::new(conn),
            rx,
        }
    }

    pub async fn send(&mut self, router: &Router, frame: Frame) -> Flow {
        router.handle_frame(&mut self.state, frame).await
    }

    /// Everything queued for this client so far.
    pub fn drain(&mut self) -> Vec<Response> {
        let mut out = Vec::new();
        while let Ok(text) = self.rx.try_recv() {
            out.push(serde_json::from_str(&text).unwrap());
        }
        out
    }

    pub fn conn(&self) -> &Arc<Connection> {
        &self.state.conn
    }
}

/// Connect `name` to `router` and drop the login response.
pub(crate) async fn login(router: &Router, name: &str) -> TestClient {
    let mut client = TestClient::connect(name);
    let flow = client
        .send(router, Frame::new(SEND_CLIENT_ID_CMD).arg(name))
        .await;
    assert_eq!(flow, Flow::Continue);
    let first = client.drain();
    assert!(first[0].ok, "login refused: {first:?}");
    client
}

/// A peer link listening on `router`'s dispatch channel.
pub(crate) async fn link(router: &Router, label: &str) -> mpsc::Receiver<String> {
    let (conn, rx) = Connection::new(label, 64);
    router
        .bus
        .join_channel(ChannelName::Dispatch, conn, label)
        .await;
    rx
}

/// Envelopes queued on a link, in publish order.
pub(crate) fn envelopes(rx: &mut mpsc::Receiver<String>) -> Vec<RoutedEnvelope> {
    let mut out = Vec::new();
    while let Ok(text) = rx.try_recv() {
        out.push(RoutedEnvelope::from_frame(Frame::from_json(&text).unwrap()).unwrap());
    }
    out
}

/// Feed everything queued on a link into `target`. Returns how many frames moved.
pub(crate) async fn pump(rx: &mut mpsc::Receiver<String>, target: &Router) -> usize {
    let mut moved = 0;
    while let Ok(text) = rx.try_recv() {
        assert!(peer::accept_from_peer(target, &text).await);
        moved += 1;
    }
    moved
}
