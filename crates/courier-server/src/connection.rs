//! The send side of one client or peer connection.
//!
//! Every connection owns a bounded outbound queue drained by its own writer
//! task. Producers never wait on it: a full queue means the remote end cannot
//! keep up, and the connection is closed instead of stalling the producer.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::error::SendError;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u64);

impl ConnId {
    fn next() -> Self {
        Self(NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

pub struct Connection {
    id: ConnId,
    peer: String,
    tx: mpsc::Sender<String>,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
}

impl Connection {
    /// Create a connection and the receiving end of its outbound queue.
    pub fn new(peer: impl Into<String>, buffer: usize) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let (closed_tx, _) = watch::channel(false);
        let conn = Arc::new(Self {
            id: ConnId::next(),
            peer: peer.into(),
            tx,
            closed: AtomicBool::new(false),
            closed_tx,
        });
        (conn, rx)
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Queue a pre-encoded text frame.
    pub fn send_text(&self, text: String) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        match self.tx.try_send(text) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(conn = %self.id, peer = %self.peer, "Outbound buffer full, disconnecting");
                self.close();
                Err(SendError::SlowConsumer)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.close();
                Err(SendError::Closed)
            }
        }
    }

    /// Encode and queue any serializable frame or response.
    pub fn send<T: Serialize>(&self, value: &T) -> Result<(), SendError> {
        let text = serde_json::to_string(value)?;
        self.send_text(text)
    }

    /// Mark the connection closed. The writer drains what is already queued
    /// and then shuts the socket. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(conn = %self.id, peer = %self.peer, "Closing connection");
            self.closed_tx.send_replace(true);
        }
    }

    /// Resolves once [`Connection::close`] has been called.
    pub async fn closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}
