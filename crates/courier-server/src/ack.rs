//! Outstanding delivery receipts and their retransmission schedule.
//!
//! Three tables with the same contract: person-to-person and mutual requests
//! are keyed by message UUID, topic messages by (recipient, UUID) since one
//! topic message fans out to many recipients who acknowledge independently.
//! Each table has its own lock.

use std::collections::HashMap;
use std::hash::Hash;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use courier_shared::ClientId;

#[derive(Debug, Clone, Copy)]
pub struct AckPolicy {
    /// Time since the last send after which a message is resent.
    pub timeout: Duration,
    /// Retransmissions allowed before the delivery is abandoned.
    pub max_retries: u32,
}

impl Default for AckPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::seconds(10),
            max_retries: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AckEntry {
    last_sent: DateTime<Utc>,
    retries: u32,
}

/// What a sweep decided for a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepOutcome<K> {
    /// Entries whose retry count was just incremented; resend these.
    pub resend: Vec<K>,
    /// Entries removed because the retry budget was spent.
    pub abandoned: Vec<K>,
}

impl<K> Default for SweepOutcome<K> {
    fn default() -> Self {
        Self {
            resend: Vec::new(),
            abandoned: Vec::new(),
        }
    }
}

pub struct AckTable<K> {
    entries: Mutex<HashMap<K, AckEntry>>,
}

impl<K> Default for AckTable<K> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> AckTable<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `key` with zero retries. Re-registering resets it.
    pub async fn register(&self, key: K, sent_at: DateTime<Utc>) {
        self.entries.lock().await.insert(
            key,
            AckEntry {
                last_sent: sent_at,
                retries: 0,
            },
        );
    }

    /// Remove `key`. Late or duplicate receipts return false.
    pub async fn acknowledge(&self, key: &K) -> bool {
        self.entries.lock().await.remove(key).is_some()
    }

    pub async fn contains(&self, key: &K) -> bool {
        self.entries.lock().await.contains_key(key)
    }

    pub async fn retries(&self, key: &K) -> Option<u32> {
        self.entries.lock().await.get(key).map(|e| e.retries)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// One retransmission pass.
    ///
    /// Entries not due yet are left alone. Due entries with budget left are
    /// bumped and returned for resending; the rest are removed.
    pub async fn sweep(&self, now: DateTime<Utc>, policy: &AckPolicy) -> SweepOutcome<K> {
        let mut outcome = SweepOutcome::default();
        let mut entries = self.entries.lock().await;
        entries.retain(|key, entry| {
            if now - entry.last_sent < policy.timeout {
                return true;
            }
            if entry.retries >= policy.max_retries {
                outcome.abandoned.push(key.clone());
                return false;
            }
            entry.retries += 1;
            entry.last_sent = now;
            outcome.resend.push(key.clone());
            true
        });
        outcome
    }
}

/// Key of a topic receipt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicAckKey {
    pub recipient: ClientId,
    pub uuid: Uuid,
}

impl TopicAckKey {
    pub fn new(recipient: ClientId, uuid: Uuid) -> Self {
        Self { recipient, uuid }
    }
}

/// The three receipt tables of a node.
#[derive(Default)]
pub struct AckEngine {
    pub policy: AckPolicy,
    pub p2p: AckTable<Uuid>,
    pub topic: AckTable<TopicAckKey>,
    pub mutual: AckTable<Uuid>,
}

impl AckEngine {
    pub fn new(policy: AckPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Pending entry counts as (p2p, topic, mutual).
    pub async fn pending(&self) -> (usize, usize, usize) {
        (
            self.p2p.len().await,
            self.topic.len().await,
            self.mutual.len().await,
        )
    }
}
