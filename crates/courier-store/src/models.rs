//! Records returned by the store that have no wire counterpart.
//!
//! Message and request records are the shared domain types from
//! `courier-shared` and are re-exported here for convenience.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use courier_shared::{ClientId, NodeAddr, TopicId};

pub use courier_shared::{DirectMessage, MutualKind, MutualRequest, TopicMessage};

// ---------------------------------------------------------------------------
// Clients
// ---------------------------------------------------------------------------

/// Where a client was last seen and whether that session is considered live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientLocation {
    pub client: ClientId,
    pub node: NodeAddr,
    pub alive: bool,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Topics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicRecord {
    pub topic: TopicId,
    pub founder: ClientId,
    /// Node the topic was created on.
    pub node: NodeAddr,
    pub created_at: DateTime<Utc>,
}

/// A topic member joined with its current location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicMember {
    pub client: ClientId,
    /// `None` when the client never logged in.
    pub node: Option<NodeAddr>,
    pub alive: bool,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// An undelivered message, in send order, as returned to a reconnecting client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredMessage {
    Direct(DirectMessage),
    Topic(TopicMessage),
}

impl StoredMessage {
    pub fn time(&self) -> DateTime<Utc> {
        match self {
            StoredMessage::Direct(m) => m.time,
            StoredMessage::Topic(m) => m.time,
        }
    }
}

// ---------------------------------------------------------------------------
// Mutual requests
// ---------------------------------------------------------------------------

/// Outcome of resolving a mutual request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The request was accepted and relationship state changed on both sides.
    Accepted(MutualRequest),
    /// The request was refused; nothing but the request itself changed.
    Refused(MutualRequest),
    /// Someone already resolved it.
    AlreadyResolved(MutualRequest),
}

// ---------------------------------------------------------------------------
// Node directory
// ---------------------------------------------------------------------------

/// Self-registration record a node refreshes periodically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeInfo {
    pub addr: NodeAddr,
    pub name: String,
    pub cpus: u32,
    pub sessions: u64,
    pub last_seen: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Timestamp columns
// ---------------------------------------------------------------------------

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
pub(crate) fn to_column(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn from_column(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn uuid_column(idx: usize, s: &str) -> rusqlite::Result<uuid::Uuid> {
    uuid::Uuid::parse_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
