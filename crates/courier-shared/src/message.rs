//! Domain records that flow through routing and persistence alike.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::command::MutualKind;
use crate::types::{ClientId, TopicId};

/// A person-to-person chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMessage {
    pub uuid: Uuid,
    pub from: ClientId,
    pub to: ClientId,
    pub content: String,
    pub time: DateTime<Utc>,
}

/// A message posted to a topic. Recipients are tracked separately because
/// each one acknowledges independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMessage {
    pub uuid: Uuid,
    pub topic: TopicId,
    pub from: ClientId,
    pub content: String,
    pub time: DateTime<Utc>,
}

/// A friend/invite request awaiting the counterparty's decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutualRequest {
    pub uuid: Uuid,
    pub from: ClientId,
    pub to: ClientId,
    pub kind: MutualKind,
    /// Topic concerned by `add_topic` / `invite_topic` requests.
    pub topic: Option<TopicId>,
    pub time: DateTime<Utc>,
    pub resolved: bool,
}

impl DirectMessage {
    pub fn new(from: ClientId, to: ClientId, content: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            from,
            to,
            content: content.into(),
            time: Utc::now(),
        }
    }
}

impl TopicMessage {
    pub fn new(topic: TopicId, from: ClientId, content: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            topic,
            from,
            content: content.into(),
            time: Utc::now(),
        }
    }
}

impl MutualRequest {
    pub fn new(from: ClientId, to: ClientId, kind: MutualKind, topic: Option<TopicId>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            from,
            to,
            kind,
            topic,
            time: Utc::now(),
            resolved: false,
        }
    }
}
