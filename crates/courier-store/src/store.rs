//! The store interface a node consumes, and its SQLite implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use courier_shared::{ClientId, DirectMessage, MutualRequest, NodeAddr, TopicId, TopicMessage};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{ClientLocation, NodeInfo, Resolution, StoredMessage, TopicMember, TopicRecord};

/// Persistent state queried and updated by client ID, topic ID or message
/// UUID. Calls are blocking; callers issue them from the task handling the
/// command at hand, never from a shared loop.
pub trait MessageStore: Send + Sync {
    // -- Client location / directory --
    fn get_client_location(&self, client: &ClientId) -> Result<Option<ClientLocation>>;
    fn upsert_client_session(&self, client: &ClientId, node: &NodeAddr, alive: bool)
        -> Result<()>;
    fn set_client_offline(&self, client: &ClientId, node: &NodeAddr) -> Result<bool>;

    // -- Relationships --
    fn get_client_relationships(&self, client: &ClientId) -> Result<Vec<ClientId>>;
    fn are_friends(&self, a: &ClientId, b: &ClientId) -> Result<bool>;
    fn remove_friendship(&self, a: &ClientId, b: &ClientId) -> Result<bool>;

    // -- Topics --
    fn create_topic(&self, topic: &TopicRecord) -> Result<bool>;
    fn get_topic(&self, topic: &TopicId) -> Result<Option<TopicRecord>>;
    fn add_topic_member(&self, topic: &TopicId, client: &ClientId) -> Result<bool>;
    fn remove_topic_member(&self, topic: &TopicId, client: &ClientId) -> Result<bool>;
    fn get_topic_members(&self, topic: &TopicId) -> Result<Option<Vec<TopicMember>>>;
    fn is_topic_member(&self, topic: &TopicId, client: &ClientId) -> Result<bool>;
    fn topics_for_client(&self, client: &ClientId) -> Result<Vec<TopicId>>;

    // -- Messages --
    fn record_p2p_message(&self, message: &DirectMessage) -> Result<()>;
    fn record_topic_message(&self, message: &TopicMessage, recipients: &[ClientId]) -> Result<()>;
    fn get_p2p_message(&self, uuid: Uuid) -> Result<Option<DirectMessage>>;
    fn get_topic_message(&self, uuid: Uuid) -> Result<Option<TopicMessage>>;
    fn read_undelivered_messages(&self, client: &ClientId) -> Result<Vec<StoredMessage>>;
    /// False unless `recipient` is the message's addressee.
    fn mark_p2p_delivered(&self, uuid: Uuid, recipient: &ClientId) -> Result<bool>;
    fn mark_topic_delivered(&self, uuid: Uuid, recipient: &ClientId) -> Result<bool>;

    // -- Mutual requests --
    fn record_mutual_request(&self, request: &MutualRequest) -> Result<()>;
    fn get_mutual_request(&self, uuid: Uuid) -> Result<Option<MutualRequest>>;
    fn pending_mutual_requests(&self, client: &ClientId) -> Result<Vec<MutualRequest>>;
    /// False unless `recipient` is the request's target.
    fn mark_mutual_read(&self, uuid: Uuid, recipient: &ClientId) -> Result<bool>;
    fn resolve_mutual_request(&self, uuid: Uuid, accept: bool) -> Result<Resolution>;

    // -- Node directory --
    fn register_node(&self, info: &NodeInfo) -> Result<()>;
    fn node_is_reachable(&self, addr: &NodeAddr, ttl: Duration, now: DateTime<Utc>)
        -> Result<bool>;
}

/// [`MessageStore`] backed by a single SQLite connection.
pub struct SqliteStore {
    db: Mutex<Database>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        Ok(Self::new(Database::open_at(path)?))
    }

    pub fn open_default() -> Result<Self> {
        Ok(Self::new(Database::open_default()?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    fn with<T>(&self, f: impl FnOnce(&mut Database) -> Result<T>) -> Result<T> {
        let mut db = self.db.lock().map_err(|_| StoreError::Poisoned)?;
        f(&mut db)
    }
}

impl MessageStore for SqliteStore {
    fn get_client_location(&self, client: &ClientId) -> Result<Option<ClientLocation>> {
        self.with(|db| db.get_client_location(client))
    }

    fn upsert_client_session(
        &self,
        client: &ClientId,
        node: &NodeAddr,
        alive: bool,
    ) -> Result<()> {
        self.with(|db| db.upsert_client_session(client, node, alive))
    }

    fn set_client_offline(&self, client: &ClientId, node: &NodeAddr) -> Result<bool> {
        self.with(|db| db.set_client_offline(client, node))
    }

    fn get_client_relationships(&self, client: &ClientId) -> Result<Vec<ClientId>> {
        self.with(|db| db.get_friends(client))
    }

    fn are_friends(&self, a: &ClientId, b: &ClientId) -> Result<bool> {
        self.with(|db| db.are_friends(a, b))
    }

    fn remove_friendship(&self, a: &ClientId, b: &ClientId) -> Result<bool> {
        self.with(|db| db.remove_friendship(a, b))
    }

    fn create_topic(&self, topic: &TopicRecord) -> Result<bool> {
        self.with(|db| db.create_topic(topic))
    }

    fn get_topic(&self, topic: &TopicId) -> Result<Option<TopicRecord>> {
        self.with(|db| db.get_topic(topic))
    }

    fn add_topic_member(&self, topic: &TopicId, client: &ClientId) -> Result<bool> {
        self.with(|db| db.add_topic_member(topic, client))
    }

    fn remove_topic_member(&self, topic: &TopicId, client: &ClientId) -> Result<bool> {
        self.with(|db| db.remove_topic_member(topic, client))
    }

    fn get_topic_members(&self, topic: &TopicId) -> Result<Option<Vec<TopicMember>>> {
        self.with(|db| db.get_topic_members(topic))
    }

    fn is_topic_member(&self, topic: &TopicId, client: &ClientId) -> Result<bool> {
        self.with(|db| db.is_topic_member(topic, client))
    }

    fn topics_for_client(&self, client: &ClientId) -> Result<Vec<TopicId>> {
        self.with(|db| db.topics_for_client(client))
    }

    fn record_p2p_message(&self, message: &DirectMessage) -> Result<()> {
        self.with(|db| db.record_p2p_message(message))
    }

    fn record_topic_message(&self, message: &TopicMessage, recipients: &[ClientId]) -> Result<()> {
        self.with(|db| db.record_topic_message(message, recipients))
    }

    fn get_p2p_message(&self, uuid: Uuid) -> Result<Option<DirectMessage>> {
        self.with(|db| db.get_p2p_message(uuid))
    }

    fn get_topic_message(&self, uuid: Uuid) -> Result<Option<TopicMessage>> {
        self.with(|db| db.get_topic_message(uuid))
    }

    fn read_undelivered_messages(&self, client: &ClientId) -> Result<Vec<StoredMessage>> {
        self.with(|db| db.read_undelivered_messages(client))
    }

    fn mark_p2p_delivered(&self, uuid: Uuid, recipient: &ClientId) -> Result<bool> {
        self.with(|db| db.mark_p2p_delivered(uuid, recipient))
    }

    fn mark_topic_delivered(&self, uuid: Uuid, recipient: &ClientId) -> Result<bool> {
        self.with(|db| db.mark_topic_delivered(uuid, recipient))
    }

    fn record_mutual_request(&self, request: &MutualRequest) -> Result<()> {
        self.with(|db| db.record_mutual_request(request))
    }

    fn get_mutual_request(&self, uuid: Uuid) -> Result<Option<MutualRequest>> {
        self.with(|db| db.get_mutual_request(uuid))
    }

    fn pending_mutual_requests(&self, client: &ClientId) -> Result<Vec<MutualRequest>> {
        self.with(|db| db.pending_mutual_requests(client))
    }

    fn mark_mutual_read(&self, uuid: Uuid, recipient: &ClientId) -> Result<bool> {
        self.with(|db| db.mark_mutual_read(uuid, recipient))
    }

    fn resolve_mutual_request(&self, uuid: Uuid, accept: bool) -> Result<Resolution> {
        self.with(|db| db.resolve_mutual_request(uuid, accept))
    }

    fn register_node(&self, info: &NodeInfo) -> Result<()> {
        self.with(|db| db.register_node(info))
    }

    fn node_is_reachable(
        &self,
        addr: &NodeAddr,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with(|db| db.node_is_reachable(addr, ttl, now))
    }
}
