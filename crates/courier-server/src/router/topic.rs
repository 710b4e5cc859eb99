//! Topic fan-out and topic management.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use courier_shared::command::format_time;
use courier_shared::constants::*;
use courier_shared::{ClientId, Frame, NodeAddr, Response, RoutedCommand, TopicId, TopicMessage};
use courier_store::{TopicMember, TopicRecord};

use super::{topic_push, Router};
use crate::ack::TopicAckKey;
use crate::channel::ChannelName;
use crate::error::RouteError;

/// Recipients of one topic message split by where they can be reached.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Partition {
    pub local: Vec<ClientId>,
    /// One group per owning node.
    pub remote: BTreeMap<NodeAddr, Vec<ClientId>>,
    pub offline: Vec<ClientId>,
}

/// Split `members` into local, per-node remote and offline groups.
///
/// `bound_here` holds the members with a session on this node; those are
/// local whatever the store says. Members the store places on this node
/// without a session are offline.
pub fn partition_members(
    members: Vec<TopicMember>,
    local: &NodeAddr,
    bound_here: &HashSet<ClientId>,
) -> Partition {
    let mut partition = Partition::default();
    for member in members {
        if bound_here.contains(&member.client) {
            partition.local.push(member.client);
            continue;
        }
        match member.node {
            Some(node) if member.alive && &node != local => {
                partition.remote.entry(node).or_default().push(member.client);
            }
            _ => partition.offline.push(member.client),
        }
    }
    partition
}

/// What one fan-out did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FanOut {
    pub local: usize,
    pub envelopes: usize,
    pub offline: usize,
}

impl Router {
    pub(crate) async fn send_topic(
        &self,
        from: &ClientId,
        topic: TopicId,
        content: String,
    ) -> Result<Response, RouteError> {
        let members = self
            .store
            .get_topic_members(&topic)?
            .ok_or_else(|| RouteError::UnknownTopic(topic.clone()))?;
        if !members.iter().any(|m| &m.client == from) {
            return Err(RouteError::NotAMember(topic));
        }

        let message = TopicMessage::new(topic, from.clone(), content);
        let recipients: Vec<TopicMember> =
            members.into_iter().filter(|m| &m.client != from).collect();
        let ids: Vec<ClientId> = recipients.iter().map(|m| m.client.clone()).collect();
        self.store.record_topic_message(&message, &ids)?;

        let fan_out = self.fan_out(&message, recipients, Utc::now()).await;
        debug!(
            uuid = %message.uuid,
            topic = %message.topic,
            local = fan_out.local,
            envelopes = fan_out.envelopes,
            offline = fan_out.offline,
            "Topic message fanned out"
        );
        Ok(Response::ok(RESP_SEND_TOPIC_CMD)
            .arg(message.uuid.to_string())
            .arg(format_time(&message.time)))
    }

    /// Deliver to local members and send one envelope per remote node.
    pub(crate) async fn fan_out(
        &self,
        message: &TopicMessage,
        recipients: Vec<TopicMember>,
        now: DateTime<Utc>,
    ) -> FanOut {
        let bound = self
            .sessions
            .bound_among(recipients.iter().map(|m| &m.client))
            .await;
        let partition = partition_members(recipients, &self.local, &bound);
        let mut result = FanOut {
            offline: partition.offline.len(),
            ..FanOut::default()
        };

        for member in &partition.local {
            if self.deliver_topic_local(message, member, now).await {
                result.local += 1;
            }
        }

        for (node, members) in partition.remote {
            if !self.node_reachable(&node, now) {
                warn!(node = %node, uuid = %message.uuid, "Owning node unreachable, members left offline");
                result.offline += members.len();
                continue;
            }
            let command = RoutedCommand::DeliverTopic {
                message: message.clone(),
                members,
            };
            match self.forward(&node, &command).await {
                Ok(_) => result.envelopes += 1,
                Err(e) => warn!(node = %node, error = %e, "Topic envelope not published"),
            }
        }
        result
    }

    /// Push to one local member and track its receipt.
    pub(crate) async fn deliver_topic_local(
        &self,
        message: &TopicMessage,
        member: &ClientId,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(conn) = self.sessions.lookup(member).await else {
            return false;
        };
        if !self.push(&conn, &topic_push(message)) {
            return false;
        }
        let key = TopicAckKey::new(member.clone(), message.uuid);
        self.acks.topic.register(key, now).await;
        true
    }

    pub(crate) async fn ack_topic(&self, client: &ClientId, uuid: Uuid) {
        let key = TopicAckKey::new(client.clone(), uuid);
        if !self.acks.topic.acknowledge(&key).await {
            debug!(client = %client, uuid = %uuid, "Late or duplicate topic receipt");
        }
        if let Err(e) = self.store.mark_topic_delivered(uuid, client) {
            warn!(client = %client, uuid = %uuid, error = %e, "Failed to mark delivered");
        }
    }

    // -- Management --

    pub(crate) async fn create_topic(
        &self,
        founder: &ClientId,
        topic: TopicId,
    ) -> Result<Response, RouteError> {
        let record = TopicRecord {
            topic: topic.clone(),
            founder: founder.clone(),
            node: self.local.clone(),
            created_at: Utc::now(),
        };
        if !self.store.create_topic(&record)? {
            return Err(RouteError::TopicExists(topic));
        }
        info!(topic = %topic, founder = %founder, "Topic created");
        let status = Frame::new(TOPIC_STATUS_CMD)
            .arg(topic.as_str())
            .arg(founder.as_str())
            .arg("created");
        self.bus.broadcast(ChannelName::TopicStatus, &status).await;
        Ok(Response::ok(RESP_TOPIC_CMD)
            .arg(CREATE_TOPIC_CMD)
            .arg(topic.as_str()))
    }

    pub(crate) async fn join_topic(
        &self,
        client: &ClientId,
        topic: TopicId,
    ) -> Result<Response, RouteError> {
        if self.store.get_topic(&topic)?.is_none() {
            return Err(RouteError::UnknownTopic(topic));
        }
        if !self.store.add_topic_member(&topic, client)? {
            return Err(RouteError::AlreadyMember {
                client: client.clone(),
                topic,
            });
        }
        self.announce_membership(&topic, client, "join").await;
        Ok(Response::ok(RESP_TOPIC_CMD)
            .arg(JOIN_TOPIC_CMD)
            .arg(topic.as_str()))
    }

    pub(crate) async fn leave_topic(
        &self,
        client: &ClientId,
        topic: TopicId,
    ) -> Result<Response, RouteError> {
        if !self.store.remove_topic_member(&topic, client)? {
            return Err(RouteError::NotAMember(topic));
        }
        self.announce_membership(&topic, client, "leave").await;
        Ok(Response::ok(RESP_TOPIC_CMD)
            .arg(LEAVE_TOPIC_CMD)
            .arg(topic.as_str()))
    }

    pub(crate) fn list_topics(&self, client: &ClientId) -> Result<Response, RouteError> {
        let topics = self.store.topics_for_client(client)?;
        Ok(Response::ok(RESP_TOPIC_CMD)
            .arg(LIST_TOPIC_CMD)
            .args(topics.into_iter().map(|t| t.0)))
    }

    /// Members as `client:online` / `client:offline`. Members only.
    pub(crate) fn topic_members(
        &self,
        client: &ClientId,
        topic: TopicId,
    ) -> Result<Response, RouteError> {
        let members = self
            .store
            .get_topic_members(&topic)?
            .ok_or_else(|| RouteError::UnknownTopic(topic.clone()))?;
        if !members.iter().any(|m| &m.client == client) {
            return Err(RouteError::NotAMember(topic));
        }
        let listed = members.into_iter().map(|m| {
            let state = if m.alive { "online" } else { "offline" };
            format!("{}:{}", m.client, state)
        });
        Ok(Response::ok(RESP_TOPIC_CMD)
            .arg(TOPIC_MEMBERS_LIST_CMD)
            .arg(topic.as_str())
            .args(listed))
    }

    pub(crate) async fn announce_membership(&self, topic: &TopicId, client: &ClientId, change: &str) {
        let sync = Frame::new(TOPIC_SYNC_CMD)
            .arg(topic.as_str())
            .arg(client.as_str())
            .arg(change);
        self.bus.broadcast(ChannelName::TopicSync, &sync).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(client: &str, node: Option<&str>, alive: bool) -> TopicMember {
        TopicMember {
            client: ClientId::from(client),
            node: node.map(NodeAddr::from),
            alive,
        }
    }

    #[test]
    fn test_partition_groups_by_owning_node() {
        let local = NodeAddr::from("n1");
        let members = vec![
            member("alice", Some("n1"), true),
            member("bob", Some("n2"), true),
            member("carol", Some("n2"), true),
            member("dave", Some("n3"), true),
            member("erin", Some("n3"), false),
            member("frank", None, false),
            member("grace", Some("n1"), true),
        ];
        let bound: HashSet<ClientId> = [ClientId::from("alice")].into_iter().collect();

        let p = partition_members(members, &local, &bound);

        assert_eq!(p.local, vec![ClientId::from("alice")]);
        assert_eq!(p.remote.len(), 2);
        assert_eq!(p.remote[&NodeAddr::from("n2")].len(), 2);
        assert_eq!(p.remote[&NodeAddr::from("n3")], vec![ClientId::from("dave")]);
        // erin is not alive, frank never logged in, grace has no session here.
        assert_eq!(p.offline.len(), 3);
    }

    #[test]
    fn test_local_session_wins_over_stale_store_entry() {
        let local = NodeAddr::from("n1");
        let bound: HashSet<ClientId> = [ClientId::from("bob")].into_iter().collect();
        let p = partition_members(vec![member("bob", Some("n2"), true)], &local, &bound);
        assert_eq!(p.local, vec![ClientId::from("bob")]);
        assert!(p.remote.is_empty());
    }
}
