//! Friend and topic requests, and the relationship views they change.

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use courier_shared::constants::*;
use courier_shared::{ClientId, MutualKind, MutualRequest, Reaction, Response, RoutedCommand, TopicId};
use courier_store::Resolution;

use super::{ask_push, Locality, Router};
use crate::error::RouteError;

impl Router {
    pub(crate) async fn ask(
        &self,
        from: &ClientId,
        kind: MutualKind,
        target: String,
        topic: Option<TopicId>,
    ) -> Result<Response, RouteError> {
        let (to, topic) = match kind {
            MutualKind::AddFriend => {
                let to = ClientId::new(target);
                if &to == from {
                    return Err(RouteError::SelfRequest);
                }
                if self.store.are_friends(from, &to)? {
                    return Err(RouteError::AlreadyFriends(to));
                }
                (to, None)
            }
            MutualKind::AddTopic => {
                let topic = TopicId::new(target);
                let record = self
                    .store
                    .get_topic(&topic)?
                    .ok_or_else(|| RouteError::UnknownTopic(topic.clone()))?;
                if self.store.is_topic_member(&topic, from)? {
                    return Err(RouteError::AlreadyMember {
                        client: from.clone(),
                        topic,
                    });
                }
                (record.founder, Some(topic))
            }
            MutualKind::InviteTopic => {
                let to = ClientId::new(target);
                let Some(topic) = topic else {
                    return Err(RouteError::MissingArguments(SEND_ASK_CMD.to_string()));
                };
                if &to == from {
                    return Err(RouteError::SelfRequest);
                }
                if !self.store.is_topic_member(&topic, from)? {
                    return Err(RouteError::NotAMember(topic));
                }
                if self.store.is_topic_member(&topic, &to)? {
                    return Err(RouteError::AlreadyMember { client: to, topic });
                }
                (to, Some(topic))
            }
        };

        let request = MutualRequest::new(from.clone(), to, kind, topic);
        self.store.record_mutual_request(&request)?;
        info!(uuid = %request.uuid, kind = %request.kind, from = %request.from, to = %request.to, "Request recorded");
        self.deliver_ask(&request).await;
        Ok(Response::ok(RESP_ASK_CMD).arg(request.uuid.to_string()))
    }

    pub(crate) async fn deliver_ask(&self, request: &MutualRequest) {
        let now = Utc::now();
        match self.locate(&request.to, now).await {
            Locality::Local(conn) => {
                if self.push(&conn, &ask_push(request)) {
                    self.acks.mutual.register(request.uuid, now).await;
                }
            }
            Locality::Remote(node) => {
                let command = RoutedCommand::DeliverAsk(request.clone());
                if let Err(e) = self.forward(&node, &command).await {
                    warn!(uuid = %request.uuid, error = %e, "Request not forwarded, left pending");
                }
            }
            Locality::Offline => debug!(uuid = %request.uuid, to = %request.to, "Target offline, request pending"),
        }
    }

    /// Accept or refuse a request addressed to `client`, then tell the requester.
    pub(crate) async fn react(
        &self,
        client: &ClientId,
        reaction: Reaction,
        uuid: Uuid,
    ) -> Result<Response, RouteError> {
        let request = self
            .store
            .get_mutual_request(uuid)?
            .ok_or(RouteError::UnknownRequest(uuid))?;
        if &request.to != client {
            return Err(RouteError::NotAddressee(uuid));
        }

        let resolution = self
            .store
            .resolve_mutual_request(uuid, reaction == Reaction::Agree)?;
        let request = match resolution {
            Resolution::Accepted(r) | Resolution::Refused(r) => r,
            Resolution::AlreadyResolved(_) => return Err(RouteError::AlreadyResolved(uuid)),
        };
        info!(uuid = %uuid, reaction = reaction.as_str(), kind = %request.kind, "Request resolved");

        // Answering implies the request arrived.
        self.acks.mutual.acknowledge(&uuid).await;
        if let Err(e) = self.store.mark_mutual_read(uuid, client) {
            warn!(uuid = %uuid, error = %e, "Failed to mark request read");
        }

        let notice = Response::ok(RECEIVE_REACT_CMD)
            .arg(reaction.as_str())
            .arg(request.kind.as_str())
            .arg(client.as_str())
            .arg(uuid.to_string())
            .arg(request.topic.as_ref().map(|t| t.as_str()).unwrap_or_default());
        self.notify(&request.from, notice).await;

        Ok(Response::ok(RESP_REACT_CMD)
            .arg(reaction.as_str())
            .arg(uuid.to_string()))
    }

    pub(crate) async fn ack_mutual(&self, client: &ClientId, uuid: Uuid) {
        match self.store.mark_mutual_read(uuid, client) {
            Ok(true) => {}
            Ok(false) => {
                warn!(client = %client, uuid = %uuid, "Request receipt from a client other than the target");
                return;
            }
            Err(e) => {
                warn!(client = %client, uuid = %uuid, error = %e, "Failed to mark request read");
                return;
            }
        }
        if !self.acks.mutual.acknowledge(&uuid).await {
            debug!(client = %client, uuid = %uuid, "Late or duplicate request receipt");
        }
    }

    /// Unresolved requests addressed to `client`, one JSON record per arg.
    pub(crate) fn list_asks(&self, client: &ClientId) -> Result<Response, RouteError> {
        let pending = self.store.pending_mutual_requests(client)?;
        let mut resp = Response::ok(RESP_ASK_CMD).arg(LIST_ASK_CMD);
        for request in &pending {
            match serde_json::to_string(request) {
                Ok(json) => resp = resp.arg(json),
                Err(e) => warn!(uuid = %request.uuid, error = %e, "Failed to encode request"),
            }
        }
        Ok(resp)
    }

    pub(crate) fn view_friends(&self, client: &ClientId) -> Result<Response, RouteError> {
        let friends = self.store.get_client_relationships(client)?;
        Ok(Response::ok(RESP_FRIENDS_CMD)
            .arg(VIEW_FRIENDS_CMD)
            .args(friends.into_iter().map(|f| f.0)))
    }

    pub(crate) fn delete_friend(
        &self,
        client: &ClientId,
        friend: ClientId,
    ) -> Result<Response, RouteError> {
        if !self.store.remove_friendship(client, &friend)? {
            return Err(RouteError::NotFriends(friend));
        }
        info!(client = %client, friend = %friend, "Friendship removed");
        Ok(Response::ok(RESP_FRIENDS_CMD)
            .arg(DEL_FRIEND_CMD)
            .arg(friend.as_str()))
    }
}
