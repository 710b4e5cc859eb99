//! Identity binding, logout, eviction and the offline push on login.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use courier_shared::constants::*;
use courier_shared::{ClientId, Frame, Response, RoutedCommand};
use courier_store::StoredMessage;

use super::{ask_push, p2p_push, topic_push, ConnState, Router};
use crate::ack::TopicAckKey;
use crate::channel::ChannelName;
use crate::connection::{ConnId, Connection};
use crate::error::RouteError;
use crate::session::Session;

/// Why a session left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictReason {
    Logout,
    Disconnected,
    Expired,
    /// The client logged in on another node.
    Relocated,
}

impl EvictReason {
    fn as_str(&self) -> &'static str {
        match self {
            EvictReason::Logout => "logout",
            EvictReason::Disconnected => "disconnected",
            EvictReason::Expired => "expired",
            EvictReason::Relocated => "relocated",
        }
    }
}

impl Router {
    /// Bind `client` to the connection in `state`.
    pub(crate) async fn login(
        &self,
        state: &mut ConnState,
        client: ClientId,
        request_id: Option<String>,
    ) -> Result<(), RouteError> {
        if client.is_empty() {
            return Err(RouteError::MissingArguments(SEND_CLIENT_ID_CMD.to_string()));
        }
        let now = Utc::now();

        // A connection re-binding to another identity drops the old one first.
        if let Some(previous) = state.client.take() {
            if previous != client {
                self.evict(&previous, Some(state.conn.id()), EvictReason::Logout)
                    .await;
            }
        }

        // Claim ownership from another node before binding here.
        match self.store.get_client_location(&client) {
            Ok(Some(location)) if location.alive && location.node != self.local => {
                info!(client = %client, node = %location.node, "Client relocating from another node");
                let command = RoutedCommand::ClientRelocated {
                    client: client.clone(),
                };
                if let Err(e) = self.forward(&location.node, &command).await {
                    warn!(client = %client, error = %e, "Relocation notice not published");
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(client = %client, error = %e, "Directory lookup failed during login, consistency risk");
            }
        }

        if let Some(displaced) = self
            .sessions
            .insert(client.clone(), state.conn.clone(), now)
            .await
        {
            let err = RouteError::DuplicateSession(client.clone());
            info!(error = %err, conn = %displaced.id(), "Evicting prior session");
            let notice = Response::ok(RESP_LOGOUT_CMD).with_message(MSG_RELOGIN);
            self.push(&displaced, &notice);
            displaced.close();
        }

        if let Err(e) = self.store.upsert_client_session(&client, &self.local, true) {
            warn!(client = %client, error = %e, "Failed to record session location, consistency risk");
        }
        self.announce_status(&client, true).await;
        state.client = Some(client.clone());
        info!(client = %client, conn = %state.conn.id(), "Client bound");

        let resp = Response::ok(RESP_CLIENT_ID_CMD)
            .arg(client.as_str())
            .reply_to(request_id);
        self.push(&state.conn, &resp);

        self.push_offline(&client, &state.conn).await;
        Ok(())
    }

    pub(crate) async fn logout(&self, client: &ClientId, state: &mut ConnState) {
        self.evict(client, Some(state.conn.id()), EvictReason::Logout)
            .await;
        state.client = None;
    }

    /// Remove the session of `client`.
    ///
    /// With `conn` set, only a session still bound to that connection is
    /// removed. Relocated sessions are not marked offline: the store already
    /// names the new owner.
    pub async fn evict(&self, client: &ClientId, conn: Option<ConnId>, reason: EvictReason) -> bool {
        let removed = match conn {
            Some(id) => self.sessions.evict_if(client, id).await,
            None => self.sessions.remove(client).await,
        };
        let Some(session) = removed else {
            return false;
        };
        self.finish_eviction(&session, reason).await;
        true
    }

    /// Close, mark offline and announce a session already out of the registry.
    pub(crate) async fn finish_eviction(&self, session: &Session, reason: EvictReason) {
        let client = &session.client;
        info!(client = %client, conn = %session.conn.id(), reason = reason.as_str(), "Session evicted");

        match reason {
            EvictReason::Relocated => {
                let notice = Response::ok(RESP_LOGOUT_CMD).with_message(MSG_RELOGIN);
                self.push(&session.conn, &notice);
                session.conn.close();
            }
            EvictReason::Expired => session.conn.close(),
            EvictReason::Logout | EvictReason::Disconnected => {}
        }

        if reason != EvictReason::Relocated {
            match self.store.set_client_offline(client, &self.local) {
                Ok(true) => {}
                Ok(false) => debug!(client = %client, "Store already names another owner"),
                Err(e) => warn!(client = %client, error = %e, "Failed to mark client offline, consistency risk"),
            }
        }
        self.bus.leave_all(session.conn.id()).await;
        self.announce_status(client, false).await;
    }

    /// Tear down whatever was attached to a connection that went away.
    pub async fn connection_closed(&self, conn: &Arc<Connection>) {
        self.bus.leave_all(conn.id()).await;
        if let Some(client) = self.sessions.client_of(conn.id()).await {
            self.evict(&client, Some(conn.id()), EvictReason::Disconnected)
                .await;
        }
    }

    async fn announce_status(&self, client: &ClientId, online: bool) {
        let status = Frame::new(CLIENT_STATUS_CMD)
            .arg(client.as_str())
            .arg(self.local.as_str())
            .arg(if online { "online" } else { "offline" });
        self.bus.broadcast(ChannelName::ClientStatus, &status).await;
    }

    /// Push everything stored for `client` while it was away.
    pub(crate) async fn push_offline(&self, client: &ClientId, conn: &Connection) {
        let now = Utc::now();
        match self.store.read_undelivered_messages(client) {
            Ok(messages) => {
                if !messages.is_empty() {
                    info!(client = %client, count = messages.len(), "Pushing offline messages");
                }
                for message in messages {
                    match message {
                        StoredMessage::Direct(m) => {
                            if self.push(conn, &p2p_push(&m)) {
                                self.acks.p2p.register(m.uuid, now).await;
                            }
                        }
                        StoredMessage::Topic(m) => {
                            if self.push(conn, &topic_push(&m)) {
                                let key = TopicAckKey::new(client.clone(), m.uuid);
                                self.acks.topic.register(key, now).await;
                            }
                        }
                    }
                }
            }
            Err(e) => warn!(client = %client, error = %e, "Failed to read offline messages"),
        }

        match self.store.pending_mutual_requests(client) {
            Ok(requests) => {
                for request in requests {
                    if self.push(conn, &ask_push(&request)) {
                        self.acks.mutual.register(request.uuid, now).await;
                    }
                }
            }
            Err(e) => warn!(client = %client, error = %e, "Failed to read pending requests"),
        }
    }
}
