//! Delivery router: decides, per decoded command, what happens to it.
//!
//! Client commands arrive through [`Router::handle_frame`], one at a time per
//! connection and in arrival order. Envelopes from peer nodes arrive through
//! [`Router::handle_routed`]. Background sweeps call [`Router::sweep_acks`]
//! and [`Router::scan_liveness`] with an explicit clock.

mod direct;
mod inbound;
mod mutual;
mod session;
mod sweep;
mod topic;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use courier_shared::constants::*;
use courier_shared::{
    ClientCommand, ClientId, DirectMessage, Frame, MutualRequest, NodeAddr, ProtocolError,
    Response, RoutedCommand, RoutedEnvelope, TopicMessage,
};
use courier_store::MessageStore;

use crate::ack::{AckEngine, AckPolicy};
use crate::channel::{ChannelBus, ChannelName};
use crate::connection::Connection;
use crate::error::RouteError;
use crate::session::SessionRegistry;

pub use self::session::EvictReason;
pub use self::sweep::SweepReport;

/// Static routing parameters of a node.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub local: NodeAddr,
    pub ack: AckPolicy,
    /// Age after which a node's directory registration no longer counts.
    pub directory_ttl: Duration,
}

/// Per-connection state owned by the task reading that connection.
pub struct ConnState {
    pub conn: Arc<Connection>,
    pub client: Option<ClientId>,
}

impl ConnState {
    pub fn new(conn: Arc<Connection>) -> Self {
        Self { conn, client: None }
    }
}

/// What the connection reader should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

/// Where a recipient can currently be reached.
#[derive(Debug)]
pub(crate) enum Locality {
    Local(Arc<Connection>),
    Remote(NodeAddr),
    Offline,
}

pub struct Router {
    pub(crate) local: NodeAddr,
    pub(crate) directory_ttl: Duration,
    pub(crate) store: Arc<dyn MessageStore>,
    pub sessions: SessionRegistry,
    pub bus: ChannelBus,
    pub acks: AckEngine,
}

impl Router {
    pub fn new(config: RouterConfig, store: Arc<dyn MessageStore>) -> Self {
        Self {
            local: config.local,
            directory_ttl: config.directory_ttl,
            store,
            sessions: SessionRegistry::new(),
            bus: ChannelBus::new(),
            acks: AckEngine::new(config.ack),
        }
    }

    pub fn local_addr(&self) -> &NodeAddr {
        &self.local
    }

    /// Process one frame received on a client connection.
    ///
    /// Never fails: every error becomes a response, a log line, or a
    /// request to close the connection.
    pub async fn handle_frame(&self, state: &mut ConnState, frame: Frame) -> Flow {
        let request_id = frame.request_id.clone();
        let command = match ClientCommand::decode(&frame) {
            Ok(command) => command,
            Err(ProtocolError::MissingArguments {
                command,
                expected,
                got,
            }) => {
                warn!(conn = %state.conn.id(), %command, expected, got, "Missing arguments, dropping");
                if command == SEND_CLIENT_ID_CMD && state.client.is_none() {
                    return Flow::Close;
                }
                return Flow::Continue;
            }
            Err(e) => {
                warn!(conn = %state.conn.id(), command = %frame.name, error = %e, "Malformed command");
                let err = RouteError::Protocol(e);
                self.reply(state, err.to_response(RESP_ERROR_CMD, request_id));
                return Flow::Continue;
            }
        };

        if !command.is_identity_binding() && !self.is_authenticated(state).await {
            warn!(conn = %state.conn.id(), command = %frame.name, "Unauthenticated command, closing");
            let resp = RouteError::NotAuthenticated.to_response(reply_name(&command), request_id);
            self.reply(state, resp);
            return Flow::Close;
        }

        let reply = reply_name(&command);
        let closes = matches!(command, ClientCommand::Logout);
        let binding = command.is_identity_binding();
        match self.dispatch(state, command, request_id.clone()).await {
            Ok(Some(resp)) => self.reply(state, resp),
            Ok(None) => {}
            Err(e) => {
                match &e {
                    RouteError::StoreUnavailable(inner) => {
                        warn!(conn = %state.conn.id(), error = %inner, "Store failure, command aborted")
                    }
                    RouteError::UnknownCommand(name) => {
                        warn!(conn = %state.conn.id(), command = %name, "Unknown command")
                    }
                    other => debug!(conn = %state.conn.id(), error = %other, "Command refused"),
                }
                self.reply(state, e.to_response(reply, request_id));
                if binding {
                    return Flow::Close;
                }
            }
        }

        if closes {
            Flow::Close
        } else {
            Flow::Continue
        }
    }

    async fn dispatch(
        &self,
        state: &mut ConnState,
        command: ClientCommand,
        request_id: Option<String>,
    ) -> Result<Option<Response>, RouteError> {
        if let ClientCommand::Login { client } = command {
            self.login(state, client, request_id).await?;
            return Ok(None);
        }
        let Some(me) = state.client.clone() else {
            return Err(RouteError::NotAuthenticated);
        };
        let now = Utc::now();

        let resp = match command {
            ClientCommand::Login { .. } => None,
            ClientCommand::Logout => {
                self.logout(&me, state).await;
                Some(Response::ok(RESP_LOGOUT_CMD))
            }
            ClientCommand::Ping => {
                self.sessions.mark_alive(&me, now).await;
                Some(Response::ok(RESP_PING_CMD))
            }
            // Channels carry other clients' traffic; peers join them on /peer.
            ClientCommand::SubscribeChannel { .. } => return Err(RouteError::PeerOnly),
            ClientCommand::SendP2p { to, content } => Some(self.send_p2p(&me, to, content).await?),
            ClientCommand::P2pAck { uuid } => {
                self.ack_p2p(&me, uuid).await;
                None
            }
            ClientCommand::SendTopic { topic, content } => {
                Some(self.send_topic(&me, topic, content).await?)
            }
            ClientCommand::TopicAck { uuid } => {
                self.ack_topic(&me, uuid).await;
                None
            }
            ClientCommand::CreateTopic { topic } => Some(self.create_topic(&me, topic).await?),
            ClientCommand::JoinTopic { topic } => Some(self.join_topic(&me, topic).await?),
            ClientCommand::LeaveTopic { topic } => Some(self.leave_topic(&me, topic).await?),
            ClientCommand::ListTopics => Some(self.list_topics(&me)?),
            ClientCommand::TopicMembers { topic } => Some(self.topic_members(&me, topic)?),
            ClientCommand::ViewFriends => Some(self.view_friends(&me)?),
            ClientCommand::DelFriend { friend } => Some(self.delete_friend(&me, friend)?),
            ClientCommand::Ask {
                kind,
                target,
                topic,
            } => Some(self.ask(&me, kind, target, topic).await?),
            ClientCommand::React { reaction, uuid } => {
                Some(self.react(&me, reaction, uuid).await?)
            }
            ClientCommand::MutualAck { uuid } => {
                self.ack_mutual(&me, uuid).await;
                None
            }
            ClientCommand::ListAsks => Some(self.list_asks(&me)?),
            ClientCommand::Unknown { name } => return Err(RouteError::UnknownCommand(name)),
        };
        Ok(resp.map(|r| r.reply_to(request_id)))
    }

    /// The connection is authenticated while its identity is still bound to it.
    async fn is_authenticated(&self, state: &ConnState) -> bool {
        match &state.client {
            Some(client) => self.sessions.is_bound_to(client, state.conn.id()).await,
            None => false,
        }
    }

    fn reply(&self, state: &ConnState, resp: Response) {
        if let Err(e) = state.conn.send(&resp) {
            debug!(conn = %state.conn.id(), error = %e, "Reply not delivered");
        }
    }

    /// Resolve where `client` can be reached right now.
    ///
    /// Directory trouble degrades to `Offline`: the message is already stored
    /// and will be pushed when the client logs in again.
    pub(crate) async fn locate(&self, client: &ClientId, now: DateTime<Utc>) -> Locality {
        if let Some(conn) = self.sessions.lookup(client).await {
            return Locality::Local(conn);
        }
        let location = match self.store.get_client_location(client) {
            Ok(Some(location)) => location,
            Ok(None) => return Locality::Offline,
            Err(e) => {
                warn!(client = %client, error = %e, "Directory lookup failed");
                return Locality::Offline;
            }
        };
        if !location.alive || location.node == self.local {
            return Locality::Offline;
        }
        if self.node_reachable(&location.node, now) {
            Locality::Remote(location.node)
        } else {
            let err = RouteError::DirectoryInconsistent {
                client: client.clone(),
                node: location.node,
            };
            warn!(error = %err, "Degrading to offline delivery");
            Locality::Offline
        }
    }

    pub(crate) fn node_reachable(&self, node: &NodeAddr, now: DateTime<Utc>) -> bool {
        match self.store.node_is_reachable(node, self.directory_ttl, now) {
            Ok(reachable) => reachable,
            Err(e) => {
                warn!(node = %node, error = %e, "Node directory lookup failed");
                false
            }
        }
    }

    /// Wrap `command` for `target` and publish it on the dispatch channel.
    ///
    /// Returns the number of peer links that took the envelope.
    pub(crate) async fn forward(
        &self,
        target: &NodeAddr,
        command: &RoutedCommand,
    ) -> Result<usize, RouteError> {
        let envelope = RoutedEnvelope::new(target.clone(), self.local.clone(), command)?;
        let reached = self
            .bus
            .broadcast(ChannelName::Dispatch, &envelope.to_frame())
            .await;
        if reached == 0 {
            warn!(target = %target, command = %envelope.inner.name, "No peer link took the envelope");
        } else {
            info!(target = %target, command = %envelope.inner.name, "Envelope published");
        }
        Ok(reached)
    }

    /// Push a response to a local connection. Returns whether it was queued.
    pub(crate) fn push(&self, conn: &Connection, resp: &Response) -> bool {
        match conn.send(resp) {
            Ok(()) => true,
            Err(e) => {
                debug!(conn = %conn.id(), push = %resp.name, error = %e, "Push failed");
                false
            }
        }
    }

    /// Deliver a prepared response to `client` wherever it lives. No receipt.
    pub(crate) async fn notify(&self, client: &ClientId, resp: Response) {
        match self.locate(client, Utc::now()).await {
            Locality::Local(conn) => {
                self.push(&conn, &resp);
            }
            Locality::Remote(node) => {
                let command = RoutedCommand::Notice {
                    client: client.clone(),
                    response: resp,
                };
                if let Err(e) = self.forward(&node, &command).await {
                    warn!(client = %client, error = %e, "Notice not forwarded");
                }
            }
            Locality::Offline => debug!(client = %client, "Notice dropped, client offline"),
        }
    }
}

/// Name of the response sent back for a command.
fn reply_name(command: &ClientCommand) -> &'static str {
    match command {
        ClientCommand::Login { .. } => RESP_CLIENT_ID_CMD,
        ClientCommand::Logout => RESP_LOGOUT_CMD,
        ClientCommand::Ping => RESP_PING_CMD,
        ClientCommand::SendP2p { .. } | ClientCommand::P2pAck { .. } => RESP_SEND_P2P_CMD,
        ClientCommand::SendTopic { .. } | ClientCommand::TopicAck { .. } => RESP_SEND_TOPIC_CMD,
        ClientCommand::CreateTopic { .. }
        | ClientCommand::JoinTopic { .. }
        | ClientCommand::LeaveTopic { .. }
        | ClientCommand::ListTopics
        | ClientCommand::TopicMembers { .. } => RESP_TOPIC_CMD,
        ClientCommand::ViewFriends | ClientCommand::DelFriend { .. } => RESP_FRIENDS_CMD,
        ClientCommand::Ask { .. } | ClientCommand::ListAsks | ClientCommand::MutualAck { .. } => {
            RESP_ASK_CMD
        }
        ClientCommand::React { .. } => RESP_REACT_CMD,
        ClientCommand::SubscribeChannel { .. } | ClientCommand::Unknown { .. } => RESP_ERROR_CMD,
    }
}

// -- Pushes --

pub(crate) fn p2p_push(message: &DirectMessage) -> Response {
    Response::ok(RESP_MESSAGE_P2P_CMD)
        .arg(message.content.as_str())
        .arg(message.from.as_str())
        .arg(message.uuid.to_string())
        .arg(courier_shared::command::format_time(&message.time))
}

pub(crate) fn topic_push(message: &TopicMessage) -> Response {
    Response::ok(RESP_MESSAGE_TOPIC_CMD)
        .arg(message.content.as_str())
        .arg(message.topic.as_str())
        .arg(message.from.as_str())
        .arg(message.uuid.to_string())
        .arg(courier_shared::command::format_time(&message.time))
}

pub(crate) fn ask_push(request: &MutualRequest) -> Response {
    Response::ok(RECEIVE_ASK_CMD)
        .arg(request.kind.as_str())
        .arg(request.from.as_str())
        .arg(courier_shared::command::format_time(&request.time))
        .arg(request.uuid.to_string())
        .arg(request.topic.as_ref().map(|t| t.as_str()).unwrap_or_default())
}
