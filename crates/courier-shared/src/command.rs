//! Closed command registries.
//!
//! Frames are decoded exactly once, at the edge, into [`ClientCommand`] (what a
//! connected client may ask for) or [`RoutedCommand`] (what a peer node may
//! forward). Everything downstream matches on these enums exhaustively.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::*;
use crate::error::ProtocolError;
use crate::message::{DirectMessage, MutualRequest, TopicMessage};
use crate::protocol::{Frame, Response};
use crate::types::{ClientId, TopicId};

/// Kind of a mutual (friend/invite) request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutualKind {
    /// Befriend the target client.
    AddFriend,
    /// Ask the founder of a topic to be let in.
    AddTopic,
    /// Invite the target client into a topic the requester belongs to.
    InviteTopic,
}

impl MutualKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutualKind::AddFriend => ASK_ADD_FRIEND,
            MutualKind::AddTopic => ASK_ADD_TOPIC,
            MutualKind::InviteTopic => ASK_INVITE_TOPIC,
        }
    }

    pub fn parse(s: &str) -> Result<Self, ProtocolError> {
        match s {
            ASK_ADD_FRIEND => Ok(MutualKind::AddFriend),
            ASK_ADD_TOPIC => Ok(MutualKind::AddTopic),
            ASK_INVITE_TOPIC => Ok(MutualKind::InviteTopic),
            other => Err(ProtocolError::UnknownKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for MutualKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Agree,
    Refuse,
}

impl Reaction {
    pub fn parse(s: &str) -> Result<Self, ProtocolError> {
        match s {
            REACT_AGREE => Ok(Reaction::Agree),
            REACT_REFUSE => Ok(Reaction::Refuse),
            other => Err(ProtocolError::UnknownReaction(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Reaction::Agree => REACT_AGREE,
            Reaction::Refuse => REACT_REFUSE,
        }
    }
}

/// Commands a client connection may send.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    Login { client: ClientId },
    Logout,
    Ping,
    SubscribeChannel { channel: String, subscriber: String },
    SendP2p { to: ClientId, content: String },
    P2pAck { uuid: Uuid },
    SendTopic { topic: TopicId, content: String },
    TopicAck { uuid: Uuid },
    CreateTopic { topic: TopicId },
    JoinTopic { topic: TopicId },
    LeaveTopic { topic: TopicId },
    ListTopics,
    TopicMembers { topic: TopicId },
    ViewFriends,
    DelFriend { friend: ClientId },
    Ask {
        kind: MutualKind,
        target: String,
        topic: Option<TopicId>,
    },
    React { reaction: Reaction, uuid: Uuid },
    MutualAck { uuid: Uuid },
    ListAsks,
    /// Name outside the registry. Kept as a value so the router can report it.
    Unknown { name: String },
}

impl ClientCommand {
    pub fn decode(frame: &Frame) -> Result<Self, ProtocolError> {
        let a = &frame.args;
        let cmd = match frame.name.as_str() {
            SEND_CLIENT_ID_CMD => {
                frame.require_args(1)?;
                ClientCommand::Login {
                    client: ClientId::new(a[0].trim()),
                }
            }
            SEND_LOGOUT_CMD => ClientCommand::Logout,
            SEND_PING_CMD => ClientCommand::Ping,
            SUBSCRIBE_CHANNEL_CMD => {
                frame.require_args(2)?;
                ClientCommand::SubscribeChannel {
                    channel: a[0].clone(),
                    subscriber: a[1].clone(),
                }
            }
            SEND_MESSAGE_P2P_CMD => {
                frame.require_args(2)?;
                ClientCommand::SendP2p {
                    to: ClientId::new(a[0].as_str()),
                    content: a[1].clone(),
                }
            }
            P2P_ACK_CMD => {
                frame.require_args(1)?;
                ClientCommand::P2pAck {
                    uuid: Uuid::parse_str(&a[0])?,
                }
            }
            SEND_MESSAGE_TOPIC_CMD => {
                frame.require_args(2)?;
                ClientCommand::SendTopic {
                    topic: TopicId::new(a[0].as_str()),
                    content: a[1].clone(),
                }
            }
            TOPIC_ACK_CMD => {
                frame.require_args(1)?;
                ClientCommand::TopicAck {
                    uuid: Uuid::parse_str(&a[0])?,
                }
            }
            CREATE_TOPIC_CMD => {
                frame.require_args(1)?;
                ClientCommand::CreateTopic {
                    topic: TopicId::new(a[0].as_str()),
                }
            }
            JOIN_TOPIC_CMD => {
                frame.require_args(1)?;
                ClientCommand::JoinTopic {
                    topic: TopicId::new(a[0].as_str()),
                }
            }
            LEAVE_TOPIC_CMD => {
                frame.require_args(1)?;
                ClientCommand::LeaveTopic {
                    topic: TopicId::new(a[0].as_str()),
                }
            }
            LIST_TOPIC_CMD => ClientCommand::ListTopics,
            TOPIC_MEMBERS_LIST_CMD => {
                frame.require_args(1)?;
                ClientCommand::TopicMembers {
                    topic: TopicId::new(a[0].as_str()),
                }
            }
            VIEW_FRIENDS_CMD => ClientCommand::ViewFriends,
            DEL_FRIEND_CMD => {
                frame.require_args(1)?;
                ClientCommand::DelFriend {
                    friend: ClientId::new(a[0].as_str()),
                }
            }
            SEND_ASK_CMD => {
                frame.require_args(2)?;
                let kind = MutualKind::parse(&a[0])?;
                if kind == MutualKind::InviteTopic {
                    frame.require_args(3)?;
                }
                ClientCommand::Ask {
                    kind,
                    target: a[1].clone(),
                    topic: a.get(2).map(|t| TopicId::new(t.as_str())),
                }
            }
            SEND_REACT_CMD => {
                frame.require_args(2)?;
                ClientCommand::React {
                    reaction: Reaction::parse(&a[0])?,
                    uuid: Uuid::parse_str(&a[1])?,
                }
            }
            MUTUAL_ACK_CMD => {
                frame.require_args(1)?;
                ClientCommand::MutualAck {
                    uuid: Uuid::parse_str(&a[0])?,
                }
            }
            LIST_ASK_CMD => ClientCommand::ListAsks,
            other => ClientCommand::Unknown {
                name: other.to_string(),
            },
        };
        Ok(cmd)
    }

    /// Commands accepted before an identity is bound to the connection.
    pub fn is_identity_binding(&self) -> bool {
        matches!(self, ClientCommand::Login { .. })
    }
}

/// Commands carried inside a routed envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutedCommand {
    DeliverP2p(DirectMessage),
    DeliverTopic {
        message: TopicMessage,
        members: Vec<ClientId>,
    },
    DeliverAsk(MutualRequest),
    /// The client now lives on the envelope's origin node.
    ClientRelocated { client: ClientId },
    Notice {
        client: ClientId,
        response: Response,
    },
    Unknown { name: String },
}

impl RoutedCommand {
    pub fn decode(frame: &Frame) -> Result<Self, ProtocolError> {
        let a = &frame.args;
        let cmd = match frame.name.as_str() {
            ROUTE_MESSAGE_P2P_CMD => {
                frame.require_args(5)?;
                RoutedCommand::DeliverP2p(DirectMessage {
                    from: ClientId::new(a[0].as_str()),
                    to: ClientId::new(a[1].as_str()),
                    content: a[2].clone(),
                    uuid: Uuid::parse_str(&a[3])?,
                    time: parse_time(&a[4])?,
                })
            }
            ROUTE_MESSAGE_TOPIC_CMD => {
                frame.require_args(5)?;
                let members: Vec<ClientId> = match &frame.data {
                    Some(data) => serde_json::from_value(data.clone())?,
                    None => Vec::new(),
                };
                RoutedCommand::DeliverTopic {
                    message: TopicMessage {
                        topic: TopicId::new(a[0].as_str()),
                        from: ClientId::new(a[1].as_str()),
                        content: a[2].clone(),
                        uuid: Uuid::parse_str(&a[3])?,
                        time: parse_time(&a[4])?,
                    },
                    members,
                }
            }
            ROUTE_ASK_CMD => {
                frame.require_args(5)?;
                RoutedCommand::DeliverAsk(MutualRequest {
                    kind: MutualKind::parse(&a[0])?,
                    from: ClientId::new(a[1].as_str()),
                    to: ClientId::new(a[2].as_str()),
                    uuid: Uuid::parse_str(&a[3])?,
                    time: parse_time(&a[4])?,
                    topic: a
                        .get(5)
                        .filter(|t| !t.is_empty())
                        .map(|t| TopicId::new(t.as_str())),
                    resolved: false,
                })
            }
            ROUTE_CHANGE_MESSAGE_SERVER_CMD => {
                frame.require_args(1)?;
                RoutedCommand::ClientRelocated {
                    client: ClientId::new(a[0].as_str()),
                }
            }
            ROUTE_NOTICE_CMD => {
                frame.require_args(1)?;
                let data = frame
                    .data
                    .clone()
                    .ok_or_else(|| ProtocolError::NotAnEnvelope("notice without payload".into()))?;
                RoutedCommand::Notice {
                    client: ClientId::new(a[0].as_str()),
                    response: serde_json::from_value(data)?,
                }
            }
            other => RoutedCommand::Unknown {
                name: other.to_string(),
            },
        };
        Ok(cmd)
    }

    pub fn encode(&self) -> Result<Frame, ProtocolError> {
        let frame = match self {
            RoutedCommand::DeliverP2p(msg) => Frame::new(ROUTE_MESSAGE_P2P_CMD)
                .arg(msg.from.as_str())
                .arg(msg.to.as_str())
                .arg(msg.content.as_str())
                .arg(msg.uuid.to_string())
                .arg(format_time(&msg.time)),
            RoutedCommand::DeliverTopic { message, members } => {
                Frame::new(ROUTE_MESSAGE_TOPIC_CMD)
                    .arg(message.topic.as_str())
                    .arg(message.from.as_str())
                    .arg(message.content.as_str())
                    .arg(message.uuid.to_string())
                    .arg(format_time(&message.time))
                    .with_data(serde_json::to_value(members)?)
            }
            RoutedCommand::DeliverAsk(req) => Frame::new(ROUTE_ASK_CMD)
                .arg(req.kind.as_str())
                .arg(req.from.as_str())
                .arg(req.to.as_str())
                .arg(req.uuid.to_string())
                .arg(format_time(&req.time))
                .arg(req.topic.as_ref().map(|t| t.as_str()).unwrap_or_default()),
            RoutedCommand::ClientRelocated { client } => {
                Frame::new(ROUTE_CHANGE_MESSAGE_SERVER_CMD).arg(client.as_str())
            }
            RoutedCommand::Notice { client, response } => Frame::new(ROUTE_NOTICE_CMD)
                .arg(client.as_str())
                .with_data(serde_json::to_value(response)?),
            RoutedCommand::Unknown { name } => Frame::new(name.as_str()),
        };
        Ok(frame)
    }
}

/// Timestamps travel as RFC 3339 strings.
pub fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339()
}

pub fn parse_time(s: &str) -> Result<DateTime<Utc>, ProtocolError> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}
