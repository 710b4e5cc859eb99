use thiserror::Error;
use uuid::Uuid;

use courier_shared::constants::{MSG_INTERNAL, MSG_NOT_AUTHENTICATED, MSG_UNKNOWN_COMMAND};
use courier_shared::{ClientId, NodeAddr, ProtocolError, Response, TopicId};
use courier_store::StoreError;

/// Failures while routing a single command.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("command requires a bound identity")]
    NotAuthenticated,

    #[error("missing arguments for {0}")]
    MissingArguments(String),

    #[error("malformed command: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("owning node {node} of {client} is unreachable")]
    DirectoryInconsistent { client: ClientId, node: NodeAddr },

    #[error("delivery of {0} abandoned after exhausting retries")]
    AckExhausted(Uuid),

    #[error("{0} logged in again, prior session evicted")]
    DuplicateSession(ClientId),

    #[error("unknown command {0}")]
    UnknownCommand(String),

    #[error("topic {0} does not exist")]
    UnknownTopic(TopicId),

    #[error("topic {0} already exists")]
    TopicExists(TopicId),

    #[error("not a member of topic {0}")]
    NotAMember(TopicId),

    #[error("{client} is already a member of topic {topic}")]
    AlreadyMember { client: ClientId, topic: TopicId },

    #[error("already friends with {0}")]
    AlreadyFriends(ClientId),

    #[error("not friends with {0}")]
    NotFriends(ClientId),

    #[error("a request cannot target its own sender")]
    SelfRequest,

    #[error("request {0} does not exist")]
    UnknownRequest(Uuid),

    #[error("request {0} is addressed to someone else")]
    NotAddressee(Uuid),

    #[error("request {0} was already resolved")]
    AlreadyResolved(Uuid),

    #[error("channel subscriptions are only accepted on peer links")]
    PeerOnly,
}

impl RouteError {
    /// Build the failure response for the command that produced this error.
    ///
    /// Store and internal failures are reported generically.
    pub fn to_response(&self, reply: &str, request_id: Option<String>) -> Response {
        let message = match self {
            RouteError::StoreUnavailable(_) => MSG_INTERNAL.to_string(),
            RouteError::NotAuthenticated => MSG_NOT_AUTHENTICATED.to_string(),
            RouteError::UnknownCommand(_) => MSG_UNKNOWN_COMMAND.to_string(),
            other => other.to_string(),
        };
        Response::failure(reply, message).reply_to(request_id)
    }
}

/// Failures pushing a frame into a connection's outbound queue.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("connection closed")]
    Closed,

    #[error("outbound buffer full")]
    SlowConsumer,

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_are_reported_generically() {
        let err = RouteError::StoreUnavailable(StoreError::Poisoned);
        let resp = err.to_response("RESP_SEND_P2P", Some("9".into()));
        assert!(!resp.ok);
        assert_eq!(resp.message.as_deref(), Some(MSG_INTERNAL));
        assert_eq!(resp.request_id.as_deref(), Some("9"));
    }

    #[test]
    fn test_refusals_keep_their_reason() {
        let err = RouteError::NotAMember(TopicId::from("rust"));
        let resp = err.to_response("RESP_SEND_TOPIC", None);
        assert_eq!(resp.message.as_deref(), Some("not a member of topic rust"));
    }

    #[test]
    fn test_subscription_refusal_names_peer_links() {
        let resp = RouteError::PeerOnly.to_response("RESP_ERROR", None);
        assert!(!resp.ok);
        assert_eq!(
            resp.message.as_deref(),
            Some("channel subscriptions are only accepted on peer links")
        );
    }
}
