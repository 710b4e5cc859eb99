use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use courier_shared::command::format_time;
use courier_shared::constants::RESP_SEND_P2P_CMD;
use courier_shared::{ClientId, DirectMessage, Response, RoutedCommand};

use super::{p2p_push, Locality, Router};
use crate::error::RouteError;

impl Router {
    /// Store a person-to-person message, then deliver it where `to` lives.
    pub(crate) async fn send_p2p(
        &self,
        from: &ClientId,
        to: ClientId,
        content: String,
    ) -> Result<Response, RouteError> {
        let message = DirectMessage::new(from.clone(), to, content);
        self.store.record_p2p_message(&message)?;
        self.deliver_p2p(&message).await;
        Ok(Response::ok(RESP_SEND_P2P_CMD)
            .arg(message.uuid.to_string())
            .arg(format_time(&message.time)))
    }

    /// Local send with receipt tracking, or one envelope to the owning node.
    pub(crate) async fn deliver_p2p(&self, message: &DirectMessage) {
        let now = Utc::now();
        match self.locate(&message.to, now).await {
            Locality::Local(conn) => {
                if self.push(&conn, &p2p_push(message)) {
                    self.acks.p2p.register(message.uuid, now).await;
                    debug!(uuid = %message.uuid, to = %message.to, "Delivered locally");
                }
            }
            Locality::Remote(node) => {
                let command = RoutedCommand::DeliverP2p(message.clone());
                match self.forward(&node, &command).await {
                    Ok(_) => info!(uuid = %message.uuid, to = %message.to, node = %node, "Forwarded"),
                    Err(e) => warn!(uuid = %message.uuid, error = %e, "Forward failed, left for offline delivery"),
                }
            }
            Locality::Offline => {
                debug!(uuid = %message.uuid, to = %message.to, "Recipient offline, stored");
            }
        }
    }

    /// Receipt for a direct message. Only the addressee's receipt counts;
    /// the sender knows the uuid too and must not cancel the delivery.
    pub(crate) async fn ack_p2p(&self, client: &ClientId, uuid: Uuid) {
        match self.store.mark_p2p_delivered(uuid, client) {
            Ok(true) => {}
            Ok(false) => {
                warn!(client = %client, uuid = %uuid, "Receipt from a client other than the recipient");
                return;
            }
            Err(e) => {
                warn!(client = %client, uuid = %uuid, error = %e, "Failed to mark delivered");
                return;
            }
        }
        if !self.acks.p2p.acknowledge(&uuid).await {
            debug!(client = %client, uuid = %uuid, "Late or duplicate receipt");
        }
    }
}
