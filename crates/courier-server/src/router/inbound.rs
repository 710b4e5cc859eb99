//! Envelopes arriving from peer nodes.
//!
//! The target node routes the inner command by identity only: recipients
//! without a session here are left to offline delivery, never forwarded on.

use chrono::Utc;
use tracing::{debug, info, warn};

use courier_shared::{RoutedCommand, RoutedEnvelope};

use super::{ask_push, p2p_push, EvictReason, Router};

impl Router {
    pub async fn handle_routed(&self, envelope: RoutedEnvelope) {
        if !envelope.is_for(&self.local) {
            debug!(target = %envelope.target, "Envelope for another node ignored");
            return;
        }
        let command = match envelope.command() {
            Ok(command) => command,
            Err(e) => {
                warn!(origin = %envelope.origin, command = %envelope.inner.name, error = %e, "Malformed envelope dropped");
                return;
            }
        };
        let now = Utc::now();

        match command {
            RoutedCommand::DeliverP2p(message) => {
                match self.sessions.lookup(&message.to).await {
                    Some(conn) => {
                        if self.push(&conn, &p2p_push(&message)) {
                            self.acks.p2p.register(message.uuid, now).await;
                            debug!(uuid = %message.uuid, to = %message.to, "Routed message delivered");
                        }
                    }
                    None => debug!(uuid = %message.uuid, to = %message.to, "Routed recipient not here"),
                }
            }
            RoutedCommand::DeliverTopic { message, members } => {
                let mut delivered = 0;
                for member in &members {
                    if self.deliver_topic_local(&message, member, now).await {
                        delivered += 1;
                    }
                }
                debug!(
                    uuid = %message.uuid,
                    topic = %message.topic,
                    delivered,
                    members = members.len(),
                    "Routed topic message delivered"
                );
            }
            RoutedCommand::DeliverAsk(request) => {
                match self.sessions.lookup(&request.to).await {
                    Some(conn) => {
                        if self.push(&conn, &ask_push(&request)) {
                            self.acks.mutual.register(request.uuid, now).await;
                        }
                    }
                    None => debug!(uuid = %request.uuid, to = %request.to, "Routed request target not here"),
                }
            }
            RoutedCommand::ClientRelocated { client } => {
                info!(client = %client, origin = %envelope.origin, "Client relocated away");
                self.evict(&client, None, EvictReason::Relocated).await;
            }
            RoutedCommand::Notice { client, response } => {
                if let Some(conn) = self.sessions.lookup(&client).await {
                    self.push(&conn, &response);
                }
            }
            RoutedCommand::Unknown { name } => {
                warn!(origin = %envelope.origin, command = %name, "Unknown routed command");
            }
        }
    }
}
