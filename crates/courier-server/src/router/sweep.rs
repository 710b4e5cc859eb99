//! Retransmission of unacknowledged deliveries.
//!
//! Payloads are not kept in memory; a resend refetches them from the store.
//! A resend only goes to a local session: when the recipient is no longer
//! connected here the entry is dropped and the message stays undelivered in
//! the store for the next login.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{ask_push, p2p_push, topic_push, Router};
use crate::error::RouteError;

/// Counts from one sweep over the three tables.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub resent: usize,
    pub abandoned: usize,
    /// Entries dropped because the recipient has no session here.
    pub dropped: usize,
}

impl Router {
    pub async fn sweep_acks(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        let policy = self.acks.policy;

        let p2p = self.acks.p2p.sweep(now, &policy).await;
        for uuid in &p2p.abandoned {
            warn!(error = %RouteError::AckExhausted(*uuid), kind = "p2p", "Delivery abandoned");
        }
        report.abandoned += p2p.abandoned.len();
        for uuid in p2p.resend {
            let message = match self.store.get_p2p_message(uuid) {
                Ok(Some(message)) => message,
                Ok(None) => {
                    self.acks.p2p.acknowledge(&uuid).await;
                    report.dropped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(uuid = %uuid, error = %e, "Resend lookup failed, retrying next sweep");
                    continue;
                }
            };
            match self.sessions.lookup(&message.to).await {
                Some(conn) => {
                    if self.push(&conn, &p2p_push(&message)) {
                        report.resent += 1;
                    }
                }
                None => {
                    debug!(uuid = %uuid, to = %message.to, "Recipient gone, dropping receipt entry");
                    self.acks.p2p.acknowledge(&uuid).await;
                    report.dropped += 1;
                }
            }
        }

        let topic = self.acks.topic.sweep(now, &policy).await;
        for key in &topic.abandoned {
            warn!(error = %RouteError::AckExhausted(key.uuid), recipient = %key.recipient, kind = "topic", "Delivery abandoned");
        }
        report.abandoned += topic.abandoned.len();
        for key in topic.resend {
            let Some(conn) = self.sessions.lookup(&key.recipient).await else {
                debug!(uuid = %key.uuid, to = %key.recipient, "Recipient gone, dropping receipt entry");
                self.acks.topic.acknowledge(&key).await;
                report.dropped += 1;
                continue;
            };
            match self.store.get_topic_message(key.uuid) {
                Ok(Some(message)) => {
                    if self.push(&conn, &topic_push(&message)) {
                        report.resent += 1;
                    }
                }
                Ok(None) => {
                    self.acks.topic.acknowledge(&key).await;
                    report.dropped += 1;
                }
                Err(e) => warn!(uuid = %key.uuid, error = %e, "Resend lookup failed, retrying next sweep"),
            }
        }

        let mutual = self.acks.mutual.sweep(now, &policy).await;
        for uuid in &mutual.abandoned {
            warn!(error = %RouteError::AckExhausted(*uuid), kind = "mutual", "Delivery abandoned");
        }
        report.abandoned += mutual.abandoned.len();
        for uuid in mutual.resend {
            let request = match self.store.get_mutual_request(uuid) {
                Ok(Some(request)) if !request.resolved => request,
                Ok(_) => {
                    self.acks.mutual.acknowledge(&uuid).await;
                    report.dropped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(uuid = %uuid, error = %e, "Resend lookup failed, retrying next sweep");
                    continue;
                }
            };
            match self.sessions.lookup(&request.to).await {
                Some(conn) => {
                    if self.push(&conn, &ask_push(&request)) {
                        report.resent += 1;
                    }
                }
                None => {
                    self.acks.mutual.acknowledge(&uuid).await;
                    report.dropped += 1;
                }
            }
        }

        if report != SweepReport::default() {
            debug!(
                resent = report.resent,
                abandoned = report.abandoned,
                dropped = report.dropped,
                "Ack sweep"
            );
        }
        report
    }
}
