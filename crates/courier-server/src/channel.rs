//! Named broadcast channels for control traffic and cross-node forwarding.
//!
//! The set of channels is closed and created at startup. Peer nodes join
//! [`ChannelName::Dispatch`] over their `/peer` link; everything this node
//! forwards to another node is published there.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::connection::{ConnId, Connection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelName {
    ClientStatus,
    TopicStatus,
    TopicSync,
    Dispatch,
    Monitor,
}

impl ChannelName {
    pub const ALL: [ChannelName; 5] = [
        ChannelName::ClientStatus,
        ChannelName::TopicStatus,
        ChannelName::TopicSync,
        ChannelName::Dispatch,
        ChannelName::Monitor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelName::ClientStatus => "client_status",
            ChannelName::TopicStatus => "topic_status",
            ChannelName::TopicSync => "topic_sync",
            ChannelName::Dispatch => "dispatch",
            ChannelName::Monitor => "monitor",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Subscriber {
    conn: Arc<Connection>,
    /// Who the subscriber said it was (a node address for peers).
    label: String,
}

pub struct ChannelBus {
    channels: RwLock<HashMap<ChannelName, HashMap<ConnId, Subscriber>>>,
    unknown: AtomicU64,
}

impl ChannelBus {
    pub fn new() -> Self {
        let channels = ChannelName::ALL
            .into_iter()
            .map(|name| (name, HashMap::new()))
            .collect();
        Self {
            channels: RwLock::new(channels),
            unknown: AtomicU64::new(0),
        }
    }

    /// Attach `conn` to the channel called `name`.
    ///
    /// Unknown names are reported and counted, never created.
    pub async fn join(&self, name: &str, conn: Arc<Connection>, label: &str) -> bool {
        match ChannelName::parse(name) {
            Some(channel) => {
                self.join_channel(channel, conn, label).await;
                true
            }
            None => {
                self.unknown.fetch_add(1, Ordering::Relaxed);
                warn!(channel = %name, conn = %conn.id(), "Join on unknown channel ignored");
                false
            }
        }
    }

    pub async fn join_channel(&self, channel: ChannelName, conn: Arc<Connection>, label: &str) {
        info!(channel = %channel, conn = %conn.id(), subscriber = %label, "Channel joined");
        let mut channels = self.channels.write().await;
        channels.entry(channel).or_default().insert(
            conn.id(),
            Subscriber {
                conn,
                label: label.to_string(),
            },
        );
    }

    /// Detach a connection from every channel.
    pub async fn leave_all(&self, conn: ConnId) {
        let mut channels = self.channels.write().await;
        for (name, subscribers) in channels.iter_mut() {
            if subscribers.remove(&conn).is_some() {
                debug!(channel = %name, conn = %conn, "Channel left");
            }
        }
    }

    /// Deliver `message` to every subscriber of `channel`.
    ///
    /// The message is encoded once. Each subscriber gets a non-blocking push;
    /// one that cannot take it is closed and detached. Returns the number of
    /// subscribers reached.
    pub async fn broadcast<T: Serialize>(&self, channel: ChannelName, message: &T) -> usize {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                warn!(channel = %channel, error = %e, "Failed to encode broadcast");
                return 0;
            }
        };

        let mut reached = 0;
        let mut failed = Vec::new();
        {
            let channels = self.channels.read().await;
            let Some(subscribers) = channels.get(&channel) else {
                return 0;
            };
            for (id, sub) in subscribers {
                match sub.conn.send_text(text.clone()) {
                    Ok(()) => reached += 1,
                    Err(e) => {
                        warn!(
                            channel = %channel,
                            subscriber = %sub.label,
                            error = %e,
                            "Dropping channel subscriber"
                        );
                        sub.conn.close();
                        failed.push(*id);
                    }
                }
            }
        }

        if !failed.is_empty() {
            let mut channels = self.channels.write().await;
            if let Some(subscribers) = channels.get_mut(&channel) {
                for id in failed {
                    subscribers.remove(&id);
                }
            }
        }
        reached
    }

    pub async fn subscriber_count(&self, channel: ChannelName) -> usize {
        self.channels
            .read()
            .await
            .get(&channel)
            .map_or(0, HashMap::len)
    }

    pub async fn subscriber_counts(&self) -> Vec<(ChannelName, usize)> {
        let channels = self.channels.read().await;
        ChannelName::ALL
            .into_iter()
            .map(|name| (name, channels.get(&name).map_or(0, HashMap::len)))
            .collect()
    }

    /// Joins that named a channel outside the registry.
    pub fn unknown_count(&self) -> u64 {
        self.unknown.load(Ordering::Relaxed)
    }
}

impl Default for ChannelBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_shared::Frame;

    #[test]
    fn test_channel_names_round_trip() {
        for name in ChannelName::ALL {
            assert_eq!(ChannelName::parse(name.as_str()), Some(name));
        }
        assert_eq!(ChannelName::parse("lobby"), None);
    }

    #[tokio::test]
    async fn test_unknown_channel_is_counted() {
        let bus = ChannelBus::new();
        let (conn, _rx) = Connection::new("test", 4);

        assert!(!bus.join("lobby", conn.clone(), "x").await);
        assert!(!bus.join("", conn.clone(), "x").await);
        assert!(bus.join("monitor", conn, "x").await);
        assert_eq!(bus.unknown_count(), 2);
        assert_eq!(bus.subscriber_count(ChannelName::Monitor).await, 1);
    }

    #[tokio::test]
    async fn test_slow_subscriber_does_not_stall_others() {
        let bus = ChannelBus::new();
        let (slow, _slow_rx) = Connection::new("slow", 1);
        let (fast, mut fast_rx) = Connection::new("fast", 8);
        bus.join_channel(ChannelName::Monitor, slow.clone(), "slow").await;
        bus.join_channel(ChannelName::Monitor, fast.clone(), "fast").await;

        assert_eq!(bus.broadcast(ChannelName::Monitor, &Frame::new("A")).await, 2);
        assert_eq!(bus.broadcast(ChannelName::Monitor, &Frame::new("B")).await, 1);

        assert!(slow.is_closed());
        assert_eq!(bus.subscriber_count(ChannelName::Monitor).await, 1);
        assert!(fast_rx.recv().await.unwrap().contains("\"A\""));
        assert!(fast_rx.recv().await.unwrap().contains("\"B\""));
    }

    #[tokio::test]
    async fn test_leave_all_detaches_everywhere() {
        let bus = ChannelBus::new();
        let (conn, _rx) = Connection::new("peer", 4);
        bus.join_channel(ChannelName::Dispatch, conn.clone(), "n2").await;
        bus.join_channel(ChannelName::ClientStatus, conn.clone(), "n2").await;

        bus.leave_all(conn.id()).await;
        assert!(bus
            .subscriber_counts()
            .await
            .iter()
            .all(|(_, count)| *count == 0));
    }
}
