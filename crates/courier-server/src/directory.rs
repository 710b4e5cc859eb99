//! Node self-registration and monitor beacons.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use courier_shared::constants::MONITOR_CMD;
use courier_shared::Frame;
use courier_store::NodeInfo;

use crate::channel::ChannelName;
use crate::router::Router;

/// Logical CPUs, as published in the node directory.
pub fn cpu_count() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}

impl Router {
    /// Refresh this node's directory entry with its current load.
    pub async fn register_self(&self, name: &str, now: DateTime<Utc>) {
        let info = NodeInfo {
            addr: self.local.clone(),
            name: name.to_string(),
            cpus: cpu_count(),
            sessions: self.sessions.len().await as u64,
            last_seen: now,
        };
        match self.store.register_node(&info) {
            Ok(()) => debug!(node = %info.addr, sessions = info.sessions, "Directory heartbeat"),
            Err(e) => warn!(node = %info.addr, error = %e, "Directory heartbeat failed"),
        }
    }

    /// Publish `MONITOR [node, sessions]` on the monitor channel.
    pub async fn monitor_beacon(&self) -> usize {
        let beacon = Frame::new(MONITOR_CMD)
            .arg(self.local.as_str())
            .arg(self.sessions.len().await.to_string());
        self.bus.broadcast(ChannelName::Monitor, &beacon).await
    }
}
