//! Node configuration loaded from environment variables.
//!
//! All settings have sensible defaults so a single node can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use courier_shared::NodeAddr;

use crate::ack::AckPolicy;

/// Node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Socket address of the HTTP / WebSocket listener.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Address other nodes and the directory know this node by.
    /// Env: `NODE_ADDR`
    /// Default: `127.0.0.1:8080`
    pub node_addr: NodeAddr,

    /// Human-readable name published in the node directory.
    /// Env: `NODE_NAME`
    /// Default: `courier-node`
    pub node_name: String,

    /// SQLite database file. `None` means the platform data directory.
    /// Env: `DB_PATH`
    pub db_path: Option<PathBuf>,

    /// WebSocket URLs (`ws://host:port/peer`) of the other nodes.
    /// Env: `PEERS` (comma separated)
    /// Default: empty
    pub peers: Vec<String>,

    /// Bounded outbound queue length of every connection.
    /// Env: `OUTBOUND_BUFFER`
    /// Default: `1024`
    pub outbound_buffer: usize,

    /// Env: `ACK_SCAN_SECS`, default 5.
    pub ack_scan_interval: Duration,

    /// Env: `ACK_TIMEOUT_SECS`, default 10.
    pub ack_timeout: Duration,

    /// Retransmissions before a delivery is abandoned.
    /// Env: `ACK_MAX_RETRIES`, default 5.
    pub ack_max_retries: u32,

    /// Env: `SESSION_SCAN_SECS`, default 60.
    pub session_scan_interval: Duration,

    /// A live session unconfirmed for this long is demoted; demoted sessions
    /// are evicted on the following scan.
    /// Env: `SESSION_EXPIRY_SECS`, default 60.
    pub session_expiry: Duration,

    /// Env: `DIRECTORY_BEAT_SECS`, default 3.
    pub directory_beat_interval: Duration,

    /// Registration age after which a node is considered unreachable.
    /// Env: `DIRECTORY_TTL_SECS`, default 10.
    pub directory_ttl: Duration,

    /// Env: `MONITOR_BEAT_SECS`, default 10.
    pub monitor_beat_interval: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            node_addr: NodeAddr::from("127.0.0.1:8080"),
            node_name: "courier-node".to_string(),
            db_path: None,
            peers: Vec::new(),
            outbound_buffer: 1024,
            ack_scan_interval: Duration::from_secs(5),
            ack_timeout: Duration::from_secs(10),
            ack_max_retries: 5,
            session_scan_interval: Duration::from_secs(60),
            session_expiry: Duration::from_secs(60),
            directory_beat_interval: Duration::from_secs(3),
            directory_ttl: Duration::from_secs(10),
            monitor_beat_interval: Duration::from_secs(10),
        }
    }
}

impl NodeConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`NodeConfig::from_env`] but reads values through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            parse_into(&mut config.http_addr, "HTTP_ADDR", &addr);
        }

        if let Some(addr) = lookup("NODE_ADDR") {
            if !addr.trim().is_empty() {
                config.node_addr = NodeAddr::new(addr.trim());
            }
        }

        if let Some(name) = lookup("NODE_NAME") {
            config.node_name = name;
        }

        if let Some(path) = lookup("DB_PATH") {
            if !path.is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }

        if let Some(peers) = lookup("PEERS") {
            config.peers = parse_peers(&peers);
        }

        if let Some(val) = lookup("OUTBOUND_BUFFER") {
            parse_into(&mut config.outbound_buffer, "OUTBOUND_BUFFER", &val);
            if config.outbound_buffer == 0 {
                tracing::warn!("OUTBOUND_BUFFER must be positive, using 1");
                config.outbound_buffer = 1;
            }
        }

        if let Some(val) = lookup("ACK_MAX_RETRIES") {
            parse_into(&mut config.ack_max_retries, "ACK_MAX_RETRIES", &val);
        }

        let secs = [
            ("ACK_SCAN_SECS", &mut config.ack_scan_interval),
            ("ACK_TIMEOUT_SECS", &mut config.ack_timeout),
            ("SESSION_SCAN_SECS", &mut config.session_scan_interval),
            ("SESSION_EXPIRY_SECS", &mut config.session_expiry),
            ("DIRECTORY_BEAT_SECS", &mut config.directory_beat_interval),
            ("DIRECTORY_TTL_SECS", &mut config.directory_ttl),
            ("MONITOR_BEAT_SECS", &mut config.monitor_beat_interval),
        ];
        for (key, slot) in secs {
            if let Some(val) = lookup(key) {
                match val.trim().parse::<u64>() {
                    Ok(n) if n > 0 => *slot = Duration::from_secs(n),
                    _ => tracing::warn!(key, value = %val, "Invalid duration, using default"),
                }
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    pub fn ack_policy(&self) -> AckPolicy {
        AckPolicy {
            timeout: to_chrono(self.ack_timeout),
            max_retries: self.ack_max_retries,
        }
    }

    pub fn session_expiry(&self) -> chrono::Duration {
        to_chrono(self.session_expiry)
    }

    pub fn directory_ttl(&self) -> chrono::Duration {
        to_chrono(self.directory_ttl)
    }
}

fn parse_into<T: FromStr>(slot: &mut T, key: &str, value: &str) {
    match value.trim().parse::<T>() {
        Ok(parsed) => *slot = parsed,
        Err(_) => tracing::warn!(key, value = %value, "Invalid value, using default"),
    }
}

fn parse_peers(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::seconds(i64::from(u32::MAX)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> NodeConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        NodeConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.ack_max_retries, 5);
        assert_eq!(config.ack_timeout, Duration::from_secs(10));
        assert!(config.peers.is_empty());
        assert!(config.db_path.is_none());
    }

    #[test]
    fn test_overrides_from_lookup() {
        let config = config_with(&[
            ("NODE_ADDR", "10.0.0.2:9000"),
            ("PEERS", "ws://10.0.0.3:9000/peer, ,ws://10.0.0.4:9000/peer"),
            ("ACK_TIMEOUT_SECS", "3"),
            ("ACK_MAX_RETRIES", "2"),
        ]);
        assert_eq!(config.node_addr, NodeAddr::from("10.0.0.2:9000"));
        assert_eq!(config.peers.len(), 2);
        assert_eq!(config.ack_timeout, Duration::from_secs(3));
        assert_eq!(config.ack_policy().max_retries, 2);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = config_with(&[
            ("HTTP_ADDR", "not an address"),
            ("SESSION_EXPIRY_SECS", "0"),
            ("OUTBOUND_BUFFER", "lots"),
        ]);
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.session_expiry, Duration::from_secs(60));
        assert_eq!(config.outbound_buffer, 1024);
    }
}
