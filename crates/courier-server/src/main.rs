//! # courier-server
//!
//! One node of a horizontally scaled chat delivery service.
//!
//! This binary provides:
//! - **Client WebSocket endpoint** (`/ws`): identity binding, direct and
//!   topic messages, friend/invite requests, all with receipt tracking
//! - **Peer WebSocket endpoint** (`/peer`): other nodes subscribe to the
//!   `dispatch` channel and receive envelopes addressed to them
//! - **Outbound peer links** to every node listed in `PEERS`
//! - **Background sweeps**: retransmission, session liveness, directory
//!   heartbeat and monitor beacons
//! - **REST API** (axum) for health checks and node statistics

mod ack;
mod api;
mod channel;
mod config;
mod connection;
mod directory;
mod error;
mod hub;
mod liveness;
mod peer;
mod router;
mod session;
mod tasks;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use courier_store::SqliteStore;

use crate::api::AppState;
use crate::config::NodeConfig;
use crate::hub::Hub;
use crate::peer::PeerLinkConfig;
use crate::router::{Router, RouterConfig};
use crate::tasks::BackgroundTasks;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,courier_server=debug")),
        )
        .init();

    info!("Starting courier node v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = Arc::new(NodeConfig::from_env());
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let store = match &config.db_path {
        Some(path) => SqliteStore::open_at(path)?,
        None => SqliteStore::open_default()?,
    };

    let router = Arc::new(Router::new(
        RouterConfig {
            local: config.node_addr.clone(),
            ack: config.ack_policy(),
            directory_ttl: config.directory_ttl(),
        },
        Arc::new(store),
    ));
    router.register_self(&config.node_name, Utc::now()).await;

    let (hub, hub_handle) = Hub::new(router.clone());
    let hub_task = tokio::spawn(hub.run());

    let app_state = AppState {
        router: router.clone(),
        hub: hub_handle,
        config: config.clone(),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------
    let mut tasks = BackgroundTasks::new();

    let r = router.clone();
    tasks.spawn_periodic("ack-sweep", config.ack_scan_interval, move || {
        let r = r.clone();
        async move {
            r.sweep_acks(Utc::now()).await;
        }
    });

    let r = router.clone();
    let expiry = config.session_expiry();
    tasks.spawn_periodic("liveness", config.session_scan_interval, move || {
        let r = r.clone();
        async move {
            r.scan_liveness(Utc::now(), expiry).await;
        }
    });

    let r = router.clone();
    let name = config.node_name.clone();
    tasks.spawn_periodic("directory", config.directory_beat_interval, move || {
        let r = r.clone();
        let name = name.clone();
        async move {
            r.register_self(&name, Utc::now()).await;
        }
    });

    let r = router.clone();
    tasks.spawn_periodic("monitor", config.monitor_beat_interval, move || {
        let r = r.clone();
        async move {
            r.monitor_beacon().await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Dial peer nodes
    // -----------------------------------------------------------------------
    for url in &config.peers {
        let link = PeerLinkConfig::new(url.clone());
        let r = router.clone();
        tasks.spawn("peer-link", move |shutdown| peer::run_peer_link(link, r, shutdown));
        info!(peer = %url, "Peer link scheduled");
    }

    info!(
        node = %router.local_addr(),
        tasks = tasks.len(),
        "Node running"
    );

    // -----------------------------------------------------------------------
    // 6. Run the HTTP API server until Ctrl+C
    // -----------------------------------------------------------------------
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
        info!("Received Ctrl+C, shutting down");
    };
    let result = api::serve(app_state, config.http_addr, shutdown).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "HTTP server failed");
    }

    tasks.stop().await;
    // Upgraded sockets may still hold hub handles after the listener stops.
    hub_task.abort();
    info!("Node stopped");

    result
}
