//! Outbound links to peer nodes.
//!
//! Each link dials a peer's `/peer` endpoint, subscribes to its `dispatch`
//! channel under this node's address, and feeds the envelopes addressed to
//! this node into the router. Lost links are redialed with exponential
//! backoff until shutdown.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use courier_shared::constants::SUBSCRIBE_CHANNEL_CMD;
use courier_shared::{Frame, RoutedEnvelope};

use crate::channel::ChannelName;
use crate::router::Router;

#[derive(Debug, Clone)]
pub struct PeerLinkConfig {
    pub url: String,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
}

impl PeerLinkConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_initial: Duration::from_millis(250),
            reconnect_max: Duration::from_secs(10),
        }
    }
}

/// The subscription a link sends right after connecting.
pub fn subscribe_frame(router: &Router) -> Frame {
    Frame::new(SUBSCRIBE_CHANNEL_CMD)
        .arg(ChannelName::Dispatch.as_str())
        .arg(router.local_addr().as_str())
}

/// Feed one text frame received from a peer into the router.
///
/// Returns false when the text was not an envelope.
pub async fn accept_from_peer(router: &Router, text: &str) -> bool {
    let envelope = match Frame::from_json(text).and_then(RoutedEnvelope::from_frame) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!(error = %e, "Ignoring non-envelope frame from peer");
            return false;
        }
    };
    if envelope.is_for(router.local_addr()) {
        router.handle_routed(envelope).await;
    }
    true
}

pub async fn run_peer_link(
    config: PeerLinkConfig,
    router: Arc<Router>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = config.reconnect_initial;

    'outer: loop {
        tokio::select! {
            _ = shutdown.changed() => break 'outer,
            result = connect_async(config.url.as_str()) => {
                match result {
                    Ok((stream, _)) => {
                        info!(peer = %config.url, "Peer link established");
                        backoff = config.reconnect_initial;
                        let (mut write, mut read) = stream.split();

                        let subscribe = match subscribe_frame(&router).to_json() {
                            Ok(json) => json,
                            Err(e) => {
                                warn!(error = %e, "Failed to encode subscription");
                                break 'outer;
                            }
                        };
                        if let Err(e) = write.send(Message::Text(subscribe)).await {
                            warn!(peer = %config.url, error = %e, "Subscription failed");
                        } else {
                            loop {
                                tokio::select! {
                                    _ = shutdown.changed() => {
                                        let _ = write.send(Message::Close(None)).await;
                                        break 'outer;
                                    }
                                    incoming = read.next() => match incoming {
                                        Some(Ok(Message::Text(text))) => {
                                            accept_from_peer(&router, &text).await;
                                        }
                                        Some(Ok(Message::Ping(payload))) => {
                                            let _ = write.send(Message::Pong(payload)).await;
                                        }
                                        Some(Ok(Message::Close(_))) | None => break,
                                        Some(Ok(_)) => {}
                                        Some(Err(e)) => {
                                            warn!(peer = %config.url, error = %e, "Peer link read failed");
                                            break;
                                        }
                                    }
                                }
                            }
                        }
                        info!(peer = %config.url, "Peer link lost");
                    }
                    Err(e) => {
                        debug!(peer = %config.url, error = %e, backoff_ms = backoff.as_millis() as u64, "Peer dial failed");
                    }
                }
            }
        }

        tokio::select! {
            _ = shutdown.changed() => break 'outer,
            _ = tokio::time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(config.reconnect_max);
    }
    debug!(peer = %config.url, "Peer link stopped");
}
