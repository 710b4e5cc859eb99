use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router as HttpRouter,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use courier_shared::constants::{PROTOCOL_VERSION, RESP_ERROR_CMD};
use courier_shared::{ClientCommand, Frame, Response};

use crate::config::NodeConfig;
use crate::connection::Connection;
use crate::hub::HubHandle;
use crate::router::{ConnState, Flow, Router};

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<Router>,
    pub hub: HubHandle,
    pub config: Arc<NodeConfig>,
}

pub fn build_router(state: AppState) -> HttpRouter {
    HttpRouter::new()
        .route("/health", get(health_check))
        .route("/info", get(node_info))
        .route("/ws", get(client_upgrade))
        .route("/peer", get(peer_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct PendingAcks {
    p2p: usize,
    topic: usize,
    mutual: usize,
}

#[derive(Serialize)]
struct NodeInfoResponse {
    name: String,
    addr: String,
    version: &'static str,
    protocol: &'static str,
    sessions: usize,
    connections: usize,
    pending_acks: PendingAcks,
    channels: BTreeMap<&'static str, usize>,
    unknown_channel_events: u64,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn node_info(State(state): State<AppState>) -> Json<NodeInfoResponse> {
    let router = &state.router;
    let (p2p, topic, mutual) = router.acks.pending().await;
    let channels = router
        .bus
        .subscriber_counts()
        .await
        .into_iter()
        .map(|(name, count)| (name.as_str(), count))
        .collect();
    Json(NodeInfoResponse {
        name: state.config.node_name.clone(),
        addr: router.local_addr().to_string(),
        version: env!("CARGO_PKG_VERSION"),
        protocol: PROTOCOL_VERSION,
        sessions: router.sessions.len().await,
        connections: state.hub.connection_count().await,
        pending_acks: PendingAcks { p2p, topic, mutual },
        channels,
        unknown_channel_events: router.bus.unknown_count(),
    })
}

async fn client_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| client_session(socket, state, addr))
}

async fn peer_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| peer_session(socket, state, addr))
}

/// Read client frames in order and hand each to the router.
async fn client_session(socket: WebSocket, state: AppState, addr: SocketAddr) {
    let (conn, outbound) = Connection::new(addr.to_string(), state.config.outbound_buffer);
    state.hub.register(conn.clone());
    info!(conn = %conn.id(), peer = %addr, "Client connected");

    let (sink, mut stream) = socket.split();
    let writer = tokio::spawn(write_loop(sink, outbound, conn.clone()));
    let mut conn_state = ConnState::new(conn.clone());

    loop {
        tokio::select! {
            _ = conn.closed() => break,
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => match Frame::from_json(&text) {
                    Ok(frame) => {
                        if state.router.handle_frame(&mut conn_state, frame).await == Flow::Close {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(conn = %conn.id(), error = %e, "Undecodable frame");
                        let _ = conn.send(&Response::failure(RESP_ERROR_CMD, e.to_string()));
                    }
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(conn = %conn.id(), error = %e, "Client read failed");
                    break;
                }
            }
        }
    }

    conn.close();
    state.hub.unregister(conn.id());
    let _ = writer.await;
    info!(conn = %conn.id(), peer = %addr, "Client disconnected");
}

/// A peer node link. Only channel subscriptions are accepted.
async fn peer_session(socket: WebSocket, state: AppState, addr: SocketAddr) {
    let (conn, outbound) = Connection::new(addr.to_string(), state.config.outbound_buffer);
    state.hub.register(conn.clone());
    info!(conn = %conn.id(), peer = %addr, "Peer connected");

    let (sink, mut stream) = socket.split();
    let writer = tokio::spawn(write_loop(sink, outbound, conn.clone()));

    loop {
        tokio::select! {
            _ = conn.closed() => break,
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let command = Frame::from_json(&text).and_then(|f| ClientCommand::decode(&f));
                    match command {
                        Ok(ClientCommand::SubscribeChannel { channel, subscriber }) => {
                            state.router.bus.join(&channel, conn.clone(), &subscriber).await;
                        }
                        Ok(other) => {
                            warn!(conn = %conn.id(), command = ?other, "Peer sent a non-subscription command");
                            let _ = conn.send(&Response::failure(RESP_ERROR_CMD, "peers may only subscribe"));
                        }
                        Err(e) => debug!(conn = %conn.id(), error = %e, "Undecodable peer frame"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(conn = %conn.id(), error = %e, "Peer read failed");
                    break;
                }
            }
        }
    }

    conn.close();
    state.hub.unregister(conn.id());
    let _ = writer.await;
    info!(conn = %conn.id(), peer = %addr, "Peer disconnected");
}

/// Drain a connection's outbound queue into its socket.
///
/// After close, whatever was already queued is still written before the
/// close frame.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<String>,
    conn: Arc<Connection>,
) {
    loop {
        tokio::select! {
            biased;
            next = outbound.recv() => match next {
                Some(text) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        conn.close();
                        return;
                    }
                }
                None => break,
            },
            _ = conn.closed() => break,
        }
    }
    while let Ok(text) = outbound.try_recv() {
        if sink.send(Message::Text(text)).await.is_err() {
            return;
        }
    }
    let _ = sink.send(Message::Close(None)).await;
}

pub async fn serve(
    state: AppState,
    addr: SocketAddr,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}
