//! Vote Relay Service
//!
//! HTTP/WebSocket service relaying DKG result votes between group members.

use anyhow::Result;
use axum::{
    extract::{ConnectInfo, Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn, Level};
use vote_relay::{MessageStore, StoredMessage};

/// Vote relay service CLI arguments
#[derive(Parser, Debug)]
#[command(name = "vote-relay-svc")]
#[command(about = "Vote relay service for DKG result agreement")]
struct Args {
    /// Listen address
    #[arg(short, long, env = "RELAY_LISTEN", default_value = "0.0.0.0:8080")]
    listen: String,

    /// Message TTL in seconds
    #[arg(long, env = "RELAY_TTL", default_value = "3600")]
    ttl: i64,

    /// Interval between expired message sweeps, in seconds
    #[arg(long, default_value = "60")]
    cleanup_interval: u64,
}

/// Application state
struct AppState {
    store: MessageStore,
}

/// Request to publish a vote
#[derive(Debug, Serialize, Deserialize)]
struct PostVoteRequest {
    session_id: String,
    from: u32,
    payload: String, // base64 encoded
}

/// Stored vote as returned to clients
#[derive(Debug, Serialize, Deserialize)]
struct VoteResponse {
    hash: String,
    from: u32,
    payload: String, // base64 encoded
    created_at: String,
}

impl From<&StoredMessage> for VoteResponse {
    fn from(message: &StoredMessage) -> Self {
        Self {
            hash: message.id.hash(),
            from: message.id.from,
            payload: b64::encode(&message.payload),
            created_at: message.created_at.to_rfc3339(),
        }
    }
}

/// Query parameters of the websocket endpoint
#[derive(Debug, Deserialize)]
struct SubscribeParams {
    member: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    info!(
        listen = %args.listen,
        ttl = args.ttl,
        "Starting vote relay service"
    );

    let state = Arc::new(AppState {
        store: MessageStore::new(args.ttl),
    });

    // Spawn cleanup task
    let cleanup_store = state.store.clone();
    let cleanup_interval = std::time::Duration::from_secs(args.cleanup_interval);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        loop {
            interval.tick().await;
            cleanup_store.cleanup();
        }
    });

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    info!(address = %args.listen, "Listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/votes", post(post_vote))
        .route("/v1/votes/:session", get(get_votes))
        .route("/v1/message/:hash", get(get_message_by_hash))
        .route("/v1/ws/:session", get(websocket_handler))
        .route("/diagnostics/connected_peers", get(connected_peers))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "vote-relay-svc",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Publish a vote to a session
async fn post_vote(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<PostVoteRequest>,
) -> impl IntoResponse {
    state.store.touch_peer(&addr.to_string(), Some(req.from));

    let payload = match b64::decode(&req.payload) {
        Ok(p) => p,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": format!("Invalid base64: {}", e) })),
            );
        }
    };

    match state.store.put(&req.session_id, req.from, payload) {
        Ok((id, stored)) => {
            info!(
                session_id = %req.session_id,
                from = req.from,
                stored,
                "Vote received"
            );
            (
                StatusCode::OK,
                Json(serde_json::json!({ "hash": id.hash(), "stored": stored })),
            )
        }
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
    }
}

/// List the votes stored for a session
async fn get_votes(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
) -> impl IntoResponse {
    let votes: Vec<VoteResponse> = state
        .store
        .get_session_messages(&session)
        .iter()
        .map(VoteResponse::from)
        .collect();

    Json(serde_json::json!({ "session_id": session, "votes": votes }))
}

/// Get a vote by hash
async fn get_message_by_hash(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> impl IntoResponse {
    match state.store.get(&hash) {
        Ok(message) => (
            StatusCode::OK,
            Json(serde_json::to_value(VoteResponse::from(&message)).unwrap_or_default()),
        ),
        Err(e) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
    }
}

/// Peers seen recently, with the member index they announced
async fn connected_peers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.store.connected_peers())
}

/// WebSocket handler streaming a session's votes
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(session): Path<String>,
    Query(params): Query<SubscribeParams>,
) -> impl IntoResponse {
    state.store.touch_peer(&addr.to_string(), params.member);
    ws.on_upgrade(move |socket| handle_websocket(socket, state, session, addr))
}

async fn handle_websocket(
    socket: axum::extract::ws::WebSocket,
    state: Arc<AppState>,
    session: String,
    addr: SocketAddr,
) {
    use axum::extract::ws::Message;
    use futures_util::{SinkExt, StreamExt};
    use tokio::sync::broadcast::error::RecvError;

    let (mut sender, mut receiver) = socket.split();
    let (backlog, mut live) = state.store.subscribe(&session);

    debug!(session = %session, peer = %addr, backlog = backlog.len(), "Subscriber connected");

    for message in backlog {
        if sender.send(Message::Binary(message.payload)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            message = live.recv() => match message {
                Ok(message) => {
                    if sender.send(Message::Binary(message.payload)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Closing makes the client resubscribe and replay the backlog.
                    warn!(session = %session, peer = %addr, skipped, "Subscriber lagging, closing");
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => state.store.touch_peer(&addr.to_string(), None),
            },
        }
    }

    debug!(session = %session, peer = %addr, "Subscriber disconnected");
}

mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine};

    pub fn encode(data: &[u8]) -> String {
        STANDARD.encode(data)
    }

    pub fn decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(s)
    }
}
