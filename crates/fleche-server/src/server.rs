//! Server wiring: WebSocket endpoint, REST routes, background tasks.

use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::sync::{broadcast, mpsc};
use tower_http::cors::CorsLayer;

use fleche_core::events::GameEvent;
use fleche_engine::service::GameService;
use fleche_engine::wordbank::WordBank;
use fleche_store::Database;

use crate::bridge;
use crate::client::{self, ClientId, ClientRegistry};
use crate::coordinator::RealtimeCoordinator;
use crate::http;
use crate::presence::PresenceTracker;

/// Server configuration.
pub struct ServerConfig {
    pub port: u16,
    pub max_send_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8090,
            max_send_queue: 256,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<GameService>,
    pub registry: Arc<ClientRegistry>,
    pub message_tx: mpsc::Sender<(ClientId, String)>,
    pub coordinator: Arc<RealtimeCoordinator>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .merge(http::routes())
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle that keeps the background
/// tasks alive.
pub async fn start(
    config: ServerConfig,
    db: Database,
    bank: Arc<WordBank>,
) -> Result<ServerHandle, std::io::Error> {
    let registry = Arc::new(ClientRegistry::new(config.max_send_queue));
    let presence = Arc::new(PresenceTracker::new());
    let service = Arc::new(GameService::new(db.clone(), bank));

    let (event_tx, _) = broadcast::channel::<GameEvent>(1024);

    // Room fan-out
    let bridge_handle = bridge::create_bridge(Arc::clone(&registry), event_tx.subscribe());

    // Dead-client cleanup (every 60s)
    let cleanup_handle =
        client::start_cleanup_task(Arc::clone(&registry), std::time::Duration::from_secs(60));

    // Inbound command pipeline: one consumer, run-to-completion per command.
    let (msg_tx, msg_rx) = mpsc::channel::<(ClientId, String)>(1024);

    let coordinator = Arc::new(RealtimeCoordinator::new(
        db,
        Arc::clone(&service),
        presence,
        Arc::clone(&registry),
        event_tx,
    ));

    let command_coordinator = Arc::clone(&coordinator);
    let command_handle = tokio::spawn(process_commands(msg_rx, command_coordinator));

    let state = AppState {
        service,
        registry,
        message_tx: msg_tx,
        coordinator,
    };

    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "fleche server started");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server_handle,
        _bridge: bridge_handle,
        _commands: command_handle,
        _cleanup: cleanup_handle,
    })
}

/// Handle returned by `start()` — keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
    _bridge: tokio::task::JoinHandle<()>,
    _commands: tokio::task::JoinHandle<()>,
    _cleanup: tokio::task::JoinHandle<()>,
}

/// Drain the inbound command channel into the coordinator. One command at a
/// time; a command runs to completion before the next is picked up.
async fn process_commands(
    mut rx: mpsc::Receiver<(ClientId, String)>,
    coordinator: Arc<RealtimeCoordinator>,
) {
    while let Some((client_id, raw)) = rx.recv().await {
        coordinator.handle_message(&client_id, &raw).await;
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a new WebSocket connection for its whole lifetime.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (client_id, rx) = state.registry.register();
    tracing::info!(client_id = %client_id, "websocket client connected");

    client::handle_ws_connection(
        socket,
        client_id.clone(),
        rx,
        Arc::clone(&state.registry),
        state.message_tx.clone(),
    )
    .await;

    // Socket is gone: tear down presence and tell the room.
    state.coordinator.handle_disconnect(&client_id).await;
    tracing::info!(client_id = %client_id, "websocket client disconnected");
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "clients": state.registry.count(),
    }))
}
