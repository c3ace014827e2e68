use axum::extract::rejection::JsonRejection;
use axum::extract::ws::{Message, WebSocket};
use axum::http::Method;
use axum::{
    extract::{State as AxumState, WebSocketUpgrade},
    response::{Html, Json, Response},
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use crate::commands::executor::{find_pm2_binary, ProcessExecutor};
use crate::commands::gateway::ExecutionReport;
use crate::commands::process_monitor::{ProcessSnapshot, ProcessStats, ProcessSummary};
use crate::config::Config;
use crate::error::ApiError;
use crate::web::{broadcaster, AppState, ClientEvent, Outbound, ServerEvent};

/// Capacity of the per-connection outbound queue.
const OUTBOUND_QUEUE: usize = 32;

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProcessListing {
    pub processes: ProcessSnapshot,
    pub summaries: Vec<ProcessSummary>,
    pub stats: ProcessStats,
}

/// Serve the dashboard page
async fn serve_frontend() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

async fn login(
    AxumState(state): AxumState<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(request) = payload?;
    state
        .gateway
        .authenticate(request.password.as_deref())
        .inspect_err(|_| log::warn!("Failed login attempt"))?;
    Ok(Json(json!({ "success": true })))
}

async fn execute_command(
    AxumState(state): AxumState<AppState>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Json<ExecutionReport>, ApiError> {
    let Json(request) = payload?;
    let command = request.command.unwrap_or_default();
    let report = state
        .gateway
        .execute(request.password.as_deref(), &command)
        .await?;
    Ok(Json(report))
}

/// Parsed process list with display summaries and totals
async fn list_processes(
    AxumState(state): AxumState<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<ProcessListing>>, ApiError> {
    let Json(request) = payload?;
    state.gateway.authenticate(request.password.as_deref())?;

    let snapshot = state.gateway.snapshot().await.inspect_err(|e| {
        log::warn!("Process listing failed: {}", e);
    })?;
    let listing = ProcessListing {
        summaries: snapshot.summaries(chrono::Utc::now()),
        stats: snapshot.stats(),
        processes: snapshot,
    };
    Ok(Json(ApiResponse::success(listing)))
}

/// WebSocket handler for live process updates
async fn dashboard_websocket(
    ws: WebSocketUpgrade,
    AxumState(state): AxumState<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| dashboard_websocket_handler(socket, state))
}

async fn dashboard_websocket_handler(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let session_id = state.sessions.open().await;
    log::info!("WebSocket session {} connected", session_id);

    // Channel for sending frames to the WebSocket
    let (tx, mut rx) = mpsc::channel::<Outbound>(OUTBOUND_QUEUE);

    let forward_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if frame.is_stale() {
                continue;
            }
            let text = match serde_json::to_string(&frame.event) {
                Ok(text) => text,
                Err(e) => {
                    log::error!("Failed to serialize frame: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => handle_client_frame(&state, &session_id, &text, &tx).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                log::debug!("WebSocket session {} receive error: {}", session_id, e);
                break;
            }
        }
    }

    // Clean up session
    state.sessions.close(&session_id).await;
    drop(tx);
    forward_task.abort();
    log::info!("WebSocket session {} disconnected", session_id);
}

async fn handle_client_frame(
    state: &AppState,
    session_id: &str,
    text: &str,
    tx: &mpsc::Sender<Outbound>,
) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            log::debug!("Session {}: unparsable frame: {}", session_id, e);
            let error = ServerEvent::Error(format!("Failed to parse message: {}", e));
            let _ = tx.send(Outbound::reply(error)).await;
            return;
        }
    };

    match event {
        ClientEvent::Authenticate(secret) => {
            if state.gateway.authenticate(Some(&secret)).is_err() {
                if state.sessions.revoke(session_id).await {
                    log::info!("Session {}: authentication revoked", session_id);
                } else {
                    log::warn!("Session {}: authentication failed", session_id);
                }
                let _ = tx.send(Outbound::reply(ServerEvent::Authenticated(false))).await;
                return;
            }

            let Some(token) = state.sessions.grant(session_id).await else {
                return;
            };
            log::info!("Session {}: authenticated", session_id);
            if tx
                .send(Outbound::reply(ServerEvent::Authenticated(true)))
                .await
                .is_err()
            {
                return;
            }
            broadcaster::spawn_update_loop(
                session_id.to_string(),
                state.gateway.clone(),
                state.config.update_interval(),
                tx.clone(),
                token,
            );
        }
        ClientEvent::Logout => {
            if state.sessions.revoke(session_id).await {
                log::info!("Session {}: logged out", session_id);
            }
            let _ = tx.send(Outbound::reply(ServerEvent::Authenticated(false))).await;
        }
    }
}

/// Build the router. With `static_dir`, the page and its assets come from disk.
pub fn create_router(state: AppState, static_dir: Option<&Path>) -> Router {
    // CORS layer to allow requests from phone browsers
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/login", post(login))
        .route("/api/execute", post(execute_command))
        .route("/api/processes", post(list_processes))
        // WebSocket endpoint for live process updates
        .route("/ws", get(dashboard_websocket));

    let app = match static_dir {
        Some(dir) => app.fallback_service(ServeDir::new(dir)),
        None => app
            .route("/", get(serve_frontend))
            .route("/index.html", get(serve_frontend)),
    };

    app.layer(cors).with_state(state)
}

/// Serve `state` on an already-bound listener until ctrl-c.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    static_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let app = create_router(state, static_dir.as_deref());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Create the web server for `config`, running real pm2 commands
pub async fn create_web_server(config: Config, static_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = AppState::with_executor(config, Arc::new(ProcessExecutor), find_pm2_binary());

    let listener = TcpListener::bind(addr).await?;
    log::info!("PM2 dashboard running on http://{}", addr);
    log::info!(
        "Live updates every {:?} over ws://{}/ws",
        state.config.update_interval(),
        addr
    );

    serve(listener, state, static_dir).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down");
}
