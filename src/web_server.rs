use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post, put},
    serve, Json, Router,
};
use chrono::Local;
use futures::{sink::SinkExt, stream::StreamExt, Sink};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{future::Future, net::SocketAddr, path::PathBuf, sync::Arc};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::chat::{ChatReply, ChatService, Overrides};
use crate::constants::*;
use crate::conversation::{self, Exchange, QUICK_ACTIONS};
use crate::error::ChatError;

// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    chat: Arc<ChatService>,
}

// ── Errors ───────────────────────────────────────────────────────────────────

/// JSON error body with a status derived from the error kind.
pub struct ApiError(ChatError);

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(%status, error = %self.0, "request failed");
        } else {
            warn!(%status, error = %self.0, "request rejected");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

fn status_for(e: &ChatError) -> StatusCode {
    match e {
        ChatError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ChatError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        ChatError::NotConfigured => StatusCode::PRECONDITION_FAILED,
        ChatError::Provider(_) => StatusCode::BAD_GATEWAY,
        ChatError::Storage(_) | ChatError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

// ── Templates ────────────────────────────────────────────────────────────────

fn create_minijinja_env(dir: PathBuf) -> AutoReloader {
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader(&dir));
        notifier.watch_path(&dir, true);
        Ok(env)
    })
}

async fn index_handler(State(state): State<AppState>) -> Result<Html<String>, Html<String>> {
    let settings = state.chat.settings();
    state
        .templates
        .acquire_env()
        .and_then(|env| {
            env.get_template("index.html").and_then(|tmpl| {
                tmpl.render(minijinja::context! {
                    title => "AI Chatbot",
                    provider => settings.provider.to_string(),
                    model => settings.gemini_model.clone(),
                    server_configured => state.chat.server_configured(),
                    quick_actions => QUICK_ACTIONS,
                    temperature => format!("{:.1}", settings.temperature),
                    min_temperature => MIN_TEMPERATURE,
                    max_temperature => MAX_TEMPERATURE,
                    max_tokens => settings.max_tokens,
                    min_max_tokens => MIN_MAX_TOKENS,
                    max_max_tokens => MAX_MAX_TOKENS,
                })
            })
        })
        .map(Html)
        .map_err(|e| {
            error!("Failed to get or render template: {}", e);
            Html(format!("Internal Server Error: {}", e))
        })
}

// ── JSON API ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub message: Option<String>,
    /// Id of a quick action; its canned prompt replaces `message`.
    #[serde(default)]
    pub quick_action: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    fn resolve_message(&self) -> std::result::Result<String, ChatError> {
        if let Some(id) = &self.quick_action {
            return conversation::quick_action(id)
                .map(|a| a.prompt.to_string())
                .ok_or_else(|| ChatError::InvalidInput(format!("unknown quick action: {id}")));
        }
        Ok(self.message.clone().unwrap_or_default())
    }

    fn overrides(&self) -> Overrides {
        Overrides {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

async fn run_chat(chat: &ChatService, req: &ChatRequest) -> std::result::Result<ChatReply, ChatError> {
    let message = req.resolve_message()?;
    chat.send(req.session_id, &message, req.overrides()).await
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "provider": state.chat.settings().provider,
        "configured": state.chat.server_configured(),
    }))
}

async fn create_session_handler(State(state): State<AppState>) -> impl IntoResponse {
    let session_id = state.chat.sessions().create().await;
    (StatusCode::CREATED, Json(json!({ "session_id": session_id })))
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Json<ChatReply>> {
    Ok(Json(run_chat(&state.chat, &req).await?))
}

#[derive(Serialize)]
struct MessagesResponse {
    session_id: Uuid,
    configured: bool,
    messages: Vec<Exchange>,
}

async fn messages_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessagesResponse>> {
    let messages = state.chat.sessions().history(id).await?;
    Ok(Json(MessagesResponse {
        session_id: id,
        configured: state.chat.session_configured(id).await,
        messages,
    }))
}

async fn clear_handler(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    state.chat.sessions().clear(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn export_handler(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Response> {
    let text = state.chat.sessions().export_text(id).await?;
    if text.is_empty() {
        return Ok((StatusCode::NOT_FOUND, Json(json!({ "error": "nothing to export yet" }))).into_response());
    }
    let disposition = format!(
        "attachment; filename=\"{}\"",
        conversation::export_file_name(Local::now())
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        text,
    )
        .into_response())
}

#[derive(Deserialize)]
struct ApiKeyRequest {
    api_key: String,
}

async fn api_key_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ApiKeyRequest>,
) -> ApiResult<StatusCode> {
    state.chat.set_session_key(id, &req.api_key).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn quick_actions_handler() -> impl IntoResponse {
    Json(QUICK_ACTIONS)
}

/// Persisted log rows for a session, including turns cleared from the UI.
async fn log_handler(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<impl IntoResponse> {
    let store = state.chat.history().clone();
    let messages = tokio::task::spawn_blocking(move || store.messages(id))
        .await
        .map_err(|e| ChatError::Storage(format!("chat log task failed: {e}")))??;
    Ok(Json(messages))
}

// ── WebSocket ────────────────────────────────────────────────────────────────

/// Frames sent by the browser.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Chat(ChatRequest),
    Clear { session_id: Uuid },
}

/// Frames sent to the browser.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Info { message: String },
    Thinking,
    Reply(ChatReply),
    Cleared { session_id: Uuid },
    Error { message: String },
}

pub async fn respond(chat: &ChatService, frame: ClientFrame) -> ServerFrame {
    let result = match frame {
        ClientFrame::Chat(req) => run_chat(chat, &req).await.map(ServerFrame::Reply),
        ClientFrame::Clear { session_id } => chat
            .sessions()
            .clear(session_id)
            .await
            .map(|_| ServerFrame::Cleared { session_id }),
    };
    result.unwrap_or_else(|e| {
        warn!(error = %e, "WebSocket request failed");
        ServerFrame::Error { message: e.to_string() }
    })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_frame<S>(sink: &mut S, frame: &ServerFrame) -> bool
where
    S: Sink<Message> + Unpin,
{
    match serde_json::to_string(frame) {
        Ok(text) => sink.send(Message::Text(text)).await.is_ok(),
        Err(e) => {
            error!("Failed to serialize WebSocket frame: {}", e);
            true
        }
    }
}

// Handle individual WebSocket connections
async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("New WebSocket connection established");
    let (mut sender, mut receiver) = socket.split();

    let welcome = ServerFrame::Info {
        message: "Connected to chat".to_string(),
    };
    if !send_frame(&mut sender, &welcome).await {
        warn!("Failed to send welcome message to new WebSocket client");
        return;
    }

    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        };
        match msg {
            Message::Text(text) => {
                let frame = match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(f) => f,
                    Err(e) => {
                        let err = ServerFrame::Error {
                            message: format!("invalid frame: {e}"),
                        };
                        if !send_frame(&mut sender, &err).await {
                            break;
                        }
                        continue;
                    }
                };
                if matches!(frame, ClientFrame::Chat(_)) && !send_frame(&mut sender, &ServerFrame::Thinking).await {
                    break;
                }
                let reply = respond(&state.chat, frame).await;
                if !send_frame(&mut sender, &reply).await {
                    warn!("WebSocket client disconnected or send error. Closing connection.");
                    break;
                }
            }
            Message::Binary(_) => warn!("Received unexpected binary message from client"),
            // Axum answers pings itself
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => {
                info!("Client requested WebSocket close");
                break;
            }
        }
    }
    info!("WebSocket connection closed");
}

// ── Router & server ──────────────────────────────────────────────────────────

pub fn build_router(chat: Arc<ChatService>) -> Router {
    let settings = chat.settings();
    let templates = create_minijinja_env(settings.templates_dir.clone());

    let static_files_service = ServeDir::new(&settings.static_dir).not_found_service(tower::service_fn(
        |_req: axum::extract::Request| async {
            Ok::<_, std::convert::Infallible>((StatusCode::NOT_FOUND, "Not Found").into_response())
        },
    ));

    let state = AppState {
        templates: Arc::new(templates),
        chat,
    };

    Router::new()
        .route("/", get(index_handler))
        .route("/ws", get(ws_handler))
        .route("/api/health", get(health_handler))
        .route("/api/quick-actions", get(quick_actions_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/sessions", post(create_session_handler))
        .route("/api/sessions/:id", axum::routing::delete(clear_handler))
        .route("/api/sessions/:id/messages", get(messages_handler))
        .route("/api/sessions/:id/export", get(export_handler))
        .route("/api/sessions/:id/api-key", put(api_key_handler))
        .route("/api/history/:id", get(log_handler))
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve until `shutdown` resolves, then let in-flight requests finish.
pub async fn start_web_server<F>(host: std::net::IpAddr, port: u16, chat: Arc<ChatService>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(chat);
    let addr = SocketAddr::from((host, port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;
    info!("Web server listening on http://{}", listener.local_addr()?);

    serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .context("Web server failed")?;

    info!("Web server stopped");
    Ok(())
}
