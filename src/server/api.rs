use crate::agent::{ AgentError, ChatAgent };
use crate::config::settings::{ SettingsError, SettingsSnapshot };
use crate::conversation::Conversation;
use crate::llm::catalog::{ AVAILABLE_MODELS, DEFAULT_MODEL };
use crate::models::chat::{ ChatMessage, ChatSession };
use crate::server::signing;

use axum::{
    extract::{ Path, Request, State },
    http::StatusCode,
    middleware::{ self, Next },
    response::{ IntoResponse, Response },
    routing::{ get, post },
    Json,
    Router,
};
use log::{ error, info };
use serde::{ Deserialize, Serialize };
use serde_json::json;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{ Any, CorsLayer };

#[derive(Clone)]
struct AppState {
    agent: Arc<ChatAgent>,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct ReloadResponse {
    success: bool,
    message: String,
}

#[derive(Serialize)]
struct ModelsResponse {
    default: &'static str,
    models: &'static [crate::llm::catalog::ModelDescriptor],
}

#[derive(Deserialize, Debug, Default)]
pub struct SettingsUpdate {
    pub font_size: Option<f32>,
    pub selected_model: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ChatRequest {
    pub user_id: String,
    pub message: String,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    content: String,
    timestamp: i64,
}

#[derive(Serialize)]
struct HistoryResponse {
    user_id: String,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct SessionsResponse {
    user_id: String,
    sessions: Vec<ChatSession>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn settings_failure(e: SettingsError) -> Response {
    error!("Settings update failed: {}", e);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn header_value<'a>(req: &'a Request, name: &str) -> Option<&'a str> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
}

async fn require_signature(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if let Some(secret) = state.api_key.as_deref() {
        let verdict = signing::verify(
            secret,
            header_value(&req, "x-api-ts"),
            header_value(&req, "x-api-sign")
        );
        if let Err(e) = verdict {
            return error_response(StatusCode::UNAUTHORIZED, e.reason());
        }
    }
    next.run(req).await
}

/// All `/api` routes. `api_key` switches on request signing.
pub fn router(agent: Arc<ChatAgent>, api_key: Option<String>) -> Router {
    let state = AppState {
        agent,
        api_key: api_key.filter(|k| !k.is_empty()),
    };

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/models", get(models_handler))
        .route("/api/settings", get(get_settings_handler).put(put_settings_handler))
        .route("/api/settings/font/{action}", post(font_handler))
        .route("/api/settings/reset", post(reset_settings_handler))
        .route("/api/history/{user_id}", get(history_handler).delete(delete_history_handler))
        .route("/api/history/{user_id}/sessions", get(sessions_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/reload-prompts", get(reload_prompts_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_signature))
        .layer(cors)
        .with_state(state)
}

pub async fn start_http_server(
    http_port: u16,
    agent: Arc<ChatAgent>,
    api_key: Option<String>,
    tls_paths: Option<(String, String)>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = format!("0.0.0.0:{}", http_port).parse::<SocketAddr>()?;
    let app = router(agent, api_key);

    if let Some((cert_path, key_path)) = tls_paths {
        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
            cert_path,
            key_path
        ).await?;

        tokio::spawn(async move {
            let result = axum_server
                ::bind_rustls(addr, tls_config)
                .serve(app.into_make_service()).await;

            if let Err(e) = result {
                error!("HTTPS server error: {}", e);
            }
        });

        info!("HTTPS API server started on: https://{}", addr);
    } else {
        tokio::spawn(async move {
            match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => {
                    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                        error!("HTTP server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
                }
            }
        });

        info!("HTTP API server started on: http://{}", addr);
    }

    Ok(())
}

async fn models_handler() -> impl IntoResponse {
    Json(ModelsResponse {
        default: DEFAULT_MODEL,
        models: AVAILABLE_MODELS,
    })
}

async fn get_settings_handler(State(state): State<AppState>) -> Json<SettingsSnapshot> {
    let settings = state.agent.settings();
    let snapshot = settings.read().await.snapshot();
    Json(snapshot)
}

async fn put_settings_handler(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>
) -> Response {
    let settings = state.agent.settings();
    let mut manager = settings.write().await;
    if let Some(size) = update.font_size {
        if let Err(e) = manager.set_font_size(size) {
            return settings_failure(e);
        }
    }
    if let Some(model) = update.selected_model.as_deref() {
        if let Err(e) = manager.set_selected_model(model) {
            return settings_failure(e);
        }
    }
    Json(manager.snapshot()).into_response()
}

async fn font_handler(State(state): State<AppState>, Path(action): Path<String>) -> Response {
    let settings = state.agent.settings();
    let mut manager = settings.write().await;
    let result = match action.as_str() {
        "increase" => manager.increase_font_size(),
        "decrease" => manager.decrease_font_size(),
        "toggle" => manager.toggle_font_size(),
        other => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("unknown font action '{}'", other)
            );
        }
    };
    match result {
        Ok(_) => Json(manager.snapshot()).into_response(),
        Err(e) => settings_failure(e),
    }
}

async fn reset_settings_handler(State(state): State<AppState>) -> Response {
    let settings = state.agent.settings();
    let mut manager = settings.write().await;
    match manager.clear_all_settings() {
        Ok(()) => Json(manager.snapshot()).into_response(),
        Err(e) => settings_failure(e),
    }
}

async fn history_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>
) -> Json<HistoryResponse> {
    let messages = state.agent.history(&user_id).await;
    Json(HistoryResponse { user_id, messages })
}

async fn sessions_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>
) -> Json<SessionsResponse> {
    let sessions = state.agent.sessions(&user_id).await;
    Json(SessionsResponse { user_id, sessions })
}

async fn delete_history_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>
) -> Response {
    let success = state.agent.delete_history(&user_id).await;
    let code = if success { StatusCode::OK } else { StatusCode::BAD_GATEWAY };
    (code, Json(json!({ "success": success }))).into_response()
}

async fn chat_handler(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Response {
    if req.user_id.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "user_id is required");
    }
    let mut conversation = Conversation::new(&req.user_id);
    match state.agent.submit(&mut conversation, &req.message, req.model.as_deref()).await {
        Ok(reply) =>
            Json(ChatResponse {
                content: reply.text,
                timestamp: reply.timestamp,
            }).into_response(),
        Err(AgentError::EmptyPrompt) =>
            error_response(StatusCode::BAD_REQUEST, AgentError::EmptyPrompt.to_string()),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn reload_prompts_handler(State(state): State<AppState>) -> Response {
    let (code, body) = match state.agent.reload_prompts_if_changed().await {
        Ok(true) =>
            (StatusCode::OK, ReloadResponse { success: true, message: "Prompts reloaded".into() }),
        Ok(false) =>
            (StatusCode::OK, ReloadResponse { success: true, message: "Prompts unchanged".into() }),
        Err(e) =>
            (
                StatusCode::BAD_REQUEST,
                ReloadResponse { success: false, message: format!("Reload error: {}", e) },
            ),
    };
    (code, Json(body)).into_response()
}
