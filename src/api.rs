//! REST API Server for the Financial Education Assistant
//!
//! Exposes the assistant, its caches and its quality metrics over HTTP

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::agent::Assistant;
use crate::cache::CacheScope;
use crate::error::AssistantError;
use crate::models::AgentDomain;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Either a bare `query` or a chat transcript; the last user turn wins
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    fn user_query(&self) -> Option<&str> {
        if let Some(query) = self.query.as_deref() {
            return Some(query);
        }
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
    }
}

#[derive(Debug, Deserialize)]
pub struct ClearCacheParams {
    pub scope: Option<String>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type ApiResult = (StatusCode, Json<ApiResponse>);

fn ok<T: Serialize>(data: T) -> ApiResult {
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

fn fail(status: StatusCode, message: impl Into<String>) -> ApiResult {
    (status, Json(ApiResponse::error(message.into())))
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub assistant: Arc<Assistant>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "model": state.assistant.model_name(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Endpoint
/// =============================

async fn chat_handler(State(state): State<ApiState>, Json(req): Json<ChatRequest>) -> ApiResult {
    let Some(query) = req.user_query() else {
        return fail(StatusCode::BAD_REQUEST, "No user message found");
    };

    info!("Received chat query: {}", query);

    match state.assistant.handle(query).await {
        Ok(response) => ok(response),
        Err(AssistantError::InvalidQuery(msg)) => fail(StatusCode::BAD_REQUEST, msg),
        Err(e) => {
            error!("Chat handler failed: {}", e);
            fail(StatusCode::INTERNAL_SERVER_ERROR, format!("Assistant failed: {}", e))
        }
    }
}

/// =============================
/// Cache Endpoints
/// =============================

async fn cache_stats(State(state): State<ApiState>) -> ApiResult {
    ok(state.assistant.cache_stats().await)
}

async fn clear_cache(
    State(state): State<ApiState>,
    Query(params): Query<ClearCacheParams>,
) -> ApiResult {
    let scope = match params.scope.as_deref() {
        None => CacheScope::All,
        Some(raw) => match CacheScope::parse(raw) {
            Some(scope) => scope,
            None => {
                return fail(
                    StatusCode::BAD_REQUEST,
                    format!("Unknown cache scope '{}', expected all, rag or response", raw),
                )
            }
        },
    };

    state.assistant.cache().clear(scope).await;
    info!(?scope, "Cache cleared via API");
    ok(serde_json::json!({ "cleared": scope }))
}

/// =============================
/// Performance & Feedback Endpoints
/// =============================

async fn performance_all(State(state): State<ApiState>) -> ApiResult {
    ok(state.assistant.tracker().snapshot_all().await)
}

async fn performance_agent(State(state): State<ApiState>, Path(agent): Path<String>) -> ApiResult {
    let domain = match AgentDomain::from_label(&agent) {
        Some(domain) if domain != AgentDomain::Reject => domain,
        _ => return fail(StatusCode::BAD_REQUEST, format!("Unknown agent '{}'", agent)),
    };

    match state.assistant.tracker().snapshot(domain.as_str()).await {
        Some(stats) => ok(stats),
        None => fail(
            StatusCode::NOT_FOUND,
            format!("No performance data for '{}' yet", domain),
        ),
    }
}

async fn feedback_stats(State(state): State<ApiState>) -> ApiResult {
    ok(state.assistant.feedback_stats())
}

/// =============================
/// Router
/// =============================

pub fn create_router(assistant: Arc<Assistant>) -> Router {
    let state = ApiState { assistant };

    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .route("/api/cache/stats", get(cache_stats))
        .route("/api/cache", delete(clear_cache))
        .route("/api/performance", get(performance_all))
        .route("/api/performance/:agent", get(performance_agent))
        .route("/api/feedback/stats", get(feedback_stats))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

/// Serve until `shutdown` resolves
pub async fn start_server<F>(
    assistant: Arc<Assistant>,
    port: u16,
    shutdown: F,
) -> std::result::Result<(), Box<dyn std::error::Error>>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let router = create_router(assistant);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
