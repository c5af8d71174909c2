//! Web server: shared `ServerState`, route wiring, and the plain-HTTP
//! `axum::serve` startup (SPEC_FULL §6). Grounded on the teacher's
//! `server/mod.rs` (`ServerState`, CORS + trace layers, `axum::serve`
//! startup), with the JWT auth layer dropped — the gateway's HTTP surface
//! has no authentication per SPEC_FULL §6.2.

use crate::config::Config;
use crate::gateway::{self, SessionRegistry};
use crate::history::{self, HistoryStore};
use crate::provider::Providers;
use crate::{flow, telephony};
use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use reqwest::Client;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared, `Clone`-able state injected into every axum handler.
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub providers: Arc<Providers>,
    pub history: Arc<HistoryStore>,
    pub sessions: Arc<SessionRegistry>,
    pub http_client: Client,
}

/// Builds the application router without binding a socket, so tests can
/// exercise it in-process.
pub fn build_router(state: ServerState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/flow", post(flow::flow_handler))
        .route("/webhook", post(history::webhook_handler))
        .route("/api/calls/initiate", post(telephony::initiate_call_handler))
        .route("/api/calls/history", get(calls_history_handler))
        .route("/api/calls/active", get(calls_active_handler))
        .route("/api/calls/{call_id}", get(call_details_handler))
        .route("/api/calls/{call_id}/status", get(call_status_handler))
        .route("/api/ai/status", get(ai_status_handler))
        .route("/api/ai/conversation", post(ai_conversation_handler))
        .route("/media-stream", get(gateway::media_stream_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `GET /health`.
async fn health_handler(axum::extract::State(state): axum::extract::State<ServerState>) -> Json<Value> {
    Json(json!({
        "status": "OK",
        "message": "Voicebridge gateway is running",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "teler_available": state.providers.all_available(),
    }))
}

/// `GET /api/calls/history`.
async fn calls_history_handler(axum::extract::State(state): axum::extract::State<ServerState>) -> Json<Value> {
    let records = state.history.list_all();
    Json(json!({
        "success": true,
        "count": records.len(),
        "data": records,
    }))
}

/// `GET /api/calls/active`.
async fn calls_active_handler(axum::extract::State(state): axum::extract::State<ServerState>) -> Json<Value> {
    let sessions = state.sessions.all().await;
    let mut active = Vec::with_capacity(sessions.len());
    for session in &sessions {
        active.push(json!({
            "connection_id": session.connection_id,
            "call_id": session.call_id().await,
        }));
    }
    Json(json!({
        "success": true,
        "count": active.len(),
        "data": active,
    }))
}

/// `GET /api/calls/{call_id}`.
async fn call_details_handler(
    axum::extract::State(state): axum::extract::State<ServerState>,
    axum::extract::Path(call_id): axum::extract::Path<String>,
) -> Result<Json<Value>, crate::error::GatewayError> {
    match state.history.get(&call_id) {
        Some(record) => Ok(Json(json!({ "success": true, "data": record }))),
        None => Err(crate::error::GatewayError::NotFound(format!("call not found: {call_id}"))),
    }
}

/// `GET /api/calls/{call_id}/status`.
async fn call_status_handler(
    axum::extract::State(state): axum::extract::State<ServerState>,
    axum::extract::Path(call_id): axum::extract::Path<String>,
) -> Result<Json<Value>, crate::error::GatewayError> {
    match state.history.get(&call_id) {
        Some(record) => Ok(Json(json!({
            "success": true,
            "data": {
                "call_id": record.call_id,
                "status": record.status,
                "timestamp": record.updated_at,
                "webhook_data": record.webhook_data,
            },
        }))),
        None => Err(crate::error::GatewayError::NotFound(format!("call not found: {call_id}"))),
    }
}

/// `GET /api/ai/status`.
async fn ai_status_handler(axum::extract::State(state): axum::extract::State<ServerState>) -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "llm_available": state.providers.llm.is_available(),
            "service": "anthropic",
            "model": state.config.llm.model,
        },
    }))
}

#[derive(serde::Deserialize)]
struct HistoryTurn {
    role: String,
    content: String,
}

#[derive(serde::Deserialize)]
struct AiConversationRequest {
    #[serde(default)]
    history: Vec<HistoryTurn>,
    current_input: String,
    #[serde(default)]
    call_id: Option<String>,
    #[serde(default)]
    context: Option<Value>,
}

/// Pairs a flat `{role, content}` history into `(user, assistant)` turns for
/// the LLM adapter, dropping a leading assistant entry with no preceding
/// user turn (the same shape `session::history_pairs` produces).
fn history_turns_to_pairs(history: &[HistoryTurn]) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut iter = history.iter().peekable();
    if matches!(iter.peek(), Some(t) if t.role == "assistant") {
        iter.next();
    }
    while let (Some(user), Some(assistant)) = (iter.next(), iter.next()) {
        pairs.push((user.content.clone(), assistant.content.clone()));
    }
    pairs
}

/// `POST /api/ai/conversation`: a text-only debugging path into the LLM
/// adapter, bypassing STT/TTS (SPEC_FULL §6.1).
async fn ai_conversation_handler(
    axum::extract::State(state): axum::extract::State<ServerState>,
    Json(request): Json<AiConversationRequest>,
) -> (StatusCode, Json<Value>) {
    let _ = (&request.call_id, &request.context);

    if !state.providers.llm.is_available() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "success": false, "error": "LLM provider not configured" })),
        );
    }

    let language = state.config.session.default_language.clone();
    let history_pairs = history_turns_to_pairs(&request.history);

    match state
        .providers
        .llm
        .reply(&history_pairs, &request.current_input, &language, "warm and concise")
        .await
    {
        Ok(reply) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "response": reply,
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                },
            })),
        ),
        Err(crate::error::ProviderError::Unavailable(msg)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "success": false, "error": msg })),
        ),
        Err(err) => (
            StatusCode::OK,
            Json(json!({ "success": false, "error": err.to_string() })),
        ),
    }
}

/// Builds state, binds, and serves until the returned future is dropped or
/// a bind error occurs. `shutdown` resolves when the process should stop
/// accepting new connections and begin the drain sequence.
pub async fn start(config: Arc<Config>, shutdown: impl std::future::Future<Output = ()> + Send + 'static) -> Result<()> {
    let providers = Arc::new(Providers::from_config(&config));
    if config.session.require_providers && !providers.all_available() {
        anyhow::bail!("require_providers is set but not every STT/LLM/TTS provider is configured");
    }

    let state = ServerState {
        history: Arc::new(HistoryStore::new()),
        sessions: Arc::new(SessionRegistry::new()),
        http_client: Client::new(),
        config: config.clone(),
        providers,
    };

    let app = build_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server host/port")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(%addr, "voicebridge gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            gateway::drain_all_sessions(&state.sessions, &state.config).await;
        })
        .await
        .context("server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_state() -> ServerState {
        let config = Arc::new(Config::default());
        ServerState {
            providers: Arc::new(Providers::from_config(&config)),
            config,
            history: Arc::new(HistoryStore::new()),
            sessions: Arc::new(SessionRegistry::new()),
            http_client: Client::new(),
        }
    }

    #[tokio::test]
    async fn health_reports_provider_availability() {
        let state = test_state();
        let response = health_handler(axum::extract::State(state)).await;
        assert_eq!(response.0["status"], "OK");
        assert_eq!(response.0["teler_available"], false);
    }

    #[tokio::test]
    async fn calls_history_starts_empty() {
        let state = test_state();
        let response = calls_history_handler(axum::extract::State(state)).await;
        assert_eq!(response.0["count"], 0);
    }
}
