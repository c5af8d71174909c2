//! Error taxonomy for the gateway.
//!
//! Application glue uses `anyhow::Result` with `.context(...)`, matching the
//! rest of the crate. Errors that need to be matched on — at provider
//! boundaries and in HTTP response mapping — use the typed enums below.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Errors raised by the three provider adapters (STT, LLM, TTS).
#[derive(Debug, Error)]
pub enum ProviderError {
    /// 4xx from the provider; not retried, the caller falls back to a canned response.
    #[error("provider rejected input: {0}")]
    Input(String),

    /// Network failure, connection refused, DNS failure, etc.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// Deadline exceeded waiting for a response.
    #[error("provider timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Audio could not be decoded or re-encoded.
    #[error("bad audio: {0}")]
    BadAudio(String),
}

impl ProviderError {
    /// Whether this failure is eligible for the adapter's retry policy
    /// (connection/timeout/5xx only, per the provider-adapter retry contract).
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Unavailable(_) | ProviderError::Timeout(_))
    }
}

/// Errors surfaced by HTTP handlers (validation, protocol, fatal).
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("missing required field: {0}")]
    Validation(String),

    #[error("malformed frame: {0}")]
    Protocol(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            GatewayError::Validation(field) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "success": false,
                    "error": format!("Missing required field: {field}"),
                })),
            )
                .into_response(),
            GatewayError::Protocol(msg) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": msg })),
            )
                .into_response(),
            GatewayError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "success": false, "error": msg })),
            )
                .into_response(),
            GatewayError::Other(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": err.to_string() })),
            )
                .into_response(),
        }
    }
}
