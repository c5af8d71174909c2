//! Flow Endpoint (SPEC_FULL §4.7): tells the telephony provider where to
//! open the media WebSocket. Grounded on
//! `examples/original_source/backend/fastapi_app.py`'s `/flow` handler,
//! which ignores its request body entirely and always returns the same
//! descriptor — so this handler accepts (and discards) any body, JSON or
//! otherwise, and never fails.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use tracing::debug;

/// `POST /flow`. Always 200; the request body is not inspected because the
/// original handler's body model was never read for the response either.
pub async fn flow_handler(State(state): State<crate::server::ServerState>, body: axum::body::Bytes) -> Json<Value> {
    if !body.is_empty() {
        debug!(bytes = body.len(), "flow request body received and ignored");
    }

    Json(json!({
        "action": "stream",
        "ws_url": state.config.media_stream_url(),
        "chunk_size": 500,
        "record": true,
    }))
}
