//! Call record store and the status-webhook handler (SPEC_FULL §4.9).
//!
//! Grounded on the teacher's `server/device.rs` `DeviceRegistry` idiom
//! (`Arc<Self>` + `RwLock<HashMap<..>>`, register/list), adapted from a
//! device-handle map to a call-record map keyed by call id. No ordering
//! requirement beyond insertion order, so a plain `RwLock<HashMap>` plus an
//! insertion-order `Vec<String>` of keys is used rather than reaching for
//! `indexmap`, which is not part of the teacher's or the wider pack's stack.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, warn};

/// One initiated call. Created by the initiation facade, mutated only by
/// the status-webhook handler, never destroyed within a process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: u64,
    pub call_id: String,
    pub from_number: String,
    pub to_number: String,
    pub flow_url: String,
    pub status_callback_url: String,
    pub record: bool,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_response: Option<Value>,
    /// Set when the telephony provider call failed and a local fallback
    /// call-id/status was substituted (SPEC_FULL §4.8).
    #[serde(default)]
    pub provider_failed: bool,
}

/// In-process, thread-safe call history store keyed by call id. Readers see
/// a consistent snapshot; writers are serialized by the `RwLock`. Pluggable
/// for a durable store by implementing the same shape against another
/// backend.
pub struct HistoryStore {
    inner: RwLock<Inner>,
}

struct Inner {
    by_call_id: HashMap<String, CallRecord>,
    /// Insertion order, most recent first (matches the source's
    /// `call_history.insert(0, ...)` behavior).
    order: Vec<String>,
    next_id: u64,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                by_call_id: HashMap::new(),
                order: Vec::new(),
                next_id: 1,
            }),
        }
    }

    /// Insert a newly initiated call record, most-recent-first.
    pub fn insert(&self, mut record: CallRecord) -> CallRecord {
        let mut inner = self.inner.write().expect("history store lock poisoned");
        record.id = inner.next_id;
        inner.next_id += 1;
        inner.order.insert(0, record.call_id.clone());
        inner.by_call_id.insert(record.call_id.clone(), record.clone());
        record
    }

    /// Upsert webhook status/data into an existing record by call id.
    /// Returns `true` if a matching record was found and updated.
    pub fn apply_webhook(&self, call_id: &str, status: Option<String>, webhook_data: Value) -> bool {
        let mut inner = self.inner.write().expect("history store lock poisoned");
        match inner.by_call_id.get_mut(call_id) {
            Some(record) => {
                if let Some(status) = status {
                    record.status = status;
                }
                record.webhook_data = Some(webhook_data);
                record.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, call_id: &str) -> Option<CallRecord> {
        self.inner
            .read()
            .expect("history store lock poisoned")
            .by_call_id
            .get(call_id)
            .cloned()
    }

    /// All records, most-recent-first.
    pub fn list_all(&self) -> Vec<CallRecord> {
        let inner = self.inner.read().expect("history store lock poisoned");
        inner
            .order
            .iter()
            .filter_map(|id| inner.by_call_id.get(id).cloned())
            .collect()
    }
}

/// Parse a request body as JSON, falling back to form-encoding, since the
/// telephony provider's webhook may POST either (SPEC_FULL §4.9/§4.7).
pub fn parse_json_or_form(headers: &HeaderMap, body: &[u8]) -> Value {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if content_type.contains("application/x-www-form-urlencoded") {
        return form_to_json(body);
    }

    serde_json::from_slice(body).unwrap_or_else(|_| form_to_json(body))
}

fn form_to_json(body: &[u8]) -> Value {
    match serde_urlencoded::from_bytes::<Vec<(String, String)>>(body) {
        Ok(pairs) => {
            let mut map = Map::new();
            for (k, v) in pairs {
                map.insert(k, Value::String(v));
            }
            Value::Object(map)
        }
        Err(_) => Value::Object(Map::new()),
    }
}

/// `POST /webhook`. Always returns 200 so the provider does not retry on our
/// bugs (SPEC_FULL §4.9/§7 — history-store write failures degrade to
/// best-effort).
pub async fn webhook_handler(
    State(state): State<crate::server::ServerState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let payload = parse_json_or_form(&headers, &body);

    let call_id = payload
        .get("call_id")
        .or_else(|| payload.get("CallSid"))
        .or_else(|| payload.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string);

    if let Some(call_id) = call_id {
        let status = payload.get("status").and_then(Value::as_str).map(str::to_string);
        if state.history.apply_webhook(&call_id, status, payload.clone()) {
            debug!(call_id, "webhook applied to call record");
            if let Some(session) = state.sessions.get(&call_id).await {
                session.note_webhook_status(payload.get("status").and_then(Value::as_str));
            }
        } else {
            debug!(call_id, "webhook for unknown call id, ignoring");
        }
    } else {
        warn!("webhook payload had no call_id/CallSid/id field");
    }

    Json(json!({ "success": true, "message": "Webhook received successfully" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(call_id: &str) -> CallRecord {
        CallRecord {
            id: 0,
            call_id: call_id.to_string(),
            from_number: "+911".to_string(),
            to_number: "+912".to_string(),
            flow_url: "https://x/flow".to_string(),
            status_callback_url: "https://x/webhook".to_string(),
            record: true,
            status: "initiated".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            webhook_data: None,
            provider_response: None,
            provider_failed: false,
        }
    }

    #[test]
    fn insert_assigns_sequential_ids_and_orders_most_recent_first() {
        let store = HistoryStore::new();
        store.insert(sample("C1"));
        store.insert(sample("C2"));
        let all = store.list_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].call_id, "C2");
        assert_eq!(all[1].call_id, "C1");
    }

    #[test]
    fn webhook_upserts_existing_record_by_call_id() {
        let store = HistoryStore::new();
        store.insert(sample("C1"));
        let applied = store.apply_webhook("C1", Some("ringing".to_string()), json!({"status": "ringing"}));
        assert!(applied);
        assert_eq!(store.get("C1").unwrap().status, "ringing");
    }

    #[test]
    fn webhook_for_unknown_call_id_is_a_no_op() {
        let store = HistoryStore::new();
        assert!(!store.apply_webhook("missing", None, json!({})));
    }

    #[test]
    fn form_body_parses_into_json_map() {
        let value = form_to_json(b"call_id=C1&status=completed");
        assert_eq!(value.get("call_id").unwrap(), "C1");
        assert_eq!(value.get("status").unwrap(), "completed");
    }
}
