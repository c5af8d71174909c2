//! Media Gateway: the `/media-stream` WebSocket handler, the live-session
//! registry, and the process-level shutdown drain (SPEC_FULL §4.6, §5).
//!
//! Grounded on the teacher's `server/device.rs` (`DeviceRegistry`'s
//! `Arc<Self>` + `RwLock<HashMap<..>>` register/unregister idiom, and
//! `handle_device_socket`'s dual send/read task + `tokio::select!` pattern)
//! and `gateway/mod.rs` (`tokio::sync::broadcast::channel(1)` shutdown
//! signal, subscribed by every spawned task).

use crate::config::Config;
use crate::provider::Providers;
use crate::session::{InboundFrame, OutboundFrame, Session};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Registry of live call sessions, keyed by connection id and indexed by
/// call id once their `start` frame arrives (needed so the status-webhook
/// handler can reach a live session, SPEC_FULL §4.9).
pub struct SessionRegistry {
    by_connection: RwLock<HashMap<String, Arc<Session>>>,
    call_id_index: RwLock<HashMap<String, String>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            by_connection: RwLock::new(HashMap::new()),
            call_id_index: RwLock::new(HashMap::new()),
        }
    }

    async fn register(&self, session: Arc<Session>) {
        self.by_connection.write().await.insert(session.connection_id.clone(), session);
    }

    async fn unregister(&self, connection_id: &str) {
        self.by_connection.write().await.remove(connection_id);
        self.call_id_index.write().await.retain(|_, conn| conn != connection_id);
    }

    /// Called once a session's `start` frame is known, so future webhook
    /// lookups by call id can find it.
    pub async fn index_call_id(&self, call_id: String, connection_id: String) {
        self.call_id_index.write().await.insert(call_id, connection_id);
    }

    /// Look up a live session by the telephony provider's call id.
    pub async fn get(&self, call_id: &str) -> Option<Arc<Session>> {
        let connection_id = self.call_id_index.read().await.get(call_id).cloned()?;
        self.by_connection.read().await.get(&connection_id).cloned()
    }

    pub async fn all(&self) -> Vec<Arc<Session>> {
        self.by_connection.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.by_connection.read().await.len()
    }
}

/// Axum handler for `GET /media-stream`, upgrading to a WebSocket per
/// SPEC_FULL §4.5.3.
pub async fn media_stream_handler(ws: WebSocketUpgrade, State(state): State<crate::server::ServerState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_media_socket(socket, state))
}

async fn handle_media_socket(socket: WebSocket, state: crate::server::ServerState) {
    let connection_id = Uuid::new_v4().to_string();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundFrame>(state.config.session.outbound_channel_capacity);
    let session = Session::new(connection_id.clone(), state.config.clone(), state.providers.clone(), outbound_tx);
    state.sessions.register(session.clone()).await;

    info!(connection_id = %connection_id, "media-stream connected");

    let send_task = {
        let session = session.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = outbound_rx.recv() => {
                        match frame {
                            Some(frame) => {
                                let payload = match serde_json::to_string(&frame) {
                                    Ok(payload) => payload,
                                    Err(err) => {
                                        warn!(%err, "failed to encode outbound frame");
                                        continue;
                                    }
                                };
                                if ws_tx.send(Message::Text(payload.into())).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                    close = session.wait_for_close() => {
                        let (code, reason) = close;
                        let _ = ws_tx
                            .send(Message::Close(Some(axum::extract::ws::CloseFrame {
                                code,
                                reason: reason.into(),
                            })))
                            .await;
                        break;
                    }
                }
            }
        })
    };

    let read_task = {
        let session = session.clone();
        let sessions = state.sessions.clone();
        let connection_id = connection_id.clone();
        tokio::spawn(async move {
            while let Some(Ok(msg)) = ws_rx.next().await {
                match msg {
                    Message::Text(text) => match serde_json::from_str::<InboundFrame>(&text) {
                        Ok(frame) => {
                            if let InboundFrame::Start { call_id, .. } = &frame {
                                sessions.index_call_id(call_id.clone(), connection_id.clone()).await;
                            }
                            session.handle_inbound_frame(frame).await;
                        }
                        Err(err) => {
                            debug!(connection_id = %connection_id, %err, "malformed inbound frame");
                        }
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        })
    };

    tokio::select! {
        _ = send_task => {},
        _ = read_task => {},
    }

    session.teardown_fatal().await;
    state.sessions.unregister(&connection_id).await;
    info!(connection_id = %connection_id, "media-stream disconnected");
}

/// Drains every live session on process shutdown: stop accepting new
/// connections (handled by the caller aborting the accept loop), deliver a
/// farewell to each live session, wait the configured grace period, then
/// return so the caller can force-close remaining sockets (SPEC_FULL §5).
pub async fn drain_all_sessions(sessions: &SessionRegistry, config: &Config) {
    let live = sessions.all().await;
    if live.is_empty() {
        return;
    }
    info!(count = live.len(), "draining live media sessions for shutdown");

    for session in &live {
        session.request_close(1000, "Server is shutting down").await;
    }

    tokio::time::sleep(std::time::Duration::from_secs(config.session.shutdown_grace_seconds)).await;
}
