//! Inbound/outbound WebSocket frame JSON protocols (SPEC_FULL §4.5.3/§4.5.4).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct StartData {
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioData {
    #[serde(rename = "audio_b64", alias = "audio")]
    pub audio_b64: String,
    #[serde(default)]
    pub chunk_size: Option<u32>,
}

/// Frames received over `/media-stream`. Anything not matching a known
/// `type` tag decodes to `Unknown` rather than failing the socket (SPEC_FULL
/// §7 — malformed control traffic is a `ProtocolError`, not fatal).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    Start {
        account_id: String,
        call_app_id: String,
        call_id: String,
        stream_id: String,
        data: StartData,
    },
    Audio {
        stream_id: String,
        data: AudioData,
    },
    #[serde(other)]
    Unknown,
}

/// Frames sent over `/media-stream`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Audio {
        audio_b64: String,
        chunk_id: u64,
    },
    Interrupt {},
    Clear {},
}
