//! Voicebridge Gateway library
//!
//! A realtime voice telephony gateway with:
//! - An audio codec for the 8kHz/16-bit PCM telephony wire format
//! - A frame-based voice activity detector
//! - STT/LLM/TTS provider adapters with retry/backoff
//! - A per-call turn state machine (the Call Session)
//! - A media WebSocket gateway dispatching frames to owning sessions
//! - A flow endpoint, call-initiation facade, and status-webhook history store

pub mod audio;
pub mod config;
pub mod error;
pub mod language;
pub mod vad;
pub mod provider;
pub mod session;
pub mod gateway;
pub mod flow;
pub mod telephony;
pub mod history;
pub mod server;
pub mod cli;

pub use config::Config;
pub use error::{GatewayError, ProviderError};
pub use server::{start as start_server, ServerState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - realtime voice telephony gateway", NAME, VERSION)
}
