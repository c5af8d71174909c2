//! Configuration management
//!
//! A single `Config` struct composed of sub-structs, each field
//! `#[serde(default)]` with a named default function, loaded from (in
//! increasing precedence) built-in defaults, an optional TOML file, then
//! environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telephony: TelephonyConfig,
    #[serde(default)]
    pub stt: SttConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub tts: TtsConfig,
    #[serde(default)]
    pub session: SessionPolicyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Host (no scheme) the telephony provider can reach us at; used to build
    /// the `wss://…/media-stream` URL returned by the flow endpoint.
    #[serde(default = "default_public_backend_host")]
    pub public_backend_host: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_public_backend_host() -> String {
    "localhost:8000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_backend_host: default_public_backend_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonyConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_telephony_base_url")]
    pub base_url: String,
}

fn default_telephony_base_url() -> String {
    "https://api.telephony.example.com".to_string()
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_telephony_base_url(),
        }
    }
}

/// Shared retry/timeout policy for the three provider adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPolicy {
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_base_ms() -> u64 {
    250
}

impl Default for ProviderPolicy {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SttConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_stt_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub policy: ProviderPolicy,
}

fn default_stt_base_url() -> String {
    "https://api.sarvam.ai".to_string()
}

impl SttConfig {
    fn defaults() -> Self {
        Self {
            api_key: None,
            base_url: default_stt_base_url(),
            policy: ProviderPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub policy: ProviderPolicy,
}

fn default_llm_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_llm_model() -> String {
    "claude-3-5-sonnet".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            policy: ProviderPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_tts_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub policy: ProviderPolicy,
}

fn default_tts_base_url() -> String {
    "https://api.sarvam.ai".to_string()
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_tts_base_url(),
            policy: ProviderPolicy::default(),
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self::defaults()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPolicyConfig {
    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,
    #[serde(default = "default_max_conversation_history")]
    pub max_conversation_history: usize,
    #[serde(default = "default_silence_warning_interval_seconds")]
    pub silence_warning_interval_seconds: u64,
    #[serde(default = "default_max_silence_warnings")]
    pub max_silence_warnings: u32,
    #[serde(default = "default_min_accumulation_ms")]
    pub min_accumulation_ms_before_stt: u64,
    #[serde(default = "default_language")]
    pub default_language: String,
    #[serde(default = "default_max_buffer_ms")]
    pub max_buffer_ms: u64,
    #[serde(default = "default_outbound_channel_capacity")]
    pub outbound_channel_capacity: usize,
    #[serde(default)]
    pub require_providers: bool,
}

fn default_shutdown_grace_seconds() -> u64 {
    3
}

fn default_max_conversation_history() -> usize {
    20
}

fn default_silence_warning_interval_seconds() -> u64 {
    30
}

fn default_max_silence_warnings() -> u32 {
    2
}

fn default_min_accumulation_ms() -> u64 {
    3000
}

fn default_language() -> String {
    "hi-IN".to_string()
}

fn default_max_buffer_ms() -> u64 {
    60_000
}

fn default_outbound_channel_capacity() -> usize {
    32
}

impl Default for SessionPolicyConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_seconds: default_shutdown_grace_seconds(),
            max_conversation_history: default_max_conversation_history(),
            silence_warning_interval_seconds: default_silence_warning_interval_seconds(),
            max_silence_warnings: default_max_silence_warnings(),
            min_accumulation_ms_before_stt: default_min_accumulation_ms(),
            default_language: default_language(),
            max_buffer_ms: default_max_buffer_ms(),
            outbound_channel_capacity: default_outbound_channel_capacity(),
            require_providers: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration: defaults, then an optional TOML file, then
    /// environment variable overrides (the dominant source in container
    /// deployments).
    pub fn load() -> Result<Self> {
        let config_path = config_path()?;

        let mut config = if config_path.exists() {
            let contents =
                std::fs::read_to_string(&config_path).context("Failed to read config file")?;
            toml::from_str(&contents).context("Failed to parse config file")?
        } else {
            Config::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Save configuration to file. Secrets are never written back out.
    pub fn save(&self) -> Result<()> {
        let config_path = config_path()?;
        let parent = config_path.parent().context("Config path has no parent")?;

        std::fs::create_dir_all(parent).context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(domain) = std::env::var("BACKEND_DOMAIN") {
            self.server.public_backend_host = domain;
        }
        if let Ok(key) = std::env::var("TELER_API_KEY") {
            self.telephony.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("SARVAM_API_KEY") {
            self.stt.api_key = Some(key.clone());
            self.tts.api_key = Some(key);
        }
    }

    /// Construct the `wss://…/media-stream` (or `ws://` for localhost) URL
    /// the flow endpoint reports to the telephony provider.
    pub fn media_stream_url(&self) -> String {
        let scheme = if self.server.public_backend_host.starts_with("localhost") {
            "ws"
        } else {
            "wss"
        };
        format!("{scheme}://{}/media-stream", self.server.public_backend_host)
    }

    pub fn webhook_url(&self) -> String {
        let scheme = if self.server.public_backend_host.starts_with("localhost") {
            "http"
        } else {
            "https"
        };
        format!("{scheme}://{}/webhook", self.server.public_backend_host)
    }
}

/// Get the configuration file path.
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "voicebridge", "voicebridge-gateway")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get the default configuration as a TOML string.
pub fn default_config_toml() -> String {
    let config = Config::default();
    toml::to_string_pretty(&config).unwrap_or_else(|_| "# Default configuration\n".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = Config::default();
        assert_eq!(config.session.max_conversation_history, 20);
        assert_eq!(config.session.silence_warning_interval_seconds, 30);
        assert_eq!(config.session.max_silence_warnings, 2);
        assert_eq!(config.session.min_accumulation_ms_before_stt, 3000);
        assert_eq!(config.session.default_language, "hi-IN");
        assert_eq!(config.session.max_buffer_ms, 60_000);
        assert_eq!(config.session.outbound_channel_capacity, 32);
        assert_eq!(config.stt.policy.timeout_seconds, 30);
        assert_eq!(config.stt.policy.max_retries, 2);
        assert_eq!(config.stt.policy.backoff_base_ms, 250);
    }

    #[test]
    fn media_stream_url_uses_ws_for_localhost() {
        let mut config = Config::default();
        config.server.public_backend_host = "localhost:8000".to_string();
        assert_eq!(config.media_stream_url(), "ws://localhost:8000/media-stream");

        config.server.public_backend_host = "gateway.example.com".to_string();
        assert_eq!(
            config.media_stream_url(),
            "wss://gateway.example.com/media-stream"
        );
    }

    #[test]
    fn secrets_are_not_serialized() {
        let mut config = Config::default();
        config.llm.api_key = Some("secret-key".to_string());
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(!toml.contains("secret-key"));
    }
}
