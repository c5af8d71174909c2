//! Provider adapters: speech-to-text, conversational reply generation, and
//! text-to-speech, each behind a trait so the gateway can run against either
//! a live HTTP-backed implementation or a deterministic stub when the
//! corresponding API key is absent (`require_providers = false`).

pub mod llm;
pub mod retry;
pub mod stt;
pub mod tts;

use crate::error::ProviderError;
use async_trait::async_trait;

/// Result of a speech-to-text call.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub detected_language: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SttProvider: Send + Sync {
    /// Transcribe 8kHz/16-bit PCM audio, optionally hinting the source
    /// language. Returns the recognized text and, when the provider
    /// performs language identification, the detected language tag.
    async fn transcribe(&self, pcm: &[u8], source_lang: &str) -> Result<Transcript, ProviderError>;

    /// Whether this adapter is configured to make live calls.
    fn is_available(&self) -> bool;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a reply given prior turns, the current user utterance, and a
    /// target-language/style hint.
    async fn reply(
        &self,
        history: &[(String, String)],
        current_input: &str,
        language_hint: &str,
        style_hint: &str,
    ) -> Result<String, ProviderError>;

    fn is_available(&self) -> bool;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TtsProvider: Send + Sync {
    /// Synthesize `text` in `language` using `speaker`, returning raw 8kHz
    /// 16-bit PCM ready for the telephony wire format.
    async fn synthesize(&self, text: &str, language: &str, speaker: &str) -> Result<Vec<u8>, ProviderError>;

    fn is_available(&self) -> bool;
}

/// Bundles the three live (or stubbed) provider adapters the gateway needs
/// per call session.
pub struct Providers {
    pub stt: Box<dyn SttProvider>,
    pub llm: Box<dyn LlmProvider>,
    pub tts: Box<dyn TtsProvider>,
}

impl Providers {
    pub fn from_config(config: &crate::config::Config) -> Self {
        let stt: Box<dyn SttProvider> = match &config.stt.api_key {
            Some(key) => Box::new(stt::SarvamStt::new(
                config.stt.base_url.clone(),
                key.clone(),
                config.stt.policy.clone(),
            )),
            None => Box::new(stt::UnavailableStt),
        };

        let llm: Box<dyn LlmProvider> = match &config.llm.api_key {
            Some(key) => Box::new(llm::AnthropicLlm::new(
                config.llm.base_url.clone(),
                key.clone(),
                config.llm.model.clone(),
                config.llm.policy.clone(),
            )),
            None => Box::new(llm::UnavailableLlm),
        };

        let tts: Box<dyn TtsProvider> = match &config.tts.api_key {
            Some(key) => Box::new(tts::SarvamTts::new(
                config.tts.base_url.clone(),
                key.clone(),
                config.tts.policy.clone(),
            )),
            None => Box::new(tts::UnavailableTts),
        };

        Self { stt, llm, tts }
    }

    /// True when every adapter is backed by a live configuration.
    pub fn all_available(&self) -> bool {
        self.stt.is_available() && self.llm.is_available() && self.tts.is_available()
    }
}
