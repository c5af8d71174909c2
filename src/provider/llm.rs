//! Conversational reply generation.
//!
//! Shape grounded on the teacher's `src/agent/llm.rs` (`ProviderConfig`
//! wrapping a `reqwest::Client`, `ChatRequest`/`ChatMessage` JSON bodies),
//! pointed at an Anthropic-style messages endpoint and given a retrying
//! wrapper the teacher's client never had.

use super::LlmProvider;
use crate::config::ProviderPolicy;
use crate::error::ProviderError;
use crate::provider::retry::with_retry;
use crate::provider::stt::{classify_status_error, classify_transport_error};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub struct AnthropicLlm {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    policy: ProviderPolicy,
}

impl AnthropicLlm {
    pub fn new(base_url: String, api_key: String, model: String, policy: ProviderPolicy) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
            model,
            policy,
        }
    }

    fn system_prompt(&self, language_hint: &str, style_hint: &str) -> String {
        format!(
            "You are a helpful voice assistant speaking {language_hint}. \
             Keep replies short and conversational, suitable for text-to-speech. \
             Style: {style_hint}."
        )
    }

    async fn call_once(
        &self,
        history: &[(String, String)],
        current_input: &str,
        language_hint: &str,
        style_hint: &str,
    ) -> Result<String, ProviderError> {
        let mut messages: Vec<ChatMessage> = history
            .iter()
            .flat_map(|(user, assistant)| {
                vec![
                    ChatMessage {
                        role: "user".to_string(),
                        content: user.clone(),
                    },
                    ChatMessage {
                        role: "assistant".to_string(),
                        content: assistant.clone(),
                    },
                ]
            })
            .collect();
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: current_input.to_string(),
        });

        let body = json!({
            "model": self.model,
            "system": self.system_prompt(language_hint, style_hint),
            "messages": messages,
            "max_tokens": 512,
        });

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status_error(status, response.text().await.unwrap_or_default()));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::BadAudio(format!("malformed LLM response: {e}")))?;

        parsed
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| ProviderError::BadAudio("LLM response had no text content".to_string()))
    }
}

#[async_trait]
impl LlmProvider for AnthropicLlm {
    async fn reply(
        &self,
        history: &[(String, String)],
        current_input: &str,
        language_hint: &str,
        style_hint: &str,
    ) -> Result<String, ProviderError> {
        with_retry(&self.policy, || {
            self.call_once(history, current_input, language_hint, style_hint)
        })
        .await
    }

    fn is_available(&self) -> bool {
        true
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

/// Stub used when no LLM API key is configured.
pub struct UnavailableLlm;

#[async_trait]
impl LlmProvider for UnavailableLlm {
    async fn reply(
        &self,
        _history: &[(String, String)],
        _current_input: &str,
        _language_hint: &str,
        _style_hint: &str,
    ) -> Result<String, ProviderError> {
        Err(ProviderError::Unavailable("LLM provider not configured".to_string()))
    }

    fn is_available(&self) -> bool {
        false
    }
}
