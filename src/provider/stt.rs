//! Sarvam AI speech-to-text adapter (`saarika:v2.5`).
//!
//! Grounded on `examples/original_source/backend/sarvam_service.py`: audio is
//! uploaded as a multipart `audio.wav` part with an `API-Subscription-Key`
//! header, against the `saarika:v2.5` model.

use super::{SttProvider, Transcript};
use crate::audio;
use crate::config::ProviderPolicy;
use crate::error::ProviderError;
use crate::provider::retry::with_retry;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

const STT_MODEL: &str = "saarika:v2.5";

pub struct SarvamStt {
    client: Client,
    base_url: String,
    api_key: String,
    policy: ProviderPolicy,
}

impl SarvamStt {
    pub fn new(base_url: String, api_key: String, policy: ProviderPolicy) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
            policy,
        }
    }

    async fn call_once(&self, wav: Vec<u8>, source_lang: &str) -> Result<Transcript, ProviderError> {
        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| ProviderError::BadAudio(format!("multipart build failed: {e}")))?;

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", STT_MODEL)
            .text("language_code", source_lang.to_string());

        let response = self
            .client
            .post(format!("{}/speech-to-text", self.base_url))
            .header("API-Subscription-Key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status_error(status, response.text().await.unwrap_or_default()));
        }

        let body: SttResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::BadAudio(format!("malformed STT response: {e}")))?;

        Ok(Transcript {
            text: body.transcript,
            detected_language: body.language_code,
        })
    }
}

#[async_trait]
impl SttProvider for SarvamStt {
    async fn transcribe(&self, pcm: &[u8], source_lang: &str) -> Result<Transcript, ProviderError> {
        let wav = audio::pcm_to_wav(pcm, audio::WIRE_SAMPLE_RATE, 1, audio::SAMPLE_WIDTH as u16)?;
        with_retry(&self.policy, || self.call_once(wav.clone(), source_lang)).await
    }

    fn is_available(&self) -> bool {
        true
    }
}

#[derive(Debug, Deserialize)]
struct SttResponse {
    transcript: String,
    language_code: Option<String>,
}

/// Stub used when no Sarvam API key is configured; reports itself as
/// unavailable so the session can decide whether to degrade or fail per
/// `require_providers`.
pub struct UnavailableStt;

#[async_trait]
impl SttProvider for UnavailableStt {
    async fn transcribe(&self, _pcm: &[u8], _source_lang: &str) -> Result<Transcript, ProviderError> {
        Err(ProviderError::Unavailable("STT provider not configured".to_string()))
    }

    fn is_available(&self) -> bool {
        false
    }
}

pub(crate) fn classify_transport_error(err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(std::time::Duration::from_secs(0))
    } else {
        ProviderError::Unavailable(err.to_string())
    }
}

pub(crate) fn classify_status_error(status: StatusCode, body: String) -> ProviderError {
    if status.is_client_error() {
        ProviderError::Input(format!("{status}: {body}"))
    } else {
        ProviderError::Unavailable(format!("{status}: {body}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_classify_as_input() {
        let err = classify_status_error(StatusCode::BAD_REQUEST, "bad language code".to_string());
        assert!(!err.is_retryable());
    }

    #[test]
    fn server_errors_classify_as_unavailable_and_retryable() {
        let err = classify_status_error(StatusCode::INTERNAL_SERVER_ERROR, "oops".to_string());
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn unavailable_stub_reports_unavailable() {
        let stt = UnavailableStt;
        assert!(!stt.is_available());
        let result = stt.transcribe(&[0u8; 10], "hi-IN").await;
        assert!(matches!(result, Err(ProviderError::Unavailable(_))));
    }
}
