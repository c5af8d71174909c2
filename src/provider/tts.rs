//! Sarvam AI text-to-speech adapter (`bulbul:v2`).
//!
//! Grounded on `examples/original_source/backend/sarvam_service.py`: JSON
//! body with `pitch`/`pace`/`loudness`/`speech_sample_rate`/
//! `enable_preprocessing`, returning base64-encoded audio. Resampling to the
//! telephony wire rate follows the teacher's `voice/audio.rs` linear
//! resample idiom, implemented here via `rubato` per §4.3's note that the
//! resampling crate is kept specifically for this mismatch.

use super::TtsProvider;
use crate::audio;
use crate::config::ProviderPolicy;
use crate::error::ProviderError;
use crate::provider::retry::with_retry;
use crate::provider::stt::{classify_status_error, classify_transport_error};
use async_trait::async_trait;
use reqwest::Client;
use rubato::{FftFixedIn, Resampler};
use serde::Deserialize;
use serde_json::json;

const TTS_MODEL: &str = "bulbul:v2";
/// Sample rate Sarvam's TTS emits at.
const TTS_SOURCE_SAMPLE_RATE: u32 = 22_050;

pub struct SarvamTts {
    client: Client,
    base_url: String,
    api_key: String,
    policy: ProviderPolicy,
}

impl SarvamTts {
    pub fn new(base_url: String, api_key: String, policy: ProviderPolicy) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
            policy,
        }
    }

    async fn call_once(&self, text: String, language: String, speaker: String) -> Result<Vec<u8>, ProviderError> {
        let body = json!({
            "inputs": [text],
            "target_language_code": language,
            "speaker": speaker,
            "model": TTS_MODEL,
            "pitch": 0,
            "pace": 1.0,
            "loudness": 1.0,
            "speech_sample_rate": TTS_SOURCE_SAMPLE_RATE,
            "enable_preprocessing": true,
        });

        let response = self
            .client
            .post(format!("{}/text-to-speech", self.base_url))
            .header("API-Subscription-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status_error(status, response.text().await.unwrap_or_default()));
        }

        let parsed: TtsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::BadAudio(format!("malformed TTS response: {e}")))?;

        let clip = parsed
            .audios
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::BadAudio("TTS response had no audio".to_string()))?;

        let wav = audio::decode_base64(&clip)?;
        let pcm = audio::pcm_from_wav(&wav)?;
        resample_to_wire_rate(&pcm, TTS_SOURCE_SAMPLE_RATE, audio::WIRE_SAMPLE_RATE)
    }
}

#[async_trait]
impl TtsProvider for SarvamTts {
    async fn synthesize(&self, text: &str, language: &str, speaker: &str) -> Result<Vec<u8>, ProviderError> {
        with_retry(&self.policy, || {
            self.call_once(text.to_string(), language.to_string(), speaker.to_string())
        })
        .await
    }

    fn is_available(&self) -> bool {
        true
    }
}

#[derive(Debug, Deserialize)]
struct TtsResponse {
    audios: Vec<String>,
}

/// Resample raw 16-bit PCM from `from_rate` to `to_rate` using a fixed-input
/// FFT resampler. A no-op when the rates already match.
fn resample_to_wire_rate(pcm: &[u8], from_rate: u32, to_rate: u32) -> Result<Vec<u8>, ProviderError> {
    if from_rate == to_rate {
        return Ok(pcm.to_vec());
    }

    let samples: Vec<f64> = pcm
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]) as f64 / i16::MAX as f64)
        .collect();

    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let chunk_size = samples.len();
    let mut resampler = FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, 1, 1)
        .map_err(|e| ProviderError::BadAudio(format!("resampler init failed: {e}")))?;

    let output = resampler
        .process(&[samples], None)
        .map_err(|e| ProviderError::BadAudio(format!("resample failed: {e}")))?;

    let resampled = &output[0];
    let mut out = Vec::with_capacity(resampled.len() * 2);
    for &sample in resampled {
        let clamped = (sample * i16::MAX as f64).clamp(i16::MIN as f64, i16::MAX as f64) as i16;
        out.extend_from_slice(&clamped.to_le_bytes());
    }
    Ok(out)
}

/// Stub used when no Sarvam API key is configured.
pub struct UnavailableTts;

#[async_trait]
impl TtsProvider for UnavailableTts {
    async fn synthesize(&self, _text: &str, _language: &str, _speaker: &str) -> Result<Vec<u8>, ProviderError> {
        Err(ProviderError::Unavailable("TTS provider not configured".to_string()))
    }

    fn is_available(&self) -> bool {
        false
    }
}
