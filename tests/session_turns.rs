//! Call Session end-to-end turn scenarios, driven through the same
//! `InboundFrame`/`OutboundFrame` wire protocol the media gateway uses, with
//! hand-rolled STT/LLM/TTS fakes standing in for the HTTP-backed adapters.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use voicebridge_gateway::audio::encode_base64;
use voicebridge_gateway::config::Config;
use voicebridge_gateway::error::ProviderError;
use voicebridge_gateway::provider::{LlmProvider, Providers, SttProvider, Transcript, TtsProvider};
use voicebridge_gateway::session::{AudioData, InboundFrame, OutboundFrame, Session, StartData};

fn sine_pcm(duration_ms: u32, sample_rate: u32) -> Vec<u8> {
    let n_samples = (sample_rate as u64 * duration_ms as u64 / 1000) as usize;
    let mut out = Vec::with_capacity(n_samples * 2);
    for i in 0..n_samples {
        let t = i as f64 / sample_rate as f64;
        let value = ((i16::MAX / 2) as f64 * (2.0 * std::f64::consts::PI * 440.0 * t).sin()) as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

struct FixedStt(&'static str);

#[async_trait]
impl SttProvider for FixedStt {
    async fn transcribe(&self, _pcm: &[u8], _source_lang: &str) -> Result<Transcript, ProviderError> {
        Ok(Transcript { text: self.0.to_string(), detected_language: None })
    }
    fn is_available(&self) -> bool {
        true
    }
}

struct FailingStt;

#[async_trait]
impl SttProvider for FailingStt {
    async fn transcribe(&self, _pcm: &[u8], _source_lang: &str) -> Result<Transcript, ProviderError> {
        Err(ProviderError::Unavailable("stt backend unreachable".to_string()))
    }
    fn is_available(&self) -> bool {
        false
    }
}

struct RecordingLlm {
    reply_text: &'static str,
    seen_inputs: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl LlmProvider for RecordingLlm {
    async fn reply(&self, _history: &[(String, String)], current_input: &str, _language_hint: &str, _style_hint: &str) -> Result<String, ProviderError> {
        self.seen_inputs.lock().unwrap().push(current_input.to_string());
        Ok(self.reply_text.to_string())
    }
    fn is_available(&self) -> bool {
        true
    }
}

/// Always succeeds with a short clip, except when the text carries a
/// `LONGREPLY` marker, used to simulate a TTS clip still playing out when the
/// next turn's reply is ready (barge-in scenario).
struct MarkedTts;

#[async_trait]
impl TtsProvider for MarkedTts {
    async fn synthesize(&self, text: &str, _language: &str, _speaker: &str) -> Result<Vec<u8>, ProviderError> {
        if text.contains("LONGREPLY") {
            Ok(sine_pcm(3000, 8000))
        } else {
            Ok(sine_pcm(80, 8000))
        }
    }
    fn is_available(&self) -> bool {
        true
    }
}

fn test_config(min_accumulation_ms: u64) -> Arc<Config> {
    let mut config = Config::default();
    config.session.min_accumulation_ms_before_stt = min_accumulation_ms;
    Arc::new(config)
}

fn start_frame() -> InboundFrame {
    InboundFrame::Start {
        account_id: "acc1".to_string(),
        call_app_id: "app1".to_string(),
        call_id: "call1".to_string(),
        stream_id: "stream1".to_string(),
        data: StartData { encoding: "pcm".to_string(), sample_rate: 8000, channels: 1 },
    }
}

fn audio_frame(pcm: &[u8]) -> InboundFrame {
    InboundFrame::Audio {
        stream_id: "stream1".to_string(),
        data: AudioData { audio_b64: encode_base64(pcm), chunk_size: None },
    }
}

async fn recv_audio(rx: &mut mpsc::Receiver<OutboundFrame>) -> (String, u64) {
    match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
        Ok(Some(OutboundFrame::Audio { audio_b64, chunk_id })) => (audio_b64, chunk_id),
        other => panic!("expected an outbound audio frame, got {other:?}"),
    }
}

async fn recv_frame(rx: &mut mpsc::Receiver<OutboundFrame>) -> OutboundFrame {
    match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
        Ok(Some(frame)) => frame,
        other => panic!("expected an outbound frame, got {other:?}"),
    }
}

async fn assert_no_frame_within(rx: &mut mpsc::Receiver<OutboundFrame>, millis: u64) {
    let result = tokio::time::timeout(Duration::from_millis(millis), rx.recv()).await;
    assert!(result.is_err(), "expected no outbound frame, but got {result:?}");
}

#[tokio::test]
async fn meaningful_turn_transcribes_and_replies_with_synthesized_audio() {
    let config = test_config(100);
    let seen_inputs = Arc::new(Mutex::new(Vec::new()));
    let providers = Arc::new(Providers {
        stt: Box::new(FixedStt("please help me book a cab to the airport")),
        llm: Box::new(RecordingLlm { reply_text: "Sure, booking a cab to the airport now.", seen_inputs: seen_inputs.clone() }),
        tts: Box::new(MarkedTts),
    });
    let (tx, mut rx) = mpsc::channel(16);
    let session = Session::new("conn-1".to_string(), config, providers, tx);

    session.handle_inbound_frame(start_frame()).await;
    recv_audio(&mut rx).await; // greeting

    session.handle_inbound_frame(audio_frame(&sine_pcm(500, 8000))).await;
    recv_audio(&mut rx).await; // reply

    assert_eq!(seen_inputs.lock().unwrap().as_slice(), ["please help me book a cab to the airport"]);
}

#[tokio::test]
async fn non_meaningful_transcript_is_discarded_without_invoking_llm() {
    let config = test_config(100);
    let seen_inputs = Arc::new(Mutex::new(Vec::new()));
    let providers = Arc::new(Providers {
        stt: Box::new(FixedStt("um")),
        llm: Box::new(RecordingLlm { reply_text: "should never be produced", seen_inputs: seen_inputs.clone() }),
        tts: Box::new(MarkedTts),
    });
    let (tx, mut rx) = mpsc::channel(16);
    let session = Session::new("conn-1".to_string(), config, providers, tx);

    session.handle_inbound_frame(start_frame()).await;
    recv_audio(&mut rx).await; // greeting

    session.handle_inbound_frame(audio_frame(&sine_pcm(500, 8000))).await;
    assert_no_frame_within(&mut rx, 300).await;
    assert!(seen_inputs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn silent_buffer_never_reaches_stt() {
    let config = test_config(100);
    let seen_inputs = Arc::new(Mutex::new(Vec::new()));
    let providers = Arc::new(Providers {
        stt: Box::new(FixedStt("this should never be heard")),
        llm: Box::new(RecordingLlm { reply_text: "unused", seen_inputs: seen_inputs.clone() }),
        tts: Box::new(MarkedTts),
    });
    let (tx, mut rx) = mpsc::channel(16);
    let session = Session::new("conn-1".to_string(), config, providers, tx);

    session.handle_inbound_frame(start_frame()).await;
    recv_audio(&mut rx).await; // greeting

    let silence = vec![0u8; 8000 /* 500ms at 8kHz/16-bit */];
    session.handle_inbound_frame(audio_frame(&silence)).await;
    assert_no_frame_within(&mut rx, 300).await;
    assert!(seen_inputs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn stt_failure_falls_back_to_a_canned_reply_without_calling_the_llm() {
    let config = test_config(100);
    let seen_inputs = Arc::new(Mutex::new(Vec::new()));
    let providers = Arc::new(Providers {
        stt: Box::new(FailingStt),
        llm: Box::new(RecordingLlm { reply_text: "should never be produced", seen_inputs: seen_inputs.clone() }),
        tts: Box::new(MarkedTts),
    });
    let (tx, mut rx) = mpsc::channel(16);
    let session = Session::new("conn-1".to_string(), config, providers, tx);

    session.handle_inbound_frame(start_frame()).await;
    recv_audio(&mut rx).await; // greeting

    session.handle_inbound_frame(audio_frame(&sine_pcm(500, 8000))).await;
    recv_audio(&mut rx).await; // fallback reply, still audible

    assert!(seen_inputs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn explicit_language_switch_request_is_confirmed_without_calling_the_llm() {
    let config = test_config(100);
    let seen_inputs = Arc::new(Mutex::new(Vec::new()));
    let providers = Arc::new(Providers {
        stt: Box::new(FixedStt("please speak in english now")),
        llm: Box::new(RecordingLlm { reply_text: "should never be produced", seen_inputs: seen_inputs.clone() }),
        tts: Box::new(MarkedTts),
    });
    let (tx, mut rx) = mpsc::channel(16);
    let session = Session::new("conn-1".to_string(), config, providers, tx);

    session.handle_inbound_frame(start_frame()).await;
    recv_audio(&mut rx).await; // greeting

    session.handle_inbound_frame(audio_frame(&sine_pcm(500, 8000))).await;
    recv_audio(&mut rx).await; // switch confirmation

    assert!(seen_inputs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn barge_in_sends_clear_before_a_reply_that_overlaps_a_still_playing_clip() {
    let config = test_config(100);
    let seen_inputs = Arc::new(Mutex::new(Vec::new()));
    let providers = Arc::new(Providers {
        stt: Box::new(FixedStt("please tell me a very long story")),
        llm: Box::new(RecordingLlm { reply_text: "LONGREPLY here is a long answer that keeps going", seen_inputs: seen_inputs.clone() }),
        tts: Box::new(MarkedTts),
    });
    let (tx, mut rx) = mpsc::channel(16);
    let session = Session::new("conn-1".to_string(), config, providers, tx);

    session.handle_inbound_frame(start_frame()).await;
    recv_audio(&mut rx).await; // greeting (short clip)

    // First turn: the LLM reply is marked LONGREPLY, so the synthesized clip
    // is long enough to still be "playing" when the next turn completes.
    session.handle_inbound_frame(audio_frame(&sine_pcm(500, 8000))).await;
    recv_audio(&mut rx).await; // first reply (long clip)

    // Second turn arrives while the first reply's estimated playback window
    // has not yet elapsed.
    session.handle_inbound_frame(audio_frame(&sine_pcm(500, 8000))).await;
    let clear = recv_frame(&mut rx).await;
    assert!(matches!(clear, OutboundFrame::Clear {}), "expected a clear frame ahead of the barge-in reply, got {clear:?}");
    recv_audio(&mut rx).await; // second reply
}

#[tokio::test]
async fn silence_watchdog_warns_then_ends_the_call_with_a_farewell_and_close() {
    let mut config = Config::default();
    config.session.min_accumulation_ms_before_stt = 100;
    config.session.silence_warning_interval_seconds = 1;
    config.session.max_silence_warnings = 1;
    config.session.shutdown_grace_seconds = 1;
    let config = Arc::new(config);

    let seen_inputs = Arc::new(Mutex::new(Vec::new()));
    let providers = Arc::new(Providers {
        stt: Box::new(FixedStt("unused")),
        llm: Box::new(RecordingLlm { reply_text: "unused", seen_inputs: seen_inputs.clone() }),
        tts: Box::new(MarkedTts),
    });
    let (tx, mut rx) = mpsc::channel(16);
    let session = Session::new("conn-1".to_string(), config, providers, tx);

    session.handle_inbound_frame(start_frame()).await;
    recv_audio(&mut rx).await; // greeting
    recv_audio(&mut rx).await; // silence warning, ~1s later
    recv_audio(&mut rx).await; // farewell, ~1s after the warning

    let (code, reason) = tokio::time::timeout(Duration::from_secs(5), session.wait_for_close())
        .await
        .expect("session should request socket close after exhausting silence warnings");
    assert_eq!(code, 1000);
    assert!(reason.contains("inactivity"));
    assert!(seen_inputs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_start_frame_is_ignored() {
    let config = test_config(100);
    let seen_inputs = Arc::new(Mutex::new(Vec::new()));
    let providers = Arc::new(Providers {
        stt: Box::new(FixedStt("unused")),
        llm: Box::new(RecordingLlm { reply_text: "unused", seen_inputs: seen_inputs.clone() }),
        tts: Box::new(MarkedTts),
    });
    let (tx, mut rx) = mpsc::channel(16);
    let session = Session::new("conn-1".to_string(), config, providers, tx);

    session.handle_inbound_frame(start_frame()).await;
    recv_audio(&mut rx).await; // greeting

    // A second start frame must not re-trigger another greeting.
    session.handle_inbound_frame(start_frame()).await;
    assert_no_frame_within(&mut rx, 300).await;
    assert_eq!(session.call_id().await.as_deref(), Some("call1"));
}
