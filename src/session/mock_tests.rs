//! Scripted-response Call Session tests using `mockall`-generated provider
//! mocks (SPEC_FULL §10.4), covering the happy-path and language-switch
//! scenarios from spec.md §8 (S1/S2). Colocated under `#[cfg(test)]` since
//! `mockall::automock` is only generated when this crate itself is compiled
//! under test.

use super::*;
use crate::provider::{MockLlmProvider, MockSttProvider, MockTtsProvider, Providers, Transcript};
use tokio::time::timeout;

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

fn start_frame() -> InboundFrame {
    InboundFrame::Start {
        account_id: "acc1".to_string(),
        call_app_id: "app1".to_string(),
        call_id: "C1".to_string(),
        stream_id: "S1".to_string(),
        data: StartData { encoding: "audio/l16".to_string(), sample_rate: 8000, channels: 1 },
    }
}

fn audio_frame(pcm: &[u8]) -> InboundFrame {
    InboundFrame::Audio {
        stream_id: "S1".to_string(),
        data: AudioData { audio_b64: crate::audio::encode_base64(pcm), chunk_size: None },
    }
}

async fn recv_audio(rx: &mut mpsc::Receiver<OutboundFrame>) -> (String, u64) {
    match timeout(Duration::from_secs(2), rx.recv()).await {
        Ok(Some(OutboundFrame::Audio { audio_b64, chunk_id })) => (audio_b64, chunk_id),
        other => panic!("expected an outbound audio frame, got {other:?}"),
    }
}

/// S1 — happy path: greeting is `chunk_id=1`, the LLM turn's reply is
/// `chunk_id=2`, and chunk ids strictly increase (invariant #1).
#[tokio::test]
async fn happy_path_emits_strictly_increasing_chunk_ids() {
    let mut config = Config::default();
    config.session.min_accumulation_ms_before_stt = 100;
    let config = Arc::new(config);

    let mut stt = MockSttProvider::new();
    stt.expect_transcribe()
        .returning(|_, _| Ok(Transcript { text: "mujhe ek cab chahiye".to_string(), detected_language: Some("hi-IN".to_string()) }));
    stt.expect_is_available().return_const(true);

    let mut llm = MockLlmProvider::new();
    llm.expect_reply().returning(|_, _, _, _| Ok("theek hai, main cab book kar rahi hoon".to_string()));
    llm.expect_is_available().return_const(true);

    let mut tts = MockTtsProvider::new();
    tts.expect_synthesize().returning(|_, _, _| Ok(sine_pcm(80, 8000)));
    tts.expect_is_available().return_const(true);

    let providers = Arc::new(Providers { stt: Box::new(stt), llm: Box::new(llm), tts: Box::new(tts) });
    let (tx, mut rx) = mpsc::channel(16);
    let session = Session::new("conn-1".to_string(), config, providers, tx);

    session.handle_inbound_frame(start_frame()).await;
    let (_, greeting_chunk) = recv_audio(&mut rx).await;
    assert_eq!(greeting_chunk, 1);

    session.handle_inbound_frame(audio_frame(&sine_pcm(3000, 8000))).await;
    let (_, reply_chunk) = recv_audio(&mut rx).await;
    assert_eq!(reply_chunk, 2);
}

/// S2 — an explicit language-switch phrase must short-circuit the LLM
/// entirely and flip `current_language`.
#[tokio::test]
async fn language_switch_command_bypasses_the_llm() {
    let mut config = Config::default();
    config.session.min_accumulation_ms_before_stt = 100;
    let config = Arc::new(config);

    let mut stt = MockSttProvider::new();
    stt.expect_transcribe()
        .returning(|_, _| Ok(Transcript { text: "please speak in english".to_string(), detected_language: None }));
    stt.expect_is_available().return_const(true);

    let mut llm = MockLlmProvider::new();
    llm.expect_reply().times(0).returning(|_, _, _, _| Ok("should never run".to_string()));
    llm.expect_is_available().return_const(true);

    let mut tts = MockTtsProvider::new();
    tts.expect_synthesize().returning(|_, _, _| Ok(sine_pcm(80, 8000)));
    tts.expect_is_available().return_const(true);

    let providers = Arc::new(Providers { stt: Box::new(stt), llm: Box::new(llm), tts: Box::new(tts) });
    let (tx, mut rx) = mpsc::channel(16);
    let session = Session::new("conn-1".to_string(), config, providers, tx);

    session.handle_inbound_frame(start_frame()).await;
    recv_audio(&mut rx).await; // greeting

    session.handle_inbound_frame(audio_frame(&sine_pcm(3000, 8000))).await;
    recv_audio(&mut rx).await; // switch confirmation
}
