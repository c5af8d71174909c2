//! One turn of the accumulate→STT→LLM→TTS pipeline (SPEC_FULL §4.5.2).
//!
//! Grounded on the teacher's `server/realtime_voice.rs` turn-processing
//! block (VAD gate, transcript, reply, synthesis, send), generalized from a
//! single local-model call chain to the three HTTP provider adapters with
//! recoverable-error fallback replies.

use super::{HistoryEntry, Role, Session};
use crate::language;
use rand::Rng;
use tracing::{info, warn};

pub(super) async fn run_turn(session: &std::sync::Arc<Session>, pcm: Vec<u8>) {
    if !session.vad.has_speech(&pcm, crate::audio::WIRE_SAMPLE_RATE) {
        info!(connection_id = %session.connection_id, "accumulated buffer had no speech, discarding");
        return;
    }

    let (current_language, speaker) = {
        let state = session.state.lock().await;
        (state.current_language.clone(), language::speaker_for(&state.current_language).to_string())
    };

    let transcript = match session.providers.stt.transcribe(&pcm, &current_language).await {
        Ok(t) => t,
        Err(err) => {
            warn!(connection_id = %session.connection_id, %err, "STT failed, sending fallback reply");
            speak_fallback(session, &current_language, &speaker).await;
            return;
        }
    };

    if !super::meaningful(&transcript.text) {
        info!(connection_id = %session.connection_id, text = %transcript.text, "transcript not meaningful, skipping turn");
        return;
    }

    info!(connection_id = %session.connection_id, text = %transcript.text, "transcribed user utterance");

    {
        let mut state = session.state.lock().await;
        state.last_user_speech_at = Some(std::time::Instant::now());
        state.silence_warnings = 0;
    }
    session.reset_watchdog();

    if let Some(requested_lang) = language::detect_switch_request(&transcript.text) {
        switch_language(session, requested_lang).await;
        return;
    }

    if let Some(detected) = transcript.detected_language.as_deref().or_else(|| language::detect_language_from_text(&transcript.text)) {
        let mut state = session.state.lock().await;
        state.detected_language = Some(detected.to_string());
        if detected != state.current_language && language::SUPPORTED_LANGUAGES.contains(&detected) {
            state.current_language = detected.to_string();
        }
    }

    let (language, speaker, history_pairs) = {
        let state = session.state.lock().await;
        (state.current_language.clone(), language::speaker_for(&state.current_language).to_string(), state.history_pairs())
    };

    let reply = match session
        .providers
        .llm
        .reply(&history_pairs, &transcript.text, &language, "warm and concise")
        .await
    {
        Ok(reply) => reply,
        Err(err) => {
            warn!(connection_id = %session.connection_id, %err, "LLM failed, sending fallback reply");
            record_turn(session, &transcript.text, fallback_text(&language)).await;
            speak_fallback(session, &language, &speaker).await;
            return;
        }
    };

    record_turn(session, &transcript.text, &reply).await;

    let pcm = match session.providers.tts.synthesize(&reply, &language, &speaker).await {
        Ok(pcm) => pcm,
        Err(err) => {
            warn!(connection_id = %session.connection_id, %err, "TTS failed, could not voice the reply");
            return;
        }
    };

    session.maybe_send_clear().await;
    session.send_outbound_audio(pcm).await;

    {
        let mut state = session.state.lock().await;
        state.last_ai_response_at = Some(std::time::Instant::now());
        state.waiting_for_user = true;
    }
}

async fn switch_language(session: &std::sync::Arc<Session>, lang: &'static str) {
    {
        let mut state = session.state.lock().await;
        state.current_language = lang.to_string();
        state.waiting_for_user = true;
    }
    let speaker = language::speaker_for(lang);
    let text = language::switch_confirmation_for(lang);
    if let Ok(pcm) = session.providers.tts.synthesize(text, lang, speaker).await {
        session.maybe_send_clear().await;
        session.send_outbound_audio(pcm).await;
    }
    let mut state = session.state.lock().await;
    state.last_ai_response_at = Some(std::time::Instant::now());
}

fn fallback_text(language: &str) -> &'static str {
    let replies = language::fallback_replies(language);
    let idx = rand::rng().random_range(0..replies.len());
    replies[idx]
}

async fn speak_fallback(session: &std::sync::Arc<Session>, language: &str, speaker: &str) {
    let text = fallback_text(language);
    if let Ok(pcm) = session.providers.tts.synthesize(text, language, speaker).await {
        session.maybe_send_clear().await;
        session.send_outbound_audio(pcm).await;
    }
    let mut state = session.state.lock().await;
    state.last_ai_response_at = Some(std::time::Instant::now());
    state.waiting_for_user = true;
}

/// Appends a user/assistant pair to conversation history, trimming to the
/// configured maximum (SPEC_FULL §3 Session State — alternating-role
/// invariant, bounded history).
async fn record_turn(session: &std::sync::Arc<Session>, user_text: &str, assistant_text: &str) {
    let mut state = session.state.lock().await;
    state.conversation_history.push(HistoryEntry { role: Role::User, content: user_text.to_string() });
    state.conversation_history.push(HistoryEntry { role: Role::Assistant, content: assistant_text.to_string() });

    let max_entries = session.config.session.max_conversation_history * 2;
    let len = state.conversation_history.len();
    if len > max_entries {
        state.conversation_history.drain(0..(len - max_entries));
    }
}
