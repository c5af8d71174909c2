//! Call Session — the per-connection turn state machine (SPEC_FULL §4.5).
//!
//! Grounded on the teacher's `server/realtime_voice.rs` (turn-based session
//! state, VAD+STT+LLM+TTS per-turn pipeline, conversation history vector,
//! `tokio::sync::Mutex`-guarded session struct). The browser-WebM/local-voice
//! semantics are replaced with the telephony PCM/VAD/HTTP-adapter semantics
//! SPEC_FULL calls for; the ad hoc `SessionState` enum is replaced with the
//! Connected→Greeting→Listening→Accumulating→Processing→Ending→Ended machine
//! from SPEC_FULL §4.5.1.

mod frames;
mod turn;
#[cfg(test)]
mod mock_tests;

pub use frames::{AudioData, InboundFrame, OutboundFrame, StartData};

use crate::config::Config;
use crate::provider::Providers;
use crate::{audio, language, vad};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One live media WebSocket's immutable provenance, captured from the first
/// `start` frame (SPEC_FULL §3 Stream Metadata).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMetadata {
    pub account_id: String,
    pub call_app_id: String,
    pub call_id: String,
    pub stream_id: String,
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// Turn state machine states (SPEC_FULL §4.5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Connected,
    Greeting,
    Listening,
    Accumulating,
    Processing,
    Ending,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

struct AudioChunk {
    pcm: Vec<u8>,
    arrival: Instant,
}

/// Mutable state owned by exactly one session, guarded by a single mutex so
/// inbound-frame handlers and the turn pipeline never observe a torn state
/// (SPEC_FULL §4.5.6 concurrency discipline).
struct SessionState {
    turn: TurnState,
    greeting_sent: bool,
    waiting_for_user: bool,
    is_processing: bool,
    call_ended: bool,
    last_user_speech_at: Option<Instant>,
    last_ai_response_at: Option<Instant>,
    silence_warnings: u32,
    current_language: String,
    detected_language: Option<String>,
    audio_buffer: Vec<AudioChunk>,
    conversation_history: Vec<HistoryEntry>,
    outbound_chunk_counter: u64,
    /// Estimated wall-clock instant the most recently sent TTS clip finishes
    /// playing out on the caller's side; used to decide whether a `clear`
    /// frame is needed before the next response (barge-in, SPEC_FULL §4.5.4
    /// Open Question 4 — conditional, not unconditional).
    outbound_playback_until: Option<Instant>,
    last_drain_at: Instant,
    stream: Option<StreamMetadata>,
}

impl SessionState {
    fn new(default_language: &str) -> Self {
        Self {
            turn: TurnState::Connected,
            greeting_sent: false,
            waiting_for_user: false,
            is_processing: false,
            call_ended: false,
            last_user_speech_at: None,
            last_ai_response_at: None,
            silence_warnings: 0,
            current_language: default_language.to_string(),
            detected_language: None,
            audio_buffer: Vec::new(),
            conversation_history: Vec::new(),
            outbound_chunk_counter: 0,
            outbound_playback_until: None,
            last_drain_at: Instant::now(),
            stream: None,
        }
    }

    fn accumulated_ms(&self) -> f64 {
        self.audio_buffer
            .iter()
            .map(|c| audio::duration_ms(c.pcm.len(), audio::WIRE_SAMPLE_RATE))
            .sum()
    }

    fn outbound_inflight(&self) -> bool {
        self.outbound_playback_until
            .map(|until| Instant::now() < until)
            .unwrap_or(false)
    }

    /// History as `(user, assistant)` turn pairs for the LLM adapter,
    /// dropping the leading greeting (which has no preceding user turn).
    fn history_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        let mut iter = self.conversation_history.iter().peekable();
        if matches!(iter.peek(), Some(e) if e.role == Role::Assistant) {
            iter.next();
        }
        while let (Some(user), Some(assistant)) = (iter.next(), iter.next()) {
            pairs.push((user.content.clone(), assistant.content.clone()));
        }
        pairs
    }
}

/// One live call. Owns the media socket's outbound channel, the audio
/// accumulation buffer, conversation history, current language, and the
/// silence watchdog.
pub struct Session {
    pub connection_id: String,
    config: Arc<Config>,
    providers: Arc<Providers>,
    vad: vad::Vad,
    state: Mutex<SessionState>,
    /// Serializes turn processing; `is_processing` is checked before this is
    /// acquired so re-entrant processing is rejected without blocking
    /// (SPEC_FULL §4.5.6).
    processing_lock: Mutex<()>,
    outbound_tx: mpsc::Sender<OutboundFrame>,
    watchdog: Mutex<Option<JoinHandle<()>>>,
    close_signal: Notify,
    close_reason: Mutex<Option<(u16, String)>>,
}

impl Session {
    pub fn new(connection_id: String, config: Arc<Config>, providers: Arc<Providers>, outbound_tx: mpsc::Sender<OutboundFrame>) -> Arc<Self> {
        let default_language = config.session.default_language.clone();
        Arc::new(Self {
            connection_id,
            config,
            providers,
            vad: vad::Vad::default(),
            state: Mutex::new(SessionState::new(&default_language)),
            processing_lock: Mutex::new(()),
            outbound_tx,
            watchdog: Mutex::new(None),
            close_signal: Notify::new(),
            close_reason: Mutex::new(None),
        })
    }

    /// Requests the gateway close the underlying WebSocket with the given
    /// close code/reason once the outbound queue drains.
    pub async fn request_close(&self, code: u16, reason: impl Into<String>) {
        *self.close_reason.lock().await = Some((code, reason.into()));
        self.close_signal.notify_one();
    }

    pub async fn wait_for_close(&self) -> (u16, String) {
        loop {
            if let Some(reason) = self.close_reason.lock().await.clone() {
                return reason;
            }
            self.close_signal.notified().await;
        }
    }

    pub async fn call_id(&self) -> Option<String> {
        self.state.lock().await.stream.as_ref().map(|s| s.call_id.clone())
    }

    /// Best-effort note that a status webhook arrived for this call; purely
    /// observational (no behavior change), matching SPEC_FULL §4.9's
    /// "upsert ... into the active-session map if live".
    pub fn note_webhook_status(&self, status: Option<&str>) {
        if let Some(status) = status {
            debug!(connection_id = %self.connection_id, status, "webhook status noted on live session");
        }
    }

    /// Dispatch one inbound frame (SPEC_FULL §4.5.3). Unknown frame types
    /// are logged and ignored, never torn down.
    pub async fn handle_inbound_frame(self: &Arc<Self>, frame: InboundFrame) {
        match frame {
            InboundFrame::Start { account_id, call_app_id, call_id, stream_id, data } => {
                self.handle_start(account_id, call_app_id, call_id, stream_id, data).await;
            }
            InboundFrame::Audio { data, .. } => {
                self.handle_audio(data).await;
            }
            InboundFrame::Unknown => {
                debug!(connection_id = %self.connection_id, "ignoring unknown inbound frame type");
            }
        }
    }

    async fn handle_start(self: &Arc<Self>, account_id: String, call_app_id: String, call_id: String, stream_id: String, data: StartData) {
        {
            let mut state = self.state.lock().await;
            if state.stream.is_some() {
                warn!(connection_id = %self.connection_id, "duplicate start frame ignored");
                return;
            }
            state.stream = Some(StreamMetadata {
                account_id,
                call_app_id,
                call_id: call_id.clone(),
                stream_id,
                encoding: data.encoding,
                sample_rate: data.sample_rate,
                channels: data.channels,
                started_at: chrono::Utc::now(),
            });
            state.turn = TurnState::Greeting;
        }
        info!(connection_id = %self.connection_id, call_id, "stream started");
        self.send_greeting().await;
    }

    async fn handle_audio(self: &Arc<Self>, data: AudioData) {
        let pcm = match audio::decode_base64(&data.audio_b64) {
            Ok(pcm) => pcm,
            Err(err) => {
                debug!(connection_id = %self.connection_id, %err, "dropping bad audio frame");
                return;
            }
        };

        let should_drain = {
            let mut state = self.state.lock().await;
            if state.call_ended {
                return;
            }
            state.audio_buffer.push(AudioChunk { pcm, arrival: Instant::now() });

            let max_buffer_ms = self.config.session.max_buffer_ms as f64;
            while state.accumulated_ms() > max_buffer_ms && state.audio_buffer.len() > 1 {
                state.audio_buffer.remove(0);
                warn!(connection_id = %self.connection_id, "audio_buffer exceeded max_buffer_ms, dropping oldest chunk");
            }

            let accumulated = state.accumulated_ms();
            let threshold = self.config.session.min_accumulation_ms_before_stt as f64;
            accumulated >= threshold && state.waiting_for_user && !state.is_processing
        };

        if should_drain {
            self.try_drain_and_process(false).await;
        }
    }

    /// Attempts to drain the audio buffer and run one turn. Rejects
    /// re-entrant processing by checking `is_processing` before acquiring
    /// `processing_lock` (SPEC_FULL §4.5.6).
    async fn try_drain_and_process(self: &Arc<Self>, forced: bool) {
        {
            let state = self.state.lock().await;
            if state.is_processing || state.call_ended {
                return;
            }
        }

        let _guard = self.processing_lock.lock().await;

        let pcm = {
            let mut state = self.state.lock().await;
            if state.is_processing || state.call_ended {
                return;
            }
            if state.audio_buffer.is_empty() {
                return;
            }
            if !forced {
                let threshold = self.config.session.min_accumulation_ms_before_stt as f64;
                if state.accumulated_ms() < threshold {
                    return;
                }
            }

            state.is_processing = true;
            state.waiting_for_user = false;
            state.turn = TurnState::Processing;
            state.last_drain_at = Instant::now();

            let chunks: Vec<Vec<u8>> = state.audio_buffer.drain(..).map(|c| c.pcm).collect();
            audio::concat(&chunks)
        };

        turn::run_turn(self, pcm).await;

        {
            let mut state = self.state.lock().await;
            state.is_processing = false;
            if state.turn == TurnState::Processing {
                state.turn = TurnState::Listening;
            }
        }
    }

    async fn send_greeting(self: &Arc<Self>) {
        let (language, speaker) = {
            let state = self.state.lock().await;
            (state.current_language.clone(), language::speaker_for(&state.current_language).to_string())
        };

        let text = language::greeting_for(&language);
        let pcm = match self.providers.tts.synthesize(text, &language, &speaker).await {
            Ok(pcm) => pcm,
            Err(err) => {
                warn!(connection_id = %self.connection_id, %err, "greeting TTS failed, sending silent placeholder");
                Vec::new()
            }
        };

        self.send_outbound_audio(pcm).await;

        {
            let mut state = self.state.lock().await;
            state.conversation_history.push(HistoryEntry { role: Role::Assistant, content: text.to_string() });
            state.greeting_sent = true;
            state.waiting_for_user = true;
            state.last_ai_response_at = Some(Instant::now());
            state.turn = TurnState::Listening;
        }

        self.reset_watchdog();
    }

    /// Pushes one outbound `audio` frame with a fresh, strictly increasing
    /// `chunk_id` (SPEC_FULL §4.5.4, invariant #1). Dropped silently once the
    /// call has ended (invariant #9).
    async fn send_outbound_audio(self: &Arc<Self>, pcm: Vec<u8>) {
        let chunk_id = {
            let mut state = self.state.lock().await;
            if state.call_ended {
                return;
            }
            state.outbound_chunk_counter += 1;
            let duration_ms = audio::pcm_stats(&pcm, audio::WIRE_SAMPLE_RATE).duration_ms;
            state.outbound_playback_until = Some(Instant::now() + Duration::from_millis(duration_ms as u64));
            state.outbound_chunk_counter
        };

        let frame = OutboundFrame::Audio {
            audio_b64: audio::encode_base64(&pcm),
            chunk_id,
        };
        if self.outbound_tx.send(frame).await.is_err() {
            debug!(connection_id = %self.connection_id, "outbound channel closed, dropping audio frame");
        }
    }

    /// Sends `clear` ahead of a new response only when a prior TTS stream is
    /// still estimated to be playing (conditional barge-in).
    async fn maybe_send_clear(self: &Arc<Self>) {
        let inflight = self.state.lock().await.outbound_inflight();
        if inflight {
            let _ = self.outbound_tx.send(OutboundFrame::Clear {}).await;
        }
    }

    /// (Re)starts the silence watchdog, aborting any previous instance. The
    /// task sleeps for the configured interval, then checks whether the
    /// session has seen user speech or a response since it started; if not,
    /// it sends a warning or ends the call, per SPEC_FULL §4.5.1.
    fn reset_watchdog(self: &Arc<Self>) {
        let session = self.clone();
        let interval = Duration::from_secs(self.config.session.silence_warning_interval_seconds);

        tokio::spawn(async move {
            let mut guard = session.watchdog.lock().await;
            if let Some(handle) = guard.take() {
                handle.abort();
            }
            let task = tokio::spawn(watchdog_loop(session.clone(), interval));
            *guard = Some(task);
        });
    }

    async fn end_call(self: &Arc<Self>) {
        let (language, speaker) = {
            let mut state = self.state.lock().await;
            if state.call_ended {
                return;
            }
            state.waiting_for_user = false;
            state.audio_buffer.clear();
            state.turn = TurnState::Ending;
            (state.current_language.clone(), language::speaker_for(&state.current_language).to_string())
        };

        let text = language::farewell_for(&language);
        if let Ok(pcm) = self.providers.tts.synthesize(text, &language, &speaker).await {
            self.send_outbound_audio(pcm).await;
        }

        let grace = Duration::from_secs(self.config.session.shutdown_grace_seconds);
        tokio::time::sleep(grace).await;

        {
            let mut state = self.state.lock().await;
            state.call_ended = true;
            state.turn = TurnState::Ended;
        }
        self.request_close(1000, "Call ended due to inactivity").await;
    }

    /// Immediate teardown on a fatal socket error: no farewell, cancel
    /// watchdog, drop buffers (SPEC_FULL §7 — only `Fatal` skips local
    /// recovery).
    pub async fn teardown_fatal(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        state.call_ended = true;
        state.waiting_for_user = false;
        state.audio_buffer.clear();
        state.turn = TurnState::Ended;
        drop(state);

        if let Some(handle) = self.watchdog.lock().await.take() {
            handle.abort();
        }
    }
}

async fn watchdog_loop(session: Arc<Session>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;

        let (ended, reference, warnings, max_warnings, buffer_ms, threshold_ms, last_drain_age) = {
            let state = session.state.lock().await;
            if state.call_ended {
                return;
            }
            let reference = state.last_user_speech_at.or(state.last_ai_response_at);
            (
                state.call_ended,
                reference,
                state.silence_warnings,
                session.config.session.max_silence_warnings,
                state.accumulated_ms(),
                session.config.session.min_accumulation_ms_before_stt as f64,
                state.last_drain_at.elapsed(),
            )
        };
        if ended {
            return;
        }

        // Force a drain if a quiet caller's buffer has gone un-drained for
        // 2x the accumulation threshold (SPEC_FULL §4.5.5 anti-starvation).
        if buffer_ms > 0.0 && last_drain_age >= Duration::from_millis((2.0 * threshold_ms) as u64) {
            session.try_drain_and_process(true).await;
            continue;
        }

        let idle_for = reference.map(|t| t.elapsed()).unwrap_or(Duration::MAX);
        if idle_for < interval {
            continue;
        }

        if warnings < max_warnings {
            let (language, speaker) = {
                let state = session.state.lock().await;
                (state.current_language.clone(), language::speaker_for(&state.current_language).to_string())
            };
            let text = language::silence_prompt(&language, warnings + 1);
            if let Ok(pcm) = session.providers.tts.synthesize(text, &language, &speaker).await {
                session.send_outbound_audio(pcm).await;
            }
            let mut state = session.state.lock().await;
            state.silence_warnings += 1;
            state.last_ai_response_at = Some(Instant::now());
        } else {
            session.end_call().await;
            return;
        }
    }
}

/// Meaningful-speech predicate (SPEC_FULL §4.5.2). Applied after STT to gate
/// LLM invocation.
pub fn meaningful(transcript: &str) -> bool {
    const FILLERS: &[&str] = &["so", "um", "uh", "hmm", "ah", "er", "well", "and", "the", "but", "oh"];

    let cleaned = transcript.trim().to_lowercase();
    if cleaned.is_empty() || FILLERS.contains(&cleaned.as_str()) {
        return false;
    }
    if cleaned.len() < 4 {
        return false;
    }

    let words: Vec<&str> = cleaned.split_whitespace().collect();
    words.len() >= 2 || (words.len() == 1 && words[0].len() >= 5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meaningful_rejects_fillers_and_short_strings() {
        for s in ["", "so", "uh", "oh", "hi"] {
            assert!(!meaningful(s), "expected {s:?} to be non-meaningful");
        }
    }

    #[test]
    fn meaningful_accepts_sentences_and_long_single_words() {
        for s in ["hello", "ok go", "kya haal hai"] {
            assert!(meaningful(s), "expected {s:?} to be meaningful");
        }
    }

    #[test]
    fn history_pairs_drops_leading_greeting() {
        let mut state = SessionState::new("hi-IN");
        state.conversation_history.push(HistoryEntry { role: Role::Assistant, content: "greeting".into() });
        state.conversation_history.push(HistoryEntry { role: Role::User, content: "hello".into() });
        state.conversation_history.push(HistoryEntry { role: Role::Assistant, content: "hi there".into() });
        let pairs = state.history_pairs();
        assert_eq!(pairs, vec![("hello".to_string(), "hi there".to_string())]);
    }

    #[test]
    fn outbound_inflight_is_false_once_playback_window_elapses() {
        let mut state = SessionState::new("hi-IN");
        assert!(!state.outbound_inflight());
        state.outbound_playback_until = Some(Instant::now() + Duration::from_millis(50));
        assert!(state.outbound_inflight());
        std::thread::sleep(Duration::from_millis(60));
        assert!(!state.outbound_inflight());
    }
}
