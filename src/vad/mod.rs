//! Frame-based voice activity detection over raw PCM buffers.
//!
//! The teacher's `voice/vad.rs` drives a streaming state machine (onset /
//! hangover smoothing, adaptive noise floor) tuned for a continuous mic
//! capture. The telephony gateway classifies one already-accumulated
//! utterance buffer at a time, so this module keeps the teacher's
//! config-struct-with-defaults and frame-processing shape but collapses the
//! streaming state machine into a single-shot ratio/duration classifier.

use serde::{Deserialize, Serialize};

/// Default frame size in milliseconds.
pub const DEFAULT_FRAME_MS: u32 = 20;

/// Default RMS energy threshold (int16 scale) used by the fallback oracle.
pub const DEFAULT_ENERGY_THRESHOLD: f64 = 300.0;

const MIN_SPEECH_RATIO: f64 = 0.05;
const MIN_SPEECH_DURATION_MS: f64 = 150.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VadConfig {
    pub frame_ms: u32,
    pub energy_threshold: f64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            frame_ms: DEFAULT_FRAME_MS,
            energy_threshold: DEFAULT_ENERGY_THRESHOLD,
        }
    }
}

/// Per-frame and aggregate classification stats for a PCM buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadStats {
    pub speech_frames: usize,
    pub total_frames: usize,
    pub speech_ratio: f64,
    pub speech_duration_ms: f64,
}

impl VadStats {
    fn empty() -> Self {
        Self {
            speech_frames: 0,
            total_frames: 0,
            speech_ratio: 0.0,
            speech_duration_ms: 0.0,
        }
    }
}

pub struct Vad {
    config: VadConfig,
}

impl Default for Vad {
    fn default() -> Self {
        Self::new(VadConfig::default())
    }
}

impl Vad {
    pub fn new(config: VadConfig) -> Self {
        Self { config }
    }

    fn frame_len_bytes(&self, sample_rate: u32) -> usize {
        let samples_per_frame = (sample_rate as u64 * self.config.frame_ms as u64 / 1000) as usize;
        samples_per_frame * crate::audio::SAMPLE_WIDTH
    }

    fn classify_frame(&self, frame: &[u8]) -> bool {
        let samples: Vec<i16> = frame
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        if samples.is_empty() {
            return false;
        }
        let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        let rms = (sum_sq / samples.len() as f64).sqrt();
        rms >= self.config.energy_threshold
    }

    /// Frame-based classification stats for a PCM buffer.
    pub fn stats(&self, pcm: &[u8], sample_rate: u32) -> VadStats {
        let frame_len = self.frame_len_bytes(sample_rate);
        if frame_len == 0 || pcm.len() < frame_len {
            return VadStats::empty();
        }

        let frames: Vec<&[u8]> = pcm.chunks(frame_len).filter(|f| f.len() == frame_len).collect();
        let total_frames = frames.len();
        if total_frames == 0 {
            return VadStats::empty();
        }

        let speech_frames = frames.iter().filter(|f| self.classify_frame(f)).count();
        let speech_ratio = speech_frames as f64 / total_frames as f64;
        let speech_duration_ms = speech_frames as f64 * self.config.frame_ms as f64;

        VadStats {
            speech_frames,
            total_frames,
            speech_ratio,
            speech_duration_ms,
        }
    }

    /// Whether the buffer contains speech: at least one speech frame AND
    /// `speech_ratio >= 0.05` AND `speech_duration_ms >= 150`. Borderline
    /// ratios resolve to non-speech.
    pub fn has_speech(&self, pcm: &[u8], sample_rate: u32) -> bool {
        let stats = self.stats(pcm, sample_rate);
        stats.speech_frames > 0
            && stats.speech_ratio >= MIN_SPEECH_RATIO
            && stats.speech_duration_ms >= MIN_SPEECH_DURATION_MS
    }

    /// Concatenation of frames classified as speech, preserving order.
    pub fn filter_speech(&self, pcm: &[u8], sample_rate: u32) -> Vec<u8> {
        let frame_len = self.frame_len_bytes(sample_rate);
        if frame_len == 0 || pcm.len() < frame_len {
            return Vec::new();
        }

        pcm.chunks(frame_len)
            .filter(|f| f.len() == frame_len && self.classify_frame(f))
            .flatten()
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silence(duration_ms: u32, sample_rate: u32) -> Vec<u8> {
        let n_samples = (sample_rate as u64 * duration_ms as u64 / 1000) as usize;
        vec![0u8; n_samples * 2]
    }

    fn sine(duration_ms: u32, sample_rate: u32, freq_hz: f64, amplitude: i16) -> Vec<u8> {
        let n_samples = (sample_rate as u64 * duration_ms as u64 / 1000) as usize;
        let mut out = Vec::with_capacity(n_samples * 2);
        for i in 0..n_samples {
            let t = i as f64 / sample_rate as f64;
            let value = (amplitude as f64 * (2.0 * std::f64::consts::PI * freq_hz * t).sin()) as i16;
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }

    #[test]
    fn pure_silence_has_no_speech() {
        let vad = Vad::default();
        let pcm = silence(1000, 8000);
        assert!(!vad.has_speech(&pcm, 8000));
    }

    #[test]
    fn loud_sine_is_speech() {
        let vad = Vad::default();
        let pcm = sine(400, 8000, 1000.0, i16::MAX / 2);
        assert!(vad.has_speech(&pcm, 8000));
    }

    #[test]
    fn short_buffer_returns_false_with_empty_stats() {
        let vad = Vad::default();
        let pcm = vec![0u8; 10];
        assert!(!vad.has_speech(&pcm, 8000));
        let stats = vad.stats(&pcm, 8000);
        assert_eq!(stats, VadStats::empty());
        assert!(vad.filter_speech(&pcm, 8000).is_empty());
    }

    #[test]
    fn filter_speech_preserves_order_and_drops_silence() {
        let vad = Vad::default();
        let mut pcm = silence(100, 8000);
        pcm.extend(sine(400, 8000, 1000.0, i16::MAX / 2));
        pcm.extend(silence(100, 8000));
        let filtered = vad.filter_speech(&pcm, 8000);
        assert!(!filtered.is_empty());
        assert!(filtered.len() < pcm.len());
    }
}
