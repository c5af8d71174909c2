//! Audio codec: conversions between the telephony wire format (raw 16-bit
//! little-endian signed PCM, 8kHz mono) and the WAV containers STT providers
//! expect, plus base64 framing and basic signal stats.

use crate::error::ProviderError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::io::Cursor;

/// Sample width in bytes for 16-bit PCM.
pub const SAMPLE_WIDTH: usize = 2;

/// Telephony wire sample rate.
pub const WIRE_SAMPLE_RATE: u32 = 8000;

/// Basic amplitude/duration statistics for a PCM buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PcmStats {
    pub rms: f64,
    pub peak: i16,
    pub duration_ms: f64,
}

/// Decode a base64 string into raw bytes.
pub fn decode_base64(s: &str) -> Result<Vec<u8>, ProviderError> {
    STANDARD
        .decode(s)
        .map_err(|e| ProviderError::BadAudio(format!("invalid base64: {e}")))
}

/// Encode raw bytes as a base64 string.
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Concatenate PCM chunks in order. Associative and total.
pub fn concat(chunks: &[Vec<u8>]) -> Vec<u8> {
    chunks.iter().flat_map(|c| c.iter().copied()).collect()
}

/// Zero-pad the tail of `pcm` so its length is a multiple of `alignment`.
pub fn align(pcm: &[u8], alignment: usize) -> Vec<u8> {
    let remainder = pcm.len() % alignment;
    if remainder == 0 {
        return pcm.to_vec();
    }
    let mut out = pcm.to_vec();
    out.resize(pcm.len() + (alignment - remainder), 0);
    out
}

/// Wrap raw PCM in a RIFF/WAVE container (one `fmt ` chunk, one `data` chunk).
pub fn pcm_to_wav(
    pcm: &[u8],
    sample_rate: u32,
    channels: u16,
    sample_width: u16,
) -> Result<Vec<u8>, ProviderError> {
    let aligned = align(pcm, sample_width as usize * channels as usize);

    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: sample_width * 8,
        sample_format: hound::SampleFormat::Int,
    };

    let mut buffer = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut buffer, spec)
            .map_err(|e| ProviderError::BadAudio(format!("wav writer init failed: {e}")))?;
        for chunk in aligned.chunks_exact(2) {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            writer
                .write_sample(sample)
                .map_err(|e| ProviderError::BadAudio(format!("wav write failed: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| ProviderError::BadAudio(format!("wav finalize failed: {e}")))?;
    }

    Ok(buffer.into_inner())
}

/// Extract raw little-endian 16-bit PCM from a WAV container.
pub fn pcm_from_wav(wav: &[u8]) -> Result<Vec<u8>, ProviderError> {
    let mut reader = hound::WavReader::new(Cursor::new(wav))
        .map_err(|e| ProviderError::BadAudio(format!("wav reader init failed: {e}")))?;

    let mut out = Vec::with_capacity(wav.len());
    for sample in reader.samples::<i16>() {
        let sample = sample.map_err(|e| ProviderError::BadAudio(format!("wav decode failed: {e}")))?;
        out.extend_from_slice(&sample.to_le_bytes());
    }
    Ok(out)
}

/// RMS/peak amplitude and implied duration for a PCM buffer.
pub fn pcm_stats(pcm: &[u8], sample_rate: u32) -> PcmStats {
    if pcm.len() < SAMPLE_WIDTH {
        return PcmStats {
            rms: 0.0,
            peak: 0,
            duration_ms: 0.0,
        };
    }

    let samples: Vec<i16> = pcm
        .chunks_exact(SAMPLE_WIDTH)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();

    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    let rms = (sum_sq / samples.len() as f64).sqrt();
    let peak = samples.iter().map(|&s| s.unsigned_abs()).max().unwrap_or(0) as i16;
    let duration_ms = duration_ms(pcm.len(), sample_rate);

    PcmStats {
        rms,
        peak,
        duration_ms,
    }
}

/// `duration_ms = (len / sample_width) / sample_rate * 1000`.
pub fn duration_ms(byte_len: usize, sample_rate: u32) -> f64 {
    (byte_len as f64 / SAMPLE_WIDTH as f64) / sample_rate as f64 * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_pcm(duration_ms: u32, sample_rate: u32, freq_hz: f64, amplitude: i16) -> Vec<u8> {
        let n_samples = (sample_rate as f64 * duration_ms as f64 / 1000.0) as usize;
        let mut out = Vec::with_capacity(n_samples * 2);
        for i in 0..n_samples {
            let t = i as f64 / sample_rate as f64;
            let value = (amplitude as f64 * (2.0 * std::f64::consts::PI * freq_hz * t).sin()) as i16;
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }

    #[test]
    fn base64_round_trip() {
        let pcm = sine_pcm(50, 8000, 440.0, 8000);
        let encoded = encode_base64(&pcm);
        let decoded = decode_base64(&encoded).unwrap();
        assert_eq!(decoded, pcm);
    }

    #[test]
    fn wav_round_trip() {
        let pcm = sine_pcm(100, 8000, 440.0, 8000);
        let wav = pcm_to_wav(&pcm, 8000, 1, 2).unwrap();
        let back = pcm_from_wav(&wav).unwrap();
        assert_eq!(back, pcm);
    }

    #[test]
    fn align_pads_tail() {
        let pcm = vec![1u8, 2, 3];
        let aligned = align(&pcm, 2);
        assert_eq!(aligned, vec![1, 2, 3, 0]);
        assert_eq!(align(&pcm, 2).len() % 2, 0);
    }

    #[test]
    fn concat_is_associative() {
        let a = vec![1u8, 2];
        let b = vec![3u8, 4];
        let c = vec![5u8, 6];
        let left = concat(&[concat(&[a.clone(), b.clone()]), c.clone()]);
        let right = concat(&[a, concat(&[b, c])]);
        assert_eq!(left, right);
    }

    #[test]
    fn duration_ms_matches_formula() {
        // 8000 samples at 8kHz mono 16-bit = 1 second = 16000 bytes.
        assert_eq!(duration_ms(16_000, 8000), 1000.0);
    }

    #[test]
    fn decode_base64_rejects_garbage() {
        assert!(decode_base64("not valid base64!!").is_err());
    }

    #[test]
    fn pcm_stats_reports_silence() {
        let pcm = vec![0u8; 1600];
        let stats = pcm_stats(&pcm, 8000);
        assert_eq!(stats.rms, 0.0);
        assert_eq!(stats.peak, 0);
    }
}
