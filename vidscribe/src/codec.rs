//! Canonical audio container and PCM helpers.
//!
//! Everything here is pure byte/sample manipulation: 44-byte RIFF/WAVE header,
//! 16-bit little-endian signed PCM, linear-interpolation resampling and
//! channel mixdown. No I/O.

/// Byte length of the canonical container header.
pub const HEADER_LEN: usize = 44;

/// An encoded audio clip in the canonical uncompressed container format.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
}

impl AudioClip {
    /// Channel count declared in the header.
    pub fn channels(&self) -> u16 {
        read_u16(&self.bytes, 22)
    }

    /// Sample rate declared in the header.
    pub fn sample_rate(&self) -> u32 {
        read_u32(&self.bytes, 24)
    }

    /// Payload byte count declared in the header.
    pub fn data_size(&self) -> u32 {
        read_u32(&self.bytes, 40)
    }

    /// Duration in seconds implied by the header.
    pub fn duration_secs(&self) -> f64 {
        let rate = self.sample_rate();
        let channels = self.channels().max(1);
        if rate == 0 {
            return 0.0;
        }
        let frames = self.data_size() as f64 / (channels as f64 * 2.0);
        frames / rate as f64
    }

    /// Locate the PCM payload by scanning for the `data` marker within the
    /// first 64 bytes, tolerating extended headers. If no marker is found the
    /// whole buffer is treated as payload (lenient fallback, not an error).
    pub fn payload(&self) -> &[u8] {
        let window = self.bytes.len().min(64);
        if window >= 4 {
            for i in 0..=window - 4 {
                if &self.bytes[i..i + 4] == b"data" {
                    // marker + 4-byte size field precede the PCM
                    let start = (i + 8).min(self.bytes.len());
                    return &self.bytes[start..];
                }
            }
        }
        &self.bytes
    }

    /// Decode the payload back to float samples in [-1, 1].
    pub fn samples(&self) -> Vec<f32> {
        self.payload()
            .chunks_exact(2)
            .map(|chunk| {
                let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
                sample as f32 / 32768.0
            })
            .collect()
    }
}

/// Quantize float samples to 16-bit PCM and wrap them in a well-formed
/// canonical container. NaN samples are treated as silence; everything else
/// is clamped to [-1, 1] before scaling.
pub fn encode_pcm16(samples: &[f32], sample_rate: u32, channels: u16) -> AudioClip {
    let data_size = (samples.len() * 2) as u32;
    let byte_rate = sample_rate * channels as u32 * 2;
    let block_align = channels * 2;

    let mut bytes = Vec::with_capacity(HEADER_LEN + samples.len() * 2);

    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_size).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");

    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());

    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_size.to_le_bytes());

    for &sample in samples {
        bytes.extend_from_slice(&quantize(sample).to_le_bytes());
    }

    AudioClip { bytes }
}

/// Little-endian header field reads. A buffer too short for the field reads
/// as 0 rather than panicking; foreign buffers without a canonical header are
/// legitimate input for `payload()`.
fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    match bytes.get(offset..offset + 2) {
        Some(b) => u16::from_le_bytes([b[0], b[1]]),
        None => 0,
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    match bytes.get(offset..offset + 4) {
        Some(b) => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        None => 0,
    }
}

fn quantize(sample: f32) -> i16 {
    let s = if sample.is_nan() { 0.0 } else { sample };
    let s = s.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Linear-interpolation resampling. Identity when rates match. The final
/// source sample is reused as both neighbors so the tail never reads past
/// the end.
pub fn resample(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = src_rate as f64 / dst_rate as f64;
    let out_len = (samples.len() as f64 / ratio).round() as usize;
    let last = samples.len() - 1;

    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let i0 = (src_pos.floor() as usize).min(last);
        let i1 = (i0 + 1).min(last);
        let frac = (src_pos - i0 as f64) as f32;
        out.push(samples[i0] * (1.0 - frac) + samples[i1] * frac);
    }
    out
}

/// Per-sample arithmetic mean across channels. A single channel passes
/// through unchanged.
pub fn mix_to_mono(channels: &[Vec<f32>]) -> Vec<f32> {
    match channels {
        [] => Vec::new(),
        [only] => only.clone(),
        many => {
            let frames = many.iter().map(Vec::len).max().unwrap_or(0);
            let n = many.len() as f32;
            (0..frames)
                .map(|i| {
                    many.iter()
                        .map(|ch| ch.get(i).copied().unwrap_or(0.0))
                        .sum::<f32>()
                        / n
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: f32 = 1.0 / 32768.0;

    #[test]
    fn test_header_layout() {
        let clip = encode_pcm16(&[0.0; 4], 16_000, 1);
        assert_eq!(&clip.bytes[0..4], b"RIFF");
        assert_eq!(&clip.bytes[8..12], b"WAVE");
        assert_eq!(&clip.bytes[12..16], b"fmt ");
        assert_eq!(&clip.bytes[36..40], b"data");
        assert_eq!(clip.channels(), 1);
        assert_eq!(clip.sample_rate(), 16_000);
        assert_eq!(clip.data_size(), 8);
        // declared byte counts consistent with payload length
        assert_eq!(clip.bytes.len(), HEADER_LEN + clip.data_size() as usize);
    }

    #[test]
    fn test_one_second_of_silence() {
        // 16000 mono zero samples at 16kHz: dataSize 32000, 44-byte header
        let clip = encode_pcm16(&vec![0.0; 16_000], 16_000, 1);
        assert_eq!(clip.data_size(), 32_000);
        assert_eq!(clip.bytes.len(), 44 + 32_000);
        assert!((clip.duration_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_encode_payload_round_trip() {
        let samples = vec![0.0, 0.5, -0.5, 1.0, -1.0, 0.25, -0.125];
        let clip = encode_pcm16(&samples, 16_000, 1);
        let decoded = clip.samples();
        assert_eq!(decoded.len(), samples.len());
        for (orig, dec) in samples.iter().zip(&decoded) {
            assert!(
                (orig - dec).abs() <= STEP + 1e-7,
                "round trip error too large: {orig} vs {dec}"
            );
        }
    }

    #[test]
    fn test_quantize_clamps_out_of_range() {
        assert_eq!(quantize(2.0), 32767);
        assert_eq!(quantize(-2.0), -32768);
    }

    #[test]
    fn test_quantize_nan_is_silence() {
        assert_eq!(quantize(f32::NAN), 0);
    }

    #[test]
    fn test_header_accessors_on_undersized_buffer() {
        // a foreign buffer shorter than a canonical header reads as zeroed
        // fields instead of panicking
        let clip = AudioClip {
            bytes: vec![1, 2, 3],
        };
        assert_eq!(clip.channels(), 0);
        assert_eq!(clip.sample_rate(), 0);
        assert_eq!(clip.data_size(), 0);
        assert_eq!(clip.duration_secs(), 0.0);
    }

    #[test]
    fn test_payload_without_marker_is_whole_buffer() {
        let clip = AudioClip {
            bytes: vec![1, 2, 3, 4, 5, 6],
        };
        assert_eq!(clip.payload(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_payload_skips_extended_header() {
        // marker shifted past the standard 36-byte offset
        let mut bytes = vec![0u8; 50];
        bytes[46..50].copy_from_slice(b"data");
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&[9, 9, 9, 9]);
        let clip = AudioClip { bytes };
        assert_eq!(clip.payload(), &[9, 9, 9, 9]);
    }

    #[test]
    fn test_resample_identity() {
        let samples = vec![0.1, -0.2, 0.3, 0.4];
        assert_eq!(resample(&samples, 16_000, 16_000), samples);
    }

    #[test]
    fn test_resample_output_length() {
        let samples = vec![0.0f32; 48_000];
        let out = resample(&samples, 48_000, 16_000);
        assert_eq!(out.len(), 16_000);

        let out = resample(&samples, 48_000, 44_100);
        assert_eq!(out.len(), (48_000f64 * 44_100.0 / 48_000.0).round() as usize);
    }

    #[test]
    fn test_resample_upsampling_interpolates() {
        let samples = vec![0.0, 1.0];
        let out = resample(&samples, 8_000, 16_000);
        assert_eq!(out.len(), 4);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
        assert!((out[2] - 1.0).abs() < 1e-6);
        // tail clamps to the final sample instead of reading past the end
        assert!((out[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_resample_empty() {
        assert!(resample(&[], 48_000, 16_000).is_empty());
    }

    #[test]
    fn test_mix_to_mono_single_channel_unchanged() {
        let ch = vec![0.1, 0.2, 0.3];
        assert_eq!(mix_to_mono(&[ch.clone()]), ch);
    }

    #[test]
    fn test_mix_to_mono_averages_stereo() {
        let left = vec![1.0, 0.0, -1.0];
        let right = vec![0.0, 0.0, 1.0];
        let mono = mix_to_mono(&[left, right]);
        assert_eq!(mono, vec![0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_mix_to_mono_empty() {
        assert!(mix_to_mono(&[]).is_empty());
    }
}
