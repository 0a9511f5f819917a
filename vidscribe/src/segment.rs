//! Partitioning a source duration into fixed-length transcription windows.

use serde::{Deserialize, Serialize};

use crate::codec::{self, AudioClip};
use crate::decode::Waveform;

/// One contiguous time window over the source, the unit of transcription
/// work. Indices are 1-based and contiguous; only the last segment may be
/// shorter than the configured length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub index: u32,
    pub start_secs: f64,
    pub duration_secs: f64,
}

impl Segment {
    pub fn end_secs(&self) -> f64 {
        self.start_secs + self.duration_secs
    }
}

/// Partition a total duration into `ceil(D/L)` contiguous segments. Pure and
/// deterministic; a non-positive duration or length yields no segments.
pub fn compute_segments(total_duration_secs: f64, segment_len_secs: f64) -> Vec<Segment> {
    if total_duration_secs <= 0.0 || segment_len_secs <= 0.0 {
        return Vec::new();
    }

    let count = (total_duration_secs / segment_len_secs).ceil() as u32;
    (1..=count)
        .map(|index| {
            let start_secs = (index - 1) as f64 * segment_len_secs;
            // clip the final window so no segment extends past the source
            let duration_secs = segment_len_secs.min((total_duration_secs - start_secs).max(0.0));
            Segment {
                index,
                start_secs,
                duration_secs,
            }
        })
        .collect()
}

/// Slice one segment's samples out of a mono waveform and encode them at the
/// target rate. Bounds are clamped to the available samples, so a window
/// hanging past the decoded audio yields a short (possibly empty) clip.
pub fn extract_segment_clip(waveform: &Waveform, segment: &Segment, target_rate: u32) -> AudioClip {
    let rate = waveform.sample_rate;
    let start = (segment.start_secs * rate as f64).round() as usize;
    let frames = (segment.duration_secs * rate as f64).floor() as usize;

    let start = start.min(waveform.samples.len());
    let end = (start + frames).min(waveform.samples.len());

    let samples = codec::resample(&waveform.samples[start..end], rate, target_rate);
    codec::encode_pcm16(&samples, target_rate, 1)
}
