//! Orchestrator-owned transcript state for one processing run.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::segment::Segment;

/// A single word with approximate timing.
///
/// Timing is uniform interpolation across the segment's duration, not
/// acoustic alignment: token `i` of `n` spans the `[i/n, (i+1)/n]` fraction
/// of the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

/// The recorded outcome for one segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SegmentEntry {
    /// A backend produced text for this segment.
    Recognized { text: String, words: Vec<Word> },
    /// A backend answered, but with no text. Distinguishable from failure.
    Empty,
    /// Every backend failed. `artifact` points at the raw segment clip
    /// written out for manual handling, when one was produced.
    Failed {
        reason: String,
        artifact: Option<PathBuf>,
    },
}

impl SegmentEntry {
    pub fn is_recognized(&self) -> bool {
        matches!(self, SegmentEntry::Recognized { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SegmentEntry::Failed { .. })
    }
}

/// Running state of one transcription run: the immutable segment sequence,
/// one entry per completed segment, and the cursor for the next segment to
/// process. Created when processing starts; replaced wholesale for a new
/// source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSession {
    segments: Vec<Segment>,
    entries: BTreeMap<u32, SegmentEntry>,
    cursor: u32,
}

impl TranscriptSession {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self {
            segments,
            entries: BTreeMap::new(),
            cursor: 1,
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// 1-based index of the next unprocessed segment.
    pub fn next_index(&self) -> u32 {
        self.cursor
    }

    pub fn is_complete(&self) -> bool {
        self.entries.len() >= self.segments.len()
    }

    pub fn entry(&self, index: u32) -> Option<&SegmentEntry> {
        self.entries.get(&index)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&u32, &SegmentEntry)> {
        self.entries.iter()
    }

    /// Record the outcome for a segment and advance the cursor past it.
    pub fn record(&mut self, index: u32, entry: SegmentEntry) {
        self.entries.insert(index, entry);
        while self.entries.contains_key(&self.cursor) {
            self.cursor += 1;
        }
    }

    /// Accumulated transcript: recognized entries in segment order, joined
    /// with single spaces.
    pub fn text(&self) -> String {
        self.entries
            .values()
            .filter_map(|e| match e {
                SegmentEntry::Recognized { text, .. } => {
                    let t = text.trim();
                    (!t.is_empty()).then_some(t)
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// All words with their approximate timings, in segment order.
    pub fn words(&self) -> Vec<Word> {
        self.entries
            .values()
            .filter_map(|e| match e {
                SegmentEntry::Recognized { words, .. } => Some(words.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn recognized_in_order(&self) -> impl Iterator<Item = (&Segment, &str)> {
        self.segments.iter().filter_map(|seg| {
            match self.entries.get(&seg.index) {
                Some(SegmentEntry::Recognized { text, .. }) if !text.trim().is_empty() => {
                    Some((seg, text.trim()))
                }
                _ => None,
            }
        })
    }

    /// Format as SRT subtitles. Only recognized segments are rendered.
    pub fn to_srt(&self) -> String {
        let mut out = String::new();
        for (i, (seg, text)) in self.recognized_in_order().enumerate() {
            out.push_str(&format!("{}\n", i + 1));
            out.push_str(&format!(
                "{} --> {}\n",
                format_srt_time(seg.start_secs),
                format_srt_time(seg.end_secs())
            ));
            out.push_str(text);
            out.push_str("\n\n");
        }
        out
    }

    /// Format as WebVTT subtitles.
    pub fn to_vtt(&self) -> String {
        let mut out = String::from("WEBVTT\n\n");
        for (seg, text) in self.recognized_in_order() {
            out.push_str(&format!(
                "{} --> {}\n",
                format_vtt_time(seg.start_secs),
                format_vtt_time(seg.end_secs())
            ));
            out.push_str(text);
            out.push_str("\n\n");
        }
        out
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Spread a segment's whitespace tokens uniformly across its window.
/// Token `i` completes at fraction `(i+1)/n` of the elapsed segment time.
pub fn interpolate_words(text: &str, segment: &Segment) -> Vec<Word> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let n = tokens.len();
    if n == 0 {
        return Vec::new();
    }

    let step = segment.duration_secs / n as f64;
    tokens
        .into_iter()
        .enumerate()
        .map(|(i, token)| Word {
            text: token.to_string(),
            start: segment.start_secs + step * i as f64,
            end: segment.start_secs + step * (i + 1) as f64,
        })
        .collect()
}

/// Format seconds as SRT timestamp: HH:MM:SS,mmm
fn format_srt_time(seconds: f64) -> String {
    let total_ms = (seconds * 1000.0) as u64;
    let h = total_ms / 3_600_000;
    let m = (total_ms % 3_600_000) / 60_000;
    let s = (total_ms % 60_000) / 1_000;
    let ms = total_ms % 1_000;
    format!("{h:02}:{m:02}:{s:02},{ms:03}")
}

/// Format seconds as VTT timestamp: HH:MM:SS.mmm
fn format_vtt_time(seconds: f64) -> String {
    let total_ms = (seconds * 1000.0) as u64;
    let h = total_ms / 3_600_000;
    let m = (total_ms % 3_600_000) / 60_000;
    let s = (total_ms % 60_000) / 1_000;
    let ms = total_ms % 1_000;
    format!("{h:02}:{m:02}:{s:02}.{ms:03}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::compute_segments;

    fn session_25s() -> TranscriptSession {
        TranscriptSession::new(compute_segments(25.0, 10.0))
    }

    fn recognized(text: &str, seg: &Segment) -> SegmentEntry {
        SegmentEntry::Recognized {
            text: text.to_string(),
            words: interpolate_words(text, seg),
        }
    }

    #[test]
    fn test_text_joins_in_segment_order() {
        let mut session = session_25s();
        let segs = session.segments().to_vec();
        session.record(2, recognized("two", &segs[1]));
        session.record(1, recognized("one", &segs[0]));
        session.record(3, recognized("three", &segs[2]));
        assert_eq!(session.text(), "one two three");
    }

    #[test]
    fn test_failed_and_empty_entries_excluded_from_text() {
        let mut session = session_25s();
        let segs = session.segments().to_vec();
        session.record(1, recognized("hello", &segs[0]));
        session.record(
            2,
            SegmentEntry::Failed {
                reason: "backend down".into(),
                artifact: None,
            },
        );
        session.record(3, SegmentEntry::Empty);
        assert_eq!(session.text(), "hello");
        assert!(session.is_complete());
    }

    #[test]
    fn test_cursor_advances_past_contiguous_entries() {
        let mut session = session_25s();
        let segs = session.segments().to_vec();
        assert_eq!(session.next_index(), 1);
        session.record(1, recognized("a", &segs[0]));
        assert_eq!(session.next_index(), 2);
        // out-of-order record does not move the cursor past a gap
        session.record(3, recognized("c", &segs[2]));
        assert_eq!(session.next_index(), 2);
        session.record(2, recognized("b", &segs[1]));
        assert_eq!(session.next_index(), 4);
    }

    #[test]
    fn test_interpolate_words_uniform_fractions() {
        let seg = Segment { index: 1, start_secs: 10.0, duration_secs: 10.0 };
        let words = interpolate_words("alpha beta gamma delta", &seg);
        assert_eq!(words.len(), 4);
        assert_eq!(words[0].start, 10.0);
        assert_eq!(words[0].end, 12.5);
        assert_eq!(words[3].start, 17.5);
        assert_eq!(words[3].end, 20.0);
        // each token completes at (i+1)/n of elapsed segment time
        for (i, w) in words.iter().enumerate() {
            let expected = 10.0 + 10.0 * (i as f64 + 1.0) / 4.0;
            assert!((w.end - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_interpolate_words_empty_text() {
        let seg = Segment { index: 1, start_secs: 0.0, duration_secs: 10.0 };
        assert!(interpolate_words("   ", &seg).is_empty());
    }

    #[test]
    fn test_srt_renders_recognized_segments_only() {
        let mut session = session_25s();
        let segs = session.segments().to_vec();
        session.record(1, recognized("first line", &segs[0]));
        session.record(
            2,
            SegmentEntry::Failed {
                reason: "x".into(),
                artifact: None,
            },
        );
        session.record(3, recognized("last line", &segs[2]));

        let srt = session.to_srt();
        assert!(srt.contains("1\n00:00:00,000 --> 00:00:10,000\nfirst line"));
        // the failed segment is skipped and numbering stays dense
        assert!(srt.contains("2\n00:00:20,000 --> 00:00:25,000\nlast line"));
        assert!(!srt.contains("backend"));
    }

    #[test]
    fn test_vtt_header_and_times() {
        let mut session = session_25s();
        let segs = session.segments().to_vec();
        session.record(2, recognized("middle", &segs[1]));
        let vtt = session.to_vtt();
        assert!(vtt.starts_with("WEBVTT\n\n"));
        assert!(vtt.contains("00:00:10.000 --> 00:00:20.000\nmiddle"));
    }

    #[test]
    fn test_json_round_trip() {
        let mut session = session_25s();
        let segs = session.segments().to_vec();
        session.record(1, recognized("hi there", &segs[0]));
        let json = session.to_json().unwrap();
        let back: TranscriptSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back.text(), "hi there");
        assert_eq!(back.segments().len(), 3);
    }
}
