//! Sequential segment orchestration over a pair of recognition backends.
//!
//! Exactly one clip is in flight at any time. When the primary backend
//! reports an availability or execution failure the same clip is retried
//! once on the fallback backend under a safety timeout; any other error is
//! terminal for that segment. A segment that exhausts both backends is
//! recorded as failed (with its raw clip written out when an artifact
//! directory is configured) and processing moves on.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::codec::AudioClip;
use crate::config::PipelineOptions;
use crate::decode::AudioSource;
use crate::error::{Error, Result};
use crate::recognize::Recognizer;
use crate::segment::{compute_segments, Segment};
use crate::session::{interpolate_words, SegmentEntry, TranscriptSession};

/// Extra seconds granted to the fallback backend beyond the clip duration.
const FALLBACK_GRACE_SECS: u64 = 5;

pub struct Orchestrator {
    primary: Box<dyn Recognizer>,
    fallback: Option<Box<dyn Recognizer>>,
    options: PipelineOptions,
    cancel: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(
        primary: Box<dyn Recognizer>,
        fallback: Option<Box<dyn Recognizer>>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            primary,
            fallback,
            options,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for requesting cancellation from another task. Cancellation
    /// takes effect at the next segment boundary; the in-flight call is
    /// allowed to finish.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Process every segment of the source in order and return the finished
    /// session. Single-segment failures never abort the run.
    pub async fn run_batch(&self, source: &AudioSource) -> Result<TranscriptSession> {
        let segments = compute_segments(source.duration_secs(), self.options.segment_secs);
        let mut session = TranscriptSession::new(segments.clone());

        info!(
            path = %source.path().display(),
            segments = segments.len(),
            "starting batch transcription"
        );

        for seg in &segments {
            if self.cancelled() {
                info!(next = seg.index, "cancelled, stopping before next segment");
                break;
            }
            self.process_segment(source, seg, &mut session).await;
        }

        Ok(session)
    }

    /// Follow the source in real time: each window is submitted once the
    /// wall clock has passed its end. The interval timer re-arms only after
    /// the previous recognition call returns, so a slow backend delays later
    /// windows instead of stacking concurrent calls.
    pub async fn run_live(&self, source: &AudioSource) -> Result<TranscriptSession> {
        let segments = compute_segments(source.duration_secs(), self.options.live_interval_secs);
        let mut session = TranscriptSession::new(segments.clone());

        info!(
            path = %source.path().display(),
            windows = segments.len(),
            interval_secs = self.options.live_interval_secs,
            "starting live transcription"
        );

        let started = Instant::now();
        for seg in &segments {
            if self.cancelled() {
                info!(next = seg.index, "cancelled, stopping live session");
                break;
            }

            // Wait until this window has fully elapsed in the source's
            // timeline. If recognition fell behind real time we are already
            // past it and submit immediately.
            let target = Duration::from_secs_f64(seg.end_secs().max(0.0));
            let elapsed = started.elapsed();
            if elapsed < target {
                tokio::time::sleep(target - elapsed).await;
            }

            self.process_segment(source, seg, &mut session).await;
        }

        Ok(session)
    }

    async fn process_segment(
        &self,
        source: &AudioSource,
        seg: &Segment,
        session: &mut TranscriptSession,
    ) {
        debug!(
            index = seg.index,
            start_secs = seg.start_secs,
            duration_secs = seg.duration_secs,
            "processing segment"
        );

        let clip = match source.clip(seg).await {
            Ok(clip) => clip,
            Err(e) => {
                warn!(index = seg.index, error = %e, "failed to extract segment clip");
                session.record(
                    seg.index,
                    SegmentEntry::Failed {
                        reason: format!("clip extraction: {e}"),
                        artifact: None,
                    },
                );
                return;
            }
        };

        let entry = match self.recognize_with_fallback(&clip, seg).await {
            Ok(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    SegmentEntry::Empty
                } else {
                    SegmentEntry::Recognized {
                        text: trimmed.to_string(),
                        words: interpolate_words(trimmed, seg),
                    }
                }
            }
            Err(e) => {
                warn!(index = seg.index, error = %e, "segment failed on all backends");
                SegmentEntry::Failed {
                    reason: e.to_string(),
                    artifact: self.write_artifact(&clip, seg.index).await,
                }
            }
        };

        session.record(seg.index, entry);
    }

    /// One primary attempt; on an availability or execution failure, one
    /// fallback attempt under a duration-derived safety timeout. There is no
    /// same-backend retry.
    async fn recognize_with_fallback(&self, clip: &AudioClip, seg: &Segment) -> Result<String> {
        let primary_err = match self.primary.recognize(clip).await {
            Ok(text) => return Ok(text),
            Err(e) => e,
        };

        let fallback = match &self.fallback {
            Some(fb) if primary_err.triggers_backend_fallback() => fb,
            _ => return Err(primary_err),
        };

        warn!(
            index = seg.index,
            backend = self.primary.name(),
            error = %primary_err,
            "primary backend failed, trying fallback"
        );

        // The fallback may involve real-time playback, so its budget scales
        // with the clip duration.
        let waited_secs = seg.duration_secs.ceil() as u64 + FALLBACK_GRACE_SECS;
        let budget = Duration::from_secs(waited_secs);

        match tokio::time::timeout(budget, fallback.recognize(clip)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout { waited_secs }),
        }
    }

    /// Persist the raw clip of a fully failed segment for manual handling.
    /// Artifact failures are logged, never escalated.
    async fn write_artifact(&self, clip: &AudioClip, index: u32) -> Option<PathBuf> {
        let dir = self.options.artifact_dir.as_ref()?;

        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!(dir = %dir.display(), error = %e, "failed to create artifact dir");
            return None;
        }

        let path = dir.join(format!("segment_{index:03}.wav"));
        match tokio::fs::write(&path, &clip.bytes).await {
            Ok(()) => {
                info!(path = %path.display(), "wrote failed-segment clip");
                Some(path)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to write artifact");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::decode::{MediaInfo, Waveform};

    /// Replays a fixed script of outcomes, one per call.
    struct ScriptedRecognizer {
        name: &'static str,
        script: Mutex<VecDeque<Result<String>>>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedRecognizer {
        fn new(name: &'static str, script: Vec<Result<String>>) -> Box<Self> {
            Box::new(Self {
                name,
                script: Mutex::new(script.into()),
                calls: Arc::new(AtomicUsize::new(0)),
            })
        }
    }

    #[async_trait]
    impl Recognizer for ScriptedRecognizer {
        async fn recognize(&self, _clip: &AudioClip) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    /// Never resolves; stands in for a hung backend.
    struct StalledRecognizer;

    #[async_trait]
    impl Recognizer for StalledRecognizer {
        async fn recognize(&self, _clip: &AudioClip) -> Result<String> {
            std::future::pending::<()>().await;
            unreachable!()
        }

        fn name(&self) -> &str {
            "stalled"
        }
    }

    fn source_25s() -> AudioSource {
        let info = MediaInfo {
            duration_secs: 25.0,
            audio_streams: 1,
            channels: 1,
            sample_rate: 16_000,
        };
        let waveform = Waveform {
            samples: vec![0.0; 25 * 16_000],
            sample_rate: 16_000,
        };
        AudioSource::from_waveform("/media/talk.mp4", info, waveform)
    }

    #[tokio::test]
    async fn test_failed_segment_does_not_abort_run() {
        let primary = ScriptedRecognizer::new(
            "primary",
            vec![
                Ok("segment one".into()),
                Err(Error::ServiceUnavailable("engine gone".into())),
                Ok("segment three".into()),
            ],
        );
        let fallback = ScriptedRecognizer::new(
            "fallback",
            vec![Err(Error::ServiceExecution("relay dead".into()))],
        );

        let orch = Orchestrator::new(primary, Some(fallback), PipelineOptions::default());
        let session = orch.run_batch(&source_25s()).await.unwrap();

        assert!(session.is_complete());
        assert!(session.entry(1).unwrap().is_recognized());
        assert!(session.entry(2).unwrap().is_failed());
        assert!(session.entry(3).unwrap().is_recognized());
        assert_eq!(session.text(), "segment one segment three");
    }

    #[tokio::test]
    async fn test_fallback_rescues_segment() {
        let primary = ScriptedRecognizer::new(
            "primary",
            vec![
                Err(Error::ServiceUnavailable("down".into())),
                Err(Error::ServiceUnavailable("down".into())),
                Err(Error::ServiceUnavailable("down".into())),
            ],
        );
        let fallback = ScriptedRecognizer::new(
            "fallback",
            vec![Ok("a".into()), Ok("b".into()), Ok("c".into())],
        );

        let orch = Orchestrator::new(primary, Some(fallback), PipelineOptions::default());
        let session = orch.run_batch(&source_25s()).await.unwrap();

        assert_eq!(session.text(), "a b c");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_fallback_is_cut_off_by_safety_timeout() {
        let primary = ScriptedRecognizer::new(
            "primary",
            vec![
                Ok("before".into()),
                Err(Error::ServiceUnavailable("down".into())),
                Ok("after".into()),
            ],
        );

        let orch = Orchestrator::new(
            primary,
            Some(Box::new(StalledRecognizer)),
            PipelineOptions::default(),
        );
        let session = orch.run_batch(&source_25s()).await.unwrap();

        // a 10s segment gets ceil(10) + 5 = 15 seconds on the fallback
        match session.entry(2) {
            Some(SegmentEntry::Failed { reason, .. }) => {
                assert_eq!(reason, "timed out after 15s");
            }
            other => panic!("expected failed entry, got {other:?}"),
        }
        // the hung backend does not block the rest of the run
        assert!(session.is_complete());
        assert_eq!(session.text(), "before after");
    }

    #[tokio::test]
    async fn test_non_retryable_error_skips_fallback() {
        let primary = ScriptedRecognizer::new(
            "primary",
            vec![
                Err(Error::Model("corrupt weights".into())),
                Err(Error::Model("corrupt weights".into())),
                Err(Error::Model("corrupt weights".into())),
            ],
        );
        let fallback = ScriptedRecognizer::new("fallback", vec![]);
        let fallback_calls = fallback.calls.clone();

        let orch = Orchestrator::new(primary, Some(fallback), PipelineOptions::default());
        let session = orch.run_batch(&source_25s()).await.unwrap();

        assert!(session.entries().all(|(_, e)| e.is_failed()));
        // config/model errors are not availability failures
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_result_recorded_as_empty() {
        let primary = ScriptedRecognizer::new(
            "primary",
            vec![Ok("  ".into()), Ok("words".into()), Ok(String::new())],
        );

        let orch = Orchestrator::new(primary, None, PipelineOptions::default());
        let session = orch.run_batch(&source_25s()).await.unwrap();

        assert!(matches!(session.entry(1), Some(SegmentEntry::Empty)));
        assert!(session.entry(2).unwrap().is_recognized());
        assert!(matches!(session.entry(3), Some(SegmentEntry::Empty)));
        assert_eq!(session.text(), "words");
    }

    #[tokio::test]
    async fn test_cancellation_stops_at_segment_boundary() {
        let primary = ScriptedRecognizer::new("primary", vec![Ok("never".into())]);
        let orch = Orchestrator::new(primary, None, PipelineOptions::default());
        orch.cancel_handle().store(true, Ordering::Relaxed);

        let session = orch.run_batch(&source_25s()).await.unwrap();
        assert_eq!(session.entries().count(), 0);
        assert!(!session.is_complete());
        assert_eq!(session.next_index(), 1);
    }

    #[tokio::test]
    async fn test_failed_segment_writes_artifact() {
        let dir = std::env::temp_dir().join(format!(
            "vidscribe_test_artifacts_{}",
            std::process::id()
        ));
        let primary = ScriptedRecognizer::new(
            "primary",
            vec![
                Err(Error::ServiceExecution("broken".into())),
                Ok("fine".into()),
                Ok("fine".into()),
            ],
        );

        let options = PipelineOptions::default().artifact_dir(dir.clone());
        let orch = Orchestrator::new(primary, None, options);
        let session = orch.run_batch(&source_25s()).await.unwrap();

        let artifact = match session.entry(1) {
            Some(SegmentEntry::Failed { artifact, .. }) => artifact.clone(),
            other => panic!("expected failed entry, got {other:?}"),
        };
        let path = artifact.expect("artifact path recorded");
        assert_eq!(path, dir.join("segment_001.wav"));
        assert!(path.exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_mode_walks_every_window() {
        let primary = ScriptedRecognizer::new(
            "primary",
            vec![
                Ok("one".into()),
                Ok("two".into()),
                Ok("three".into()),
                Ok("four".into()),
                Ok("five".into()),
            ],
        );

        let options = PipelineOptions::default(); // 5s live windows over 25s
        let orch = Orchestrator::new(primary, None, options);
        let session = orch.run_live(&source_25s()).await.unwrap();

        assert!(session.is_complete());
        assert_eq!(session.segments().len(), 5);
        assert_eq!(session.text(), "one two three four five");
    }
}
