//! vidscribe: turn the audio track of a local video (or audio) file into a
//! transcript with per-segment subtitles.
//!
//! The pipeline decodes the source through ffmpeg to a mono 16kHz waveform,
//! partitions it into fixed-length segments, encodes each segment as a
//! canonical PCM16 WAV clip, and runs the clips sequentially through a
//! whisper.cpp backend, falling over to a secondary backend per segment when
//! the primary reports availability or execution failures.
//!
//! ```no_run
//! # async fn run() -> vidscribe::Result<()> {
//! let session = vidscribe::transcribe_file("talk.mp4").await?;
//! println!("{}", session.to_srt());
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod decode;
pub mod error;
pub mod model;
pub mod orchestrate;
pub mod recognize;
pub mod segment;
pub mod session;

pub use codec::AudioClip;
pub use config::{Language, Mode, Model, PipelineOptions};
pub use decode::{AudioSource, MediaInfo, Waveform};
pub use error::{Error, Result};
pub use orchestrate::Orchestrator;
pub use recognize::{Recognizer, WhisperRecognizer};
pub use segment::{compute_segments, Segment};
pub use session::{SegmentEntry, TranscriptSession, Word};

#[cfg(feature = "mic-relay")]
pub use recognize::MicRelayRecognizer;

use std::path::Path;

/// Transcribe a local media file with default options.
pub async fn transcribe_file(path: impl AsRef<Path>) -> Result<TranscriptSession> {
    transcribe_file_with_options(path, &PipelineOptions::default()).await
}

/// Transcribe a local media file with custom options.
pub async fn transcribe_file_with_options(
    path: impl AsRef<Path>,
    options: &PipelineOptions,
) -> Result<TranscriptSession> {
    let source = AudioSource::open(path, options).await?;
    let recognizer = WhisperRecognizer::load(options).await?;
    let orchestrator = Orchestrator::new(Box::new(recognizer), None, options.clone());

    match options.mode {
        Mode::Batch => orchestrator.run_batch(&source).await,
        Mode::Live => orchestrator.run_live(&source).await,
    }
}
