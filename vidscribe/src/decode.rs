//! Audio decoding: one mono target-rate waveform out of an arbitrary
//! container.
//!
//! Primary strategy is a direct decode through ffmpeg (raw float PCM piped
//! back at the source's native rate and channel layout). When that fails the
//! fallback re-records the audio track in real time into an intermediate
//! compressed file and decodes that instead — wall-clock bound by content
//! duration, so strictly slower, and used only for compatibility.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::codec::{self, AudioClip};
use crate::config::PipelineOptions;
use crate::error::{Error, Result};
use crate::segment::{self, Segment};

/// Hard cap on decoded duration, matching the original pipeline's limit.
const MAX_DURATION_SECS: f64 = 7_200.0;

/// Upper bound on a single non-realtime decode subprocess.
const DECODE_TIMEOUT: Duration = Duration::from_secs(300);

/// Grace period added on top of real-time capture deadlines.
const CAPTURE_GRACE: Duration = Duration::from_secs(10);

/// Decoded audio: mono float samples at a known rate.
#[derive(Debug, Clone)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// What ffprobe reports about a source before any decoding happens.
#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub duration_secs: f64,
    pub audio_streams: u32,
    pub channels: u16,
    pub sample_rate: u32,
}

#[derive(Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    channels: Option<u16>,
    sample_rate: Option<String>,
    duration: Option<String>,
}

/// Inspect a media file without decoding it.
pub async fn probe(path: &Path) -> Result<MediaInfo> {
    if !path.exists() {
        return Err(Error::SourceNotFound {
            path: path.to_path_buf(),
        });
    }

    let output = Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::CaptureUnsupported("ffprobe not found — install with: apt install ffmpeg".into())
            } else {
                Error::Decode(format!("failed to run ffprobe: {e}"))
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Decode(format!("ffprobe failed: {}", stderr.trim())));
    }

    let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)?;

    let audio_streams: Vec<&ProbeStream> = parsed
        .streams
        .iter()
        .filter(|s| s.codec_type.as_deref() == Some("audio"))
        .collect();

    if audio_streams.is_empty() {
        return Err(Error::NoAudioTrack {
            path: path.to_path_buf(),
        });
    }

    let first = audio_streams[0];
    let duration = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(first.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| Error::Decode("source reports no duration".into()))?;

    let info = MediaInfo {
        duration_secs: duration.min(MAX_DURATION_SECS),
        audio_streams: audio_streams.len() as u32,
        channels: first.channels.unwrap_or(1).max(1),
        sample_rate: first
            .sample_rate
            .as_deref()
            .and_then(|r| r.parse().ok())
            .unwrap_or(44_100),
    };

    debug!(
        duration_secs = format!("{:.2}", info.duration_secs),
        channels = info.channels,
        sample_rate = info.sample_rate,
        "probed source"
    );

    Ok(info)
}

/// Decode a media file to a mono waveform at the configured target rate,
/// trying direct decode first and the real-time capture fallback second.
pub async fn decode(path: &Path, options: &PipelineOptions) -> Result<Waveform> {
    let info = probe(path).await?;
    decode_with_info(path, &info, options).await
}

pub(crate) async fn decode_with_info(
    path: &Path,
    info: &MediaInfo,
    options: &PipelineOptions,
) -> Result<Waveform> {
    info!(path = %path.display(), "decoding audio");

    match decode_direct(path, info).await {
        Ok(channels) => Ok(finish(channels, info.sample_rate, options)),
        Err(e) if options.capture_fallback => {
            warn!(error = %e, "direct decode failed, switching to real-time capture");
            let (channels, rate) = capture_and_decode(path, info, None, None).await?;
            Ok(finish(channels, rate, options))
        }
        Err(e) => Err(e),
    }
}

/// Direct decode: pipe raw f32le PCM out of ffmpeg at the source's native
/// rate and channel count, then deinterleave.
async fn decode_direct(path: &Path, info: &MediaInfo) -> Result<Vec<Vec<f32>>> {
    let stdout = run_ffmpeg(
        |cmd| {
            cmd.args(["-nostdin", "-threads", "0", "-i"])
                .arg(path)
                .args(["-t", &format!("{MAX_DURATION_SECS}")])
                .args(["-vn", "-acodec", "pcm_f32le", "-f", "f32le", "-"]);
        },
        DECODE_TIMEOUT,
    )
    .await?;

    if stdout.is_empty() {
        return Err(Error::Decode("ffmpeg produced no output".into()));
    }

    let interleaved: Vec<f32> = stdout
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    debug!(samples = interleaved.len(), "direct decode complete");
    Ok(deinterleave(&interleaved, info.channels as usize))
}

/// Capture fallback: re-record the audio track in real time (`-re`) into an
/// intermediate Opus file, then decode that recording with the direct path.
/// `start`/`duration` scope the capture to a window of the source. Returns
/// the per-channel samples and the recording's own sample rate.
async fn capture_and_decode(
    path: &Path,
    info: &MediaInfo,
    start: Option<f64>,
    duration: Option<f64>,
) -> Result<(Vec<Vec<f32>>, u32)> {
    let recorded_secs = duration.unwrap_or(info.duration_secs);
    // Real-time playback: the recorder runs for as long as the content does.
    let deadline = Duration::from_secs_f64(recorded_secs.max(0.1)) + CAPTURE_GRACE;

    let tmp = temp_capture_path();
    let _cleanup = CleanupGuard(&tmp);

    run_ffmpeg(
        |cmd| {
            cmd.args(["-nostdin", "-re"]);
            if let Some(s) = start {
                cmd.args(["-ss", &format!("{s}")]);
            }
            if let Some(d) = duration {
                cmd.args(["-t", &format!("{d}")]);
            }
            cmd.arg("-i")
                .arg(path)
                .args(["-vn", "-acodec", "libopus", "-f", "ogg", "-y"])
                .arg(&tmp);
        },
        deadline,
    )
    .await?;

    let recording = probe(&tmp).await.map_err(|e| match e {
        // An empty recording means the source had nothing we could capture.
        Error::NoAudioTrack { .. } => Error::Decode("capture produced no audio".into()),
        other => other,
    })?;

    info!(
        recorded_secs = format!("{:.2}", recording.duration_secs),
        "capture complete, decoding recording"
    );

    let channels = decode_direct(&tmp, &recording).await?;
    Ok((channels, recording.sample_rate))
}

/// Mix down, optionally isolate vocals, and resample to the target rate.
fn finish(channels: Vec<Vec<f32>>, src_rate: u32, options: &PipelineOptions) -> Waveform {
    let mono = if options.isolate_vocals && channels.len() >= 2 {
        isolate_vocals(&channels[0], &channels[1])
    } else {
        codec::mix_to_mono(&channels)
    };

    let samples = codec::resample(&mono, src_rate, options.sample_rate);
    let waveform = Waveform {
        samples,
        sample_rate: options.sample_rate,
    };

    info!(
        duration_secs = format!("{:.1}", waveform.duration_secs()),
        sample_rate = waveform.sample_rate,
        "audio ready"
    );
    waveform
}

/// Split interleaved samples into per-channel buffers.
fn deinterleave(interleaved: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let channels = channels.max(1);
    let frames = interleaved.len() / channels;
    let mut out = vec![Vec::with_capacity(frames); channels];
    for frame in interleaved.chunks_exact(channels) {
        for (ch, &sample) in frame.iter().enumerate() {
            out[ch].push(sample);
        }
    }
    out
}

/// Approximate vocal isolation by side-channel subtraction. Only meaningful
/// for stereo; callers skip it for mono sources.
fn isolate_vocals(left: &[f32], right: &[f32]) -> Vec<f32> {
    left.iter()
        .zip(right.iter())
        .map(|(l, r)| (l - r) * 0.5)
        .collect()
}

/// Run ffmpeg with a deadline, returning stdout. The child is killed if the
/// deadline passes.
async fn run_ffmpeg(
    configure: impl FnOnce(&mut Command),
    deadline: Duration,
) -> Result<Vec<u8>> {
    let mut cmd = Command::new("ffmpeg");
    configure(&mut cmd);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::CaptureUnsupported("ffmpeg not found — install with: apt install ffmpeg".into())
        } else {
            Error::Decode(format!("failed to run ffmpeg: {e}"))
        }
    })?;

    let output = tokio::time::timeout(deadline, child.wait_with_output())
        .await
        .map_err(|_| Error::Timeout {
            waited_secs: deadline.as_secs(),
        })??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Decode(format!("ffmpeg failed: {}", stderr.trim())));
    }

    Ok(output.stdout)
}

fn temp_capture_path() -> PathBuf {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    std::env::temp_dir().join(format!("vidscribe_capture_{}_{ts}.ogg", std::process::id()))
}

/// RAII guard that removes a temp file when dropped.
struct CleanupGuard<'a>(&'a Path);

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        if self.0.exists() {
            if let Err(e) = std::fs::remove_file(self.0) {
                warn!(path = %self.0.display(), error = %e, "failed to clean up temp file");
            }
        }
    }
}

/// An opened media source: probed metadata plus, when decoding succeeded, the
/// full mono waveform. When both decode strategies failed but an audio track
/// exists, the waveform stays empty and segment clips fall back to
/// window-scoped capture.
pub struct AudioSource {
    path: PathBuf,
    info: MediaInfo,
    waveform: Option<Waveform>,
    target_rate: u32,
}

impl AudioSource {
    /// Probe and decode a source file. No audio track anywhere is fatal;
    /// a decodable track that resists both strategies is not.
    pub async fn open(path: impl AsRef<Path>, options: &PipelineOptions) -> Result<Self> {
        let path = path.as_ref();
        let info = probe(path).await?;

        let waveform = match decode_with_info(path, &info, options).await {
            Ok(wf) => Some(wf),
            Err(e @ Error::NoAudioTrack { .. })
            | Err(e @ Error::SourceNotFound { .. })
            | Err(e @ Error::CaptureUnsupported(_)) => return Err(e),
            Err(e) => {
                warn!(error = %e, "decoding failed, segment clips will use window-scoped capture");
                None
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            info,
            waveform,
            target_rate: options.sample_rate,
        })
    }

    /// Build a source around an already-decoded waveform. Used by live mode
    /// and by tests.
    pub fn from_waveform(path: impl AsRef<Path>, info: MediaInfo, waveform: Waveform) -> Self {
        let target_rate = waveform.sample_rate;
        Self {
            path: path.as_ref().to_path_buf(),
            info,
            waveform: Some(waveform),
            target_rate,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> &MediaInfo {
        &self.info
    }

    pub fn duration_secs(&self) -> f64 {
        self.info.duration_secs
    }

    pub fn waveform(&self) -> Option<&Waveform> {
        self.waveform.as_ref()
    }

    /// Extract one segment's encoded clip. Slices the decoded waveform when
    /// available, otherwise drives a duration-bounded capture scoped to the
    /// segment's window.
    pub async fn clip(&self, seg: &Segment) -> Result<AudioClip> {
        if let Some(waveform) = &self.waveform {
            return Ok(segment::extract_segment_clip(waveform, seg, self.target_rate));
        }

        debug!(index = seg.index, "no waveform available, capturing segment window");
        let (channels, rate) =
            capture_and_decode(&self.path, &self.info, Some(seg.start_secs), Some(seg.duration_secs))
                .await?;
        let mono = codec::mix_to_mono(&channels);
        let samples = codec::resample(&mono, rate, self.target_rate);
        Ok(codec::encode_pcm16(&samples, self.target_rate, 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deinterleave_stereo() {
        let interleaved = [1.0, -1.0, 2.0, -2.0, 3.0, -3.0];
        let channels = deinterleave(&interleaved, 2);
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0], vec![1.0, 2.0, 3.0]);
        assert_eq!(channels[1], vec![-1.0, -2.0, -3.0]);
    }

    #[test]
    fn test_deinterleave_mono_passthrough() {
        let samples = [0.1, 0.2, 0.3];
        let channels = deinterleave(&samples, 1);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0], samples.to_vec());
    }

    #[test]
    fn test_deinterleave_drops_trailing_partial_frame() {
        let interleaved = [1.0, -1.0, 2.0];
        let channels = deinterleave(&interleaved, 2);
        assert_eq!(channels[0], vec![1.0]);
        assert_eq!(channels[1], vec![-1.0]);
    }

    #[test]
    fn test_isolate_vocals_cancels_center() {
        // identical channels carry no side content
        let ch = vec![0.5, -0.25, 0.75];
        let out = isolate_vocals(&ch, &ch);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_isolate_vocals_halves_difference() {
        let left = vec![1.0, 0.0];
        let right = vec![0.0, 1.0];
        assert_eq!(isolate_vocals(&left, &right), vec![0.5, -0.5]);
    }

    #[test]
    fn test_mixdown_resample_pipeline_is_mono_target_rate() {
        // the same mix/resample step both decode strategies share: whatever
        // the original channel count and rate, the result is mono 16k
        let left: Vec<f32> = (0..44_100).map(|i| (i as f32 * 0.001).sin()).collect();
        let right: Vec<f32> = (0..44_100).map(|i| (i as f32 * 0.002).sin()).collect();
        let options = PipelineOptions::default();

        let waveform = finish(vec![left, right], 44_100, &options);
        assert_eq!(waveform.sample_rate, 16_000);
        assert_eq!(waveform.samples.len(), 16_000);
        assert!((waveform.duration_secs() - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let result = probe(Path::new("/no/such/video.mp4")).await;
        assert!(matches!(result, Err(Error::SourceNotFound { .. })));
    }

    #[test]
    fn test_waveform_duration() {
        let wf = Waveform {
            samples: vec![0.0; 8_000],
            sample_rate: 16_000,
        };
        assert!((wf.duration_secs() - 0.5).abs() < 1e-9);
    }
}
