//! Pluggable recognition backends.
//!
//! Every backend implements the one capability the orchestrator needs: turn
//! an encoded clip into text. The model identifier is bound at construction,
//! so a constructed backend can be called repeatedly without re-acquiring
//! its model. Initialization failures surface as `ServiceUnavailable`,
//! per-call failures as `ServiceExecution`.

use async_trait::async_trait;
use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::codec::AudioClip;
use crate::config::{Language, PipelineOptions};
use crate::error::{Error, Result};
use crate::model;

/// Abstract recognition capability: encoded audio in, text out.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Recognize one clip. An `Ok` with empty text means the backend heard
    /// nothing — callers record that as a distinguishable empty result.
    async fn recognize(&self, clip: &AudioClip) -> Result<String>;

    /// Backend name for logs and degraded-status reporting.
    fn name(&self) -> &str;
}

/// whisper.cpp doesn't accept inputs shorter than a second; short tails are
/// padded with silence up to this many samples.
const MIN_WHISPER_SAMPLES: usize = 17_600; // 1.1s at 16kHz

/// In-process whisper.cpp backend. The context is loaded once and reused for
/// every call; only the decoding state is per-call.
pub struct WhisperRecognizer {
    ctx: WhisperContext,
    model_name: String,
    language: Language,
    translate: bool,
    temperature: f32,
    beam_size: Option<u32>,
    n_threads: Option<u32>,
}

impl WhisperRecognizer {
    /// Acquire the model (downloading into the cache if needed) and load the
    /// whisper context. This is the slow first-use path; subsequent
    /// `recognize` calls reuse the loaded context.
    pub async fn load(options: &PipelineOptions) -> Result<Self> {
        let cache_dir = options.resolve_cache_dir();
        let model_path = model::ensure_model(&options.model, &cache_dir)
            .await
            .map_err(|e| Error::ServiceUnavailable(format!("model acquisition failed: {e}")))?;

        info!(model = %model_path.display(), "loading whisper model");

        let mut ctx_params = WhisperContextParameters::new();
        ctx_params.use_gpu(options.gpu);
        ctx_params.gpu_device(options.gpu_device as i32);

        let path_str = model_path
            .to_str()
            .ok_or_else(|| Error::ServiceUnavailable("model path contains invalid UTF-8".into()))?;

        let ctx = WhisperContext::new_with_params(path_str, ctx_params)
            .map_err(|e| Error::ServiceUnavailable(format!("whisper context load failed: {e}")))?;

        Ok(Self {
            ctx,
            model_name: options.model.name().to_string(),
            language: options.language.clone(),
            translate: options.translate,
            temperature: options.temperature,
            beam_size: options.beam_size,
            n_threads: options.n_threads,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[async_trait]
impl Recognizer for WhisperRecognizer {
    async fn recognize(&self, clip: &AudioClip) -> Result<String> {
        let samples = pad_to_min_samples(clip.samples(), MIN_WHISPER_SAMPLES);

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| Error::ServiceExecution(format!("whisper state: {e}")))?;

        let mut params = match self.beam_size {
            Some(beam_size) => FullParams::new(SamplingStrategy::BeamSearch {
                beam_size: beam_size as i32,
                patience: -1.0,
            }),
            None => FullParams::new(SamplingStrategy::Greedy { best_of: 5 }),
        };

        match &self.language {
            Language::Auto => params.set_detect_language(true),
            Language::Code { code, .. } => params.set_language(Some(code)),
        }

        params.set_translate(self.translate);
        params.set_temperature(self.temperature);
        if let Some(n) = self.n_threads {
            params.set_n_threads(n as i32);
        }

        // Keep whisper.cpp off our stderr
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        debug!(samples = samples.len(), "running whisper inference");
        state
            .full(params, &samples)
            .map_err(|e| Error::ServiceExecution(format!("whisper inference: {e}")))?;

        let num_segments = state.full_n_segments();
        let mut pieces = Vec::with_capacity(num_segments as usize);
        for i in 0..num_segments {
            let segment = state
                .get_segment(i)
                .ok_or_else(|| Error::ServiceExecution(format!("segment {i} not found")))?;
            let text = segment
                .to_str_lossy()
                .map_err(|e| Error::ServiceExecution(format!("segment text: {e}")))?
                .into_owned();
            let trimmed = text.trim().to_string();
            if !trimmed.is_empty() {
                pieces.push(trimmed);
            }
        }

        Ok(pieces.join(" "))
    }

    fn name(&self) -> &str {
        "whisper"
    }
}

fn pad_to_min_samples(mut samples: Vec<f32>, min: usize) -> Vec<f32> {
    if samples.len() < min {
        samples.resize(min, 0.0);
    }
    samples
}

#[cfg(feature = "mic-relay")]
pub use self::mic_relay::MicRelayRecognizer;

#[cfg(feature = "mic-relay")]
mod mic_relay {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use tracing::{info, warn};

    use super::Recognizer;
    use crate::codec::{self, AudioClip};
    use crate::error::{Error, Result};

    /// Live microphone relay: the clip is played through the default output
    /// device while the default input device records, and the recording is
    /// handed to an inner backend. An acoustic round trip — lossy by nature,
    /// useful only as a fallback when the primary backend cannot run.
    pub struct MicRelayRecognizer {
        inner: Box<dyn Recognizer>,
        target_rate: u32,
    }

    impl MicRelayRecognizer {
        pub fn new(inner: Box<dyn Recognizer>, target_rate: u32) -> Self {
            Self { inner, target_rate }
        }
    }

    #[async_trait]
    impl Recognizer for MicRelayRecognizer {
        async fn recognize(&self, clip: &AudioClip) -> Result<String> {
            let playback = clip.samples();
            let playback_rate = clip.sample_rate().max(1);
            let playback_secs = playback.len() as f64 / playback_rate as f64;

            info!(
                secs = format!("{playback_secs:.1}"),
                "relaying clip through speaker and microphone"
            );

            // cpal streams are not Send, so the whole relay runs on a
            // blocking thread and is torn down there too.
            let (captured, rate, channels) = tokio::task::spawn_blocking(move || {
                relay_through_devices(playback, playback_rate, playback_secs)
            })
            .await
            .map_err(|e| Error::ServiceExecution(format!("relay task: {e}")))??;

            if captured.is_empty() {
                return Err(Error::ServiceExecution("microphone captured no audio".into()));
            }

            let per_channel = deinterleave_capture(&captured, channels as usize);
            let mono = codec::mix_to_mono(&per_channel);
            let resampled = codec::resample(&mono, rate, self.target_rate);
            let relayed = codec::encode_pcm16(&resampled, self.target_rate, 1);

            self.inner.recognize(&relayed).await
        }

        fn name(&self) -> &str {
            "mic-relay"
        }
    }

    fn relay_through_devices(
        playback: Vec<f32>,
        playback_rate: u32,
        playback_secs: f64,
    ) -> Result<(Vec<f32>, u32, u16)> {
        let host = cpal::default_host();
        let output = host
            .default_output_device()
            .ok_or_else(|| Error::CaptureUnsupported("no output device available".into()))?;
        let input = host
            .default_input_device()
            .ok_or_else(|| Error::CaptureUnsupported("no input device available".into()))?;

        let out_config = output
            .default_output_config()
            .map_err(|e| Error::CaptureUnsupported(format!("output config: {e}")))?;
        let in_config = input
            .default_input_config()
            .map_err(|e| Error::CaptureUnsupported(format!("input config: {e}")))?;

        let out_rate = out_config.sample_rate().0;
        let out_channels = out_config.channels() as usize;
        let in_rate = in_config.sample_rate().0;
        let in_channels = in_config.channels();

        // Mono clip, resampled to the device rate and duplicated per channel.
        let resampled = codec::resample(&playback, playback_rate, out_rate);
        let cursor = Arc::new(Mutex::new(0usize));
        let source = Arc::new(resampled);

        let captured: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));
        let err_fn = |err| warn!(error = %err, "relay stream error");

        let out_source = source.clone();
        let out_cursor = cursor.clone();
        let out_stream = output
            .build_output_stream(
                &out_config.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = match out_cursor.lock() {
                        Ok(guard) => guard,
                        Err(_) => return,
                    };
                    for frame in data.chunks_mut(out_channels) {
                        let sample = out_source.get(*pos).copied().unwrap_or(0.0);
                        for slot in frame.iter_mut() {
                            *slot = sample;
                        }
                        *pos += 1;
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| Error::CaptureUnsupported(format!("output stream: {e}")))?;

        let capture_clone = captured.clone();
        let in_stream = match in_config.sample_format() {
            cpal::SampleFormat::F32 => input.build_input_stream(
                &in_config.into(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut guard) = capture_clone.lock() {
                        guard.extend_from_slice(data);
                    }
                },
                err_fn,
                None,
            ),
            cpal::SampleFormat::I16 => input.build_input_stream(
                &in_config.into(),
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut guard) = capture_clone.lock() {
                        guard.extend(data.iter().map(|&s| s as f32 / 32768.0));
                    }
                },
                err_fn,
                None,
            ),
            other => {
                return Err(Error::CaptureUnsupported(format!(
                    "unsupported input sample format: {other:?}"
                )))
            }
        }
        .map_err(|e| Error::CaptureUnsupported(format!("input stream: {e}")))?;

        in_stream
            .play()
            .map_err(|e| Error::CaptureUnsupported(format!("input start: {e}")))?;
        out_stream
            .play()
            .map_err(|e| Error::CaptureUnsupported(format!("output start: {e}")))?;

        // Record for the clip's duration; dropping the streams stops both.
        std::thread::sleep(Duration::from_secs_f64(playback_secs.max(0.1)));
        drop(out_stream);
        drop(in_stream);

        let recorded = captured
            .lock()
            .map_err(|_| Error::ServiceExecution("capture buffer poisoned".into()))?
            .clone();

        Ok((recorded, in_rate, in_channels))
    }

    fn deinterleave_capture(interleaved: &[f32], channels: usize) -> Vec<Vec<f32>> {
        let channels = channels.max(1);
        let mut out = vec![Vec::with_capacity(interleaved.len() / channels); channels];
        for frame in interleaved.chunks_exact(channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                out[ch].push(sample);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_short_input() {
        let padded = pad_to_min_samples(vec![0.5; 100], 1_000);
        assert_eq!(padded.len(), 1_000);
        assert_eq!(padded[99], 0.5);
        assert_eq!(padded[100], 0.0);
    }

    #[test]
    fn test_pad_leaves_long_input_alone() {
        let samples = vec![0.5; 20_000];
        let padded = pad_to_min_samples(samples.clone(), MIN_WHISPER_SAMPLES);
        assert_eq!(padded, samples);
    }
}
