use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::{Parser, ValueEnum};
use vidscribe::{
    AudioSource, Language, Mode, Model, Orchestrator, PipelineOptions, WhisperRecognizer,
};

#[derive(Parser)]
#[command(name = "vidscribe", about = "Transcribe the audio track of a local video or audio file")]
struct Cli {
    /// Local media file to transcribe.
    #[arg(required_unless_present_any = ["list_models", "download_model", "list_languages"])]
    input: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Write output to file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Whisper model to use (name or path to a .bin file).
    #[arg(short, long, default_value = "base")]
    model: String,

    /// Language code (e.g. "en", "de") or "auto" for detection.
    #[arg(short, long, default_value = "auto")]
    language: String,

    /// Segment length in seconds.
    #[arg(long, default_value = "10")]
    segment_secs: f64,

    /// Follow the source in real time instead of batch processing.
    #[arg(long)]
    live: bool,

    /// Window interval in seconds for live mode.
    #[arg(long, default_value = "5")]
    interval: f64,

    /// Write failed segment clips to this directory for manual handling.
    #[arg(long)]
    artifact_dir: Option<PathBuf>,

    /// Disable the real-time capture fallback when direct decode fails.
    #[arg(long)]
    no_capture_fallback: bool,

    /// Approximate vocal isolation on stereo sources.
    #[arg(long)]
    isolate_vocals: bool,

    /// Translate to English.
    #[arg(long)]
    translate: bool,

    /// Disable GPU acceleration.
    #[arg(long)]
    no_gpu: bool,

    /// GPU device ID.
    #[arg(long, default_value = "0")]
    gpu_device: u32,

    /// Number of threads (default: auto).
    #[arg(long)]
    threads: Option<u32>,

    /// Sampling temperature.
    #[arg(long, default_value = "0.0")]
    temperature: f32,

    /// Beam search size (default: greedy).
    #[arg(long)]
    beam_size: Option<u32>,

    /// Model cache directory.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Use the microphone relay as a per-segment fallback backend.
    #[cfg(feature = "mic-relay")]
    #[arg(long)]
    mic_relay: bool,

    /// List available models.
    #[arg(long)]
    list_models: bool,

    /// Download a model without transcribing.
    #[arg(long)]
    download_model: Option<String>,

    /// List supported languages.
    #[arg(long)]
    list_languages: bool,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Srt,
    Vtt,
    Json,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vidscribe=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    if cli.list_languages {
        println!("{:<6} {}", "CODE", "LANGUAGE");
        println!("{:<6} {}", "----", "--------");
        for (code, name) in Language::supported() {
            println!("{code:<6} {name}");
        }
        return;
    }

    if cli.list_models {
        let models = [
            ("tiny", "75 MB"),
            ("tiny.en", "75 MB"),
            ("base", "142 MB"),
            ("base.en", "142 MB"),
            ("small", "466 MB"),
            ("small.en", "466 MB"),
            ("medium", "1.5 GB"),
            ("medium.en", "1.5 GB"),
            ("large-v2", "2.9 GB"),
            ("large-v3", "2.9 GB"),
            ("large-v3-turbo", "~1.6 GB"),
        ];
        println!("{:<16} {}", "MODEL", "SIZE");
        println!("{:<16} {}", "-----", "----");
        for (name, size) in models {
            println!("{name:<16} {size}");
        }

        let opts = PipelineOptions::default();
        let cache_dir = opts.resolve_cache_dir();
        let cached = vidscribe::model::list_cached_models(&cache_dir);
        if !cached.is_empty() {
            println!("\nCached models in {}:", cache_dir.display());
            for path in cached {
                let size = std::fs::metadata(&path)
                    .map(|m| format_bytes(m.len()))
                    .unwrap_or_default();
                println!(
                    "  {} ({})",
                    path.file_name()
                        .map(|f| f.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    size
                );
            }
        }
        return;
    }

    if let Some(model_name) = &cli.download_model {
        let model = match Model::parse_name(model_name) {
            Some(m) => m,
            None => {
                eprintln!("Unknown model: {model_name}");
                eprintln!("Use --list-models to see available models");
                std::process::exit(1);
            }
        };
        let opts = PipelineOptions::default();
        let cache_dir = cli.cache_dir.unwrap_or_else(|| opts.resolve_cache_dir());
        match vidscribe::model::ensure_model(&model, &cache_dir).await {
            Ok(path) => println!("Model ready: {}", path.display()),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    let input = cli.input.unwrap();

    let model = match Model::parse_name(&cli.model) {
        Some(m) => m,
        None => {
            // Try as custom model path
            let path = PathBuf::from(&cli.model);
            if path.exists() {
                Model::Custom(path)
            } else {
                eprintln!("Unknown model: {}", cli.model);
                eprintln!("Use --list-models to see available models, or provide a path to a .bin file");
                std::process::exit(1);
            }
        }
    };

    let mut opts = match PipelineOptions::new()
        .model(model)
        .mode(if cli.live { Mode::Live } else { Mode::Batch })
        .segment_secs(cli.segment_secs)
        .live_interval_secs(cli.interval)
        .capture_fallback(!cli.no_capture_fallback)
        .isolate_vocals(cli.isolate_vocals)
        .translate(cli.translate)
        .gpu(!cli.no_gpu)
        .gpu_device(cli.gpu_device)
        .temperature(cli.temperature)
        .language(&cli.language)
    {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Use --list-languages to see supported languages");
            std::process::exit(1);
        }
    };

    if let Some(n) = cli.threads {
        opts = opts.n_threads(n);
    }
    if let Some(size) = cli.beam_size {
        opts = opts.beam_size(size);
    }
    if let Some(dir) = cli.cache_dir {
        opts = opts.cache_dir(dir);
    }
    if let Some(dir) = cli.artifact_dir {
        opts = opts.artifact_dir(dir);
    }

    let source = match AudioSource::open(&input, &opts).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let recognizer = match WhisperRecognizer::load(&opts).await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    #[cfg(feature = "mic-relay")]
    let fallback: Option<Box<dyn vidscribe::Recognizer>> = if cli.mic_relay {
        // The relay needs its own inner backend for the recorded audio.
        match WhisperRecognizer::load(&opts).await {
            Ok(inner) => Some(Box::new(vidscribe::MicRelayRecognizer::new(
                Box::new(inner),
                opts.sample_rate,
            ))),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
    } else {
        None
    };
    #[cfg(not(feature = "mic-relay"))]
    let fallback: Option<Box<dyn vidscribe::Recognizer>> = None;

    let mode = opts.mode;
    let orchestrator = Orchestrator::new(Box::new(recognizer), fallback, opts);

    // Ctrl-C stops at the next segment boundary
    let cancel = orchestrator.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, finishing current segment...");
            cancel.store(true, Ordering::Relaxed);
        }
    });

    let result = match mode {
        Mode::Batch => orchestrator.run_batch(&source).await,
        Mode::Live => orchestrator.run_live(&source).await,
    };

    let session = match result {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let recognized = session
        .entries()
        .filter(|(_, e)| e.is_recognized())
        .count();
    let failed = session.entries().filter(|(_, e)| e.is_failed()).count();
    eprintln!(
        "Transcription complete: {:.1}s of audio, {} segments ({recognized} recognized, {failed} failed)",
        source.duration_secs(),
        session.segments().len(),
    );

    let output_text = match cli.format {
        OutputFormat::Text => {
            let mut text = session.text();
            text.push('\n');
            text
        }
        OutputFormat::Srt => session.to_srt(),
        OutputFormat::Vtt => session.to_vtt(),
        OutputFormat::Json => match session.to_json_pretty() {
            Ok(j) => j,
            Err(e) => {
                eprintln!("JSON error: {e}");
                std::process::exit(1);
            }
        },
    };

    match cli.output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, &output_text) {
                eprintln!("Error writing to {}: {e}", path.display());
                std::process::exit(1);
            }
            eprintln!("Written to {}", path.display());
        }
        None => print!("{output_text}"),
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_000_000_000 {
        format!("{:.1} GB", bytes as f64 / 1_000_000_000.0)
    } else if bytes >= 1_000_000 {
        format!("{:.0} MB", bytes as f64 / 1_000_000.0)
    } else {
        format!("{:.0} KB", bytes as f64 / 1_000.0)
    }
}
