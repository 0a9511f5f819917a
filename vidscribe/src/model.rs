//! Model acquisition: local cache lookup with on-demand download.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::config::Model;
use crate::error::{Error, Result};

const MODEL_REPO: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// A response under this size is a server error page, never ggml weights.
const MIN_MODEL_BYTES: u64 = 1_000_000;

/// Resolve a model to a local file path, fetching it into the cache on first
/// use. Custom models are never downloaded; a missing custom path is an
/// error, a missing catalog model triggers the download.
pub async fn ensure_model(model: &Model, cache_dir: &Path) -> Result<PathBuf> {
    if let Model::Custom(path) = model {
        return if path.exists() {
            Ok(path.clone())
        } else {
            Err(Error::ModelNotFound { path: path.clone() })
        };
    }

    let filename = model.filename();
    let model_path = cache_dir.join(&filename);

    if model_path.exists() {
        info!(path = %model_path.display(), "using cached model");
        return Ok(model_path);
    }

    tokio::fs::create_dir_all(cache_dir).await.map_err(|e| {
        Error::Model(format!(
            "cannot create model cache at {}: {e}",
            cache_dir.display()
        ))
    })?;

    let url = format!("{MODEL_REPO}/{filename}");
    info!(model = model.name(), %url, "fetching model");
    fetch_model(&url, &model_path).await?;

    Ok(model_path)
}

/// Stream the model into a partial file next to the destination, validate it,
/// then rename. A partial download never shadows a usable model.
async fn fetch_model(url: &str, dest: &Path) -> Result<()> {
    let response = reqwest::Client::new()
        .get(url)
        .send()
        .await?
        .error_for_status()
        .map_err(|e| Error::ModelDownload(format!("server rejected request: {e}")))?;

    let total_size = response.content_length().unwrap_or(0);

    let pb = ProgressBar::new(total_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
            .expect("valid template")
            .progress_chars("#>-"),
    );
    pb.set_message(format!(
        "Fetching {}",
        dest.file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default()
    ));

    let partial = dest.with_extension("bin.partial");
    let mut file = tokio::fs::File::create(&partial).await?;
    let mut stream = response.bytes_stream();
    let mut received: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        received += chunk.len() as u64;
        pb.set_position(received);
    }
    file.flush().await?;
    drop(file);

    if received < MIN_MODEL_BYTES {
        tokio::fs::remove_file(&partial).await.ok();
        return Err(Error::ModelDownload(format!(
            "response too small to be model weights ({received} bytes)"
        )));
    }
    if total_size > 0 && received != total_size {
        warn!(
            expected = total_size,
            received, "short read from model server, weights may be truncated"
        );
    }

    tokio::fs::rename(&partial, dest).await?;
    pb.finish_with_message("Fetch complete");

    info!(path = %dest.display(), bytes = received, "model cached");
    Ok(())
}

/// Every `.bin` in the cache directory, sorted by filename. A missing cache
/// directory is an empty list.
pub fn list_cached_models(cache_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(cache_dir) else {
        return Vec::new();
    };

    let mut models: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "bin"))
        .collect();
    models.sort();
    models
}
