use std::path::PathBuf;

/// All errors that can occur in vidscribe.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("audio decoding error: {0}")]
    Decode(String),

    #[error("no audio track in source: {path}")]
    NoAudioTrack { path: PathBuf },

    #[error("capture fallback unavailable: {0}")]
    CaptureUnsupported(String),

    #[error("source file not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("recognition backend unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("recognition failed: {0}")]
    ServiceExecution(String),

    #[error("timed out after {waited_secs}s")]
    Timeout { waited_secs: u64 },

    #[error("model error: {0}")]
    Model(String),

    #[error("model not found: {path}")]
    ModelNotFound { path: PathBuf },

    #[error("model download failed: {0}")]
    ModelDownload(String),

    #[error("unsupported language: \"{0}\" — use Language::supported() to list valid codes")]
    UnsupportedLanguage(String),

    #[error("whisper error: {0}")]
    Whisper(#[from] whisper_rs::WhisperError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the orchestrator should hand this failure to the fallback
    /// backend instead of giving up on the segment.
    pub fn triggers_backend_fallback(&self) -> bool {
        matches!(
            self,
            Error::ServiceUnavailable(_) | Error::ServiceExecution(_) | Error::Timeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_decode() {
        let e = Error::Decode("bad container".into());
        assert_eq!(e.to_string(), "audio decoding error: bad container");
    }

    #[test]
    fn test_error_display_no_audio_track() {
        let e = Error::NoAudioTrack {
            path: PathBuf::from("/tmp/silent.mp4"),
        };
        assert!(e.to_string().contains("/tmp/silent.mp4"));
    }

    #[test]
    fn test_error_display_timeout() {
        let e = Error::Timeout { waited_secs: 15 };
        assert_eq!(e.to_string(), "timed out after 15s");
    }

    #[test]
    fn test_error_display_unsupported_language() {
        let e = Error::UnsupportedLanguage("klingon".into());
        let msg = e.to_string();
        assert!(msg.contains("klingon"));
        assert!(msg.contains("Language::supported()"));
    }

    #[test]
    fn test_service_errors_trigger_fallback() {
        assert!(Error::ServiceUnavailable("no model".into()).triggers_backend_fallback());
        assert!(Error::ServiceExecution("inference failed".into()).triggers_backend_fallback());
        assert!(Error::Timeout { waited_secs: 15 }.triggers_backend_fallback());
    }

    #[test]
    fn test_decode_errors_do_not_trigger_fallback() {
        assert!(!Error::Decode("broken".into()).triggers_backend_fallback());
        assert!(!Error::NoAudioTrack {
            path: PathBuf::from("x")
        }
        .triggers_backend_fallback());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<String>("invalid json").unwrap_err();
        let e: Error = json_err.into();
        assert!(matches!(e, Error::Json(_)));
    }
}
