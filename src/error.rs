//! Error types
//!
//! Each collaborator has its own error enum. `EngineError` is the
//! user-facing taxonomy the session reports through its status field.

use std::time::Duration;

use thiserror::Error;

/// Failures the engine surfaces to the user
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("audio capture failed: {0}")]
    CaptureFailed(String),

    #[error("recording too short ({elapsed_ms} ms)")]
    CaptureTooShort { elapsed_ms: u64 },

    #[error("{0}")]
    NetworkOrApi(String),

    #[error("text insertion failed: {0}")]
    Output(String),

    #[error("no text selected")]
    NoSelectionFound,

    #[error("keyboard monitoring requires Accessibility permission")]
    EventTapUnavailable,

    #[error("cancelled")]
    Cancelled,
}

impl EngineError {
    /// Short machine-readable code, used by IPC clients
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::PermissionDenied(_) => "permission_denied",
            EngineError::CaptureFailed(_) => "capture_failed",
            EngineError::CaptureTooShort { .. } => "capture_too_short",
            EngineError::NetworkOrApi(_) => "network_or_api",
            EngineError::Output(_) => "output",
            EngineError::NoSelectionFound => "no_selection_found",
            EngineError::EventTapUnavailable => "event_tap_unavailable",
            EngineError::Cancelled => "cancelled",
        }
    }
}

/// Errors related to audio capture
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("a capture is already running")]
    AlreadyActive,

    #[error("failed to start recorder: {0}")]
    Spawn(String),

    #[error("no audio was captured")]
    Empty,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CaptureError> for EngineError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::PermissionDenied(msg) => EngineError::PermissionDenied(msg),
            other => EngineError::CaptureFailed(other.to_string()),
        }
    }
}

/// Errors from transcription and rewrite backends
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("failed to spawn command: {0}")]
    Spawn(String),

    #[error("failed to write to stdin: {0}")]
    Write(String),

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("command exited with code {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("output is not valid UTF-8: {0}")]
    InvalidUtf8(String),

    #[error("backend not configured")]
    NotConfigured,

    #[error("{0}")]
    Api(String),
}

/// Errors related to text output and selection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OutputError {
    #[error("text is empty")]
    EmptyText,

    #[error("failed to create keyboard event")]
    EventCreation,

    #[error("output task failed: {0}")]
    Task(String),

    #[error("output command failed: {0}")]
    Command(#[from] BackendError),
}

/// Errors from a processing pipeline task
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("{0}")]
    Capture(String),

    #[error("transcription failed: {0}")]
    Transcription(BackendError),

    #[error("rewrite failed: {0}")]
    Rewrite(BackendError),

    #[error("{0}")]
    Output(#[from] OutputError),

    #[error("processing cancelled")]
    Cancelled,
}

impl From<PipelineError> for EngineError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Transcription(e) | PipelineError::Rewrite(e) => {
                EngineError::NetworkOrApi(e.to_string())
            }
            PipelineError::Capture(msg) => EngineError::CaptureFailed(msg),
            PipelineError::Output(e) => EngineError::Output(e.to_string()),
            PipelineError::Cancelled => EngineError::Cancelled,
        }
    }
}

/// Errors writing history records
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode history entry: {0}")]
    Encode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_permission_maps_to_permission_denied() {
        let err: EngineError = CaptureError::PermissionDenied("microphone".into()).into();
        assert_eq!(err, EngineError::PermissionDenied("microphone".into()));
        assert_eq!(err.code(), "permission_denied");
    }

    #[test]
    fn test_other_capture_errors_map_to_capture_failed() {
        let err: EngineError = CaptureError::AlreadyActive.into();
        assert!(matches!(err, EngineError::CaptureFailed(_)));
    }

    #[test]
    fn test_backend_error_messages() {
        let err = BackendError::NonZeroExit {
            code: Some(2),
            stderr: "bad model".into(),
        };
        assert_eq!(err.to_string(), "command exited with code Some(2): bad model");
        assert_eq!(
            BackendError::Timeout(Duration::from_secs(30)).to_string(),
            "command timed out after 30s"
        );
        assert_eq!(
            BackendError::Timeout(Duration::from_millis(250)).to_string(),
            "command timed out after 250ms"
        );
    }

    #[test]
    fn test_pipeline_errors_map_to_taxonomy() {
        let err: EngineError = PipelineError::Rewrite(BackendError::Api("quota".into())).into();
        assert_eq!(err, EngineError::NetworkOrApi("quota".into()));

        let err: EngineError = PipelineError::Output(OutputError::EmptyText).into();
        assert_eq!(err.code(), "output");

        let err: EngineError = PipelineError::Capture(CaptureError::Empty.to_string()).into();
        assert_eq!(err, EngineError::CaptureFailed("no audio was captured".into()));

        let err: EngineError = PipelineError::Cancelled.into();
        assert_eq!(err, EngineError::Cancelled);
    }
}
