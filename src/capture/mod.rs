//! Audio capture contract
//!
//! The engine never touches audio samples. A `CaptureController` records to
//! a temporary file and hands back a `CaptureFile` that deletes itself when
//! dropped, so every path out of the pipeline cleans up exactly once.

mod command;

use std::path::Path;
use std::time::{Duration, Instant};

use tempfile::TempPath;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::CaptureError;

pub use command::CommandRecorder;

/// Recordings shorter than this are discarded without processing
pub const MIN_RECORDING: Duration = Duration::from_millis(500);

/// Temporary recording on disk, removed when dropped
#[derive(Debug)]
pub struct CaptureFile {
    path: TempPath,
    /// Resolves once the recorder has stopped writing
    writer_done: Option<oneshot::Receiver<()>>,
}

impl CaptureFile {
    /// Take ownership of a finished recording
    pub fn new(path: TempPath) -> Self {
        Self {
            path,
            writer_done: None,
        }
    }

    /// Take ownership of a recording whose writer is still shutting down
    pub fn finishing(path: TempPath, writer_done: oneshot::Receiver<()>) -> Self {
        Self {
            path,
            writer_done: Some(writer_done),
        }
    }

    /// Location of the recording
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the recorder to finish writing, then check that it wrote
    /// something.
    pub async fn finished(&mut self) -> Result<(), CaptureError> {
        if let Some(done) = self.writer_done.take() {
            // A dropped sender means the reaper is gone; the file is final
            let _ = done.await;
        }
        let size = tokio::fs::metadata(self.path()).await?.len();
        if size == 0 {
            warn!(path = %self.path.display(), "recorder produced no audio");
            return Err(CaptureError::Empty);
        }
        debug!(bytes = size, "capture file ready");
        Ok(())
    }

    /// Delete the recording now, logging rather than failing on error
    pub fn discard(self) {
        let shown = self.path.display().to_string();
        match self.path.close() {
            Ok(()) => debug!(path = %shown, "capture file removed"),
            Err(e) => warn!(path = %shown, error = %e, "failed to remove capture file"),
        }
    }
}

/// Proof that a capture is running
#[derive(Debug, Clone, Copy)]
pub struct CaptureHandle {
    /// When the recorder started
    pub started_at: Instant,
}

/// A finished recording waiting for the pipeline
#[derive(Debug)]
pub struct PendingCapture {
    /// The recorded audio
    pub file: CaptureFile,
    /// When the recorder started
    pub started_at: Instant,
    /// Length of the recording
    pub duration: Duration,
}

/// Audio recorder used by the recording session.
///
/// Calls come from the engine task, never from the event-tap thread, but
/// should still return promptly.
pub trait CaptureController: Send {
    /// Begin recording
    fn start(&mut self) -> Result<CaptureHandle, CaptureError>;

    /// Finish recording, returning the file and its duration. Must not
    /// wait for the recorder; the file's `finished` does that.
    fn stop(&mut self) -> Option<(CaptureFile, Duration)>;

    /// Abort recording and delete anything written
    fn cancel(&mut self);
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Shared view of what a `FakeCapture` did
    #[derive(Debug, Default)]
    pub struct FakeCaptureLog {
        pub starts: usize,
        pub stops: usize,
        pub cancels: usize,
        pub files: Vec<std::path::PathBuf>,
    }

    /// Capture that writes a small real temp file per recording
    pub struct FakeCapture {
        log: Arc<Mutex<FakeCaptureLog>>,
        deny: bool,
        active: Option<Instant>,
    }

    impl FakeCapture {
        pub fn new() -> (Self, Arc<Mutex<FakeCaptureLog>>) {
            let log = Arc::new(Mutex::new(FakeCaptureLog::default()));
            (
                Self {
                    log: Arc::clone(&log),
                    deny: false,
                    active: None,
                },
                log,
            )
        }

        pub fn denied() -> (Self, Arc<Mutex<FakeCaptureLog>>) {
            let (mut capture, log) = Self::new();
            capture.deny = true;
            (capture, log)
        }
    }

    impl CaptureController for FakeCapture {
        fn start(&mut self) -> Result<CaptureHandle, CaptureError> {
            if self.deny {
                return Err(CaptureError::PermissionDenied("microphone".into()));
            }
            let started_at = Instant::now();
            self.active = Some(started_at);
            self.log.lock().unwrap().starts += 1;
            Ok(CaptureHandle { started_at })
        }

        fn stop(&mut self) -> Option<(CaptureFile, Duration)> {
            let started = self.active.take()?;
            let file = tempfile::Builder::new()
                .prefix("fake_capture_")
                .suffix(".wav")
                .tempfile()
                .unwrap();
            std::fs::write(file.path(), b"RIFF").unwrap();
            let path = file.into_temp_path();
            let mut log = self.log.lock().unwrap();
            log.stops += 1;
            log.files.push(path.to_path_buf());
            Some((CaptureFile::new(path), started.elapsed()))
        }

        fn cancel(&mut self) {
            if self.active.take().is_some() {
                self.log.lock().unwrap().cancels += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_file_deleted_on_drop() {
        let path = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        let location = path.to_path_buf();
        let file = CaptureFile::new(path);
        assert!(location.exists());
        drop(file);
        assert!(!location.exists());
    }

    #[test]
    fn test_capture_file_discard() {
        let path = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        let location = path.to_path_buf();
        CaptureFile::new(path).discard();
        assert!(!location.exists());
    }

    #[tokio::test]
    async fn test_finished_waits_for_writer() {
        let path = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        let location = path.to_path_buf();
        let (done_tx, done_rx) = oneshot::channel();
        let mut file = CaptureFile::finishing(path, done_rx);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            std::fs::write(&location, b"RIFF").unwrap();
            let _ = done_tx.send(());
        });

        file.finished().await.unwrap();
        assert_eq!(std::fs::read(file.path()).unwrap(), b"RIFF");
    }

    #[tokio::test]
    async fn test_finished_rejects_empty_recording() {
        let path = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        let mut file = CaptureFile::new(path);
        assert!(matches!(file.finished().await, Err(CaptureError::Empty)));
    }
}
