//! External-process recorder
//!
//! Runs a shell command such as `rec -q -c 1 -r 16000 {output}` in its own
//! process group and stops it with SIGINT so the recorder can finalise the
//! WAV header. Stopping never waits: the recorder is reaped on a background
//! task and the returned file resolves `finished` once it has exited.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tempfile::TempPath;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{CaptureController, CaptureFile, CaptureHandle};
use crate::error::CaptureError;

/// How long a stopped recorder gets to flush before it is killed
const STOP_GRACE: Duration = Duration::from_secs(2);

struct ActiveRecording {
    child: Child,
    file: TempPath,
    started_at: Instant,
}

/// Recorder driven by a configurable shell command.
///
/// `start` and `stop` must be called from within a tokio runtime.
pub struct CommandRecorder {
    command: String,
    dir: Option<PathBuf>,
    stop_grace: Duration,
    active: Option<ActiveRecording>,
}

impl CommandRecorder {
    /// Create a recorder. `{output}` in `command` is replaced by the
    /// temp file path.
    pub fn new(command: impl Into<String>, dir: Option<PathBuf>) -> Self {
        Self {
            command: command.into(),
            dir,
            stop_grace: STOP_GRACE,
            active: None,
        }
    }

    /// Override how long a stopped recorder may take to exit
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    fn temp_path(&self) -> Result<TempPath, CaptureError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("keyscribe_").suffix(".wav");
        let file = match &self.dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        Ok(file.into_temp_path())
    }
}

/// Single-quote a path for `sh -c`
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn signal_group(child: &Child, signal: libc::c_int) {
    // Already reaped
    let Some(pid) = child.id() else {
        return;
    };
    // SAFETY: kill(2) with a negative pid targets the process group created
    // for this child; it has no memory-safety preconditions.
    let rc = unsafe { libc::kill(-(pid as libc::pid_t), signal) };
    if rc != 0 {
        debug!(pid, signal, "signal delivery failed (recorder already gone?)");
    }
}

/// Wait up to `grace` for the recorder to exit, then kill its group
async fn reap(mut child: Child, grace: Duration) {
    match timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            debug!(?status, "recorder exited");
            return;
        }
        Ok(Err(e)) => warn!(error = %e, "failed to wait for recorder"),
        Err(_) => warn!(grace_ms = grace.as_millis() as u64, "recorder did not exit in time, killing"),
    }
    signal_group(&child, libc::SIGKILL);
    let _ = child.wait().await;
}

impl CaptureController for CommandRecorder {
    fn start(&mut self) -> Result<CaptureHandle, CaptureError> {
        if self.active.is_some() {
            return Err(CaptureError::AlreadyActive);
        }

        let file = self.temp_path()?;
        let command = self
            .command
            .replace("{output}", &shell_quote(&file.to_string_lossy()));

        let child = Command::new("sh")
            .args(["-c", &command])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::PermissionDenied => CaptureError::PermissionDenied(e.to_string()),
                _ => CaptureError::Spawn(e.to_string()),
            })?;

        let started_at = Instant::now();
        info!(pid = ?child.id(), path = %file.display(), "recorder started");
        self.active = Some(ActiveRecording {
            child,
            file,
            started_at,
        });
        Ok(CaptureHandle { started_at })
    }

    fn stop(&mut self) -> Option<(CaptureFile, Duration)> {
        let active = self.active.take()?;
        let duration = active.started_at.elapsed();

        signal_group(&active.child, libc::SIGINT);
        let (done_tx, done_rx) = oneshot::channel();
        let (child, grace) = (active.child, self.stop_grace);
        tokio::spawn(async move {
            reap(child, grace).await;
            let _ = done_tx.send(());
        });

        info!(duration_ms = duration.as_millis() as u64, "recorder stopping");
        Some((CaptureFile::finishing(active.file, done_rx), duration))
    }

    fn cancel(&mut self) {
        if let Some(active) = self.active.take() {
            signal_group(&active.child, libc::SIGKILL);
            // Dropping the child lets the runtime reap it; the file goes too
            drop(active);
            info!("recording cancelled");
        }
    }
}

impl Drop for CommandRecorder {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/tmp/a.wav"), "'/tmp/a.wav'");
        assert_eq!(shell_quote("/tmp/it's.wav"), r"'/tmp/it'\''s.wav'");
    }

    #[tokio::test]
    async fn test_stop_returns_recording() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = CommandRecorder::new(
            "printf RIFF > {output}; sleep 5",
            Some(dir.path().to_path_buf()),
        );

        recorder.start().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let (mut file, duration) = recorder.stop().unwrap();
        file.finished().await.unwrap();

        assert!(duration >= Duration::from_millis(200));
        assert_eq!(std::fs::read(file.path()).unwrap(), b"RIFF");
        let location = file.path().to_path_buf();
        drop(file);
        assert!(!location.exists());
    }

    #[tokio::test]
    async fn test_stop_does_not_wait_for_stubborn_recorder() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = CommandRecorder::new(
            "trap '' INT; printf RIFF > {output}; sleep 5",
            Some(dir.path().to_path_buf()),
        )
        .with_stop_grace(Duration::from_millis(300));

        recorder.start().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let stopping = Instant::now();
        let (mut file, _) = recorder.stop().unwrap();
        assert!(stopping.elapsed() < Duration::from_millis(100));

        // The recorder ignores SIGINT, so it is killed after the grace period
        tokio::time::timeout(Duration::from_secs(3), file.finished())
            .await
            .unwrap()
            .unwrap();
        assert!(stopping.elapsed() >= Duration::from_millis(300));
        assert_eq!(std::fs::read(file.path()).unwrap(), b"RIFF");
    }

    #[tokio::test]
    async fn test_empty_recording_is_rejected_and_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = CommandRecorder::new("true", Some(dir.path().to_path_buf()));

        recorder.start().unwrap();
        let (mut file, _) = recorder.stop().unwrap();
        assert!(matches!(file.finished().await, Err(CaptureError::Empty)));
        drop(file);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = CommandRecorder::new(
            "printf RIFF > {output}; sleep 5",
            Some(dir.path().to_path_buf()),
        );

        recorder.start().unwrap();
        recorder.cancel();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(recorder.stop().is_none());
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = CommandRecorder::new("sleep 5", Some(dir.path().to_path_buf()));
        recorder.start().unwrap();
        assert!(matches!(recorder.start(), Err(CaptureError::AlreadyActive)));
    }
}
