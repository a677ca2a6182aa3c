//! Shell command execution shared by the command-line backends
//!
//! Text goes in on stdin, the result comes back on stdout. The child is
//! killed if the timeout elapses or the calling task is dropped.

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::BackendError;

/// Run `command` through `sh -c` and return its trimmed stdout
pub async fn run_shell(
    command: &str,
    stdin: Option<&str>,
    envs: &[(&str, &str)],
    limit: Duration,
) -> Result<String, BackendError> {
    let mut child = Command::new("sh")
        .args(["-c", command])
        .envs(envs.iter().copied())
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| BackendError::Spawn(e.to_string()))?;

    // Feed stdin while waiting so a child that never reads cannot stall us
    let pipe = child.stdin.take();
    let feed = async move {
        let (Some(text), Some(mut pipe)) = (stdin, pipe) else {
            return Ok(());
        };
        match pipe.write_all(text.as_bytes()).await {
            // The child exited without reading all of its input
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
            other => other,
        }
        // `pipe` drops here: EOF for the child
    };

    let (written, output) = timeout(limit, async {
        tokio::join!(feed, child.wait_with_output())
    })
    .await
    .map_err(|_| BackendError::Timeout(limit))?;
    let output = output.map_err(|e| BackendError::Spawn(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BackendError::NonZeroExit {
            code: output.status.code(),
            stderr: stderr.trim().to_string(),
        });
    }

    written.map_err(|e| BackendError::Write(e.to_string()))?;

    let text =
        String::from_utf8(output.stdout).map_err(|e| BackendError::InvalidUtf8(e.to_string()))?;
    Ok(text.trim().to_string())
}
