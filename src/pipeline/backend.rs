//! Transcription and rewrite collaborators
//!
//! The engine only sees the traits. The bundled implementations run a
//! configurable command, so any local model or HTTP client script works.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::command::run_shell;
use crate::error::BackendError;

/// Speech-to-text service
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the audio file with the given model
    async fn transcribe(&self, audio: &Path, model: &str) -> Result<String, BackendError>;
}

/// How a rewrite is steered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteMode {
    /// Fixed prompt from configuration
    Prompt(String),
    /// Instruction the user just dictated
    Instruction(String),
}

impl RewriteMode {
    fn label(&self) -> &'static str {
        match self {
            RewriteMode::Prompt(_) => "prompt",
            RewriteMode::Instruction(_) => "instruction",
        }
    }

    fn text(&self) -> &str {
        match self {
            RewriteMode::Prompt(t) | RewriteMode::Instruction(t) => t,
        }
    }
}

/// Model parameters for a rewrite call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteParams {
    pub model: String,
}

/// Text rewrite service
#[async_trait]
pub trait Rewriter: Send + Sync {
    /// Rewrite `text` according to `mode`
    async fn rewrite(
        &self,
        text: &str,
        mode: &RewriteMode,
        params: &RewriteParams,
    ) -> Result<String, BackendError>;
}

/// Runs a command with the audio path in `$KEYSCRIBE_AUDIO`; stdout is the
/// transcript.
#[derive(Debug, Clone)]
pub struct CommandTranscriber {
    command: Option<String>,
    timeout: Duration,
}

impl CommandTranscriber {
    pub fn new(command: Option<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }
}

#[async_trait]
impl Transcriber for CommandTranscriber {
    async fn transcribe(&self, audio: &Path, model: &str) -> Result<String, BackendError> {
        let command = self.command.as_deref().ok_or(BackendError::NotConfigured)?;
        let audio = audio.to_string_lossy();
        debug!(%audio, model, "running transcription command");

        let text = run_shell(
            command,
            None,
            &[("KEYSCRIBE_AUDIO", audio.as_ref()), ("KEYSCRIBE_MODEL", model)],
            self.timeout,
        )
        .await?;

        info!(chars = text.chars().count(), "transcription complete");
        Ok(text)
    }
}

/// Pipes the text to a command on stdin; the prompt or dictated instruction
/// is in `$KEYSCRIBE_PROMPT` and `$KEYSCRIBE_MODE` says which.
#[derive(Debug, Clone)]
pub struct CommandRewriter {
    command: Option<String>,
    timeout: Duration,
}

impl CommandRewriter {
    pub fn new(command: Option<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }
}

#[async_trait]
impl Rewriter for CommandRewriter {
    async fn rewrite(
        &self,
        text: &str,
        mode: &RewriteMode,
        params: &RewriteParams,
    ) -> Result<String, BackendError> {
        let command = self.command.as_deref().ok_or(BackendError::NotConfigured)?;
        debug!(mode = mode.label(), model = %params.model, "running rewrite command");

        let rewritten = run_shell(
            command,
            Some(text),
            &[
                ("KEYSCRIBE_MODE", mode.label()),
                ("KEYSCRIBE_PROMPT", mode.text()),
                ("KEYSCRIBE_MODEL", params.model.as_str()),
            ],
            self.timeout,
        )
        .await?;

        if rewritten.is_empty() {
            return Err(BackendError::Api("rewrite returned no text".into()));
        }
        Ok(rewritten)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_command_transcriber_sees_audio_path() {
        let audio = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(audio.path(), "spoken words").unwrap();
        let transcriber =
            CommandTranscriber::new(Some("cat \"$KEYSCRIBE_AUDIO\"".into()), LIMIT);

        let text = transcriber.transcribe(audio.path(), "base.en").await.unwrap();
        assert_eq!(text, "spoken words");
    }

    #[tokio::test]
    async fn test_unconfigured_backends() {
        let transcriber = CommandTranscriber::new(None, LIMIT);
        assert_eq!(
            transcriber.transcribe(Path::new("/nope"), "m").await,
            Err(BackendError::NotConfigured)
        );

        let rewriter = CommandRewriter::new(None, LIMIT);
        let params = RewriteParams { model: "m".into() };
        assert_eq!(
            rewriter
                .rewrite("x", &RewriteMode::Prompt("p".into()), &params)
                .await,
            Err(BackendError::NotConfigured)
        );
    }

    #[tokio::test]
    async fn test_command_rewriter_env_and_stdin() {
        let rewriter = CommandRewriter::new(
            Some("printf '%s|%s|' \"$KEYSCRIBE_MODE\" \"$KEYSCRIBE_PROMPT\"; cat".into()),
            LIMIT,
        );
        let params = RewriteParams { model: "m".into() };

        let out = rewriter
            .rewrite("body", &RewriteMode::Instruction("make it formal".into()), &params)
            .await
            .unwrap();
        assert_eq!(out, "instruction|make it formal|body");
    }

    #[tokio::test]
    async fn test_empty_rewrite_is_error() {
        let rewriter = CommandRewriter::new(Some("true".into()), LIMIT);
        let params = RewriteParams { model: "m".into() };
        let err = rewriter
            .rewrite("body", &RewriteMode::Prompt("p".into()), &params)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Api(_)));
    }
}
