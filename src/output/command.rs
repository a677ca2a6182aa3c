//! Text I/O through external commands
//!
//! Useful off macOS, e.g. `wtype -` / `wl-paste --primary` on Wayland or
//! `xdotool type --file -` / `xclip -o` on X11.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::TextSink;
use crate::command::run_shell;
use crate::error::{BackendError, OutputError};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Text sink that shells out for insertion and selection
#[derive(Debug, Clone)]
pub struct CommandTextSink {
    insert_command: Option<String>,
    selection_command: Option<String>,
}

impl CommandTextSink {
    /// Create a sink. Missing commands disable that direction.
    pub fn new(insert_command: Option<String>, selection_command: Option<String>) -> Self {
        Self {
            insert_command,
            selection_command,
        }
    }
}

#[async_trait]
impl TextSink for CommandTextSink {
    async fn insert_text(&self, text: &str) -> Result<(), OutputError> {
        if text.is_empty() {
            return Err(OutputError::EmptyText);
        }
        let command = self
            .insert_command
            .as_deref()
            .ok_or(BackendError::NotConfigured)?;

        run_shell(command, Some(text), &[], COMMAND_TIMEOUT).await?;
        info!(chars = text.chars().count(), "text inserted via command");
        Ok(())
    }

    async fn try_selected_text(&self) -> Result<Option<String>, OutputError> {
        let Some(command) = self.selection_command.as_deref() else {
            debug!("no selection command configured");
            return Ok(None);
        };

        let text = run_shell(command, None, &[], COMMAND_TIMEOUT).await?;
        Ok((!text.is_empty()).then_some(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_pipes_text_to_command() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("typed.txt");
        let sink = CommandTextSink::new(Some(format!("cat > '{}'", target.display())), None);

        sink.insert_text("hello there").await.unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "hello there");
    }

    #[tokio::test]
    async fn test_insert_without_command_fails() {
        let sink = CommandTextSink::new(None, None);
        assert_eq!(
            sink.insert_text("hi").await,
            Err(OutputError::Command(BackendError::NotConfigured))
        );
        assert_eq!(sink.insert_text("").await, Err(OutputError::EmptyText));
    }

    #[tokio::test]
    async fn test_selection_from_command() {
        let sink = CommandTextSink::new(None, Some("printf 'picked text\\n'".into()));
        assert_eq!(
            sink.try_selected_text().await.unwrap().as_deref(),
            Some("picked text")
        );

        let empty = CommandTextSink::new(None, Some("true".into()));
        assert_eq!(empty.try_selected_text().await.unwrap(), None);

        let missing = CommandTextSink::new(None, None);
        assert_eq!(missing.try_selected_text().await.unwrap(), None);
    }
}
