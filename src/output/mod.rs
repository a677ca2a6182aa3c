//! Result sinks: text insertion, selection lookup and history

mod command;
mod history;
#[cfg(target_os = "macos")]
mod macos;

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{HistoryError, OutputError};

pub use command::CommandTextSink;
pub use history::{HistoryEntry, HistoryKind, JsonlHistory};
#[cfg(target_os = "macos")]
pub use macos::MacTextSink;

/// Where finished text goes, and where the selection comes from
#[async_trait]
pub trait TextSink: Send + Sync {
    /// Insert text at the cursor of the focused application
    async fn insert_text(&self, text: &str) -> Result<(), OutputError>;

    /// One attempt at reading the current selection
    async fn try_selected_text(&self) -> Result<Option<String>, OutputError>;

    /// Read the selection, retrying up to `max_attempts` times with `delay`
    /// between attempts. Blank selections count as missing.
    async fn selected_text(&self, max_attempts: u32, delay: Duration) -> Option<String> {
        let attempts = max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.try_selected_text().await {
                Ok(Some(text)) if !text.trim().is_empty() => return Some(text),
                Ok(_) => debug!(attempt, "no selection yet"),
                Err(e) => warn!(attempt, error = %e, "selection lookup failed"),
            }
            if attempt < attempts {
                tokio::time::sleep(delay).await;
            }
        }
        None
    }
}

/// Persistent record of completed transcriptions and rewrites
#[async_trait]
pub trait HistorySink: Send + Sync {
    /// Append one entry
    async fn record(&self, entry: &HistoryEntry) -> Result<(), HistoryError>;
}

/// Text sink for the current platform
pub fn system_text_sink(
    insert_command: Option<String>,
    selection_command: Option<String>,
) -> Box<dyn TextSink> {
    #[cfg(target_os = "macos")]
    {
        if insert_command.is_none() && selection_command.is_none() {
            return Box::new(MacTextSink::new());
        }
    }
    Box::new(CommandTextSink::new(insert_command, selection_command))
}


#[cfg(test)]
mod tests {
    use super::testing::FakeTextSink;
    use super::*;

    #[tokio::test]
    async fn test_selected_text_retries_until_found() {
        let sink = FakeTextSink::with_selections(vec![None, Some("  "), Some("hello")]);
        let text = sink.selected_text(5, Duration::from_millis(1)).await;
        assert_eq!(text.as_deref(), Some("hello"));
        assert_eq!(*sink.lookups.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_selected_text_gives_up() {
        let sink = FakeTextSink::default();
        assert_eq!(sink.selected_text(3, Duration::from_millis(1)).await, None);
        assert_eq!(*sink.lookups.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_selected_text_zero_attempts_still_tries_once() {
        let sink = FakeTextSink::with_selections(vec![Some("x")]);
        assert_eq!(sink.selected_text(0, Duration::ZERO).await.as_deref(), Some("x"));
    }
}
