//! JSON-lines transcription history

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::HistorySink;
use crate::error::HistoryError;

/// What produced a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    /// Hold-to-talk dictation
    Dictation,
    /// Double-tap continuous dictation
    Continuous,
    /// Rewrite of selected text
    Rewrite,
}

/// One completed transcription or rewrite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Seconds since the Unix epoch
    pub timestamp: u64,
    /// Final text
    pub text: String,
    /// Recording length, zero for prompt rewrites
    pub duration_ms: u64,
    /// Model that produced the text
    pub model: String,
    pub kind: HistoryKind,
    /// Input text for rewrites
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
}

impl HistoryEntry {
    /// Entry stamped with the current time
    pub fn now(
        kind: HistoryKind,
        text: impl Into<String>,
        duration_ms: u64,
        model: impl Into<String>,
        original_text: Option<String>,
    ) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            timestamp,
            text: text.into(),
            duration_ms,
            model: model.into(),
            kind,
            original_text,
        }
    }
}

/// Appends entries to a `.jsonl` file
#[derive(Debug, Clone)]
pub struct JsonlHistory {
    path: PathBuf,
}

impl JsonlHistory {
    /// History stored at `path`; parent directories are created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File backing this history
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HistorySink for JsonlHistory {
    async fn record(&self, entry: &HistoryEntry) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;

        debug!(path = %self.path.display(), kind = ?entry.kind, "history entry recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entries_appended_as_lines() {
        let dir = tempfile::tempdir().unwrap();
        let history = JsonlHistory::new(dir.path().join("nested").join("history.jsonl"));

        history
            .record(&HistoryEntry::now(HistoryKind::Dictation, "hello", 1200, "base.en", None))
            .await
            .unwrap();
        history
            .record(&HistoryEntry::now(
                HistoryKind::Rewrite,
                "Hello.",
                0,
                "gpt",
                Some("hello".into()),
            ))
            .await
            .unwrap();

        let contents = std::fs::read_to_string(history.path()).unwrap();
        let entries: Vec<HistoryEntry> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, HistoryKind::Dictation);
        assert_eq!(entries[0].original_text, None);
        assert_eq!(entries[1].original_text.as_deref(), Some("hello"));
    }

    #[test]
    fn test_original_text_omitted_when_absent() {
        let entry = HistoryEntry::now(HistoryKind::Continuous, "hi", 800, "m", None);
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"kind\":\"continuous\""));
        assert!(!json.contains("original_text"));
    }
}
