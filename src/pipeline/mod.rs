//! Asynchronous processing pipeline
//!
//! Each submission becomes one tokio task that transcribes and/or rewrites,
//! inserts the result and appends history. Tasks watch a shared shutdown
//! flag; a cancelled task drops its capture, which deletes the temp file.

mod backend;

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::capture::PendingCapture;
use crate::error::PipelineError;
use crate::output::{HistoryEntry, HistoryKind, HistorySink, TextSink};

pub use backend::{
    CommandRewriter, CommandTranscriber, RewriteMode, RewriteParams, Rewriter, Transcriber,
};

#[cfg(test)]
pub(crate) use backend::testing;

/// Models and prompt used by pipeline tasks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    pub transcription_model: String,
    pub rewrite_model: String,
    pub rewrite_prompt: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            transcription_model: "base.en".to_string(),
            rewrite_model: "default".to_string(),
            rewrite_prompt: "Improve the clarity and grammar of this text. Keep its meaning."
                .to_string(),
        }
    }
}

/// Collaborators shared by every pipeline task
#[derive(Clone)]
pub struct PipelineServices {
    pub transcriber: Arc<dyn Transcriber>,
    pub rewriter: Arc<dyn Rewriter>,
    pub text: Arc<dyn TextSink>,
    pub history: Arc<dyn HistorySink>,
}

/// Spawns processing tasks; cheap to clone
#[derive(Clone)]
pub struct Pipeline {
    services: PipelineServices,
    options: Arc<PipelineOptions>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

/// Resolves once the shutdown flag is raised
async fn shutdown_requested(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            // Sender gone: nobody can cancel us any more
            std::future::pending::<()>().await;
        }
    }
}

impl Pipeline {
    /// Create a pipeline
    pub fn new(services: PipelineServices, options: PipelineOptions) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            services,
            options: Arc::new(options),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    /// Cancel every running and future task
    pub fn shutdown(&self) {
        info!("pipeline shutdown requested");
        self.shutdown_tx.send_replace(true);
    }

    fn spawn<F>(&self, job: F) -> JoinHandle<Result<String, PipelineError>>
    where
        F: Future<Output = Result<String, PipelineError>> + Send + 'static,
    {
        let shutdown = self.shutdown_rx.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = shutdown_requested(shutdown) => {
                    info!("pipeline task cancelled");
                    Err(PipelineError::Cancelled)
                }
                result = job => result,
            }
        })
    }

    /// Transcribe a finished recording and insert the text
    pub fn submit_capture(
        &self,
        capture: PendingCapture,
        kind: HistoryKind,
    ) -> JoinHandle<Result<String, PipelineError>> {
        let this = self.clone();
        self.spawn(async move {
            let duration_ms = capture.duration.as_millis() as u64;
            let text = this.transcribe(capture).await?;
            if text.is_empty() {
                info!("no speech detected");
                return Ok(text);
            }
            let model = this.options.transcription_model.clone();
            this.deliver(HistoryEntry::now(kind, text, duration_ms, model, None))
                .await
        })
    }

    /// Rewrite selected text with the configured prompt
    pub fn submit_selection(&self, selection: String) -> JoinHandle<Result<String, PipelineError>> {
        let this = self.clone();
        self.spawn(async move {
            let mode = RewriteMode::Prompt(this.options.rewrite_prompt.clone());
            this.rewrite_and_deliver(selection, mode, 0).await
        })
    }

    /// Transcribe a dictated instruction, then rewrite the selection with it
    pub fn submit_dictated_rewrite(
        &self,
        selection: String,
        instruction: PendingCapture,
    ) -> JoinHandle<Result<String, PipelineError>> {
        let this = self.clone();
        self.spawn(async move {
            let duration_ms = instruction.duration.as_millis() as u64;
            let spoken = this.transcribe(instruction).await?;
            if spoken.is_empty() {
                info!("no instruction detected");
                return Ok(spoken);
            }
            debug!(instruction = %spoken, "dictated instruction");
            this.rewrite_and_deliver(selection, RewriteMode::Instruction(spoken), duration_ms)
                .await
        })
    }

    async fn transcribe(&self, mut capture: PendingCapture) -> Result<String, PipelineError> {
        if let Err(e) = capture.file.finished().await {
            capture.file.discard();
            return Err(PipelineError::Capture(e.to_string()));
        }
        let result = self
            .services
            .transcriber
            .transcribe(capture.file.path(), &self.options.transcription_model)
            .await;
        capture.file.discard();
        result.map_err(PipelineError::Transcription)
    }

    async fn rewrite_and_deliver(
        &self,
        selection: String,
        mode: RewriteMode,
        duration_ms: u64,
    ) -> Result<String, PipelineError> {
        let params = RewriteParams {
            model: self.options.rewrite_model.clone(),
        };
        let rewritten = self
            .services
            .rewriter
            .rewrite(&selection, &mode, &params)
            .await
            .map_err(PipelineError::Rewrite)?;

        self.deliver(HistoryEntry::now(
            HistoryKind::Rewrite,
            rewritten,
            duration_ms,
            params.model,
            Some(selection),
        ))
        .await
    }

    /// Insert the entry's text, then record it. History is written even if
    /// insertion fails so the text is not lost.
    async fn deliver(&self, entry: HistoryEntry) -> Result<String, PipelineError> {
        let inserted = self.services.text.insert_text(&entry.text).await;

        if let Err(e) = self.services.history.record(&entry).await {
            warn!(error = %e, "failed to record history");
        }

        inserted?;
        info!(kind = ?entry.kind, chars = entry.text.chars().count(), "text delivered");
        Ok(entry.text)
    }
}
