//! Hotkey engine
//!
//! Owns the listener, the recording session and the pipeline. A single actor
//! task receives classifier intents and pipeline completions and is the only
//! code that mutates the session, so transitions are strictly serialized.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::capture::CaptureController;
use crate::error::{EngineError, PipelineError};
use crate::events::StateEvent;
use crate::hotkey::{HotkeyError, HotkeyEvent, HotkeyListener, Intent, KeyEventSource, ShortcutId};
use crate::output::{HistorySink, TextSink};
use crate::pipeline::{Pipeline, PipelineOptions, PipelineServices, Rewriter, Transcriber};
use crate::settings::SettingsStore;
use crate::state::{RecordingSession, SessionStatus, Submission, Transition};

/// What the rewrite shortcut does with the selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteStyle {
    /// Rewrite immediately with the configured prompt
    #[default]
    Prompt,
    /// Arm the selection; the next recording is the instruction
    Dictated,
}

/// Engine tuning
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub pipeline: PipelineOptions,
    pub rewrite_style: RewriteStyle,
    /// Selection lookups before giving up
    pub selection_attempts: u32,
    /// Pause between selection lookups
    pub selection_delay: Duration,
    /// How long `stop` waits for cancelled tasks
    pub shutdown_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            pipeline: PipelineOptions::default(),
            rewrite_style: RewriteStyle::Prompt,
            selection_attempts: 3,
            selection_delay: Duration::from_millis(100),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// External collaborators
pub struct Services {
    pub capture: Box<dyn CaptureController>,
    pub transcriber: Arc<dyn Transcriber>,
    pub rewriter: Arc<dyn Rewriter>,
    pub text: Arc<dyn TextSink>,
    pub history: Arc<dyn HistorySink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobKind {
    Recording,
    Rewrite,
}

/// Messages delivered to the actor besides hotkey intents
#[derive(Debug)]
enum EngineMessage {
    Completed {
        job: JobKind,
        result: Result<String, EngineError>,
    },
    SelectionResolved(Option<String>),
    Listening(Result<(), HotkeyError>),
    Shutdown,
}

/// Global hotkey engine with explicit start and stop
pub struct HotkeyEngine {
    settings: SettingsStore,
    listener: Arc<HotkeyListener>,
    status_rx: watch::Receiver<SessionStatus>,
    event_tx: broadcast::Sender<StateEvent>,
    msg_tx: mpsc::UnboundedSender<EngineMessage>,
    actor: Option<JoinHandle<()>>,
}

impl HotkeyEngine {
    /// Create the engine and spawn its actor task. Must be called inside a
    /// tokio runtime.
    pub fn new(settings: SettingsStore, services: Services, options: EngineOptions) -> Self {
        let (hotkey_tx, hotkey_rx) = mpsc::unbounded_channel();
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SessionStatus::default());
        let (event_tx, _) = broadcast::channel(64);

        let listener = Arc::new(HotkeyListener::new(settings.clone(), hotkey_tx));
        let session = RecordingSession::new(services.capture, status_tx, event_tx.clone());
        let pipeline = Pipeline::new(
            PipelineServices {
                transcriber: services.transcriber,
                rewriter: services.rewriter,
                text: Arc::clone(&services.text),
                history: services.history,
            },
            options.pipeline.clone(),
        );

        let actor = EngineActor {
            session,
            pipeline,
            text: services.text,
            options,
            hotkey_rx,
            msg_rx,
            msg_tx: msg_tx.clone(),
            tasks: Vec::new(),
            selection_pending: false,
        };

        Self {
            settings,
            listener,
            status_rx,
            event_tx,
            msg_tx,
            actor: Some(tokio::spawn(actor.run())),
        }
    }

    /// Start intercepting global shortcuts from `source`.
    ///
    /// On failure the engine keeps running without shortcuts and the status
    /// reports why.
    pub async fn start(&self, source: Box<dyn KeyEventSource>) -> Result<(), HotkeyError> {
        let listener = Arc::clone(&self.listener);
        let result = tokio::task::spawn_blocking(move || listener.start(source))
            .await
            .unwrap_or_else(|e| Err(HotkeyError::ThreadSpawn(e.to_string())));

        let _ = self.msg_tx.send(EngineMessage::Listening(result.clone()));
        result
    }

    /// Stop listening, cancel in-flight work and wait for the actor
    pub async fn stop(&mut self) {
        self.listener.stop();
        let _ = self.msg_tx.send(EngineMessage::Listening(Err(HotkeyError::SourceEnded)));
        let _ = self.msg_tx.send(EngineMessage::Shutdown);
        if let Some(actor) = self.actor.take() {
            if let Err(e) = actor.await {
                warn!(error = %e, "engine actor ended abnormally");
            }
        }
        info!("hotkey engine stopped");
    }

    /// Current session status
    pub fn status(&self) -> SessionStatus {
        self.status_rx.borrow().clone()
    }

    /// Watch the session status
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status_rx.clone()
    }

    /// Subscribe to state events
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.event_tx.subscribe()
    }

    /// Shortcut settings read by the listener
    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }
}

struct EngineActor {
    session: RecordingSession,
    pipeline: Pipeline,
    text: Arc<dyn TextSink>,
    options: EngineOptions,
    hotkey_rx: mpsc::UnboundedReceiver<HotkeyEvent>,
    msg_rx: mpsc::UnboundedReceiver<EngineMessage>,
    msg_tx: mpsc::UnboundedSender<EngineMessage>,
    tasks: Vec<JoinHandle<()>>,
    /// A selection lookup is running
    selection_pending: bool,
}

impl EngineActor {
    async fn run(mut self) {
        info!("engine started in Idle state");

        loop {
            tokio::select! {
                Some(event) = self.hotkey_rx.recv() => self.on_hotkey(event),
                msg = self.msg_rx.recv() => match msg {
                    Some(EngineMessage::Shutdown) | None => break,
                    Some(msg) => self.on_message(msg),
                },
            }
            self.tasks.retain(|task| !task.is_finished());
        }

        self.shutdown().await;
    }

    fn on_hotkey(&mut self, event: HotkeyEvent) {
        debug!(intent = ?event.intent, "hotkey intent received");
        if event.intent.shortcut() == ShortcutId::Rewrite {
            if !matches!(event.intent, Intent::EndHold(_)) {
                self.on_rewrite_shortcut();
            }
            return;
        }

        if let Transition::Submit(submission) = self.session.handle_intent(event.intent, event.at) {
            let handle = match submission {
                Submission::Dictation { capture, kind } => {
                    self.pipeline.submit_capture(capture, kind)
                }
                Submission::Instruction { selection, capture } => {
                    self.pipeline.submit_dictated_rewrite(selection, capture)
                }
            };
            self.track(JobKind::Recording, handle);
        }
    }

    fn on_rewrite_shortcut(&mut self) {
        if self.selection_pending {
            self.session.notice("Rewrite already in progress");
            return;
        }
        if self.options.rewrite_style == RewriteStyle::Prompt && !self.session.begin_rewrite() {
            return;
        }

        self.selection_pending = true;
        let text = Arc::clone(&self.text);
        let tx = self.msg_tx.clone();
        let attempts = self.options.selection_attempts;
        let delay = self.options.selection_delay;
        self.tasks.push(tokio::spawn(async move {
            let selection = text.selected_text(attempts, delay).await;
            let _ = tx.send(EngineMessage::SelectionResolved(selection));
        }));
    }

    fn on_message(&mut self, msg: EngineMessage) {
        match msg {
            EngineMessage::Completed { job: JobKind::Recording, result } => {
                self.session.finish_processing(result)
            }
            EngineMessage::Completed { job: JobKind::Rewrite, result } => {
                self.session.finish_rewrite(result)
            }
            EngineMessage::SelectionResolved(selection) => self.on_selection(selection),
            EngineMessage::Listening(Ok(())) => {
                info!("listening for shortcuts");
                self.session.set_listening(true);
            }
            EngineMessage::Listening(Err(HotkeyError::EventTapUnavailable)) => {
                self.session.listening_unavailable()
            }
            EngineMessage::Listening(Err(e)) => {
                debug!(error = %e, "not listening");
                self.session.set_listening(false);
            }
            EngineMessage::Shutdown => {}
        }
    }

    fn on_selection(&mut self, selection: Option<String>) {
        self.selection_pending = false;
        let style = self.options.rewrite_style;

        match (selection, style) {
            (None, _) => self.session.no_selection(),
            (Some(text), RewriteStyle::Prompt) => {
                let handle = self.pipeline.submit_selection(text);
                self.track(JobKind::Rewrite, handle);
            }
            (Some(text), RewriteStyle::Dictated) => self.session.arm_instruction(text),
        }
    }

    /// Forward a pipeline task's result back into the actor
    fn track(&mut self, job: JobKind, handle: JoinHandle<Result<String, PipelineError>>) {
        let tx = self.msg_tx.clone();
        self.tasks.push(tokio::spawn(async move {
            let result = match handle.await {
                Ok(result) => result.map_err(EngineError::from),
                Err(e) if e.is_cancelled() => Err(EngineError::Cancelled),
                Err(e) => Err(EngineError::NetworkOrApi(format!("processing task failed: {}", e))),
            };
            let _ = tx.send(EngineMessage::Completed { job, result });
        }));
    }

    async fn shutdown(mut self) {
        info!(tasks = self.tasks.len(), "engine shutting down");
        self.pipeline.shutdown();

        let tasks = std::mem::take(&mut self.tasks);
        let drained = tokio::time::timeout(self.options.shutdown_timeout, async {
            for task in tasks {
                let _ = task.await;
            }
        })
        .await;
        if drained.is_err() {
            warn!("timed out waiting for pipeline tasks");
        }

        // Completions that raced with shutdown still settle the session
        while let Ok(msg) = self.msg_rx.try_recv() {
            self.on_message(msg);
        }
        self.session.set_listening(false);
        self.session.shutdown();
    }
}
