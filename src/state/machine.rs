//! Recording session state machine
//!
//! Handles transitions between Idle, HoldRecording, ContinuousRecording and
//! Processing in response to classified hotkey intents. Owns the capture
//! controller; the engine actor is the only caller.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::capture::{CaptureController, PendingCapture, MIN_RECORDING};
use crate::error::EngineError;
use crate::events::StateEvent;
use crate::hotkey::{Intent, ShortcutId};
use crate::output::HistoryKind;

/// The four possible states of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Waiting for a shortcut
    #[default]
    Idle,
    /// Recording while the hold shortcut is down
    HoldRecording,
    /// Recording until the continuous shortcut toggles again
    ContinuousRecording,
    /// Capture ended; a pipeline task is running
    Processing,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::HoldRecording => write!(f, "HoldRecording"),
            SessionState::ContinuousRecording => write!(f, "ContinuousRecording"),
            SessionState::Processing => write!(f, "Processing"),
        }
    }
}

/// How a recording was started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingMode {
    Hold,
    Continuous,
}

impl RecordingMode {
    fn state(self) -> SessionState {
        match self {
            RecordingMode::Hold => SessionState::HoldRecording,
            RecordingMode::Continuous => SessionState::ContinuousRecording,
        }
    }

    fn history_kind(self) -> HistoryKind {
        match self {
            RecordingMode::Hold => HistoryKind::Dictation,
            RecordingMode::Continuous => HistoryKind::Continuous,
        }
    }
}

impl std::fmt::Display for RecordingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordingMode::Hold => write!(f, "hold"),
            RecordingMode::Continuous => write!(f, "continuous"),
        }
    }
}

/// Observable session status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Human-readable status line
    pub status_text: String,
    /// Message of the most recent pipeline failure
    pub last_error: Option<String>,
    pub recording_indicator: bool,
    pub processing_indicator: bool,
    /// Whether global shortcuts are being intercepted
    pub listening: bool,
    pub rewrite_in_flight: bool,
    /// A selection is waiting for a dictated instruction
    pub instruction_armed: bool,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            status_text: "Ready".to_string(),
            last_error: None,
            recording_indicator: false,
            processing_indicator: false,
            listening: false,
            rewrite_in_flight: false,
            instruction_armed: false,
        }
    }
}

/// Work the engine must hand to the pipeline
#[derive(Debug)]
pub enum Submission {
    /// Transcribe and insert
    Dictation {
        capture: PendingCapture,
        kind: HistoryKind,
    },
    /// Transcribe as an instruction and rewrite the armed selection
    Instruction {
        selection: String,
        capture: PendingCapture,
    },
}

/// Outcome of feeding an intent to the session
#[derive(Debug)]
pub enum Transition {
    /// Intent had no effect in the current state
    Ignored,
    /// Capture started
    Started(RecordingMode),
    /// Capture stopped and was thrown away
    Discarded { elapsed: Duration },
    /// Capture stopped; the session is now Processing
    Submit(Submission),
    /// The session stayed or returned to Idle because of an error
    Failed(EngineError),
}

/// The recording session
pub struct RecordingSession {
    /// Current state
    state: SessionState,
    /// Time when the current recording began, from the triggering key event
    session_started_at: Option<Instant>,
    /// Shortcut whose release ends the current hold
    hold_owner: Option<ShortcutId>,
    /// Selection captured for dictated-instruction rewrite
    armed_selection: Option<String>,
    capture: Box<dyn CaptureController>,
    status_tx: watch::Sender<SessionStatus>,
    /// Channel for emitting state events
    event_tx: broadcast::Sender<StateEvent>,
}

impl RecordingSession {
    /// Create a new session
    pub fn new(
        capture: Box<dyn CaptureController>,
        status_tx: watch::Sender<SessionStatus>,
        event_tx: broadcast::Sender<StateEvent>,
    ) -> Self {
        Self {
            state: SessionState::Idle,
            session_started_at: None,
            hold_owner: None,
            armed_selection: None,
            capture,
            status_tx,
            event_tx,
        }
    }

    /// Get the current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Apply a recording intent. `at` is the timestamp of the key event.
    ///
    /// Rewrite intents are not handled here; combos from other shortcuts
    /// toggle continuous recording.
    pub fn handle_intent(&mut self, intent: Intent, at: Instant) -> Transition {
        match (self.state, intent) {
            (SessionState::Idle, Intent::BeginHold(id)) => {
                self.start_recording(RecordingMode::Hold, Some(id), at)
            }
            (SessionState::Idle, Intent::ToggleContinuous(_) | Intent::TriggerCombo(_)) => {
                self.start_recording(RecordingMode::Continuous, None, at)
            }
            (SessionState::HoldRecording, Intent::EndHold(id)) if self.hold_owner == Some(id) => {
                self.stop_recording(RecordingMode::Hold, at)
            }
            (
                SessionState::ContinuousRecording,
                Intent::ToggleContinuous(_) | Intent::TriggerCombo(_),
            ) => self.stop_recording(RecordingMode::Continuous, at),
            (state, intent) => {
                debug!(%state, ?intent, "intent ignored");
                Transition::Ignored
            }
        }
    }

    fn start_recording(
        &mut self,
        mode: RecordingMode,
        owner: Option<ShortcutId>,
        at: Instant,
    ) -> Transition {
        match self.capture.start() {
            Ok(_handle) => {
                self.session_started_at = Some(at);
                self.hold_owner = owner;
                self.transition_to(mode.state());
                let text = match mode {
                    RecordingMode::Hold => "Recording...",
                    RecordingMode::Continuous => "Recording (continuous)...",
                };
                self.publish(|s| s.status_text = text.to_string());
                self.emit(StateEvent::RecordingStarted { mode });
                Transition::Started(mode)
            }
            Err(e) => {
                warn!(error = %e, "capture failed to start");
                let err = EngineError::from(e);
                self.publish(|s| s.status_text = err.to_string());
                self.emit_error(&err);
                Transition::Failed(err)
            }
        }
    }

    fn stop_recording(&mut self, mode: RecordingMode, at: Instant) -> Transition {
        let started_at = self.session_started_at.take().unwrap_or(at);
        let elapsed = at.saturating_duration_since(started_at);
        self.hold_owner = None;

        let Some((file, duration)) = self.capture.stop() else {
            self.armed_selection = None;
            self.transition_to(SessionState::Idle);
            let err = EngineError::CaptureFailed("no audio was captured".to_string());
            self.publish(|s| s.status_text = err.to_string());
            self.emit_error(&err);
            return Transition::Failed(err);
        };

        if elapsed < MIN_RECORDING {
            file.discard();
            if self.armed_selection.take().is_some() {
                debug!("armed instruction cleared by short recording");
            }
            self.transition_to(SessionState::Idle);
            let elapsed_ms = elapsed.as_millis() as u64;
            info!(elapsed_ms, "recording too short, discarded");
            let status = EngineError::CaptureTooShort { elapsed_ms }.to_string();
            self.publish(|s| s.status_text = status);
            self.emit(StateEvent::RecordingDiscarded { elapsed_ms });
            return Transition::Discarded { elapsed };
        }

        let capture = PendingCapture {
            file,
            started_at,
            duration,
        };
        self.transition_to(SessionState::Processing);
        self.emit(StateEvent::ProcessingStarted {
            mode,
            duration_ms: duration.as_millis() as u64,
        });

        match self.armed_selection.take() {
            Some(selection) => {
                self.publish(|s| s.status_text = "Rewriting with instruction...".to_string());
                Transition::Submit(Submission::Instruction { selection, capture })
            }
            None => {
                self.publish(|s| s.status_text = "Transcribing...".to_string());
                Transition::Submit(Submission::Dictation {
                    capture,
                    kind: mode.history_kind(),
                })
            }
        }
    }

    /// Pipeline completion: the only way out of Processing
    pub fn finish_processing(&mut self, result: Result<String, EngineError>) {
        if self.state != SessionState::Processing {
            warn!(state = %self.state, "processing finished outside Processing");
            return;
        }
        self.transition_to(SessionState::Idle);

        match result {
            Ok(text) if text.is_empty() => {
                self.publish(|s| s.status_text = "No speech detected".to_string());
                self.emit(StateEvent::ProcessingFinished { chars: 0 });
            }
            Ok(text) => {
                let chars = text.chars().count();
                self.publish(|s| s.status_text = format!("Inserted {} characters", chars));
                self.emit(StateEvent::ProcessingFinished { chars });
            }
            Err(err) => self.record_failure(&err),
        }
    }

    /// Mark a selection rewrite as in flight. Returns false if one already is.
    pub fn begin_rewrite(&mut self) -> bool {
        if self.status_tx.borrow().rewrite_in_flight {
            self.notice("Rewrite already in progress");
            return false;
        }
        self.publish(|s| {
            s.rewrite_in_flight = true;
            s.status_text = "Rewriting selection...".to_string();
        });
        self.emit(StateEvent::RewriteStarted);
        true
    }

    /// A selection rewrite completed
    pub fn finish_rewrite(&mut self, result: Result<String, EngineError>) {
        self.publish(|s| s.rewrite_in_flight = false);
        match result {
            Ok(text) => {
                let chars = text.chars().count();
                self.publish(|s| s.status_text = format!("Rewrote {} characters", chars));
                self.emit(StateEvent::RewriteFinished { chars });
            }
            Err(err) => self.record_failure(&err),
        }
    }

    /// Keep `selection` for the next completed recording
    pub fn arm_instruction(&mut self, selection: String) {
        let chars = selection.chars().count();
        self.armed_selection = Some(selection);
        info!(chars, "selection armed for dictated instruction");
        self.publish(|s| s.status_text = "Speak your instruction".to_string());
        self.emit(StateEvent::InstructionArmed { chars });
    }

    /// Whether a selection is waiting for an instruction
    pub fn instruction_armed(&self) -> bool {
        self.armed_selection.is_some()
    }

    /// The rewrite shortcut fired but nothing was selected
    pub fn no_selection(&mut self) {
        let err = EngineError::NoSelectionFound;
        self.publish(|s| {
            s.rewrite_in_flight = false;
            s.status_text = "No text selected".to_string();
        });
        self.emit_error(&err);
    }

    /// Record whether the hotkey listener is active
    pub fn set_listening(&mut self, listening: bool) {
        self.publish(|s| s.listening = listening);
    }

    /// The event tap could not be installed; a persistent status
    pub fn listening_unavailable(&mut self) {
        let err = EngineError::EventTapUnavailable;
        self.publish(|s| {
            s.listening = false;
            s.status_text = err.to_string();
        });
        self.emit_error(&err);
    }

    /// Informational status update
    pub fn notice(&mut self, message: &str) {
        info!(message, "notice");
        self.publish(|s| s.status_text = message.to_string());
        self.emit(StateEvent::Notice {
            message: message.to_string(),
        });
    }

    /// Abandon any active recording
    pub fn shutdown(&mut self) {
        if matches!(
            self.state,
            SessionState::HoldRecording | SessionState::ContinuousRecording
        ) {
            self.capture.cancel();
            self.transition_to(SessionState::Idle);
        }
        self.armed_selection = None;
        self.session_started_at = None;
        self.hold_owner = None;
        self.publish(|s| s.status_text = "Stopped".to_string());
    }

    fn record_failure(&mut self, err: &EngineError) {
        warn!(error = %err, "processing failed");
        let message = err.to_string();
        self.publish(|s| {
            s.status_text = message.clone();
            if *err != EngineError::Cancelled {
                s.last_error = Some(message.clone());
            }
        });
        self.emit_error(err);
    }

    /// Perform a state transition and refresh the indicators
    fn transition_to(&mut self, new_state: SessionState) {
        let old_state = self.state;
        if old_state == new_state {
            return;
        }
        info!(from = %old_state, to = %new_state, "state transition");
        self.state = new_state;
        self.publish(|s| s.state = new_state);
    }

    fn publish(&self, update: impl FnOnce(&mut SessionStatus)) {
        let state = self.state;
        self.status_tx.send_modify(|status| {
            update(status);
            status.state = state;
            status.recording_indicator = matches!(
                state,
                SessionState::HoldRecording | SessionState::ContinuousRecording
            );
            status.processing_indicator =
                state == SessionState::Processing || status.rewrite_in_flight;
            status.instruction_armed = self.armed_selection.is_some();
        });
    }

    fn emit(&self, event: StateEvent) {
        debug!(%event, "emitting state event");
        let _ = self.event_tx.send(event);
    }

    fn emit_error(&self, err: &EngineError) {
        self.emit(StateEvent::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        });
    }
}
