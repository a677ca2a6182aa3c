//! Events module for session transitions
//!
//! Every observable change of the recording session is broadcast as a
//! `StateEvent`; the IPC server forwards them to subscribed clients.

use serde::{Deserialize, Serialize};

use crate::state::RecordingMode;

/// Events emitted by the recording session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    /// Capture started
    RecordingStarted { mode: RecordingMode },

    /// Capture stopped but was too short to process
    RecordingDiscarded {
        /// How long the shortcut was active
        elapsed_ms: u64,
    },

    /// A recording was handed to the pipeline
    ProcessingStarted {
        mode: RecordingMode,
        /// Length of the recording
        duration_ms: u64,
    },

    /// The pipeline finished successfully
    ProcessingFinished {
        /// Characters inserted (zero when nothing was heard)
        chars: usize,
    },

    /// A selection rewrite was submitted
    RewriteStarted,

    /// A selection rewrite completed
    RewriteFinished { chars: usize },

    /// A selection is waiting for a dictated instruction
    InstructionArmed { chars: usize },

    /// Informational message, e.g. no selection found
    Notice { message: String },

    /// Something failed
    Error { code: String, message: String },
}

impl std::fmt::Display for StateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateEvent::RecordingStarted { mode } => write!(f, "RECORDING_STARTED ({})", mode),
            StateEvent::RecordingDiscarded { elapsed_ms } => {
                write!(f, "RECORDING_DISCARDED ({}ms)", elapsed_ms)
            }
            StateEvent::ProcessingStarted { mode, duration_ms } => {
                write!(f, "PROCESSING_STARTED ({}, {}ms)", mode, duration_ms)
            }
            StateEvent::ProcessingFinished { chars } => {
                write!(f, "PROCESSING_FINISHED ({} chars)", chars)
            }
            StateEvent::RewriteStarted => write!(f, "REWRITE_STARTED"),
            StateEvent::RewriteFinished { chars } => write!(f, "REWRITE_FINISHED ({} chars)", chars),
            StateEvent::InstructionArmed { chars } => {
                write!(f, "INSTRUCTION_ARMED ({} chars)", chars)
            }
            StateEvent::Notice { message } => write!(f, "NOTICE: {}", message),
            StateEvent::Error { code, message } => write!(f, "ERROR [{}]: {}", code, message),
        }
    }
}
