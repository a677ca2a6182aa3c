//! Key event source abstraction
//!
//! The OS event tap is one implementation; tests drive the listener with a
//! scripted source instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::time::Instant;

use super::keys::ModifierState;
use super::listener::HotkeyError;

/// Raw keyboard event type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventKind {
    /// A key went down (or auto-repeated)
    KeyDown,
    /// A key went up
    KeyUp,
    /// A modifier key changed state
    ModifierChanged,
}

/// One raw keyboard event as delivered by the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawKeyEvent {
    /// Event type
    pub kind: KeyEventKind,
    /// Virtual key code of the key that changed
    pub key_code: u16,
    /// Modifier flags after the change
    pub modifiers: ModifierState,
    /// When the OS generated the event
    pub timestamp: Instant,
    /// Key-down generated by auto-repeat
    pub is_repeat: bool,
}

impl RawKeyEvent {
    /// Key-down event
    pub fn key_down(key_code: u16, modifiers: ModifierState, timestamp: Instant) -> Self {
        Self {
            kind: KeyEventKind::KeyDown,
            key_code,
            modifiers,
            timestamp,
            is_repeat: false,
        }
    }

    /// Key-up event
    pub fn key_up(key_code: u16, modifiers: ModifierState, timestamp: Instant) -> Self {
        Self {
            kind: KeyEventKind::KeyUp,
            key_code,
            modifiers,
            timestamp,
            is_repeat: false,
        }
    }

    /// Modifier-change event
    pub fn modifier_changed(key_code: u16, modifiers: ModifierState, timestamp: Instant) -> Self {
        Self {
            kind: KeyEventKind::ModifierChanged,
            key_code,
            modifiers,
            timestamp,
            is_repeat: false,
        }
    }

    /// Mark as an auto-repeat key-down
    pub fn repeated(mut self) -> Self {
        self.is_repeat = true;
        self
    }
}

/// What the source should do with an event after classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Deliver unmodified to the rest of the system
    PassThrough,
    /// Swallow the event
    Consume,
}

/// Callback invoked for every raw event, on the source's thread
pub type EventHandler<'a> = &'a mut dyn FnMut(RawKeyEvent) -> Disposition;

/// Startup handshake and stop flag shared between a source and its listener
pub struct SourceControl {
    running: Arc<AtomicBool>,
    ready_tx: std_mpsc::Sender<Result<(), HotkeyError>>,
}

impl SourceControl {
    pub(crate) fn new(
        running: Arc<AtomicBool>,
        ready_tx: std_mpsc::Sender<Result<(), HotkeyError>>,
    ) -> Self {
        Self { running, ready_tx }
    }

    /// Report that interception is installed and events will flow
    pub fn mark_ready(&self) {
        let _ = self.ready_tx.send(Ok(()));
    }

    /// Whether the source should keep delivering events
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Capability to deliver global keyboard events.
///
/// `run` blocks on the calling thread, invoking `handler` for each event in
/// OS order, until `control.is_running()` turns false or the source ends.
/// It must call `control.mark_ready()` once interception is active, or
/// return an error without doing so.
pub trait KeyEventSource: Send + 'static {
    /// Deliver events until stopped
    fn run(self: Box<Self>, handler: EventHandler<'_>, control: &SourceControl)
        -> Result<(), HotkeyError>;
}
