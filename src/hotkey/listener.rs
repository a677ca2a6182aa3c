//! Global hotkey listener
//!
//! Owns the classifier and runs a `KeyEventSource` on a dedicated thread.
//! Classification happens inline in the source callback; intents are pushed
//! to the engine over an unbounded channel so the callback never waits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::classifier::{Intent, ShortcutClassifier};
use super::source::{Disposition, KeyEventSource, RawKeyEvent, SourceControl};
use crate::settings::SettingsStore;

/// How long `start` waits for the source to install its tap
const READY_TIMEOUT: Duration = Duration::from_secs(2);

/// Intent sent from the hotkey listener to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotkeyEvent {
    /// What the user asked for
    pub intent: Intent,
    /// Timestamp of the raw event that produced it
    pub at: Instant,
}

/// Global hotkey listener that classifies key events into intents
pub struct HotkeyListener {
    settings: SettingsStore,
    event_tx: mpsc::UnboundedSender<HotkeyEvent>,
    running: Arc<AtomicBool>,
}

impl HotkeyListener {
    /// Create a new hotkey listener
    pub fn new(settings: SettingsStore, event_tx: mpsc::UnboundedSender<HotkeyEvent>) -> Self {
        Self {
            settings,
            event_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the hotkey listener
    ///
    /// Spawns a dedicated thread that runs `source` and waits until the
    /// source reports that interception is active. Fails if the source
    /// cannot install its tap.
    pub fn start(&self, source: Box<dyn KeyEventSource>) -> Result<(), HotkeyError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HotkeyError::AlreadyRunning);
        }

        let (ready_tx, ready_rx) = std_mpsc::channel();
        let settings = self.settings.clone();
        let event_tx = self.event_tx.clone();
        let running = Arc::clone(&self.running);

        let spawned = thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || {
                info!("hotkey listener thread started");

                let control = SourceControl::new(Arc::clone(&running), ready_tx.clone());
                let mut classifier = ShortcutClassifier::new();
                let mut handler = |event: RawKeyEvent| -> Disposition {
                    let specs = settings.snapshot();
                    let result = classifier.handle(&event, &specs);
                    for intent in result.intents() {
                        debug!(?intent, "hotkey intent");
                        if event_tx.send(HotkeyEvent { intent, at: event.timestamp }).is_err() {
                            warn!("failed to send hotkey intent - channel closed?");
                        }
                    }
                    if result.consume {
                        Disposition::Consume
                    } else {
                        Disposition::PassThrough
                    }
                };

                if let Err(e) = source.run(&mut handler, &control) {
                    error!(?e, "hotkey listener error");
                    let _ = ready_tx.send(Err(e));
                }

                running.store(false, Ordering::SeqCst);
                info!("hotkey listener thread stopped");
            });

        if let Err(e) = spawned {
            self.running.store(false, Ordering::SeqCst);
            return Err(HotkeyError::ThreadSpawn(e.to_string()));
        }

        match ready_rx.recv_timeout(READY_TIMEOUT) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                self.running.store(false, Ordering::SeqCst);
                Err(HotkeyError::StartTimeout)
            }
            Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                self.running.store(false, Ordering::SeqCst);
                Err(HotkeyError::SourceEnded)
            }
        }
    }

    /// Stop the hotkey listener
    ///
    /// The source notices on its next poll of the running flag.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the listener is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Errors that can occur in the hotkey listener
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HotkeyError {
    #[error("hotkey listener is already running")]
    AlreadyRunning,

    #[error("failed to create event tap - check Accessibility permissions")]
    EventTapUnavailable,

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),

    #[error("event source did not become ready in time")]
    StartTimeout,

    #[error("event source ended before becoming ready")]
    SourceEnded,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::keys::{codes, ModifierState};
    use crate::hotkey::source::testing::ScriptedSource;
    use crate::hotkey::source::EventHandler;
    use crate::hotkey::ShortcutId;

    /// Source that stays ready until stopped
    struct IdleSource;

    impl KeyEventSource for IdleSource {
        fn run(
            self: Box<Self>,
            _handler: EventHandler<'_>,
            control: &SourceControl,
        ) -> Result<(), HotkeyError> {
            control.mark_ready();
            while control.is_running() {
                thread::sleep(Duration::from_millis(5));
            }
            Ok(())
        }
    }

    fn listener() -> (HotkeyListener, mpsc::UnboundedReceiver<HotkeyEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (HotkeyListener::new(SettingsStore::default(), tx), rx)
    }

    #[test]
    fn test_listener_creation() {
        let (listener, _rx) = listener();
        assert!(!listener.is_running());
    }

    #[test]
    fn test_intents_forwarded_and_dispositions_reported() {
        let (listener, mut rx) = listener();
        let t = Instant::now();
        let command = ModifierState::only(crate::hotkey::keys::Modifier::Command);
        let option = ModifierState::only(crate::hotkey::keys::Modifier::Option);
        let ctrl_opt = option.with(crate::hotkey::keys::Modifier::Control);

        let source = ScriptedSource::new(vec![
            RawKeyEvent::modifier_changed(codes::RIGHT_OPTION, option, t),
            RawKeyEvent::modifier_changed(codes::RIGHT_OPTION, ModifierState::NONE, t),
            RawKeyEvent::key_down(codes::R, ctrl_opt, t),
            RawKeyEvent::key_down(codes::K, command, t),
        ]);
        let dispositions = source.dispositions();

        listener.start(Box::new(source)).unwrap();

        let intents: Vec<Intent> = (0..3)
            .map(|_| tokio_test::block_on(rx.recv()).unwrap().intent)
            .collect();
        assert_eq!(
            intents,
            vec![
                Intent::BeginHold(ShortcutId::Dictation),
                Intent::EndHold(ShortcutId::Dictation),
                Intent::TriggerCombo(ShortcutId::Rewrite),
            ]
        );

        // Wait for the scripted run to finish recording dispositions
        while listener.is_running() {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(
            *dispositions.lock().unwrap(),
            vec![
                Disposition::PassThrough,
                Disposition::PassThrough,
                Disposition::Consume,
                Disposition::PassThrough,
            ]
        );
    }

    #[test]
    fn test_denied_source_fails_start() {
        let (listener, _rx) = listener();
        let result = listener.start(Box::new(ScriptedSource::denied()));
        assert_eq!(result, Err(HotkeyError::EventTapUnavailable));
        assert!(!listener.is_running());
    }

    #[test]
    fn test_double_start_rejected() {
        let (listener, _rx) = listener();
        listener.start(Box::new(IdleSource)).unwrap();
        assert_eq!(
            listener.start(Box::new(IdleSource)),
            Err(HotkeyError::AlreadyRunning)
        );
        listener.stop();
        while listener.is_running() {
            thread::sleep(Duration::from_millis(1));
        }
    }
}
