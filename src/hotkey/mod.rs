//! Hotkey module for global keyboard event listening
//!
//! Raw key events come from a `KeyEventSource` (the macOS event tap in
//! production), are classified against the three configured shortcuts, and
//! leave this module as `HotkeyEvent` intents.

mod classifier;
pub mod keys;
mod listener;
#[cfg(target_os = "macos")]
mod macos;
mod source;
mod spec;

pub use classifier::{Classification, Intent, ShortcutClassifier, DOUBLE_TAP_WINDOW};
pub use keys::{Modifier, ModifierState};
pub use listener::{HotkeyError, HotkeyEvent, HotkeyListener};
pub use source::{Disposition, EventHandler, KeyEventKind, KeyEventSource, RawKeyEvent, SourceControl};
pub use spec::{ShortcutId, ShortcutSet, ShortcutSpec, SpecError, TriggerKind};

#[cfg(test)]
pub(crate) use source::testing;

/// Source used when the platform has no supported event tap
#[derive(Debug, Default)]
pub struct UnavailableSource;

impl KeyEventSource for UnavailableSource {
    fn run(
        self: Box<Self>,
        _handler: EventHandler<'_>,
        _control: &SourceControl,
    ) -> Result<(), HotkeyError> {
        Err(HotkeyError::EventTapUnavailable)
    }
}

/// The platform's global key source
pub fn system_source() -> Box<dyn KeyEventSource> {
    #[cfg(target_os = "macos")]
    {
        Box::new(macos::EventTapSource::new())
    }
    #[cfg(not(target_os = "macos"))]
    {
        Box::new(UnavailableSource)
    }
}
