//! CGEventTap key source
//!
//! Installs an active (not listen-only) session tap so shortcut events can be
//! swallowed. Runs its own CFRunLoop on the listener thread.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventFlags, CGEventTap, CGEventTapLocation, CGEventTapOptions,
    CGEventTapPlacement, CGEventType, EventField,
};
use tracing::{error, info, warn};

use super::keys::ModifierState;
use super::listener::HotkeyError;
use super::source::{Disposition, EventHandler, KeyEventKind, KeyEventSource, RawKeyEvent, SourceControl};

/// Check if the process has Accessibility permission
pub fn check_accessibility_permissions() -> bool {
    #[link(name = "ApplicationServices", kind = "framework")]
    extern "C" {
        fn AXIsProcessTrusted() -> bool;
    }
    unsafe { AXIsProcessTrusted() }
}

fn modifiers_from_flags(flags: CGEventFlags) -> ModifierState {
    ModifierState {
        command: flags.contains(CGEventFlags::CGEventFlagCommand),
        control: flags.contains(CGEventFlags::CGEventFlagControl),
        option: flags.contains(CGEventFlags::CGEventFlagAlternate),
        shift: flags.contains(CGEventFlags::CGEventFlagShift),
    }
}

/// Key source backed by a Quartz event tap
#[derive(Debug, Default)]
pub struct EventTapSource;

impl EventTapSource {
    /// Create a new event tap source
    pub fn new() -> Self {
        Self
    }
}

impl KeyEventSource for EventTapSource {
    fn run(
        self: Box<Self>,
        handler: EventHandler<'_>,
        control: &SourceControl,
    ) -> Result<(), HotkeyError> {
        if !check_accessibility_permissions() {
            error!("Accessibility permission not granted");
            return Err(HotkeyError::EventTapUnavailable);
        }

        let handler = RefCell::new(handler);
        let tap_disabled = Arc::new(AtomicBool::new(false));
        let tap_disabled_cb = Arc::clone(&tap_disabled);

        // CGEventTap callback - must be fast and non-blocking
        let callback = move |_proxy: core_graphics::event::CGEventTapProxy,
                             event_type: CGEventType,
                             event: &CGEvent|
              -> Option<CGEvent> {
            let kind = match event_type {
                CGEventType::KeyDown => KeyEventKind::KeyDown,
                CGEventType::KeyUp => KeyEventKind::KeyUp,
                CGEventType::FlagsChanged => KeyEventKind::ModifierChanged,
                CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                    tap_disabled_cb.store(true, Ordering::SeqCst);
                    return Some(event.clone());
                }
                _ => return Some(event.clone()),
            };

            let raw = RawKeyEvent {
                kind,
                key_code: event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u16,
                modifiers: modifiers_from_flags(event.get_flags()),
                timestamp: Instant::now(),
                is_repeat: kind == KeyEventKind::KeyDown
                    && event.get_integer_value_field(EventField::KEYBOARD_EVENT_AUTOREPEAT) != 0,
            };

            let Ok(mut on_event) = handler.try_borrow_mut() else {
                return Some(event.clone());
            };
            match (*on_event)(raw) {
                Disposition::Consume => None,
                Disposition::PassThrough => Some(event.clone()),
            }
        };

        let tap = CGEventTap::new(
            CGEventTapLocation::Session,
            CGEventTapPlacement::HeadInsertEventTap,
            CGEventTapOptions::Default,
            vec![
                CGEventType::KeyDown,
                CGEventType::KeyUp,
                CGEventType::FlagsChanged,
            ],
            callback,
        )
        .map_err(|_| {
            error!("failed to create event tap - is Accessibility permission granted?");
            HotkeyError::EventTapUnavailable
        })?;

        let run_loop_source = tap
            .mach_port
            .create_runloop_source(0)
            .map_err(|_| HotkeyError::EventTapUnavailable)?;
        let run_loop = CFRunLoop::get_current();

        unsafe {
            run_loop.add_source(&run_loop_source, kCFRunLoopCommonModes);
        }

        tap.enable();
        control.mark_ready();
        info!("event tap created and enabled");

        while control.is_running() {
            unsafe {
                CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, Duration::from_millis(100), true);
            }

            // macOS disables slow taps; turn it back on rather than go deaf
            if tap_disabled.swap(false, Ordering::SeqCst) {
                warn!("event tap disabled by the system, re-enabling");
                tap.enable();
            }
        }

        Ok(())
    }
}
