//! Shortcut classifier
//!
//! Turns the raw key stream into high-level intents. Runs inline in the
//! event-tap callback, so `handle` does no I/O, takes no locks and does not
//! allocate.

use std::time::{Duration, Instant};

use tracing::trace;

use super::keys::{self, ModifierState};
use super::source::{KeyEventKind, RawKeyEvent};
use super::spec::{ShortcutId, ShortcutSet, ShortcutSpec, TriggerKind};

/// Two releases closer than this toggle continuous recording
pub const DOUBLE_TAP_WINDOW: Duration = Duration::from_millis(300);

/// High-level intent derived from key events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// A hold shortcut was pressed
    BeginHold(ShortcutId),
    /// A hold shortcut was released
    EndHold(ShortcutId),
    /// A double-tap shortcut completed
    ToggleContinuous(ShortcutId),
    /// A combo shortcut fired
    TriggerCombo(ShortcutId),
}

impl Intent {
    /// Shortcut that produced this intent
    pub fn shortcut(&self) -> ShortcutId {
        match *self {
            Intent::BeginHold(id)
            | Intent::EndHold(id)
            | Intent::ToggleContinuous(id)
            | Intent::TriggerCombo(id) => id,
        }
    }
}

/// Result of classifying one raw event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Classification {
    /// Holds ended because their spec changed, indexed by shortcut.
    /// Delivered before `intent`.
    pub released: [Option<Intent>; 3],
    /// Intent to forward, if any
    pub intent: Option<Intent>,
    /// Whether the event should be swallowed
    pub consume: bool,
}

impl Classification {
    fn emit(intent: Intent, consume: bool) -> Self {
        Self {
            intent: Some(intent),
            consume,
            ..Self::default()
        }
    }

    fn swallow() -> Self {
        Self {
            consume: true,
            ..Self::default()
        }
    }

    /// Every intent to forward, in delivery order
    pub fn intents(&self) -> impl Iterator<Item = Intent> + '_ {
        self.released.iter().flatten().copied().chain(self.intent)
    }

    /// Whether this spec claimed the event, stopping lower-precedence specs
    fn is_claimed(&self) -> bool {
        self.intent.is_some() || self.consume
    }
}

/// Transition of the key a spec watches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Press,
    Release,
    None,
}

/// Per-spec tracking state
#[derive(Debug, Clone, Copy, Default)]
struct SpecTracker {
    spec: Option<ShortcutSpec>,
    is_down: bool,
    last_release: Option<Instant>,
    pending_taps: u32,
    interrupted: bool,
}

/// Evaluation order when several specs could claim the same event
const PRECEDENCE: [TriggerKind; 3] = [TriggerKind::Combo, TriggerKind::Hold, TriggerKind::DoubleTap];

/// Pure state machine mapping raw key events to intents
#[derive(Debug, Default)]
pub struct ShortcutClassifier {
    trackers: [SpecTracker; 3],
}

impl ShortcutClassifier {
    /// Create a classifier with no keys tracked
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one raw event against the current shortcut snapshot
    pub fn handle(&mut self, event: &RawKeyEvent, specs: &ShortcutSet) -> Classification {
        let released = self.sync_specs(specs);
        let mut result = self.classify(event, specs);
        result.released = released;
        result
    }

    fn classify(&mut self, event: &RawKeyEvent, specs: &ShortcutSet) -> Classification {
        self.note_interruption(event, specs);

        for kind in PRECEDENCE {
            for (id, spec) in specs.active() {
                if spec.trigger != kind {
                    continue;
                }
                let tracker = &mut self.trackers[id.index()];
                let result = match kind {
                    TriggerKind::Combo => classify_combo(id, spec, event),
                    TriggerKind::Hold => classify_hold(id, spec, tracker, event),
                    TriggerKind::DoubleTap => classify_double_tap(id, spec, tracker, event),
                };
                if result.is_claimed() {
                    trace!(shortcut = %id, ?result, "event claimed");
                    return result;
                }
            }
        }

        Classification::default()
    }

    /// Reset trackers whose spec changed since the last event.
    ///
    /// A hold that was down under the old spec can never see its release, so
    /// it is ended here instead. The current event is still classified.
    fn sync_specs(&mut self, specs: &ShortcutSet) -> [Option<Intent>; 3] {
        let mut stale = [None; 3];
        for id in ShortcutId::ALL {
            let spec = *specs.get(id);
            let tracker = &mut self.trackers[id.index()];
            if tracker.spec == Some(spec) {
                continue;
            }
            if let Some(old) = tracker.spec {
                if old.trigger == TriggerKind::Hold && tracker.is_down {
                    stale[id.index()] = Some(Intent::EndHold(id));
                }
            }
            *tracker = SpecTracker {
                spec: Some(spec),
                ..SpecTracker::default()
            };
        }
        stale
    }

    /// Typing another key between taps cancels a pending double-tap
    fn note_interruption(&mut self, event: &RawKeyEvent, specs: &ShortcutSet) {
        if event.kind != KeyEventKind::KeyDown || event.is_repeat {
            return;
        }
        for (id, spec) in specs.active() {
            if spec.trigger != TriggerKind::DoubleTap || spec.key_code == event.key_code {
                continue;
            }
            let tracker = &mut self.trackers[id.index()];
            tracker.pending_taps = 0;
            tracker.last_release = None;
            if tracker.is_down {
                tracker.interrupted = true;
            }
        }
    }
}

/// Work out which edge, if any, `event` is for the key `spec` watches
fn edge_for(spec: &ShortcutSpec, tracker: &SpecTracker, event: &RawKeyEvent) -> Edge {
    if event.key_code != spec.key_code {
        return Edge::None;
    }

    if spec.is_modifier_only() {
        if event.kind != KeyEventKind::ModifierChanged {
            return Edge::None;
        }
        let Some(flag) = keys::modifier_for_code(spec.key_code) else {
            return Edge::None;
        };
        // A held key's next change can only be its release, even if the
        // twin modifier on the other side keeps the flag set.
        if tracker.is_down {
            Edge::Release
        } else if event.modifiers == ModifierState::only(flag) {
            Edge::Press
        } else {
            Edge::None
        }
    } else {
        match event.kind {
            KeyEventKind::KeyDown if event.modifiers == spec.modifiers => Edge::Press,
            KeyEventKind::KeyUp => Edge::Release,
            _ => Edge::None,
        }
    }
}

fn classify_combo(id: ShortcutId, spec: &ShortcutSpec, event: &RawKeyEvent) -> Classification {
    let matches = event.kind == KeyEventKind::KeyDown
        && event.key_code == spec.key_code
        && event.modifiers == spec.modifiers;

    match (matches, event.is_repeat) {
        (true, false) => Classification::emit(Intent::TriggerCombo(id), true),
        (true, true) => Classification::swallow(),
        (false, _) => Classification::default(),
    }
}

fn classify_hold(
    id: ShortcutId,
    spec: &ShortcutSpec,
    tracker: &mut SpecTracker,
    event: &RawKeyEvent,
) -> Classification {
    let consumes = !spec.is_modifier_only();

    // Auto-repeat of a held hotkey, even if modifiers shifted mid-hold
    if consumes
        && tracker.is_down
        && event.kind == KeyEventKind::KeyDown
        && event.key_code == spec.key_code
    {
        return Classification::swallow();
    }

    match edge_for(spec, tracker, event) {
        Edge::Press if !tracker.is_down && !event.is_repeat => {
            tracker.is_down = true;
            Classification::emit(Intent::BeginHold(id), consumes)
        }
        Edge::Release if tracker.is_down => {
            tracker.is_down = false;
            Classification::emit(Intent::EndHold(id), consumes)
        }
        _ => Classification::default(),
    }
}

fn classify_double_tap(
    id: ShortcutId,
    spec: &ShortcutSpec,
    tracker: &mut SpecTracker,
    event: &RawKeyEvent,
) -> Classification {
    match edge_for(spec, tracker, event) {
        Edge::Press if !tracker.is_down && !event.is_repeat => {
            tracker.is_down = true;
            tracker.interrupted = false;
            Classification::default()
        }
        Edge::Release if tracker.is_down => {
            tracker.is_down = false;
            if std::mem::take(&mut tracker.interrupted) {
                tracker.pending_taps = 0;
                tracker.last_release = None;
                return Classification::default();
            }

            let within_window = tracker
                .last_release
                .map(|last| event.timestamp.saturating_duration_since(last) < DOUBLE_TAP_WINDOW)
                .unwrap_or(false);

            if tracker.pending_taps > 0 && within_window {
                tracker.pending_taps = 0;
                tracker.last_release = None;
                Classification::emit(Intent::ToggleContinuous(id), false)
            } else {
                tracker.pending_taps = 1;
                tracker.last_release = Some(event.timestamp);
                Classification::default()
            }
        }
        _ => Classification::default(),
    }
}
