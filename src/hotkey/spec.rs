//! Shortcut definitions
//!
//! A `ShortcutSpec` is plain data. The three live specs travel together as a
//! `ShortcutSet` so the classifier can read one consistent snapshot per event.

use serde::{Deserialize, Serialize};

use super::keys::{self, ModifierState};

/// How a shortcut is activated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Active while the key is physically held
    Hold,
    /// Two releases within the double-tap window toggle a persistent mode
    DoubleTap,
    /// A single key-down with an exact modifier combination
    Combo,
}

/// Identifies which of the three configurable shortcuts an intent came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortcutId {
    /// Direct dictation
    Dictation,
    /// Continuous recording
    Continuous,
    /// Text rewrite
    Rewrite,
}

impl ShortcutId {
    /// All ids, in storage order
    pub const ALL: [ShortcutId; 3] = [Self::Dictation, Self::Continuous, Self::Rewrite];

    /// Index into per-spec arrays
    pub fn index(self) -> usize {
        match self {
            Self::Dictation => 0,
            Self::Continuous => 1,
            Self::Rewrite => 2,
        }
    }
}

impl std::fmt::Display for ShortcutId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShortcutId::Dictation => write!(f, "dictation"),
            ShortcutId::Continuous => write!(f, "continuous"),
            ShortcutId::Rewrite => write!(f, "rewrite"),
        }
    }
}

/// One configurable trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShortcutSpec {
    /// Virtual key code
    pub key_code: u16,
    /// Modifiers that must be held, exactly
    pub modifiers: ModifierState,
    /// Activation style
    pub trigger: TriggerKind,
}

impl ShortcutSpec {
    /// Create a spec
    pub fn new(key_code: u16, modifiers: ModifierState, trigger: TriggerKind) -> Self {
        Self {
            key_code,
            modifiers,
            trigger,
        }
    }

    /// A hold/double-tap spec on a bare modifier key.
    ///
    /// These react to modifier-change events rather than key-down/up.
    pub fn is_modifier_only(&self) -> bool {
        self.trigger != TriggerKind::Combo
            && self.modifiers.is_empty()
            && keys::modifier_for_code(self.key_code).is_some()
    }

    /// Display label, e.g. `⌘K`
    pub fn label(&self) -> String {
        keys::describe(self.key_code, self.modifiers)
    }
}

/// Snapshot of the three live shortcuts plus the rewrite switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutSet {
    /// Direct dictation shortcut
    pub dictation: ShortcutSpec,
    /// Continuous recording shortcut
    pub continuous: ShortcutSpec,
    /// Rewrite shortcut
    pub rewrite: ShortcutSpec,
    /// Whether the rewrite shortcut is live
    pub rewrite_enabled: bool,
}

impl ShortcutSet {
    /// Look up a spec by id
    pub fn get(&self, id: ShortcutId) -> &ShortcutSpec {
        match id {
            ShortcutId::Dictation => &self.dictation,
            ShortcutId::Continuous => &self.continuous,
            ShortcutId::Rewrite => &self.rewrite,
        }
    }

    /// Specs that take part in classification, skipping a disabled rewrite
    pub fn active(&self) -> impl Iterator<Item = (ShortcutId, &ShortcutSpec)> {
        ShortcutId::ALL
            .into_iter()
            .filter(move |id| *id != ShortcutId::Rewrite || self.rewrite_enabled)
            .map(move |id| (id, self.get(id)))
    }

    /// Reject configurations the classifier cannot disambiguate
    pub fn validate(&self) -> Result<(), SpecError> {
        for (id, spec) in ShortcutId::ALL.iter().map(|id| (*id, self.get(*id))) {
            if keys::modifier_for_code(spec.key_code).is_none() {
                continue;
            }
            if spec.trigger == TriggerKind::Combo {
                return Err(SpecError::ComboOnModifier(id));
            }
            // Modifier keys only report flag changes, never a matching key-down
            if !spec.modifiers.is_empty() {
                return Err(SpecError::ModifiedModifier(id));
            }
        }

        for (i, a) in ShortcutId::ALL.iter().enumerate() {
            for b in &ShortcutId::ALL[i + 1..] {
                if self.get(*a) == self.get(*b) {
                    return Err(SpecError::Duplicate(*a, *b));
                }
            }
        }

        Ok(())
    }
}

impl Default for ShortcutSet {
    fn default() -> Self {
        Self {
            dictation: ShortcutSpec::new(
                keys::codes::RIGHT_OPTION,
                ModifierState::NONE,
                TriggerKind::Hold,
            ),
            continuous: ShortcutSpec::new(
                keys::codes::RIGHT_COMMAND,
                ModifierState::NONE,
                TriggerKind::DoubleTap,
            ),
            rewrite: ShortcutSpec::new(
                keys::codes::R,
                ModifierState::only(keys::Modifier::Control).with(keys::Modifier::Option),
                TriggerKind::Combo,
            ),
            rewrite_enabled: true,
        }
    }
}

/// Invalid shortcut configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    #[error("{0} and {1} shortcuts are identical")]
    Duplicate(ShortcutId, ShortcutId),

    #[error("{0} shortcut is a combo on a bare modifier key")]
    ComboOnModifier(ShortcutId),

    #[error("{0} shortcut adds modifiers to a modifier key")]
    ModifiedModifier(ShortcutId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::keys::{codes, Modifier};

    #[test]
    fn test_default_set_is_valid() {
        assert!(ShortcutSet::default().validate().is_ok());
    }

    #[test]
    fn test_modifier_only_detection() {
        let bare = ShortcutSpec::new(codes::RIGHT_OPTION, ModifierState::NONE, TriggerKind::Hold);
        assert!(bare.is_modifier_only());

        let chord = ShortcutSpec::new(
            codes::RIGHT_OPTION,
            ModifierState::only(Modifier::Shift),
            TriggerKind::Hold,
        );
        assert!(!chord.is_modifier_only());

        let letter = ShortcutSpec::new(codes::K, ModifierState::NONE, TriggerKind::DoubleTap);
        assert!(!letter.is_modifier_only());
    }

    #[test]
    fn test_duplicate_specs_rejected() {
        let mut set = ShortcutSet::default();
        set.continuous = set.dictation;
        assert_eq!(
            set.validate(),
            Err(SpecError::Duplicate(ShortcutId::Dictation, ShortcutId::Continuous))
        );
    }

    #[test]
    fn test_same_key_different_kind_allowed() {
        let mut set = ShortcutSet::default();
        set.continuous = ShortcutSpec::new(
            set.dictation.key_code,
            ModifierState::NONE,
            TriggerKind::DoubleTap,
        );
        assert!(set.validate().is_ok());
    }

    #[test]
    fn test_combo_on_modifier_rejected() {
        let mut set = ShortcutSet::default();
        set.rewrite = ShortcutSpec::new(codes::COMMAND, ModifierState::NONE, TriggerKind::Combo);
        assert_eq!(
            set.validate(),
            Err(SpecError::ComboOnModifier(ShortcutId::Rewrite))
        );
    }

    #[test]
    fn test_modifier_key_with_modifiers_rejected() {
        let mut set = ShortcutSet::default();
        set.dictation = ShortcutSpec::new(
            codes::RIGHT_OPTION,
            ModifierState::only(Modifier::Shift),
            TriggerKind::Hold,
        );
        assert_eq!(
            set.validate(),
            Err(SpecError::ModifiedModifier(ShortcutId::Dictation))
        );

        let mut set = ShortcutSet::default();
        set.continuous = ShortcutSpec::new(
            codes::RIGHT_COMMAND,
            ModifierState::only(Modifier::Control),
            TriggerKind::DoubleTap,
        );
        assert_eq!(
            set.validate(),
            Err(SpecError::ModifiedModifier(ShortcutId::Continuous))
        );
    }

    #[test]
    fn test_disabled_rewrite_not_active() {
        let mut set = ShortcutSet::default();
        assert_eq!(set.active().count(), 3);
        set.rewrite_enabled = false;
        assert!(set.active().all(|(id, _)| id != ShortcutId::Rewrite));
    }
}
