//! Modifier state and key-code tables
//!
//! The classifier only ever sees opaque `u16` key codes. Everything that
//! maps those codes to names (for configuration and status text) lives here
//! as plain data.

use serde::{Deserialize, Serialize};

/// Modifier keys that participate in shortcut matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modifier {
    /// Command (⌘)
    Command,
    /// Control (⌃)
    Control,
    /// Option/Alt (⌥)
    Option,
    /// Shift (⇧)
    Shift,
}

impl Modifier {
    /// Parse a modifier name as written in the config file
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "command" | "cmd" | "super" => Some(Self::Command),
            "control" | "ctrl" => Some(Self::Control),
            "option" | "alt" => Some(Self::Option),
            "shift" => Some(Self::Shift),
            _ => None,
        }
    }
}

/// Tracks which modifier keys are currently pressed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ModifierState {
    /// Command key is held
    pub command: bool,
    /// Control key is held
    pub control: bool,
    /// Option/Alt key is held
    pub option: bool,
    /// Shift key is held
    pub shift: bool,
}

impl ModifierState {
    /// No modifiers held
    pub const NONE: Self = Self {
        command: false,
        control: false,
        option: false,
        shift: false,
    };

    /// State with exactly one modifier held
    pub fn only(modifier: Modifier) -> Self {
        Self::NONE.with(modifier)
    }

    /// Copy of this state with `modifier` added
    pub fn with(mut self, modifier: Modifier) -> Self {
        match modifier {
            Modifier::Command => self.command = true,
            Modifier::Control => self.control = true,
            Modifier::Option => self.option = true,
            Modifier::Shift => self.shift = true,
        }
        self
    }

    /// Check whether `modifier` is held
    pub fn contains(&self, modifier: Modifier) -> bool {
        match modifier {
            Modifier::Command => self.command,
            Modifier::Control => self.control,
            Modifier::Option => self.option,
            Modifier::Shift => self.shift,
        }
    }

    /// Check if all modifiers are released
    pub fn is_empty(&self) -> bool {
        !self.command && !self.control && !self.option && !self.shift
    }

    /// Build a state from a list of modifiers
    pub fn from_modifiers(modifiers: &[Modifier]) -> Self {
        modifiers.iter().fold(Self::NONE, |state, m| state.with(*m))
    }

    /// List the held modifiers in display order
    pub fn to_modifiers(&self) -> Vec<Modifier> {
        [
            Modifier::Control,
            Modifier::Option,
            Modifier::Shift,
            Modifier::Command,
        ]
        .into_iter()
        .filter(|m| self.contains(*m))
        .collect()
    }

    /// Symbol prefix such as `⌃⌥` for status text
    pub fn symbols(&self) -> String {
        self.to_modifiers()
            .into_iter()
            .map(|m| match m {
                Modifier::Command => '⌘',
                Modifier::Control => '⌃',
                Modifier::Option => '⌥',
                Modifier::Shift => '⇧',
            })
            .collect()
    }
}

/// One entry of the key table
struct KeyEntry {
    code: u16,
    label: &'static str,
    modifier: Option<Modifier>,
}

const fn key(code: u16, label: &'static str) -> KeyEntry {
    KeyEntry {
        code,
        label,
        modifier: None,
    }
}

const fn modifier_key(code: u16, label: &'static str, modifier: Modifier) -> KeyEntry {
    KeyEntry {
        code,
        label,
        modifier: Some(modifier),
    }
}

/// macOS virtual key codes (Carbon `kVK_*`)
static KEY_TABLE: &[KeyEntry] = &[
    key(0x00, "A"),
    key(0x0B, "B"),
    key(0x08, "C"),
    key(0x02, "D"),
    key(0x0E, "E"),
    key(0x03, "F"),
    key(0x05, "G"),
    key(0x04, "H"),
    key(0x22, "I"),
    key(0x26, "J"),
    key(0x28, "K"),
    key(0x25, "L"),
    key(0x2E, "M"),
    key(0x2D, "N"),
    key(0x1F, "O"),
    key(0x23, "P"),
    key(0x0C, "Q"),
    key(0x0F, "R"),
    key(0x01, "S"),
    key(0x11, "T"),
    key(0x20, "U"),
    key(0x09, "V"),
    key(0x0D, "W"),
    key(0x07, "X"),
    key(0x10, "Y"),
    key(0x06, "Z"),
    key(0x1D, "0"),
    key(0x12, "1"),
    key(0x13, "2"),
    key(0x14, "3"),
    key(0x15, "4"),
    key(0x17, "5"),
    key(0x16, "6"),
    key(0x1A, "7"),
    key(0x1C, "8"),
    key(0x19, "9"),
    key(0x7A, "F1"),
    key(0x78, "F2"),
    key(0x63, "F3"),
    key(0x76, "F4"),
    key(0x60, "F5"),
    key(0x61, "F6"),
    key(0x62, "F7"),
    key(0x64, "F8"),
    key(0x65, "F9"),
    key(0x6D, "F10"),
    key(0x67, "F11"),
    key(0x6F, "F12"),
    key(0x69, "F13"),
    key(0x6B, "F14"),
    key(0x71, "F15"),
    key(0x6A, "F16"),
    key(0x40, "F17"),
    key(0x4F, "F18"),
    key(0x50, "F19"),
    key(0x5A, "F20"),
    key(0x24, "Return"),
    key(0x30, "Tab"),
    key(0x31, "Space"),
    key(0x33, "Delete"),
    key(0x35, "Escape"),
    key(0x32, "Grave"),
    key(0x2C, "Slash"),
    key(0x2F, "Period"),
    key(0x2B, "Comma"),
    key(0x29, "Semicolon"),
    modifier_key(0x37, "Command", Modifier::Command),
    modifier_key(0x36, "RightCommand", Modifier::Command),
    modifier_key(0x3B, "Control", Modifier::Control),
    modifier_key(0x3E, "RightControl", Modifier::Control),
    modifier_key(0x3A, "Option", Modifier::Option),
    modifier_key(0x3D, "RightOption", Modifier::Option),
    modifier_key(0x38, "Shift", Modifier::Shift),
    modifier_key(0x3C, "RightShift", Modifier::Shift),
];

/// Virtual key codes referenced directly by the daemon
pub mod codes {
    /// `C`, used for the synthetic copy shortcut
    pub const C: u16 = 0x08;
    /// `K`
    pub const K: u16 = 0x28;
    /// `R`
    pub const R: u16 = 0x0F;
    /// `Space`
    pub const SPACE: u16 = 0x31;
    /// `F13`
    pub const F13: u16 = 0x69;
    /// Left Command
    pub const COMMAND: u16 = 0x37;
    /// Right Command
    pub const RIGHT_COMMAND: u16 = 0x36;
    /// Left Option
    pub const OPTION: u16 = 0x3A;
    /// Right Option
    pub const RIGHT_OPTION: u16 = 0x3D;
    /// Left Control
    pub const CONTROL: u16 = 0x3B;
    /// Left Shift
    pub const SHIFT: u16 = 0x38;
}

/// Look up a key code by its configuration label (case-insensitive)
pub fn code_for_label(label: &str) -> Option<u16> {
    KEY_TABLE
        .iter()
        .find(|entry| entry.label.eq_ignore_ascii_case(label))
        .map(|entry| entry.code)
}

/// Display label for a key code, if known
pub fn label_for_code(code: u16) -> Option<&'static str> {
    KEY_TABLE
        .iter()
        .find(|entry| entry.code == code)
        .map(|entry| entry.label)
}

/// The modifier a physical modifier key contributes, if `code` is one
pub fn modifier_for_code(code: u16) -> Option<Modifier> {
    KEY_TABLE
        .iter()
        .find(|entry| entry.code == code)
        .and_then(|entry| entry.modifier)
}

/// Human-readable name for a key plus modifiers, e.g. `⌘K` or `RightOption`
pub fn describe(code: u16, modifiers: ModifierState) -> String {
    let label = label_for_code(code)
        .map(str::to_string)
        .unwrap_or_else(|| format!("key 0x{code:02X}"));
    format!("{}{}", modifiers.symbols(), label)
}
