//! Shared shortcut settings
//!
//! Written rarely (startup, config reload), read on every key event. Readers
//! clone an `Arc` under a read lock; writers only swap the pointer, so the
//! event-tap callback never waits behind slow work.

use std::sync::{Arc, RwLock};

use tracing::info;

use crate::hotkey::{ShortcutSet, SpecError};

/// Handle to the current shortcut snapshot
#[derive(Debug, Clone)]
pub struct SettingsStore {
    current: Arc<RwLock<Arc<ShortcutSet>>>,
}

impl SettingsStore {
    /// Create a store holding `set`
    pub fn new(set: ShortcutSet) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(set))),
        }
    }

    /// Consistent snapshot of all three shortcuts
    pub fn snapshot(&self) -> Arc<ShortcutSet> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Validate and publish a new set
    pub fn replace(&self, set: ShortcutSet) -> Result<(), SpecError> {
        set.validate()?;
        let next = Arc::new(set);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        if **guard != *next {
            info!(
                dictation = %next.dictation.label(),
                continuous = %next.continuous.label(),
                rewrite = %next.rewrite.label(),
                rewrite_enabled = next.rewrite_enabled,
                "shortcut settings updated"
            );
        }
        *guard = next;
        Ok(())
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new(ShortcutSet::default())
    }
}
