//! SIGHUP-triggered shortcut reload

use std::io;

use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::debug;

use crate::config::{Config, ConfigError};
use crate::settings::SettingsStore;

/// Receives SIGHUP
pub struct ReloadSignal {
    sighup: Signal,
}

impl ReloadSignal {
    /// Register the SIGHUP handler
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            sighup: signal(SignalKind::hangup())?,
        })
    }

    /// Wait for the next SIGHUP. `None` once the stream ends.
    pub async fn recv(&mut self) -> Option<()> {
        let received = self.sighup.recv().await;
        debug!("received SIGHUP");
        received
    }
}

/// Re-read the config file and publish its shortcuts.
///
/// Only shortcuts take effect without a restart. On error the current
/// settings stay untouched.
pub fn apply_reload(config: &Config, settings: &SettingsStore) -> Result<(), ConfigError> {
    let file = config.reload()?;
    let set = file.shortcut_set()?;
    settings.replace(set)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::keys;
    use crate::hotkey::{ShortcutSet, TriggerKind};

    fn write_config(home: &std::path::Path, text: &str) {
        let dir = home.join(".config").join("keyscribe");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.toml"), text).unwrap();
    }

    #[test]
    fn test_reload_publishes_new_shortcuts() {
        let home = tempfile::tempdir().unwrap();
        let config = Config::load_from_home(home.path()).unwrap();
        let settings = SettingsStore::default();

        write_config(
            home.path(),
            r#"
            [shortcuts.dictation]
            key = "F5"
            trigger = "hold"
            "#,
        );
        apply_reload(&config, &settings).unwrap();

        let snapshot = settings.snapshot();
        assert_eq!(Some(snapshot.dictation.key_code), keys::code_for_label("F5"));
        assert_eq!(snapshot.dictation.trigger, TriggerKind::Hold);
        assert_eq!(snapshot.rewrite, ShortcutSet::default().rewrite);
    }

    #[test]
    fn test_invalid_reload_keeps_settings() {
        let home = tempfile::tempdir().unwrap();
        let config = Config::load_from_home(home.path()).unwrap();
        let settings = SettingsStore::default();

        write_config(home.path(), "[shortcuts.dictation]\nkey = \"Nope\"\ntrigger = \"hold\"\n");
        assert!(matches!(
            apply_reload(&config, &settings),
            Err(ConfigError::UnknownKey { .. })
        ));
        assert_eq!(*settings.snapshot(), ShortcutSet::default());
    }
}
