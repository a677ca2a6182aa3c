//! Configuration loading and management
//!
//! Settings live in `~/.config/keyscribe/config.toml`. Every section has
//! defaults, so a missing file still gives a working daemon.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::engine::{EngineOptions, RewriteStyle};
use crate::hotkey::keys::{self, Modifier, ModifierState};
use crate::hotkey::{ShortcutId, ShortcutSet, ShortcutSpec, SpecError, TriggerKind};
use crate::pipeline::PipelineOptions;

/// Errors loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("HOME is not set")]
    NoHome,

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{shortcut} shortcut: unknown key {key:?}")]
    UnknownKey { shortcut: ShortcutId, key: String },

    #[error("{shortcut} shortcut: unknown modifier {name:?}")]
    UnknownModifier { shortcut: ShortcutId, name: String },

    #[error(transparent)]
    Shortcuts(#[from] SpecError),
}

/// One shortcut as written in the file
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShortcutConfig {
    /// Key label from the key table, e.g. `"RightOption"` or `"K"`
    pub key: String,
    #[serde(default)]
    pub modifiers: Vec<String>,
    pub trigger: TriggerKind,
}

impl ShortcutConfig {
    fn new(key: &str, modifiers: &[&str], trigger: TriggerKind) -> Self {
        Self {
            key: key.to_string(),
            modifiers: modifiers.iter().map(|m| m.to_string()).collect(),
            trigger,
        }
    }

    fn to_spec(&self, shortcut: ShortcutId) -> Result<ShortcutSpec, ConfigError> {
        let key_code = keys::code_for_label(&self.key).ok_or_else(|| ConfigError::UnknownKey {
            shortcut,
            key: self.key.clone(),
        })?;
        let modifiers = self
            .modifiers
            .iter()
            .map(|name| {
                Modifier::parse(name).ok_or_else(|| ConfigError::UnknownModifier {
                    shortcut,
                    name: name.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ShortcutSpec::new(
            key_code,
            ModifierState::from_modifiers(&modifiers),
            self.trigger,
        ))
    }
}

/// `[shortcuts]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShortcutsConfig {
    pub dictation: ShortcutConfig,
    pub continuous: ShortcutConfig,
    pub rewrite: ShortcutConfig,
}

impl Default for ShortcutsConfig {
    fn default() -> Self {
        Self {
            dictation: ShortcutConfig::new("RightOption", &[], TriggerKind::Hold),
            continuous: ShortcutConfig::new("RightCommand", &[], TriggerKind::DoubleTap),
            rewrite: ShortcutConfig::new("R", &["control", "option"], TriggerKind::Combo),
        }
    }
}

/// `[rewrite]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RewriteConfig {
    pub enabled: bool,
    pub mode: RewriteStyle,
    pub prompt: String,
    pub model: String,
    /// Command that reads text on stdin and prints the rewrite
    pub command: Option<String>,
    pub timeout_ms: u64,
    pub selection_attempts: u32,
    pub selection_delay_ms: u64,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        let pipeline = PipelineOptions::default();
        Self {
            enabled: true,
            mode: RewriteStyle::Prompt,
            prompt: pipeline.rewrite_prompt,
            model: pipeline.rewrite_model,
            command: None,
            timeout_ms: 30_000,
            selection_attempts: 3,
            selection_delay_ms: 100,
        }
    }
}

/// `[transcription]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TranscriptionConfig {
    pub model: String,
    /// Command that prints the transcript of `$KEYSCRIBE_AUDIO`
    pub command: Option<String>,
    pub timeout_ms: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model: PipelineOptions::default().transcription_model,
            command: None,
            timeout_ms: 60_000,
        }
    }
}

/// `[recorder]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecorderConfig {
    /// Shell command; `{output}` is replaced by the WAV path
    pub command: String,
    /// Directory for temporary recordings
    pub dir: Option<PathBuf>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            command: "rec -q -c 1 -r 16000 -b 16 {output}".to_string(),
            dir: None,
        }
    }
}

/// `[output]`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub insert_command: Option<String>,
    pub selection_command: Option<String>,
}

/// `[logging]`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `tracing` filter directive, used when `RUST_LOG` is unset
    pub filter: Option<String>,
}

/// Contents of the config file
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub shortcuts: ShortcutsConfig,
    pub rewrite: RewriteConfig,
    pub transcription: TranscriptionConfig,
    pub recorder: RecorderConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

impl FileConfig {
    /// Parse TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Validated shortcut snapshot
    pub fn shortcut_set(&self) -> Result<ShortcutSet, ConfigError> {
        let set = ShortcutSet {
            dictation: self.shortcuts.dictation.to_spec(ShortcutId::Dictation)?,
            continuous: self.shortcuts.continuous.to_spec(ShortcutId::Continuous)?,
            rewrite: self.shortcuts.rewrite.to_spec(ShortcutId::Rewrite)?,
            rewrite_enabled: self.rewrite.enabled,
        };
        set.validate()?;
        Ok(set)
    }

    /// Engine tuning derived from the file
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            pipeline: PipelineOptions {
                transcription_model: self.transcription.model.clone(),
                rewrite_model: self.rewrite.model.clone(),
                rewrite_prompt: self.rewrite.prompt.clone(),
            },
            rewrite_style: self.rewrite.mode,
            selection_attempts: self.rewrite.selection_attempts,
            selection_delay: Duration::from_millis(self.rewrite.selection_delay_ms),
            ..EngineOptions::default()
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Config file location
    pub config_path: PathBuf,

    /// Parsed config file
    pub file: FileConfig,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self, ConfigError> {
        let home = std::env::var_os("HOME").ok_or(ConfigError::NoHome)?;
        Self::load_from_home(Path::new(&home))
    }

    /// Load configuration relative to `home`
    pub fn load_from_home(home: &Path) -> Result<Self, ConfigError> {
        let data_dir = home.join(".local").join("share").join("keyscribe");
        let config_path = home.join(".config").join("keyscribe").join("config.toml");
        let file = Self::read_file(&config_path)?;

        Ok(Self {
            socket_path: data_dir.join("daemon.sock"),
            data_dir,
            config_path,
            file,
        })
    }

    /// Re-read the config file
    pub fn reload(&self) -> Result<FileConfig, ConfigError> {
        Self::read_file(&self.config_path)
    }

    fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => FileConfig::from_toml_str(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_owned(),
                source,
            }),
        }
    }

    /// History file location
    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("history.jsonl")
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_dir).map_err(|source| ConfigError::Io {
            path: self.data_dir.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::keys::codes;

    #[test]
    fn test_config_load_without_file() {
        let home = tempfile::tempdir().unwrap();
        let config = Config::load_from_home(home.path()).unwrap();
        assert!(config.socket_path.to_string_lossy().contains("keyscribe"));
        assert_eq!(config.file, FileConfig::default());
        assert_eq!(config.file.shortcut_set().unwrap(), ShortcutSet::default());
    }

    #[test]
    fn test_config_file_overrides() {
        let home = tempfile::tempdir().unwrap();
        let dir = home.path().join(".config").join("keyscribe");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("config.toml"),
            r#"
            [shortcuts.rewrite]
            key = "k"
            modifiers = ["cmd"]
            trigger = "combo"

            [rewrite]
            mode = "dictated"
            selection_attempts = 5

            [transcription]
            model = "large-v3"
            command = "whisper-cli -m $KEYSCRIBE_MODEL -f $KEYSCRIBE_AUDIO"
            "#,
        )
        .unwrap();

        let config = Config::load_from_home(home.path()).unwrap();
        let set = config.file.shortcut_set().unwrap();
        assert_eq!(
            set.rewrite,
            ShortcutSpec::new(
                codes::K,
                ModifierState::only(Modifier::Command),
                TriggerKind::Combo
            )
        );

        let options = config.file.engine_options();
        assert_eq!(options.rewrite_style, RewriteStyle::Dictated);
        assert_eq!(options.selection_attempts, 5);
        assert_eq!(options.pipeline.transcription_model, "large-v3");
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let err = FileConfig::from_toml_str("[rewrite]\nenable = true\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_unknown_key_and_modifier() {
        let config = FileConfig::from_toml_str(
            "[shortcuts.dictation]\nkey = \"Hyper\"\ntrigger = \"hold\"\n",
        )
        .unwrap();
        assert!(matches!(
            config.shortcut_set(),
            Err(ConfigError::UnknownKey { shortcut: ShortcutId::Dictation, .. })
        ));

        let config = FileConfig::from_toml_str(
            "[shortcuts.rewrite]\nkey = \"R\"\nmodifiers = [\"meta\"]\ntrigger = \"combo\"\n",
        )
        .unwrap();
        assert!(matches!(
            config.shortcut_set(),
            Err(ConfigError::UnknownModifier { shortcut: ShortcutId::Rewrite, .. })
        ));
    }

    #[test]
    fn test_duplicate_shortcuts_rejected() {
        let config = FileConfig::from_toml_str(
            r#"
            [shortcuts.continuous]
            key = "RightOption"
            trigger = "hold"
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.shortcut_set(),
            Err(ConfigError::Shortcuts(SpecError::Duplicate(
                ShortcutId::Dictation,
                ShortcutId::Continuous
            )))
        ));
    }

    #[test]
    fn test_disabled_rewrite_carried_into_set() {
        let config = FileConfig::from_toml_str("[rewrite]\nenabled = false\n").unwrap();
        assert!(!config.shortcut_set().unwrap().rewrite_enabled);
    }
}
