//! Configuration loading and management
//!
//! Handles parsing of `.taskdeck.toml` configuration files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::lock::DEFAULT_LOCK_TIMEOUT_MS;

/// Name of the configuration file looked up in the working directory
pub const CONFIG_FILE: &str = ".taskdeck.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data file configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Human output configuration
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Where and how the CSV data file is kept
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data file, relative to the directory holding the config
    #[serde(default = "default_file")]
    pub file: PathBuf,

    /// How long to wait for the data file lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_file() -> PathBuf {
    PathBuf::from("tasks.csv")
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            file: default_file(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

/// Human output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// chrono format string for start/end times
    #[serde(default = "default_time_format")]
    pub time_format: String,
}

fn default_time_format() -> String {
    "%Y-%m-%d %H:%M".to_string()
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            time_format: default_time_format(),
        }
    }
}

impl Config {
    /// Load configuration from a specific file
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a directory, or return defaults
    pub fn load_from_dir(dir: &Path) -> Self {
        let config_path = dir.join(CONFIG_FILE);
        if config_path.exists() {
            match Self::load(&config_path) {
                Ok(config) => config,
                Err(err) => {
                    tracing::warn!(path = %config_path.display(), %err, "ignoring invalid config");
                    Self::default()
                }
            }
        } else {
            Self::default()
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> crate::error::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolve the data file against the directory the config applies to
    pub fn data_file(&self, dir: &Path) -> PathBuf {
        if self.storage.file.is_absolute() {
            self.storage.file.clone()
        } else {
            dir.join(&self.storage.file)
        }
    }

    fn validate(&self) -> crate::error::Result<()> {
        self.storage.validate()?;
        self.display.validate()?;
        Ok(())
    }
}

impl StorageConfig {
    fn validate(&self) -> crate::error::Result<()> {
        if self.file.as_os_str().is_empty() {
            return Err(crate::error::Error::InvalidConfig(
                "storage.file cannot be empty".to_string(),
            ));
        }
        if self.lock_timeout_ms == 0 {
            return Err(crate::error::Error::InvalidConfig(
                "storage.lock_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl DisplayConfig {
    fn validate(&self) -> crate::error::Result<()> {
        use chrono::format::{Item, StrftimeItems};

        if self.time_format.trim().is_empty() {
            return Err(crate::error::Error::InvalidConfig(
                "display.time_format cannot be empty".to_string(),
            ));
        }
        if StrftimeItems::new(&self.time_format).any(|item| matches!(item, Item::Error)) {
            return Err(crate::error::Error::InvalidConfig(format!(
                "display.time_format: invalid format '{}'",
                self.time_format
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let cfg = Config::default();
        assert_eq!(cfg.storage.file, PathBuf::from("tasks.csv"));
        assert_eq!(cfg.storage.lock_timeout_ms, DEFAULT_LOCK_TIMEOUT_MS);
        assert_eq!(cfg.display.time_format, "%Y-%m-%d %H:%M");
    }

    #[test]
    fn load_parses_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        let content = r#"
[storage]
file = "data/board.csv"
lock_timeout_ms = 250

[display]
time_format = "%d.%m %H:%M"
"#;
        std::fs::write(&path, content.trim()).expect("write config");

        let cfg = Config::load(&path).expect("load");
        assert_eq!(cfg.storage.file, PathBuf::from("data/board.csv"));
        assert_eq!(cfg.storage.lock_timeout_ms, 250);
        assert_eq!(cfg.display.time_format, "%d.%m %H:%M");
        assert_eq!(
            cfg.data_file(dir.path()),
            dir.path().join("data").join("board.csv")
        );
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[storage]\nlock_timeout_ms = 10\n").expect("write config");

        let cfg = Config::load(&path).expect("load");
        assert_eq!(cfg.storage.file, PathBuf::from("tasks.csv"));
        assert_eq!(cfg.display.time_format, "%Y-%m-%d %H:%M");
    }

    #[test]
    fn zero_lock_timeout_is_invalid() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[storage]\nlock_timeout_ms = 0\n").expect("write config");

        let err = Config::load(&path).expect_err("invalid");
        assert!(matches!(err, crate::error::Error::InvalidConfig(_)));
    }

    #[test]
    fn save_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        let mut cfg = Config::default();
        cfg.storage.file = PathBuf::from("other.csv");
        cfg.save(&path).expect("save");

        let loaded = Config::load(&path).expect("load");
        assert_eq!(loaded.storage.file, PathBuf::from("other.csv"));
    }
}
