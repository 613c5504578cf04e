//! Application configuration file.
//!
//! This is the user-level `config.toml`, separate from the per-directory
//! key derivation config. Every section has defaults, so a missing file
//! is equivalent to an empty one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GoteError, Result};
use crate::sync::{SyncSettings, DEFAULT_DEBOUNCE, DEFAULT_QUEUE_CAPACITY};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GoteConfig {
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub sync: SyncSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StorageSection {
    /// Notes directory; `None` means [`default_data_dir`]
    pub data_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSection {
    #[serde(default = "default_watch")]
    pub watch: bool,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_watch() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE.as_millis() as u64
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            watch: default_watch(),
            debounce_ms: default_debounce_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl SyncSection {
    pub fn settings(&self) -> SyncSettings {
        SyncSettings {
            debounce: Duration::from_millis(self.debounce_ms),
            queue_capacity: self.queue_capacity.max(1),
        }
    }
}

impl GoteConfig {
    /// Read `path`, or return defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            read_config(path)
        } else {
            Ok(Self::default())
        }
    }

    /// The notes directory this config points at.
    pub fn data_dir(&self) -> Result<PathBuf> {
        match self.storage.data_dir.as_deref() {
            Some(dir) if !dir.trim().is_empty() => Ok(PathBuf::from(dir)),
            _ => default_data_dir(),
        }
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(xdg_config_dir()?.join("config.toml"))
}

pub fn default_data_dir() -> Result<PathBuf> {
    Ok(xdg_data_dir()?.join("notes"))
}

pub fn read_config(path: &Path) -> Result<GoteConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        GoteError::Config(format!("Failed to read config {}: {}", path.display(), e))
    })?;
    toml::from_str(&contents).map_err(|e| {
        GoteError::Config(format!("Failed to parse config {}: {}", path.display(), e))
    })
}

pub fn write_config(path: &Path, config: &GoteConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            GoteError::Config(format!(
                "Failed to create config directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }
    let contents = toml::to_string_pretty(config)
        .map_err(|e| GoteError::Config(format!("TOML error: {}", e)))?;
    std::fs::write(path, contents).map_err(|e| {
        GoteError::Config(format!("Failed to write config {}: {}", path.display(), e))
    })?;
    Ok(())
}

pub fn xdg_config_dir() -> Result<PathBuf> {
    if let Ok(value) = std::env::var("XDG_CONFIG_HOME") {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value).join("gote"));
        }
    }
    Ok(home_dir()?.join(".config").join("gote"))
}

pub fn xdg_data_dir() -> Result<PathBuf> {
    if let Ok(value) = std::env::var("XDG_DATA_HOME") {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value).join("gote"));
        }
    }
    Ok(home_dir()?.join(".local").join("share").join("gote"))
}

fn home_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").map_err(|_| {
        GoteError::Config("HOME is not set; cannot resolve default paths".to_string())
    })?;
    Ok(PathBuf::from(home))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempdir().unwrap();
        let config = GoteConfig::load_or_default(&dir.path().join("config.toml")).unwrap();

        assert_eq!(config, GoteConfig::default());
        assert!(config.sync.watch);
        assert_eq!(config.sync.settings(), SyncSettings::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sync]\ndebounce_ms = 50\n").unwrap();

        let config = read_config(&path).unwrap();

        assert_eq!(config.sync.debounce_ms, 50);
        assert_eq!(config.sync.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert!(config.sync.watch);
        assert!(config.storage.data_dir.is_none());
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = GoteConfig::default();
        config.storage.data_dir = Some("/tmp/notes".to_string());
        config.sync.watch = false;

        write_config(&path, &config).unwrap();

        let loaded = read_config(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.data_dir().unwrap(), PathBuf::from("/tmp/notes"));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sync\n").unwrap();

        assert!(matches!(read_config(&path), Err(GoteError::Config(_))));
    }
}
