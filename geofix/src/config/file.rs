//! Configuration file handling for ~/.geofix/config.ini.
//!
//! Settings structs live in [`super::settings`], constants in
//! [`super::defaults`], parsing in [`super::parser`], and serialization in
//! [`super::writer`].

use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;

use super::fusion::FusionConfig;
use super::settings::ConfigFile;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Failed to write config file
    #[error("Failed to write config file: {0}")]
    WriteError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Failed to create config directory
    #[error("Failed to create config directory: {0}")]
    DirectoryError(std::io::Error),
}

impl ConfigFile {
    /// Load configuration from the default path (~/.geofix/config.ini).
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load() -> Result<Self, ConfigFileError> {
        let path = config_file_path();
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigFileError::DirectoryError)?;
        }

        std::fs::write(path, self.to_ini_string())
            .map_err(|e| ConfigFileError::WriteError(e.to_string()))
    }

    /// Commented INI text, as written by [`save_to`](Self::save_to).
    pub fn to_ini_string(&self) -> String {
        super::writer::to_config_string(self)
    }

    /// Runtime pipeline configuration described by this file.
    pub fn fusion_config(&self) -> FusionConfig {
        FusionConfig {
            max_accuracy_m: self.engine.max_accuracy_m,
            stale_timeout_ms: self.engine.stale_timeout_ms,
            hysteresis_margin: self.engine.hysteresis_margin,
            source_priority: self.priority.clone(),
            queue_capacity: self.queue.capacity,
            duplicate_window_ms: self.validator.duplicate_window_ms,
            timestamp_grace_ms: self.validator.timestamp_grace_ms,
            weights: self.weights,
            recency_half_life_ms: self.engine.recency_half_life_ms,
            trail_capacity: self.engine.trail_capacity,
            subscriber_buffer: self.service.subscriber_buffer,
            stale_check_interval_ms: self.service.stale_check_interval_ms,
            drain_on_shutdown: self.service.drain_on_shutdown,
        }
    }
}

/// Get the path to the config directory (~/.geofix).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".geofix")
}

/// Get the path to the config file (~/.geofix/config.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::*;
    use crate::sample::SourceId;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ConfigFile::default();

        assert_eq!(config.engine.max_accuracy_m, DEFAULT_MAX_ACCURACY_M);
        assert_eq!(config.engine.stale_timeout_ms, DEFAULT_STALE_TIMEOUT_MS);
        assert_eq!(config.foreflight.port, DEFAULT_FOREFLIGHT_PORT);
        assert_eq!(config.foreflight.source, SourceId::Gps);
        assert!(!config.foreflight.enabled);
        assert!(config.logging.file.ends_with(DEFAULT_LOG_FILE_NAME));
    }

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.ini");

        let config = ConfigFile::load_from(&config_path).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.ini");

        ConfigFile::default().save_to(&config_path).unwrap();
        assert!(config_path.exists());
    }

    #[test]
    fn test_saved_defaults_load_back() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");

        let mut config = ConfigFile::default();
        config.engine.stale_timeout_ms = 4_000;
        config.priority.set(SourceId::Network, 7);
        config.foreflight.enabled = true;
        config.service.drain_on_shutdown = false;
        config.save_to(&config_path).unwrap();

        let loaded = ConfigFile::load_from(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_default_fusion_config_matches() {
        let fusion = ConfigFile::default().fusion_config();
        assert_eq!(fusion, FusionConfig::default());
    }
}
