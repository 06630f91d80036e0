//! Configuration module for collect-rs
//!
//! This module handles the collector configuration:
//! - Loading and saving config files (TOML, or JSON by extension)
//! - Validation of acquisition and logging parameters
//! - Derived sizes: rolling buffer capacity, chunk size, sample interval
//!
//! # Config Location
//!
//! The binary looks for `collect.toml` in the platform config directory
//! when no path is given:
//! - **Linux**: `~/.config/collect-rs/`
//! - **macOS**: `~/Library/Application Support/collect-rs/`
//! - **Windows**: `%APPDATA%\collect-rs\`
//!
//! # Example
//!
//! ```toml
//! [acquisition]
//! sample_rate_hz = 250.0
//! rolling_span_secs = 15.0
//!
//! [logging]
//! output_dir = "recordings"
//! chunk_secs = 5.0
//!
//! [queues]
//! sample_capacity = 2500
//! sample_overflow = "drop_oldest"
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{CollectError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for config directories
pub const APP_ID: &str = "collect-rs";

/// Default config filename
pub const CONFIG_FILE: &str = "collect.toml";

/// Get the default config file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID).join(CONFIG_FILE))
}

/// Complete collector configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Upper bound on `disconnect()`; unset joins every stage unconditionally
    #[serde(default)]
    pub shutdown_timeout_ms: Option<u64>,

    /// Device selection
    #[serde(default)]
    pub device: DeviceConfig,

    /// Acquisition parameters
    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    /// Persisted output settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Hand-off queue sizing
    #[serde(default)]
    pub queues: QueueConfig,
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

impl AppConfig {
    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CollectError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config: Self = if is_json(path) {
            serde_json::from_str(&content).map_err(|e| {
                CollectError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        } else {
            toml::from_str(&content).map_err(|e| {
                CollectError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        };

        config.validate()?;
        Ok(config)
    }

    /// Load a config file, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the config to disk (JSON for `.json` paths, TOML otherwise)
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CollectError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = if is_json(path) {
            serde_json::to_string_pretty(self)
                .map_err(|e| CollectError::Config(format!("Failed to serialize config: {}", e)))?
        } else {
            toml::to_string_pretty(self)
                .map_err(|e| CollectError::Config(format!("Failed to serialize config: {}", e)))?
        };

        std::fs::write(path, content).map_err(|e| {
            CollectError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Check that the derived sizes are usable
    pub fn validate(&self) -> Result<()> {
        let acq = &self.acquisition;
        if !(acq.sample_rate_hz.is_finite() && acq.sample_rate_hz > 0.0) {
            return Err(CollectError::Config(format!(
                "sample_rate_hz must be positive, got {}",
                acq.sample_rate_hz
            )));
        }
        if !(acq.rolling_span_secs.is_finite() && acq.rolling_span_secs > 0.0) {
            return Err(CollectError::Config(format!(
                "rolling_span_secs must be positive, got {}",
                acq.rolling_span_secs
            )));
        }
        if self.rolling_capacity() == 0 {
            return Err(CollectError::Config(
                "rolling window holds no samples at this rate".to_string(),
            ));
        }
        if !(self.logging.chunk_secs.is_finite() && self.logging.chunk_secs > 0.0) {
            return Err(CollectError::Config(format!(
                "chunk_secs must be positive, got {}",
                self.logging.chunk_secs
            )));
        }
        if self.chunk_rows() == 0 || self.event_chunk_rows() == 0 {
            return Err(CollectError::Config(
                "chunk size must be at least one row".to_string(),
            ));
        }
        for (name, cap) in [
            ("sample_capacity", self.queues.sample_capacity),
            ("log_capacity", self.queues.log_capacity),
            ("event_capacity", self.queues.event_capacity),
        ] {
            if cap == Some(0) {
                return Err(CollectError::Config(format!("{} must be non-zero", name)));
            }
        }
        Ok(())
    }

    /// Rolling buffer length: floor(span * rate)
    pub fn rolling_capacity(&self) -> usize {
        (self.acquisition.rolling_span_secs * self.acquisition.sample_rate_hz).floor() as usize
    }

    /// Sample rows per chunk: floor(chunk_secs * rate)
    pub fn chunk_rows(&self) -> usize {
        (self.logging.chunk_secs * self.acquisition.sample_rate_hz).floor() as usize
    }

    /// Event rows per chunk
    pub fn event_chunk_rows(&self) -> usize {
        self.logging
            .event_chunk_rows
            .unwrap_or_else(|| self.chunk_rows())
    }

    /// Nominal interval between device samples
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.acquisition.sample_rate_hz)
    }

    /// Shutdown budget for `disconnect()`
    pub fn shutdown_timeout(&self) -> Option<Duration> {
        self.shutdown_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_derived_sizes() {
        let config = AppConfig::default();
        assert_eq!(config.rolling_capacity(), 3750);
        assert_eq!(config.chunk_rows(), 1250);
        assert_eq!(config.event_chunk_rows(), 1250);
        assert!((config.sample_interval().as_secs_f64() - 0.004).abs() < 1e-9);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_event_chunk_override() {
        let mut config = AppConfig::default();
        config.logging.event_chunk_rows = Some(10);
        assert_eq!(config.event_chunk_rows(), 10);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.acquisition.sample_rate_hz = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.acquisition.rolling_span_secs = 0.001;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.chunk_secs = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.queues.log_capacity = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("collect.toml");

        let mut config = AppConfig::default();
        config.device.device_id = Some("UN-2019.05.51".to_string());
        config.queues.sample_capacity = Some(500);
        config.queues.sample_overflow = OverflowPolicy::Block;
        config.shutdown_timeout_ms = Some(2000);
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_json_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collect.json");
        std::fs::write(&path, r#"{ "acquisition": { "sample_rate_hz": 500.0 } }"#).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.acquisition.sample_rate_hz, 500.0);
        assert_eq!(loaded.acquisition.counter_channel, 15);
        assert_eq!(loaded.logging, LoggingConfig::default());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str("[logging]\nchunk_secs = 1.0\n").unwrap();
        assert_eq!(config.chunk_rows(), 250);
        assert_eq!(config.acquisition, AcquisitionConfig::default());
    }

    #[test]
    fn test_load_or_default_on_missing_file() {
        let config = AppConfig::load_or_default("/nonexistent/collect.toml");
        assert_eq!(config, AppConfig::default());
    }
}
