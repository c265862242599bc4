//! Capture and analysis settings
//!
//! Loaded from a TOML file. Every section and key is optional; missing values
//! fall back to the defaults below.

use crate::spectrum::WindowType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

/// Capture stream settings
///
/// - `device`: "default" (system default input)
/// - `sample_rate`: 48000 Hz
/// - `size_hint`: five minutes of mono audio at 48 kHz
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_size_hint")]
    pub size_hint: usize,
}

/// STFT settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_hop_size")]
    pub hop_size: usize,
    #[serde(default)]
    pub window: WindowType,
}

/// Waterfall ring dimensions and frequency axis
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_extent")]
    pub history_extent: usize,
    #[serde(default = "default_layer_points")]
    pub layer_points: usize,
    #[serde(default)]
    pub x_min: f64,
    #[serde(default = "default_x_max")]
    pub x_max: f64,
}

/// Refresh intervals of the background pipelines
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimingConfig {
    #[serde(default = "default_vu_interval_ms")]
    pub vu_interval_ms: u64,
    #[serde(default = "default_spectrogram_interval_ms")]
    pub spectrogram_interval_ms: u64,
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

fn default_device() -> String {
    "default".to_string()
}

fn default_sample_rate() -> u32 {
    48000
}

fn default_size_hint() -> usize {
    48000 * 60 * 5
}

fn default_window_size() -> usize {
    1024
}

fn default_hop_size() -> usize {
    512
}

fn default_history_extent() -> usize {
    300
}

fn default_layer_points() -> usize {
    default_window_size() / 2
}

fn default_x_max() -> f64 {
    f64::from(default_sample_rate()) / 2.0
}

fn default_vu_interval_ms() -> u64 {
    50
}

fn default_spectrogram_interval_ms() -> u64 {
    100
}

fn default_stop_timeout_ms() -> u64 {
    500
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            sample_rate: default_sample_rate(),
            size_hint: default_size_hint(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            hop_size: default_hop_size(),
            window: WindowType::default(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            history_extent: default_history_extent(),
            layer_points: default_layer_points(),
            x_min: 0.0,
            x_max: default_x_max(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            vu_interval_ms: default_vu_interval_ms(),
            spectrogram_interval_ms: default_spectrogram_interval_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

impl TimingConfig {
    pub fn vu_interval(&self) -> Duration {
        Duration::from_millis(self.vu_interval_ms)
    }

    pub fn spectrogram_interval(&self) -> Duration {
        Duration::from_millis(self.spectrogram_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl Config {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load a config file if it exists, otherwise use defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            log::warn!(
                "Config file not found, using defaults: {:?}",
                path.as_ref()
            );
            Ok(Config::default())
        }
    }

    /// Write the default configuration as TOML
    pub fn write_default<P: AsRef<Path>>(path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(&Config::default())?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Check the cross-field constraints the pipelines rely on
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| -> Result<(), ConfigError> {
            Err(ConfigError::Invalid(msg))
        };

        if self.analysis.window_size == 0 {
            return invalid("analysis.window_size must be positive".into());
        }
        if self.analysis.hop_size == 0 {
            return invalid("analysis.hop_size must be at least 1".into());
        }
        if self.history.history_extent == 0 {
            return invalid("history.history_extent must be positive".into());
        }
        if self.history.layer_points != self.analysis.window_size / 2 {
            return invalid(format!(
                "history.layer_points ({}) must equal analysis.window_size / 2 ({})",
                self.history.layer_points,
                self.analysis.window_size / 2
            ));
        }
        if self.history.layer_points == 0 {
            return invalid("analysis.window_size must be at least 2".into());
        }
        if self.history.x_max <= self.history.x_min {
            return invalid("history.x_max must be greater than history.x_min".into());
        }
        if self.capture.sample_rate == 0 {
            return invalid("capture.sample_rate must be positive".into());
        }
        if self.timing.vu_interval_ms == 0 || self.timing.spectrogram_interval_ms == 0 {
            return invalid("timing intervals must be positive".into());
        }
        Ok(())
    }
}
