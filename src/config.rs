//! Application configuration
//!
//! Loaded from `config.toml` in the platform config directory. Every field
//! has a default equal to the reference pipeline constants, so a missing
//! file or a partial file is always valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::ConfigError;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub capture: CaptureConfig,
    pub playback: PlaybackConfig,
    pub codec: CodecConfig,
}

/// Microphone capture settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Input device id (`input:<name>`), default device when unset
    pub device_id: Option<String>,
    /// Frame duration in milliseconds
    pub frame_ms: u32,
    /// Gain applied before resampling
    pub input_gain: f32,
    /// Frames buffered between the audio callback and the uplink
    pub channel_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            frame_ms: FRAME_DURATION_MS,
            input_gain: DEFAULT_INPUT_GAIN,
            channel_capacity: CAPTURE_CHANNEL_CAPACITY,
        }
    }
}

/// Playback timing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Output device id (`output:<name>`), default device when unset
    pub device_id: Option<String>,
    pub prebuffer_sec: f64,
    pub safety_margin_sec: f64,
    /// Reorder window size K
    pub reorder_window: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            prebuffer_sec: PREBUFFER_SEC,
            safety_margin_sec: SAFETY_MARGIN_SEC,
            reorder_window: REORDER_WINDOW,
        }
    }
}

/// Downlink codec settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frame duration used to derive timestamps from sequence numbers
    pub frame_duration_us: u64,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            sample_rate: TARGET_SAMPLE_RATE,
            channels: TARGET_CHANNELS,
            frame_duration_us: FRAME_DURATION_US,
        }
    }
}

impl AppConfig {
    /// Default config file location, if the platform has one
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("ai", "voiceagent", "voice-agent-audio")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from the default location, falling back to defaults when absent
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load and validate a specific file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate TOML text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.frame_ms == 0 {
            return Err(ConfigError::Invalid("capture.frame_ms must be > 0".into()));
        }
        if self.capture.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "capture.channel_capacity must be > 0".into(),
            ));
        }
        if !self.capture.input_gain.is_finite() || self.capture.input_gain < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "capture.input_gain out of range: {}",
                self.capture.input_gain
            )));
        }
        if self.playback.reorder_window == 0 {
            return Err(ConfigError::Invalid(
                "playback.reorder_window must be > 0".into(),
            ));
        }
        for (name, value) in [
            ("prebuffer_sec", self.playback.prebuffer_sec),
            ("safety_margin_sec", self.playback.safety_margin_sec),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "playback.{} out of range: {}",
                    name, value
                )));
            }
        }
        if !matches!(self.codec.channels, 1 | 2) {
            return Err(ConfigError::Invalid(format!(
                "Unsupported channel count: {}",
                self.codec.channels
            )));
        }
        if !matches!(self.codec.sample_rate, 8000 | 12000 | 16000 | 24000 | 48000) {
            return Err(ConfigError::Invalid(format!(
                "Unsupported Opus sample rate: {}",
                self.codec.sample_rate
            )));
        }
        Ok(())
    }
}
