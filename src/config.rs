// src/config.rs - Acquisition and simulated device configuration
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Top-level configuration file layout
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    #[serde(default)]
    pub device: DeviceConfig,
}

/// Session and worker settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AcquisitionConfig {
    /// Channels are probed from `max_log_channel - 1` down to 1
    #[serde(default = "default_max_log_channel")]
    pub max_log_channel: u8,

    #[serde(default = "default_axis_count")]
    pub axis_count: u8,

    #[serde(default)]
    pub trigger_event_count: u32,

    /// Axis whose feedback is recorded into the history
    #[serde(default)]
    pub sample_axis: u8,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_idle_poll_us")]
    pub idle_poll_us: u64,

    #[serde(default = "default_pause_settle_us")]
    pub pause_settle_us: u64,
}

/// Settings for the in-process simulated controller
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    #[serde(default = "default_max_log_channel")]
    pub channels: u8,

    /// Channels that report a running log with an open buffer at startup
    #[serde(default)]
    pub busy_channels: Vec<u8>,

    #[serde(default = "default_samples_per_batch")]
    pub samples_per_batch: usize,

    /// Flag overflow on every n-th non-empty batch (0 = never)
    #[serde(default)]
    pub overflow_every: u32,

    /// Keep reporting the buffer as open after it has been closed
    #[serde(default)]
    pub sticky_buffer_flag: bool,
}

fn default_max_log_channel() -> u8 { 8 }
fn default_axis_count() -> u8 { 2 }
fn default_chunk_size() -> usize { 1000 }
fn default_idle_poll_us() -> u64 { 1000 }
fn default_pause_settle_us() -> u64 { 1000 }
fn default_samples_per_batch() -> usize { 16 }

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            max_log_channel: default_max_log_channel(),
            axis_count: default_axis_count(),
            trigger_event_count: 0,
            sample_axis: 0,
            chunk_size: default_chunk_size(),
            idle_poll_us: default_idle_poll_us(),
            pause_settle_us: default_pause_settle_us(),
        }
    }
}

impl AcquisitionConfig {
    pub fn idle_poll(&self) -> Duration {
        Duration::from_micros(self.idle_poll_us)
    }

    pub fn pause_settle(&self) -> Duration {
        Duration::from_micros(self.pause_settle_us)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_log_channel < 2 {
            return Err(ConfigError::Invalid(format!(
                "max_log_channel must be at least 2, got {}",
                self.max_log_channel
            )));
        }
        if self.axis_count == 0 {
            return Err(ConfigError::Invalid("axis_count must be at least 1".to_string()));
        }
        if self.sample_axis >= self.axis_count {
            return Err(ConfigError::Invalid(format!(
                "sample_axis {} is outside the {} selected axes",
                self.sample_axis, self.axis_count
            )));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be non-zero".to_string()));
        }
        Ok(())
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            channels: default_max_log_channel(),
            busy_channels: Vec::new(),
            samples_per_batch: default_samples_per_batch(),
            overflow_every: 0,
            sticky_buffer_flag: false,
        }
    }
}

impl DeviceConfig {
    /// Every channel the session may probe has to exist on the device
    pub fn validate(&self, max_log_channel: u8) -> Result<(), ConfigError> {
        if self.channels < max_log_channel {
            return Err(ConfigError::Invalid(format!(
                "device has {} channels but max_log_channel is {}",
                self.channels, max_log_channel
            )));
        }
        if let Some(&channel) = self.busy_channels.iter().find(|&&c| c >= self.channels) {
            return Err(ConfigError::Invalid(format!(
                "busy channel {} does not exist on a {} channel device",
                channel, self.channels
            )));
        }
        Ok(())
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.acquisition.validate()?;
        self.device.validate(self.acquisition.max_log_channel)
    }

    /// Load and validate a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config = Self::parse(&contents)?;
        tracing::info!("Loaded configuration from TOML file: {}", path.display());
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.acquisition.max_log_channel, 8);
        assert_eq!(config.acquisition.axis_count, 2);
        assert_eq!(config.acquisition.trigger_event_count, 0);
        assert_eq!(config.acquisition.idle_poll(), Duration::from_millis(1));
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.acquisition.chunk_size, 1000);
        assert_eq!(config.device.samples_per_batch, 16);
    }

    #[test]
    fn test_sample_axis_must_be_selected() {
        let err = Config::parse("[acquisition]\naxis_count = 2\nsample_axis = 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_more_device_channels_than_probed_is_valid() {
        let config = Config::parse("[acquisition]\nmax_log_channel = 4\n[device]\nchannels = 8\n");
        assert!(config.is_ok());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let err = Config::parse("[acquisition]\nchunk_size = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
