//! Configuration management for pcm-speaker
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments
//! 2. Environment variables (via clap `env`)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)

use crate::audio::{DeviceSelector, SampleFormat, StreamParameters};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Default output sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

/// Default frames requested per device callback
pub const DEFAULT_FRAMES_PER_BUFFER: u32 = 8192;

/// Default channel count (mono)
pub const DEFAULT_CHANNELS: u16 = 1;

/// When the callback treats starvation as the end of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionMode {
    /// Queue empty and no partially played chunk means the stream is done.
    #[default]
    OnDrain,
    /// Starvation is an underrun until the producer calls `finish_input()`.
    OnEndOfInput,
}

/// Speaker stream configuration, fixed at construction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpeakerConfig {
    pub sample_rate: u32,
    pub frames_per_buffer: u32,
    pub channels: u16,
    pub device: DeviceSelector,
    pub sample_format: SampleFormat,
    pub completion: CompletionMode,
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            frames_per_buffer: DEFAULT_FRAMES_PER_BUFFER,
            channels: DEFAULT_CHANNELS,
            device: DeviceSelector::Default,
            sample_format: SampleFormat::I16,
            completion: CompletionMode::OnDrain,
        }
    }
}

impl SpeakerConfig {
    /// Validate numeric fields and produce the immutable stream parameters.
    pub fn stream_parameters(&self) -> Result<StreamParameters> {
        if self.sample_rate == 0 {
            return Err(Error::Config("sample_rate must be greater than zero".to_string()));
        }
        if self.frames_per_buffer == 0 {
            return Err(Error::Config(
                "frames_per_buffer must be greater than zero".to_string(),
            ));
        }
        if self.channels == 0 {
            return Err(Error::Config("channels must be greater than zero".to_string()));
        }

        Ok(StreamParameters {
            sample_rate: self.sample_rate,
            frames_per_buffer: self.frames_per_buffer,
            channels: self.channels,
            sample_format: self.sample_format,
            device: self.device.clone(),
        })
    }
}

/// Configuration file layout
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub speaker: SpeakerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Load configuration from a TOML file.
    pub async fn load(path: &Path) -> Result<Self> {
        let toml_str = tokio::fs::read_to_string(path).await?;
        let config: TomlConfig = toml::from_str(&toml_str)?;

        info!("Loaded TOML configuration from {:?}", path);
        Ok(config)
    }

    /// Apply command-line overrides on top of the file values.
    pub fn apply(mut self, overrides: ConfigOverrides) -> Self {
        let speaker = &mut self.speaker;
        if let Some(rate) = overrides.sample_rate {
            speaker.sample_rate = rate;
        }
        if let Some(frames) = overrides.frames_per_buffer {
            speaker.frames_per_buffer = frames;
        }
        if let Some(channels) = overrides.channels {
            speaker.channels = channels;
        }
        if let Some(device) = overrides.device {
            speaker.device = device;
        }
        if let Some(format) = overrides.sample_format {
            speaker.sample_format = format;
        }
        if let Some(completion) = overrides.completion {
            speaker.completion = completion;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        self
    }
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub sample_rate: Option<u32>,
    pub frames_per_buffer: Option<u32>,
    pub channels: Option<u16>,
    pub device: Option<DeviceSelector>,
    pub sample_format: Option<SampleFormat>,
    pub completion: Option<CompletionMode>,
    pub log_level: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SpeakerConfig::default();
        assert_eq!(config.sample_rate, 16_000);
        assert_eq!(config.frames_per_buffer, 8192);
        assert_eq!(config.channels, 1);
        assert_eq!(config.sample_format, SampleFormat::I16);
        assert_eq!(config.device, DeviceSelector::Default);
        assert_eq!(config.completion, CompletionMode::OnDrain);
    }

    #[test]
    fn test_default_log_level() {
        assert_eq!(default_log_level(), "info");
    }

    #[test]
    fn test_stream_parameters_rejects_zero_fields() {
        let zero_rate = SpeakerConfig { sample_rate: 0, ..Default::default() };
        assert!(matches!(zero_rate.stream_parameters(), Err(Error::Config(_))));

        let zero_frames = SpeakerConfig { frames_per_buffer: 0, ..Default::default() };
        assert!(matches!(zero_frames.stream_parameters(), Err(Error::Config(_))));

        let zero_channels = SpeakerConfig { channels: 0, ..Default::default() };
        assert!(matches!(zero_channels.stream_parameters(), Err(Error::Config(_))));
    }

    #[test]
    fn test_parse_full_toml() {
        let config: TomlConfig = toml::from_str(
            r#"
            [speaker]
            sample_rate = 48000
            frames_per_buffer = 1024
            channels = 2
            sample_format = "float32"
            device = 3
            completion = "on_end_of_input"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.speaker.sample_rate, 48_000);
        assert_eq!(config.speaker.frames_per_buffer, 1024);
        assert_eq!(config.speaker.channels, 2);
        assert_eq!(config.speaker.sample_format, SampleFormat::F32);
        assert_eq!(config.speaker.device, DeviceSelector::Index(3));
        assert_eq!(config.speaker.completion, CompletionMode::OnEndOfInput);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_parse_device_names() {
        let named: TomlConfig = toml::from_str("[speaker]\ndevice = \"pulse\"").unwrap();
        assert_eq!(named.speaker.device, DeviceSelector::Name("pulse".to_string()));

        let default: TomlConfig = toml::from_str("[speaker]\ndevice = \"default\"").unwrap();
        assert_eq!(default.speaker.device, DeviceSelector::Default);
    }

    #[test]
    fn test_unknown_sample_format_rejected() {
        let result: std::result::Result<TomlConfig, _> =
            toml::from_str("[speaker]\nsample_format = \"f64\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert_eq!(config.speaker, SpeakerConfig::default());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_overrides_take_priority() {
        let config = TomlConfig::default().apply(ConfigOverrides {
            sample_rate: Some(48_000),
            sample_format: Some(SampleFormat::I32),
            log_level: Some("trace".to_string()),
            ..Default::default()
        });

        assert_eq!(config.speaker.sample_rate, 48_000);
        assert_eq!(config.speaker.sample_format, SampleFormat::I32);
        assert_eq!(config.speaker.channels, DEFAULT_CHANNELS);
        assert_eq!(config.logging.level, "trace");
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[speaker]\nsample_rate = 44100\nchannels = 2").unwrap();

        let config = TomlConfig::load(file.path()).await.unwrap();
        assert_eq!(config.speaker.sample_rate, 44_100);
        assert_eq!(config.speaker.channels, 2);
        assert_eq!(config.speaker.sample_format, SampleFormat::I16);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let result = TomlConfig::load(Path::new("/nonexistent/pcm-speaker.toml")).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
