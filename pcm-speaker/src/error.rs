//! Error types for pcm-speaker
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//! Nothing on the real-time callback path returns these; the callback reports
//! failures through [`crate::playback::CallbackResult::Abort`] instead.

use thiserror::Error;

/// Main error type for pcm-speaker
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid stream configuration (zero channels, zero sample rate, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Sample format name not recognized, or not supported by the backend
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// Device selector does not resolve to an output device
    #[error("Invalid output device: {0}")]
    InvalidDevice(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Lifecycle misuse (start twice, start after stop)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML configuration parse errors
    #[error("Config file parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Convenience Result type using pcm-speaker Error
pub type Result<T> = std::result::Result<T, Error>;
