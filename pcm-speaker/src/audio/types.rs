//! Core audio stream types
//!
//! Sample formats, device selection and the validated stream parameters
//! shared by the callback adapter and the device backends.
//!
//! Incoming chunks are already in the device's native sample format and
//! channel layout, so these types only describe byte geometry. Nothing here
//! converts samples.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Interleaved sample encodings accepted by the speaker.
///
/// The set is closed: any other encoding is rejected while parsing
/// configuration, so [`SampleFormat::bytes_per_sample`] is total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    #[serde(alias = "int8")]
    I8,
    #[serde(alias = "uint8")]
    U8,
    #[serde(alias = "int16")]
    I16,
    /// Packed 24-bit (3 bytes per sample)
    #[serde(alias = "int24")]
    I24,
    #[serde(alias = "int32")]
    I32,
    #[serde(alias = "float32")]
    F32,
}

impl SampleFormat {
    pub const ALL: [SampleFormat; 6] = [
        SampleFormat::I8,
        SampleFormat::U8,
        SampleFormat::I16,
        SampleFormat::I24,
        SampleFormat::I32,
        SampleFormat::F32,
    ];

    /// Width of one sample in bytes.
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::I8 | SampleFormat::U8 => 1,
            SampleFormat::I16 => 2,
            SampleFormat::I24 => 3,
            SampleFormat::I32 | SampleFormat::F32 => 4,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            SampleFormat::I8 => "i8",
            SampleFormat::U8 => "u8",
            SampleFormat::I16 => "i16",
            SampleFormat::I24 => "i24",
            SampleFormat::I32 => "i32",
            SampleFormat::F32 => "f32",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SampleFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "i8" | "int8" => Ok(SampleFormat::I8),
            "u8" | "uint8" => Ok(SampleFormat::U8),
            "i16" | "int16" => Ok(SampleFormat::I16),
            "i24" | "int24" => Ok(SampleFormat::I24),
            "i32" | "int32" => Ok(SampleFormat::I32),
            "f32" | "float32" => Ok(SampleFormat::F32),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Which output device to open.
///
/// In TOML: `"default"`, an index into the host's output device list, or a
/// device name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "RawDeviceSelector")]
pub enum DeviceSelector {
    #[default]
    Default,
    Index(usize),
    Name(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDeviceSelector {
    Index(usize),
    Name(String),
}

impl From<RawDeviceSelector> for DeviceSelector {
    fn from(raw: RawDeviceSelector) -> Self {
        match raw {
            RawDeviceSelector::Index(index) => DeviceSelector::Index(index),
            RawDeviceSelector::Name(name) => name.parse().unwrap_or(DeviceSelector::Name(name)),
        }
    }
}

impl FromStr for DeviceSelector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("default") {
            return Ok(DeviceSelector::Default);
        }
        Ok(match s.parse::<usize>() {
            Ok(index) => DeviceSelector::Index(index),
            Err(_) => DeviceSelector::Name(s.to_string()),
        })
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::Default => f.write_str("default"),
            DeviceSelector::Index(index) => write!(f, "#{}", index),
            DeviceSelector::Name(name) => f.write_str(name),
        }
    }
}

/// Validated, immutable stream geometry.
///
/// Built from [`crate::config::SpeakerConfig::stream_parameters`]; every
/// field is non-zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamParameters {
    pub sample_rate: u32,
    pub frames_per_buffer: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
    pub device: DeviceSelector,
}

impl StreamParameters {
    /// Bytes in one frame (one sample for every channel).
    pub fn bytes_per_frame(&self) -> usize {
        self.sample_format.bytes_per_sample() * self.channels as usize
    }

    /// Bytes the device requests for a buffer of `frame_count` frames.
    pub fn bytes_for_frames(&self, frame_count: usize) -> usize {
        frame_count * self.bytes_per_frame()
    }

    /// Bytes in one nominal device buffer.
    pub fn bytes_per_buffer(&self) -> usize {
        self.bytes_for_frames(self.frames_per_buffer as usize)
    }

    /// Nominal interval between callback invocations.
    pub fn buffer_period(&self) -> Duration {
        Duration::from_secs_f64(self.frames_per_buffer as f64 / self.sample_rate as f64)
    }

    /// Playback duration of `bytes` bytes of audio.
    pub fn duration_of(&self, bytes: usize) -> Duration {
        let frames = bytes / self.bytes_per_frame();
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(format: SampleFormat, channels: u16) -> StreamParameters {
        StreamParameters {
            sample_rate: 48_000,
            frames_per_buffer: 480,
            channels,
            sample_format: format,
            device: DeviceSelector::Default,
        }
    }

    #[test]
    fn test_bytes_per_sample_table() {
        let widths: Vec<usize> = SampleFormat::ALL.iter().map(|f| f.bytes_per_sample()).collect();
        assert_eq!(widths, vec![1, 1, 2, 3, 4, 4]);
    }

    #[test]
    fn test_sample_format_parse() {
        assert_eq!("int16".parse::<SampleFormat>().unwrap(), SampleFormat::I16);
        assert_eq!("F32".parse::<SampleFormat>().unwrap(), SampleFormat::F32);
        assert_eq!("uint8".parse::<SampleFormat>().unwrap(), SampleFormat::U8);

        let err = "f64".parse::<SampleFormat>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(ref s) if s == "f64"));
    }

    #[test]
    fn test_sample_format_display_roundtrips_parse() {
        for format in SampleFormat::ALL {
            assert_eq!(format.to_string().parse::<SampleFormat>().unwrap(), format);
        }
    }

    #[test]
    fn test_device_selector_parse() {
        assert_eq!("default".parse::<DeviceSelector>().unwrap(), DeviceSelector::Default);
        assert_eq!("".parse::<DeviceSelector>().unwrap(), DeviceSelector::Default);
        assert_eq!("3".parse::<DeviceSelector>().unwrap(), DeviceSelector::Index(3));
        assert_eq!(
            "pulse".parse::<DeviceSelector>().unwrap(),
            DeviceSelector::Name("pulse".to_string())
        );
    }

    #[test]
    fn test_byte_geometry() {
        let p = params(SampleFormat::I24, 2);
        assert_eq!(p.bytes_per_frame(), 6);
        assert_eq!(p.bytes_for_frames(4), 24);
        assert_eq!(p.bytes_per_buffer(), 2880);
        assert_eq!(p.buffer_period(), Duration::from_millis(10));
    }

    #[test]
    fn test_duration_of_bytes() {
        let p = params(SampleFormat::I16, 1);
        // 1 second of 48kHz mono i16
        assert_eq!(p.duration_of(96_000), Duration::from_secs(1));
    }
}
