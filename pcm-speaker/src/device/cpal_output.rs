//! Audio output using cpal
//!
//! Opens the selected output device with a raw byte stream in the
//! configured sample format and hands each device buffer to the
//! [`DeviceCallback`].
//!
//! cpal has no way for a data callback to end its own stream, so once the
//! callback reports Complete or Abort it keeps writing silence until the
//! session is stopped. For the same reason `Completed` is deferred until the
//! final buffer has played, and an Abort buffer is zeroed rather than left
//! holding the previous period's audio.

use super::{DeviceBackend, DeviceSession};
use crate::audio::{DeviceSelector, SampleFormat, StreamParameters};
use crate::error::{Error, Result};
use crate::playback::{CallbackResult, DeviceCallback, StatusFlags, StreamTiming};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// List available audio output devices as `(index, name)` pairs.
///
/// Indices match [`DeviceSelector::Index`].
pub fn list_output_devices() -> Result<Vec<(usize, String)>> {
    let host = cpal::default_host();

    let devices: Vec<(usize, String)> = host
        .output_devices()
        .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
        .enumerate()
        .map(|(index, device)| {
            let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            (index, name)
        })
        .collect();

    debug!("Found {} output devices", devices.len());
    Ok(devices)
}

/// Map a speaker sample format to the cpal equivalent.
///
/// cpal has no packed 24-bit format.
fn cpal_sample_format(format: SampleFormat) -> Result<cpal::SampleFormat> {
    match format {
        SampleFormat::I8 => Ok(cpal::SampleFormat::I8),
        SampleFormat::U8 => Ok(cpal::SampleFormat::U8),
        SampleFormat::I16 => Ok(cpal::SampleFormat::I16),
        SampleFormat::I32 => Ok(cpal::SampleFormat::I32),
        SampleFormat::F32 => Ok(cpal::SampleFormat::F32),
        SampleFormat::I24 => Err(Error::UnsupportedFormat(
            "i24 (packed 24-bit) is not supported by the cpal backend".to_string(),
        )),
    }
}

fn resolve_device(host: &cpal::Host, selector: &DeviceSelector) -> Result<Device> {
    match selector {
        DeviceSelector::Default => host
            .default_output_device()
            .ok_or_else(|| Error::InvalidDevice("No default output device found".to_string())),
        DeviceSelector::Index(index) => host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .nth(*index)
            .ok_or_else(|| Error::InvalidDevice(format!("No output device at index {}", index))),
        DeviceSelector::Name(name) => host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .find(|d| d.name().ok().as_deref() == Some(name.as_str()))
            .ok_or_else(|| Error::InvalidDevice(format!("Device '{}' not found", name))),
    }
}

/// Opens output streams on the default cpal host
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl DeviceBackend for CpalBackend {
    fn open(
        &self,
        params: &StreamParameters,
        callback: DeviceCallback,
    ) -> Result<Box<dyn DeviceSession>> {
        let sample_format = cpal_sample_format(params.sample_format)?;

        let host = cpal::default_host();
        let device = resolve_device(&host, &params.device)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio device: {} ({})", device_name, params.device);

        // Device defaults, for diagnostics only
        match device.default_output_config() {
            Ok(default_config) => {
                if let cpal::SupportedBufferSize::Range { min, max } = default_config.buffer_size() {
                    if params.frames_per_buffer < *min || params.frames_per_buffer > *max {
                        warn!(
                            "Requested {} frames per buffer outside device range {}..={}",
                            params.frames_per_buffer, min, max
                        );
                    }
                }
            }
            Err(e) => debug!("No default output config for {}: {}", device_name, e),
        }

        let config = StreamConfig {
            channels: params.channels,
            sample_rate: cpal::SampleRate(params.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(params.frames_per_buffer),
        };

        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}, buffer_size={:?}",
            config.sample_rate.0, config.channels, sample_format, config.buffer_size
        );

        let stream = build_stream(&device, &config, sample_format, callback)?;

        Ok(Box::new(CpalSession {
            stream: Some(stream),
            device_name,
        }))
    }
}

fn build_stream(
    device: &Device,
    config: &StreamConfig,
    sample_format: cpal::SampleFormat,
    mut callback: DeviceCallback,
) -> Result<Stream> {
    let monitor = Arc::clone(callback.monitor());
    callback.defer_completion_until_played();

    device
        .build_output_stream_raw(
            config,
            sample_format,
            move |data: &mut cpal::Data, info: &cpal::OutputCallbackInfo| {
                let timestamp = info.timestamp();
                let timing = StreamTiming {
                    output_latency: timestamp.playback.duration_since(&timestamp.callback),
                };

                fill_device_buffer(&mut callback, data.bytes_mut(), &timing);
            },
            move |err| {
                error!("Audio stream error: {}", err);
                monitor.record_stream_error();
            },
            None, // No timeout
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
}

/// Run the callback over one cpal buffer.
///
/// cpal reuses the same buffer for every period and cannot abort, so an
/// Abort (which leaves the buffer untouched) is turned into silence here.
fn fill_device_buffer(callback: &mut DeviceCallback, output: &mut [u8], timing: &StreamTiming) {
    let frame_count = output.len() / callback.bytes_per_frame();
    let result = callback.process(frame_count, output, timing, StatusFlags::default());
    if result == CallbackResult::Abort {
        output.fill(0);
    }
}

/// Live cpal output stream
pub struct CpalSession {
    stream: Option<Stream>,
    device_name: String,
}

// SAFETY: CpalSession can be safely sent between threads because:
// - the stream is only touched through `start`/`stop`, which the speaker
//   serializes behind a Mutex
// - the cpal callback thread holds its own state (the DeviceCallback), not
//   a reference into this struct
unsafe impl Send for CpalSession {}

impl DeviceSession for CpalSession {
    fn start(&mut self) -> Result<()> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| Error::AudioOutput("Stream already released".to_string()))?;

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

        info!("Audio stream started on {}", self.device_name);
        Ok(())
    }

    /// Pause and drop the stream. Dropping joins the callback thread, so no
    /// callback runs after this returns.
    fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            info!("Stopping audio stream on {}", self.device_name);
            if let Err(e) = stream.pause() {
                warn!("Failed to pause stream: {}", e);
            }
            drop(stream);
        }
        Ok(())
    }
}

impl Drop for CpalSession {
    fn drop(&mut self) {
        // Ensure stream is stopped on drop
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompletionMode;
    use crate::playback::{CallbackMonitor, ChunkQueue, Lifecycle, StopReason};

    fn callback_for(
        params: &StreamParameters,
    ) -> (DeviceCallback, Arc<ChunkQueue>, Arc<Lifecycle>) {
        let queue = Arc::new(ChunkQueue::new());
        let lifecycle = Arc::new(Lifecycle::new());
        lifecycle.begin().unwrap();
        let callback = DeviceCallback::new(
            params,
            CompletionMode::OnDrain,
            Arc::clone(&queue),
            Arc::clone(&lifecycle),
            Arc::new(CallbackMonitor::new()),
        );
        (callback, queue, lifecycle)
    }

    fn mono_i16() -> StreamParameters {
        StreamParameters {
            sample_rate: 16_000,
            frames_per_buffer: 4,
            channels: 1,
            sample_format: SampleFormat::I16,
            device: DeviceSelector::Default,
        }
    }

    #[test]
    fn test_list_devices_indices_are_contiguous() {
        // No audio hardware in CI: enumeration may fail, but never with gaps
        if let Ok(devices) = list_output_devices() {
            for (expected, (index, _)) in devices.iter().enumerate() {
                assert_eq!(*index, expected);
            }
        }
    }

    #[test]
    fn test_abort_does_not_replay_previous_period() {
        let (mut callback, queue, lifecycle) = callback_for(&mono_i16());
        queue.push(vec![0x7F; 64]);

        // One buffer reused across periods, as cpal does
        let mut buffer = vec![0u8; 8];
        fill_device_buffer(&mut callback, &mut buffer, &StreamTiming::default());
        assert_eq!(buffer, vec![0x7F; 8]);

        lifecycle.finish(StopReason::Cancelled);
        fill_device_buffer(&mut callback, &mut buffer, &StreamTiming::default());
        assert_eq!(buffer, vec![0; 8]);
    }

    #[test]
    fn test_frame_count_derived_from_buffer_length() {
        let params = StreamParameters {
            channels: 2,
            ..mono_i16()
        };
        let (mut callback, queue, _lifecycle) = callback_for(&params);
        queue.push((1..=12).collect());

        // 3 stereo i16 frames
        let mut buffer = vec![0xEEu8; 12];
        fill_device_buffer(&mut callback, &mut buffer, &StreamTiming::default());
        assert_eq!(buffer, (1..=12).collect::<Vec<u8>>());
    }

    #[test]
    fn test_sample_format_mapping() {
        assert_eq!(cpal_sample_format(SampleFormat::I8).unwrap(), cpal::SampleFormat::I8);
        assert_eq!(cpal_sample_format(SampleFormat::U8).unwrap(), cpal::SampleFormat::U8);
        assert_eq!(cpal_sample_format(SampleFormat::I16).unwrap(), cpal::SampleFormat::I16);
        assert_eq!(cpal_sample_format(SampleFormat::I32).unwrap(), cpal::SampleFormat::I32);
        assert_eq!(cpal_sample_format(SampleFormat::F32).unwrap(), cpal::SampleFormat::F32);
    }

    #[test]
    fn test_packed_24_bit_rejected() {
        let err = cpal_sample_format(SampleFormat::I24).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn test_sample_widths_match_cpal() {
        for format in SampleFormat::ALL {
            if let Ok(cpal_format) = cpal_sample_format(format) {
                assert_eq!(cpal_format.sample_size(), format.bytes_per_sample());
            }
        }
    }
}
