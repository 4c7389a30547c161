//! Speaker: single-use output stream fed from a chunk queue
//!
//! Producers `write` byte chunks from any thread; the device session pulls
//! them through the [`DeviceCallback`]; a waiter awaits
//! [`Speaker::wait_for_completion`] until the stream drains or is stopped.
//!
//! Teardown on the transition to Stopped happens once: the callback or
//! `stop()` resolves the completion signal and raises the cancellation flag;
//! `stop()`/`Drop` then stop the device session and clear the queue. Queue
//! and device are only released after the session has stopped invoking the
//! callback.

use super::callback::DeviceCallback;
use super::callback_monitor::{CallbackMonitor, CallbackStats};
use super::chunk_queue::ChunkQueue;
use super::lifecycle::{EngineState, Lifecycle, StopReason};
use crate::audio::StreamParameters;
use crate::config::SpeakerConfig;
use crate::device::{CpalBackend, DeviceBackend, DeviceSession};
use crate::error::{Error, Result};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, trace, warn};

/// One-shot audio output stream.
///
/// `Send + Sync`: share behind an `Arc` to write from several producers.
pub struct Speaker {
    params: StreamParameters,
    queue: Arc<ChunkQueue>,
    lifecycle: Arc<Lifecycle>,
    monitor: Arc<CallbackMonitor>,
    /// `None` once released
    session: Mutex<Option<Box<dyn DeviceSession>>>,
}

fn lock_session(
    session: &Mutex<Option<Box<dyn DeviceSession>>>,
) -> MutexGuard<'_, Option<Box<dyn DeviceSession>>> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Speaker {
    /// Open the configured output device via cpal.
    ///
    /// # Errors
    /// - Invalid configuration (zero rate/channels/frames)
    /// - Sample format unsupported by the device backend
    /// - Device selector does not match an output device
    pub fn new(config: SpeakerConfig) -> Result<Self> {
        Self::with_backend(config, &CpalBackend)
    }

    /// Open the output stream through a custom device backend.
    pub fn with_backend(config: SpeakerConfig, backend: &dyn DeviceBackend) -> Result<Self> {
        let params = config.stream_parameters()?;
        let queue = Arc::new(ChunkQueue::new());
        let lifecycle = Arc::new(Lifecycle::new());
        let monitor = Arc::new(CallbackMonitor::new());

        let callback = DeviceCallback::new(
            &params,
            config.completion,
            Arc::clone(&queue),
            Arc::clone(&lifecycle),
            Arc::clone(&monitor),
        );

        let session = backend.open(&params, callback)?;

        debug!(
            "Speaker opened: {}Hz, {} ch, {}, {} frames per buffer ({:.1}ms), completion {:?}",
            params.sample_rate,
            params.channels,
            params.sample_format,
            params.frames_per_buffer,
            params.buffer_period().as_secs_f64() * 1000.0,
            config.completion
        );

        Ok(Self {
            params,
            queue,
            lifecycle,
            monitor,
            session: Mutex::new(Some(session)),
        })
    }

    /// Begin streaming queued audio.
    ///
    /// # Errors
    /// - [`Error::InvalidState`] if already started or already stopped; the
    ///   device is not touched
    /// - Device start failure; the speaker is then stopped (single use)
    pub fn start(&self) -> Result<()> {
        let mut guard = lock_session(&self.session);
        self.lifecycle.begin()?;

        let session = guard
            .as_mut()
            .ok_or_else(|| Error::InvalidState("device session already released".to_string()))?;

        if let Err(e) = session.start() {
            warn!("Failed to start device session: {}", e);
            drop(guard);
            self.stop();
            return Err(e);
        }

        info!(
            "Speaker started ({} chunks, {} bytes queued)",
            self.queue.len(),
            self.queue.queued_bytes()
        );
        Ok(())
    }

    /// Queue a chunk for playback. Never blocks.
    ///
    /// Chunks written after the stream stopped are never played.
    pub fn write(&self, chunk: impl Into<Vec<u8>>) {
        let chunk = chunk.into();
        trace!("Queued {} bytes", chunk.len());
        self.queue.push(chunk);
    }

    /// Declare that no more chunks will be written.
    ///
    /// Only changes behavior in [`crate::config::CompletionMode::OnEndOfInput`].
    pub fn finish_input(&self) {
        debug!("Input finished ({} bytes still queued)", self.queue.queued_bytes());
        self.lifecycle.finish_input();
    }

    /// Stop playback and release the device. Idempotent.
    ///
    /// Resolves the completion signal as `Cancelled` unless the stream
    /// already finished.
    pub fn stop(&self) {
        if self.lifecycle.finish(StopReason::Cancelled) {
            info!("Speaker stopped before completion");
        }
        self.release();
    }

    fn release(&self) {
        let mut guard = lock_session(&self.session);
        if let Some(mut session) = guard.take() {
            if let Err(e) = session.stop() {
                warn!("Failed to stop device session: {}", e);
            }
            drop(session);

            let dropped = self.queue.clear();
            info!(
                "Speaker released ({}, {} queued chunks discarded)",
                self.lifecycle.state(),
                dropped
            );
        }
    }

    /// Future resolving when playback has completed or been cancelled.
    ///
    /// Does not trigger a stop. The future does not borrow the speaker.
    ///
    /// After `Completed` the device session is still open: cpal keeps
    /// invoking the callback, which writes silence, and chunks written
    /// afterwards stay queued. Call [`Speaker::stop`] (or drop the speaker)
    /// to release the device and clear the queue.
    pub fn wait_for_completion(&self) -> impl Future<Output = StopReason> + Send + 'static {
        self.lifecycle.completion().wait()
    }

    /// Blocking variant of [`Speaker::wait_for_completion`] for synchronous
    /// callers. Do not call from inside an async task.
    pub fn wait_for_completion_blocking(&self) -> StopReason {
        futures::executor::block_on(self.wait_for_completion())
    }

    pub fn state(&self) -> EngineState {
        self.lifecycle.state()
    }

    pub fn params(&self) -> &StreamParameters {
        &self.params
    }

    /// Bytes waiting in the queue (excludes the chunk being played)
    pub fn queued_bytes(&self) -> usize {
        self.queue.queued_bytes()
    }

    pub fn stats(&self) -> CallbackStats {
        self.monitor.stats()
    }

    /// Shared callback monitor, for [`CallbackMonitor::spawn_monitoring_task`]
    pub fn monitor(&self) -> Arc<CallbackMonitor> {
        Arc::clone(&self.monitor)
    }
}

impl Drop for Speaker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SampleFormat;
    use crate::device::{ManualDevice, ManualDeviceHandle};
    use crate::playback::CallbackResult;

    fn speaker() -> (Speaker, ManualDeviceHandle) {
        let device = ManualDevice::new();
        let handle = device.handle();
        let config = SpeakerConfig {
            frames_per_buffer: 4,
            channels: 1,
            sample_format: SampleFormat::I16,
            ..Default::default()
        };
        (Speaker::with_backend(config, &device).unwrap(), handle)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let device = ManualDevice::new();
        let config = SpeakerConfig { channels: 0, ..Default::default() };
        assert!(matches!(
            Speaker::with_backend(config, &device),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_start_then_drain() {
        let (speaker, device) = speaker();
        speaker.write(vec![1, 2, 3, 4]);
        speaker.write(vec![5, 6]);
        assert_eq!(speaker.queued_bytes(), 6);

        speaker.start().unwrap();
        assert_eq!(speaker.state(), EngineState::Running);

        let (out, result) = device.pull(4).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4, 5, 6, 0, 0]);
        assert_eq!(result, CallbackResult::Complete);
        assert_eq!(speaker.state(), EngineState::Stopped(StopReason::Completed));
        assert_eq!(speaker.wait_for_completion_blocking(), StopReason::Completed);

        // Backend does not call back after Complete
        assert!(device.pull(4).is_none());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (speaker, device) = speaker();
        speaker.write(vec![0; 64]);
        speaker.start().unwrap();

        speaker.stop();
        assert_eq!(speaker.state(), EngineState::Stopped(StopReason::Cancelled));
        assert!(device.is_released());
        assert_eq!(device.stop_count(), 1);
        assert_eq!(speaker.queued_bytes(), 0);

        speaker.stop();
        assert_eq!(speaker.state(), EngineState::Stopped(StopReason::Cancelled));
        assert_eq!(device.stop_count(), 1);
    }

    #[test]
    fn test_start_after_stop_fails_without_device_side_effects() {
        let (speaker, device) = speaker();
        speaker.stop();
        let stops = device.stop_count();

        let err = speaker.start().unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(device.start_count(), 0);
        assert_eq!(device.stop_count(), stops);
    }

    #[test]
    fn test_start_twice_fails() {
        let (speaker, device) = speaker();
        speaker.write(vec![0; 64]);
        speaker.start().unwrap();

        assert!(matches!(speaker.start(), Err(Error::InvalidState(_))));
        assert_eq!(device.start_count(), 1);
        assert_eq!(speaker.state(), EngineState::Running);
    }

    #[test]
    fn test_device_start_failure_stops_speaker() {
        let (speaker, device) = speaker();
        device.fail_next_start();

        assert!(matches!(speaker.start(), Err(Error::AudioOutput(_))));
        assert_eq!(speaker.state(), EngineState::Stopped(StopReason::Cancelled));
        assert!(device.is_released());
    }

    #[test]
    fn test_drop_releases_device() {
        let (speaker, device) = speaker();
        speaker.start().unwrap();
        let waiter = speaker.wait_for_completion();

        drop(speaker);
        assert!(device.is_released());
        assert_eq!(futures::executor::block_on(waiter), StopReason::Cancelled);
    }

    #[test]
    fn test_stop_after_completion_keeps_completed() {
        let (speaker, device) = speaker();
        speaker.write(vec![1, 2]);
        speaker.start().unwrap();
        device.pull(4).unwrap();

        speaker.stop();
        assert_eq!(speaker.state(), EngineState::Stopped(StopReason::Completed));
        assert!(device.is_released());
    }
}
