//! In-memory output device driven by the caller
//!
//! Stands in for a sound card: the caller decides when a buffer period
//! elapses by calling [`ManualDeviceHandle::pull`]. Like a real backend, it
//! stops invoking the callback once Complete or Abort has been returned.
//! Used by the test suite and for rendering a stream without hardware.

use super::{DeviceBackend, DeviceSession};
use crate::audio::StreamParameters;
use crate::error::{Error, Result};
use crate::playback::{CallbackResult, DeviceCallback, StatusFlags, StreamTiming};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct ManualState {
    callback: Option<DeviceCallback>,
    params: Option<StreamParameters>,
    running: bool,
    released: bool,
    finished: bool,
    start_count: usize,
    stop_count: usize,
    fail_next_start: bool,
}

/// Backend that hands its single session to a [`ManualDeviceHandle`]
#[derive(Clone, Default)]
pub struct ManualDevice {
    state: Arc<Mutex<ManualState>>,
}

impl ManualDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle used to pull buffers and inspect the session
    pub fn handle(&self) -> ManualDeviceHandle {
        ManualDeviceHandle {
            state: Arc::clone(&self.state),
        }
    }
}

fn lock(state: &Mutex<ManualState>) -> MutexGuard<'_, ManualState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DeviceBackend for ManualDevice {
    fn open(
        &self,
        params: &StreamParameters,
        callback: DeviceCallback,
    ) -> Result<Box<dyn DeviceSession>> {
        let mut state = lock(&self.state);
        if state.callback.is_some() || state.released {
            return Err(Error::AudioOutput("Manual device already opened".to_string()));
        }
        state.callback = Some(callback);
        state.params = Some(params.clone());
        drop(state);

        Ok(Box::new(ManualSession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct ManualSession {
    state: Arc<Mutex<ManualState>>,
}

impl DeviceSession for ManualSession {
    fn start(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        if state.fail_next_start {
            state.fail_next_start = false;
            return Err(Error::AudioOutput("Manual device start failure".to_string()));
        }
        if state.released {
            return Err(Error::AudioOutput("Stream already released".to_string()));
        }
        state.running = true;
        state.start_count += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.running = false;
        state.stop_count += 1;
        if !state.released {
            state.released = true;
            state.callback = None;
        }
        Ok(())
    }
}

/// Caller side of a [`ManualDevice`]
#[derive(Clone)]
pub struct ManualDeviceHandle {
    state: Arc<Mutex<ManualState>>,
}

impl ManualDeviceHandle {
    /// Run one callback period of `frame_count` frames.
    ///
    /// Returns `None` when the stream is not running (not started, stopped,
    /// or already finished).
    pub fn pull(&self, frame_count: usize) -> Option<(Vec<u8>, CallbackResult)> {
        let bytes = {
            let state = lock(&self.state);
            state.params.as_ref()?.bytes_for_frames(frame_count)
        };
        let mut buffer = vec![0u8; bytes];
        let result = self.pull_into(frame_count, &mut buffer)?;
        Some((buffer, result))
    }

    /// Run one callback period writing into a caller-provided buffer.
    pub fn pull_into(&self, frame_count: usize, buffer: &mut [u8]) -> Option<CallbackResult> {
        let mut state = lock(&self.state);
        if !state.running || state.finished {
            return None;
        }

        let result = state.callback.as_mut()?.process(
            frame_count,
            buffer,
            &StreamTiming::default(),
            StatusFlags::default(),
        );

        if result != CallbackResult::Continue {
            state.finished = true;
        }
        Some(result)
    }

    /// Pull nominal-size buffers until the stream finishes or `max_buffers`
    /// have been rendered. Returns the concatenated output and the last result.
    pub fn render(&self, max_buffers: usize) -> (Vec<u8>, Option<CallbackResult>) {
        let frames = {
            let state = lock(&self.state);
            match state.params.as_ref() {
                Some(params) => params.frames_per_buffer as usize,
                None => return (Vec::new(), None),
            }
        };

        let mut rendered = Vec::new();
        let mut last = None;
        for _ in 0..max_buffers {
            match self.pull(frames) {
                Some((buffer, result)) => {
                    rendered.extend_from_slice(&buffer);
                    last = Some(result);
                    if result != CallbackResult::Continue {
                        break;
                    }
                }
                None => break,
            }
        }
        (rendered, last)
    }

    /// The session is started and has not finished or been stopped
    pub fn is_running(&self) -> bool {
        let state = lock(&self.state);
        state.running && !state.finished
    }

    /// The session has been stopped and its callback dropped
    pub fn is_released(&self) -> bool {
        lock(&self.state).released
    }

    pub fn start_count(&self) -> usize {
        lock(&self.state).start_count
    }

    pub fn stop_count(&self) -> usize {
        lock(&self.state).stop_count
    }

    /// Make the next `start` fail with an audio output error
    pub fn fail_next_start(&self) {
        lock(&self.state).fail_next_start = true;
    }
}
