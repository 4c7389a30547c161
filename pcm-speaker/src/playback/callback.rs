//! Real-time device callback
//!
//! The device backend calls [`DeviceCallback::process`] once per buffer
//! period on its own real-time thread. The callback must always hand back a
//! full buffer immediately: queued audio when there is some, zeros when there
//! is not.
//!
//! No locks, no I/O, no logging on this path, and no allocation: the only
//! heap activity is dropping a fully played chunk when the cursor moves on.
//! Counters go to the [`CallbackMonitor`].
//!
//! Backends that keep calling after Complete (cpal) enable
//! [`DeviceCallback::defer_completion_until_played`], so `Completed` is only
//! published once the final buffer has left the device.

use super::callback_monitor::CallbackMonitor;
use super::chunk_queue::ChunkQueue;
use super::cursor::PlaybackCursor;
use super::lifecycle::{Lifecycle, StopReason};
use crate::audio::StreamParameters;
use crate::config::CompletionMode;
use std::sync::Arc;
use std::time::Duration;

/// What the backend should do after a callback returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackResult {
    /// Keep invoking the callback
    Continue,
    /// Stream finished; the buffer just returned is the last one
    Complete,
    /// Halt the stream now
    Abort,
}

/// Timing information supplied by the backend for one invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamTiming {
    /// Time between the callback and the buffer reaching the DAC
    pub output_latency: Option<Duration>,
}

/// Backend status flags for one invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFlags {
    pub output_underflow: bool,
    pub output_overflow: bool,
    pub priming_output: bool,
}

/// Pull-based adapter between the chunk queue and device buffers.
pub struct DeviceCallback {
    queue: Arc<ChunkQueue>,
    lifecycle: Arc<Lifecycle>,
    monitor: Arc<CallbackMonitor>,
    cursor: PlaybackCursor,
    bytes_per_frame: usize,
    completion: CompletionMode,
    sample_rate: u32,
    /// Set once Complete or Abort has been returned
    terminal: Option<CallbackResult>,
    defer_completion: bool,
    /// Frames the device must still consume before the final buffer has played
    playout_frames: Option<usize>,
}

impl DeviceCallback {
    pub fn new(
        params: &StreamParameters,
        completion: CompletionMode,
        queue: Arc<ChunkQueue>,
        lifecycle: Arc<Lifecycle>,
        monitor: Arc<CallbackMonitor>,
    ) -> Self {
        Self {
            queue,
            lifecycle,
            monitor,
            cursor: PlaybackCursor::new(),
            bytes_per_frame: params.bytes_per_frame(),
            completion,
            sample_rate: params.sample_rate,
            terminal: None,
            defer_completion: false,
            playout_frames: None,
        }
    }

    /// Publish `Completed` only after the final buffer has played.
    ///
    /// For backends that keep invoking the callback after Complete. The
    /// latched silent invocations that follow count the frames the device
    /// has consumed; once they cover the output latency reported with the
    /// final buffer plus that buffer itself, the stream is resolved.
    pub fn defer_completion_until_played(&mut self) {
        self.defer_completion = true;
    }

    /// Fill the first `frame_count` frames of `output`.
    ///
    /// Bytes past the requested frames are left untouched. After `Complete`
    /// or `Abort` has been returned, later invocations write silence and
    /// repeat that result.
    pub fn process(
        &mut self,
        frame_count: usize,
        output: &mut [u8],
        timing: &StreamTiming,
        flags: StatusFlags,
    ) -> CallbackResult {
        if let Some(result) = self.terminal {
            output.fill(0);
            self.consume_playout(frame_count);
            return result;
        }

        self.monitor
            .record_callback(timing.output_latency, flags.output_underflow);

        if self.lifecycle.is_cancelled() {
            return self.abort();
        }

        let required = frame_count * self.bytes_per_frame;
        let Some(out) = output.get_mut(..required) else {
            // Device buffer does not match the negotiated stream parameters
            return self.abort();
        };

        let written = self.cursor.fill(&self.queue, out);
        self.monitor.record_delivered(written);

        if written < required {
            out[written..].fill(0);
            self.monitor.record_silence(required - written);
        }

        if self.is_end_of_stream() {
            if self.defer_completion {
                let queued = timing.output_latency.map_or(0, |l| self.frames_in(l));
                self.playout_frames = Some(queued + frame_count);
            } else {
                self.lifecycle.finish(StopReason::Completed);
            }
            self.terminal = Some(CallbackResult::Complete);
            return CallbackResult::Complete;
        }

        if written < required {
            self.monitor.record_underrun();
        }

        CallbackResult::Continue
    }

    fn is_end_of_stream(&self) -> bool {
        // Input flag first: once it is seen, every chunk written before it
        // is visible in the queue.
        let input_done = match self.completion {
            CompletionMode::OnDrain => true,
            CompletionMode::OnEndOfInput => self.lifecycle.is_input_finished(),
        };
        input_done && self.queue.is_empty() && !self.cursor.has_remaining()
    }

    fn consume_playout(&mut self, frame_count: usize) {
        let Some(remaining) = self.playout_frames else {
            return;
        };
        // Being called again means the device consumed another period
        let remaining = remaining.saturating_sub(frame_count);
        if remaining == 0 {
            self.playout_frames = None;
            self.lifecycle.finish(StopReason::Completed);
        } else {
            self.playout_frames = Some(remaining);
        }
    }

    fn frames_in(&self, duration: Duration) -> usize {
        (duration.as_nanos() * u128::from(self.sample_rate) / 1_000_000_000) as usize
    }

    fn abort(&mut self) -> CallbackResult {
        self.lifecycle.finish(StopReason::Cancelled);
        self.terminal = Some(CallbackResult::Abort);
        CallbackResult::Abort
    }

    /// Bytes in one frame for this stream
    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_frame
    }

    pub fn monitor(&self) -> &Arc<CallbackMonitor> {
        &self.monitor
    }
}
