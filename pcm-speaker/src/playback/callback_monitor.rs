//! Audio callback statistics
//!
//! Counters updated by the real-time callback and read by everyone else.
//!
//! **Design:** Lock-free for use in real-time audio callback. The callback
//! never logs; [`CallbackMonitor::spawn_monitoring_task`] polls the counters
//! from a tokio task and reports underruns there.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Audio callback statistics
pub struct CallbackMonitor {
    /// Total callback invocations
    callback_count: AtomicU64,

    /// Callbacks that could not fill the whole buffer from queued data
    underrun_count: AtomicU64,

    /// Queued audio bytes copied to the device
    bytes_delivered: AtomicU64,

    /// Zero bytes written in place of missing audio
    silence_bytes: AtomicU64,

    /// Backend-reported output underflows (status flags)
    device_underflows: AtomicU64,

    /// Errors reported by the device backend outside the callback
    stream_errors: AtomicU64,

    /// Most recent callback-to-playback latency reported by the backend
    last_latency_ns: AtomicU64,
}

impl CallbackMonitor {
    pub fn new() -> Self {
        Self {
            callback_count: AtomicU64::new(0),
            underrun_count: AtomicU64::new(0),
            bytes_delivered: AtomicU64::new(0),
            silence_bytes: AtomicU64::new(0),
            device_underflows: AtomicU64::new(0),
            stream_errors: AtomicU64::new(0),
            last_latency_ns: AtomicU64::new(0),
        }
    }

    /// Record one callback invocation (once per buffer, not per frame)
    pub fn record_callback(&self, latency: Option<Duration>, device_underflow: bool) {
        self.callback_count.fetch_add(1, Ordering::Relaxed);
        if let Some(latency) = latency {
            self.last_latency_ns
                .store(latency.as_nanos() as u64, Ordering::Relaxed);
        }
        if device_underflow {
            self.device_underflows.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_delivered(&self, bytes: usize) {
        self.bytes_delivered.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_silence(&self, bytes: usize) {
        self.silence_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_underrun(&self) {
        self.underrun_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a backend stream error (called from the backend's error callback)
    pub fn record_stream_error(&self) {
        self.stream_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of all counters
    pub fn stats(&self) -> CallbackStats {
        CallbackStats {
            callback_count: self.callback_count.load(Ordering::Relaxed),
            underrun_count: self.underrun_count.load(Ordering::Relaxed),
            bytes_delivered: self.bytes_delivered.load(Ordering::Relaxed),
            silence_bytes: self.silence_bytes.load(Ordering::Relaxed),
            device_underflows: self.device_underflows.load(Ordering::Relaxed),
            stream_errors: self.stream_errors.load(Ordering::Relaxed),
            last_latency_us: self.last_latency_ns.load(Ordering::Relaxed) / 1_000,
        }
    }

    /// Spawn monitoring task that polls stats and logs changes
    ///
    /// Runs on tokio runtime, separate from real-time audio callback.
    ///
    /// **Returns:** Shutdown flag (set to true to stop monitoring)
    pub fn spawn_monitoring_task(
        self: Arc<Self>,
        rt_handle: tokio::runtime::Handle,
        interval: Duration,
    ) -> Arc<AtomicBool> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);
        let monitor = self;

        rt_handle.spawn(async move {
            let mut last = monitor.stats();

            debug!("CallbackMonitor: Monitoring task started");

            while !shutdown_clone.load(Ordering::Relaxed) {
                tokio::time::sleep(interval).await;

                let stats = monitor.stats();

                if stats.underrun_count > last.underrun_count {
                    warn!(
                        "Audio callback underrun: {} total (+{} since last check), {} bytes of silence",
                        stats.underrun_count,
                        stats.underrun_count - last.underrun_count,
                        stats.silence_bytes
                    );
                }

                if stats.stream_errors > last.stream_errors {
                    warn!(
                        "Audio stream errors: {} total (+{} since last check)",
                        stats.stream_errors,
                        stats.stream_errors - last.stream_errors
                    );
                }

                if stats.device_underflows > last.device_underflows {
                    debug!("Device reported {} output underflows", stats.device_underflows);
                }

                last = stats;
            }

            info!(
                "CallbackMonitor: Monitoring task stopped ({} callbacks, {} underruns)",
                last.callback_count, last.underrun_count
            );
        });

        shutdown
    }
}

impl Default for CallbackMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Callback statistics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackStats {
    pub callback_count: u64,
    pub underrun_count: u64,
    pub bytes_delivered: u64,
    pub silence_bytes: u64,
    pub device_underflows: u64,
    pub stream_errors: u64,
    pub last_latency_us: u64,
}
