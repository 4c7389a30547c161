//! Device sessions
//!
//! A [`DeviceBackend`] opens a [`DeviceSession`] that owns the native output
//! stream and drives a [`DeviceCallback`] on the backend's real-time thread.
//!
//! - [`CpalBackend`]: the system audio device via cpal
//! - [`ManualDevice`]: in-memory device pulled by the caller (tests, offline rendering)

pub mod cpal_output;
pub mod manual;

pub use cpal_output::{list_output_devices, CpalBackend};
pub use manual::{ManualDevice, ManualDeviceHandle};

use crate::audio::StreamParameters;
use crate::error::Result;
use crate::playback::DeviceCallback;

/// A native output stream.
///
/// After `stop` returns, the callback must not be invoked again.
pub trait DeviceSession: Send {
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
}

/// Factory for device sessions.
pub trait DeviceBackend {
    fn open(
        &self,
        params: &StreamParameters,
        callback: DeviceCallback,
    ) -> Result<Box<dyn DeviceSession>>;
}
