//! # pcm-speaker
//!
//! Real-time PCM output engine fed from an asynchronously filled byte queue.
//!
//! **Purpose:** Producers write arbitrary-sized chunks of device-native audio
//! (e.g. a text-to-speech websocket stream); the device callback drains them
//! into fixed-size device buffers, zero-filling on underrun, and signals
//! completion once the stream has drained or been stopped.
//!
//! **Architecture:** lock-free chunk queue + playback cursor + pull-based
//! device callback, driven by cpal
//!
//! ```no_run
//! # async fn demo(audio: Vec<Vec<u8>>) -> pcm_speaker::Result<()> {
//! use pcm_speaker::{Speaker, SpeakerConfig};
//!
//! let speaker = Speaker::new(SpeakerConfig { sample_rate: 48_000, ..Default::default() })?;
//! for chunk in audio {
//!     speaker.write(chunk);
//! }
//! speaker.start()?;
//! speaker.wait_for_completion().await;
//! speaker.stop();
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod config;
pub mod device;
pub mod error;
pub mod playback;

pub use audio::{DeviceSelector, SampleFormat, StreamParameters};
pub use config::{CompletionMode, SpeakerConfig};
pub use error::{Error, Result};
pub use playback::{CallbackResult, CallbackStats, EngineState, Speaker, StopReason};
