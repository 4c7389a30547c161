//! Audio stream description types

pub mod types;

pub use types::{DeviceSelector, SampleFormat, StreamParameters};
