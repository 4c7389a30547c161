//! Playback engine: chunk queue, cursor, device callback and lifecycle

pub mod callback;
pub mod callback_monitor;
pub mod chunk_queue;
pub mod cursor;
pub mod lifecycle;
pub mod speaker;

pub use callback::{CallbackResult, DeviceCallback, StatusFlags, StreamTiming};
pub use callback_monitor::{CallbackMonitor, CallbackStats};
pub use chunk_queue::{Chunk, ChunkQueue};
pub use cursor::PlaybackCursor;
pub use lifecycle::{CompletionSignal, EngineState, Lifecycle, StopReason};
pub use speaker::Speaker;
