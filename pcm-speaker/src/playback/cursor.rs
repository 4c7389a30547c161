//! Playback cursor
//!
//! Remembers the chunk currently being drained and how far into it playback
//! has progressed, so a chunk can span several device buffers and several
//! chunks can land in one buffer.
//!
//! Owned by the device callback; never shared.

use super::chunk_queue::{Chunk, ChunkQueue};

/// Current chunk plus consumed offset.
///
/// Invariant: `offset <= current.len()` whenever `current` is `Some`.
#[derive(Debug, Default)]
pub struct PlaybackCursor {
    current: Option<Chunk>,
    offset: usize,
}

impl PlaybackCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unplayed bytes left in the current chunk.
    pub fn remaining(&self) -> usize {
        self.current
            .as_ref()
            .map_or(0, |chunk| chunk.len() - self.offset)
    }

    /// True when a partially played chunk is pending.
    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Copy queued audio into `out`, pulling chunks from `queue` as needed.
    ///
    /// Returns the number of bytes written. Stops early (without blocking)
    /// when the queue runs dry; the caller handles the shortfall.
    pub fn fill(&mut self, queue: &ChunkQueue, out: &mut [u8]) -> usize {
        let mut written = 0;

        while written < out.len() {
            if !self.has_remaining() {
                match queue.try_pop() {
                    Some(chunk) => {
                        self.current = Some(chunk);
                        self.offset = 0;
                        // Re-check: the new chunk may be empty
                        continue;
                    }
                    None => {
                        self.current = None;
                        self.offset = 0;
                        break;
                    }
                }
            }

            let Some(chunk) = self.current.as_ref() else {
                break;
            };

            let count = (chunk.len() - self.offset).min(out.len() - written);
            out[written..written + count]
                .copy_from_slice(&chunk[self.offset..self.offset + count]);

            self.offset += count;
            written += count;
        }

        written
    }
}
