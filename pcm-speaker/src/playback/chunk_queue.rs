//! Lock-free chunk queue
//!
//! Unbounded FIFO of byte chunks between producers (`Speaker::write`, any
//! thread) and the real-time device callback (sole consumer).
//!
//! Design:
//! - Producers: push whole chunks, never block
//! - Consumer (audio callback): pops chunks without any locks
//! - Per-producer order is preserved; interleaving between producers is not

use crossbeam_queue::SegQueue;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One caller-supplied byte buffer, already in device-native format.
pub type Chunk = Vec<u8>;

/// Lock-free FIFO of pending chunks
#[derive(Debug, Default)]
pub struct ChunkQueue {
    chunks: SegQueue<Chunk>,

    /// Bytes currently queued (statistics only)
    queued_bytes: AtomicUsize,
}

impl ChunkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk to the tail.
    pub fn push(&self, chunk: Chunk) {
        self.queued_bytes.fetch_add(chunk.len(), Ordering::Relaxed);
        self.chunks.push(chunk);
    }

    /// Remove the head chunk, or `None` if the queue is empty.
    ///
    /// Lock-free; safe to call from the real-time callback.
    pub fn try_pop(&self) -> Option<Chunk> {
        let chunk = self.chunks.pop()?;
        self.queued_bytes.fetch_sub(chunk.len(), Ordering::Relaxed);
        Some(chunk)
    }

    /// Drop every queued chunk, returning how many were discarded.
    pub fn clear(&self) -> usize {
        let mut dropped = 0;
        while self.try_pop().is_some() {
            dropped += 1;
        }
        dropped
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of queued chunks
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Total bytes across queued chunks
    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes.load(Ordering::Relaxed)
    }
}
