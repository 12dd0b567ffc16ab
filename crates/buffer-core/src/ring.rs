//! Bounded FIFO chunk queue
//!
//! One ring per stream. The ring never blocks and never silently
//! overwrites: a push at capacity is rejected, and a shrinking resize
//! reports exactly how many queued chunks it dropped.

use std::collections::VecDeque;

use crate::error::{BufferError, Result};
use crate::types::MediaChunk;

/// Fixed-capacity FIFO of queued chunks for one stream
#[derive(Debug)]
pub struct ChunkRing {
    queue: VecDeque<MediaChunk>,
    capacity_min: usize,
    capacity_max: usize,
}

impl ChunkRing {
    /// Create a new ring with the given capacity bounds
    pub fn new(capacity_min: usize, capacity_max: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity_max),
            capacity_min,
            capacity_max,
        }
    }

    /// Queue a chunk, rejecting it when the ring is at maximum capacity
    pub fn push(&mut self, chunk: MediaChunk) -> Result<()> {
        if self.queue.len() >= self.capacity_max {
            return Err(BufferError::BufferFull {
                occupancy: self.queue.len(),
                capacity_max: self.capacity_max,
            });
        }
        self.queue.push_back(chunk);
        Ok(())
    }

    /// Dequeue the oldest chunk, if any
    pub fn pop(&mut self) -> Option<MediaChunk> {
        self.queue.pop_front()
    }

    /// Adjust capacity bounds
    ///
    /// When the current occupancy exceeds the new maximum, the oldest
    /// excess chunks are dropped and the drop count returned.
    pub fn resize(&mut self, new_min: usize, new_max: usize) -> usize {
        self.capacity_min = new_min;
        self.capacity_max = new_max;

        let mut dropped = 0;
        while self.queue.len() > self.capacity_max {
            self.queue.pop_front();
            dropped += 1;
        }
        dropped
    }

    /// Drop all queued chunks, returning how many were discarded
    pub fn clear(&mut self) -> usize {
        let discarded = self.queue.len();
        self.queue.clear();
        discarded
    }

    /// Current number of queued chunks
    pub fn occupancy(&self) -> usize {
        self.queue.len()
    }

    /// Whether the ring holds no chunks
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Whether a push would currently be rejected
    pub fn is_full(&self) -> bool {
        self.queue.len() >= self.capacity_max
    }

    /// Minimum capacity bound
    pub fn capacity_min(&self) -> usize {
        self.capacity_min
    }

    /// Maximum capacity bound
    pub fn capacity_max(&self) -> usize {
        self.capacity_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AudioQuality, ChunkKind};
    use bytes::Bytes;
    use std::time::Duration;

    fn chunk(sequence: u64) -> MediaChunk {
        MediaChunk::new(
            sequence,
            Bytes::from_static(b"payload"),
            Duration::from_millis(20),
            AudioQuality::High,
            ChunkKind::Audio,
        )
    }

    #[test]
    fn pop_returns_fifo_sequence_order() {
        let mut ring = ChunkRing::new(2, 10);
        for seq in 0..8 {
            ring.push(chunk(seq)).unwrap();
        }

        let mut last = None;
        while let Some(chunk) = ring.pop() {
            if let Some(prev) = last {
                assert!(chunk.sequence > prev, "sequence went backwards");
            }
            last = Some(chunk.sequence);
        }
        assert_eq!(last, Some(7));
    }

    #[test]
    fn push_at_capacity_is_rejected_without_overwrite() {
        let mut ring = ChunkRing::new(1, 3);
        for seq in 0..3 {
            ring.push(chunk(seq)).unwrap();
        }

        let err = ring.push(chunk(3)).unwrap_err();
        assert_eq!(
            err,
            BufferError::BufferFull {
                occupancy: 3,
                capacity_max: 3
            }
        );

        // Queued data untouched: still pops 0, 1, 2.
        assert_eq!(ring.pop().unwrap().sequence, 0);
        assert_eq!(ring.pop().unwrap().sequence, 1);
        assert_eq!(ring.pop().unwrap().sequence, 2);
        assert!(ring.pop().is_none());
    }

    #[test]
    fn shrinking_resize_drops_exactly_oldest_excess() {
        let mut ring = ChunkRing::new(2, 10);
        for seq in 0..10 {
            ring.push(chunk(seq)).unwrap();
        }

        let dropped = ring.resize(2, 6);
        assert_eq!(dropped, 4);
        assert_eq!(ring.occupancy(), 6);
        // Oldest were dropped; the head is now sequence 4.
        assert_eq!(ring.pop().unwrap().sequence, 4);
    }

    #[test]
    fn growing_resize_drops_nothing() {
        let mut ring = ChunkRing::new(2, 4);
        for seq in 0..4 {
            ring.push(chunk(seq)).unwrap();
        }
        assert_eq!(ring.resize(2, 8), 0);
        assert!(!ring.is_full());
        ring.push(chunk(4)).unwrap();
        assert_eq!(ring.occupancy(), 5);
    }

    #[test]
    fn clear_reports_discarded_count() {
        let mut ring = ChunkRing::new(2, 10);
        for seq in 0..5 {
            ring.push(chunk(seq)).unwrap();
        }
        assert_eq!(ring.clear(), 5);
        assert!(ring.is_empty());
        assert_eq!(ring.clear(), 0);
    }
}
