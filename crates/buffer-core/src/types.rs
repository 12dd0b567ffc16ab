//! Chunk, quality, and state definitions

use std::fmt;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Key identifying one stream within a [`BufferManager`](crate::BufferManager),
/// typically a chat or call identifier.
pub type StreamKey = String;

/// Media chunk kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkKind {
    /// Audio media
    Audio,
    /// Video media
    Video,
}

/// Quality presets for produced media
///
/// The ladder is ordered; adaptation moves at most one step per
/// adjustment cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AudioQuality {
    /// 32 kbit/s, 24 kHz
    Low,
    /// 64 kbit/s, 48 kHz
    Medium,
    /// 128 kbit/s, 48 kHz
    High,
    /// 256 kbit/s, 48 kHz
    Ultra,
}

impl AudioQuality {
    /// Nominal bitrate for this quality level, in bits per second
    pub fn bitrate(&self) -> u32 {
        match self {
            AudioQuality::Low => 32_000,
            AudioQuality::Medium => 64_000,
            AudioQuality::High => 128_000,
            AudioQuality::Ultra => 256_000,
        }
    }

    /// Sample rate for this quality level, in Hz
    pub fn sample_rate(&self) -> u32 {
        match self {
            AudioQuality::Low => 24_000,
            AudioQuality::Medium => 48_000,
            AudioQuality::High => 48_000,
            AudioQuality::Ultra => 48_000,
        }
    }

    /// Next level down the ladder, or `self` if already at the bottom
    pub fn step_down(&self) -> AudioQuality {
        match self {
            AudioQuality::Ultra => AudioQuality::High,
            AudioQuality::High => AudioQuality::Medium,
            AudioQuality::Medium => AudioQuality::Low,
            AudioQuality::Low => AudioQuality::Low,
        }
    }

    /// Next level up the ladder, or `self` if already at the top
    pub fn step_up(&self) -> AudioQuality {
        match self {
            AudioQuality::Low => AudioQuality::Medium,
            AudioQuality::Medium => AudioQuality::High,
            AudioQuality::High => AudioQuality::Ultra,
            AudioQuality::Ultra => AudioQuality::Ultra,
        }
    }
}

impl fmt::Display for AudioQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioQuality::Low => write!(f, "low"),
            AudioQuality::Medium => write!(f, "medium"),
            AudioQuality::High => write!(f, "high"),
            AudioQuality::Ultra => write!(f, "ultra"),
        }
    }
}

/// A single immutable unit of media payload
///
/// Sequence numbers are stamped by the owning stream and are strictly
/// increasing per stream. Ownership moves from producer to ring to
/// consumer; the chunk itself is never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaChunk {
    /// Per-stream monotonic sequence number
    pub sequence: u64,
    /// When the chunk entered the buffer
    pub produced_at: Instant,
    /// Raw payload data
    pub payload: Bytes,
    /// Nominal playback duration this chunk represents
    pub duration: Duration,
    /// Quality level the chunk was produced at
    pub quality: AudioQuality,
    /// Chunk kind (audio or video)
    pub kind: ChunkKind,
}

impl MediaChunk {
    /// Create a new chunk stamped with the current time
    pub fn new(
        sequence: u64,
        payload: Bytes,
        duration: Duration,
        quality: AudioQuality,
        kind: ChunkKind,
    ) -> Self {
        Self {
            sequence,
            produced_at: Instant::now(),
            payload,
            duration,
            quality,
            kind,
        }
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// Time since the chunk was produced
    pub fn age(&self) -> Duration {
        self.produced_at.elapsed()
    }
}

/// Stream buffer lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferState {
    /// Created but not yet started
    Idle,
    /// Accepting chunks, not yet releasing; ends when occupancy first
    /// reaches the target
    Filling,
    /// Normal operation: paced release at the chunk cadence
    Steady,
    /// Underrun hit; release paused until the recovery threshold refills
    Recovering,
    /// Stop requested; releasing queued chunks, rejecting new pushes
    Draining,
    /// Terminal state; all owned chunks freed
    Stopped,
}

impl fmt::Display for BufferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferState::Idle => write!(f, "idle"),
            BufferState::Filling => write!(f, "filling"),
            BufferState::Steady => write!(f, "steady"),
            BufferState::Recovering => write!(f, "recovering"),
            BufferState::Draining => write!(f, "draining"),
            BufferState::Stopped => write!(f, "stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_steps_are_single() {
        assert_eq!(AudioQuality::Ultra.step_down(), AudioQuality::High);
        assert_eq!(AudioQuality::Low.step_down(), AudioQuality::Low);
        assert_eq!(AudioQuality::Low.step_up(), AudioQuality::Medium);
        assert_eq!(AudioQuality::Ultra.step_up(), AudioQuality::Ultra);
    }

    #[test]
    fn quality_ladder_is_ordered() {
        assert!(AudioQuality::Low < AudioQuality::Medium);
        assert!(AudioQuality::Medium < AudioQuality::High);
        assert!(AudioQuality::High < AudioQuality::Ultra);
        assert!(AudioQuality::Low.bitrate() < AudioQuality::Ultra.bitrate());
    }

    #[test]
    fn chunk_accessors() {
        let chunk = MediaChunk::new(
            7,
            Bytes::from_static(b"abcd"),
            Duration::from_millis(20),
            AudioQuality::High,
            ChunkKind::Audio,
        );
        assert_eq!(chunk.size(), 4);
        assert_eq!(chunk.sequence, 7);
        assert!(chunk.age() < Duration::from_secs(1));
    }
}
