//! Outbound event notifications
//!
//! The engine has no wire surface of its own; collaborators observe it
//! through these events. Callbacks are invoked outside internal locks,
//! in the order the transitions occurred for a given stream.

use std::sync::Arc;

use crate::types::{AudioQuality, BufferState, MediaChunk, StreamKey};

/// Events emitted by a stream buffer
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// The pacing tick released a chunk to the transport
    ChunkReady {
        /// Stream the chunk belongs to
        key: StreamKey,
        /// The released chunk; ownership passes to the consumer
        chunk: MediaChunk,
    },
    /// Underrun: release paused until the recovery threshold refills
    Stalled {
        /// Affected stream
        key: StreamKey,
    },
    /// Recovery threshold reached; paced release resumed
    Resumed {
        /// Affected stream
        key: StreamKey,
    },
    /// The controller changed the quality hint for produced chunks
    QualityChanged {
        /// Affected stream
        key: StreamKey,
        /// New quality level
        quality: AudioQuality,
    },
    /// A push was rejected because the ring was full; the incoming chunk
    /// was dropped to protect already-queued, closer-to-playout data
    ProducerOverrun {
        /// Affected stream
        key: StreamKey,
    },
    /// Queued chunks were dropped by an explicit resize
    ChunksDropped {
        /// Affected stream
        key: StreamKey,
        /// Number of oldest-undelivered chunks discarded
        dropped: usize,
    },
    /// The stream moved to a new lifecycle state
    StateChanged {
        /// Affected stream
        key: StreamKey,
        /// Previous state
        from: BufferState,
        /// New state
        to: BufferState,
    },
    /// Draining finished, by queue exhaustion or by timeout
    Drained {
        /// Affected stream
        key: StreamKey,
        /// Chunks discarded when the drain timeout forced teardown
        discarded: usize,
    },
}

/// Callback for receiving stream events
pub type StreamEventCallback = Arc<dyn Fn(StreamEvent) + Send + Sync>;

/// Callback that drops all events, for streams nobody observes
pub fn noop_callback() -> StreamEventCallback {
    Arc::new(|_| {})
}
