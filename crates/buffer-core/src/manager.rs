//! Process-wide stream registry
//!
//! The manager has no data-path role: it owns stream lifecycle, the
//! concurrent-stream cap, the global memory budget, and aggregate
//! statistics. Structural changes take the write lock; lookups and the
//! producer/feedback passthroughs only read.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::{ManagerConfig, StreamBufferConfig};
use crate::error::{BufferError, Result};
use crate::events::{noop_callback, StreamEventCallback};
use crate::stats::GlobalStats;
use crate::stream::StreamBuffer;
use crate::types::{AudioQuality, ChunkKind, StreamKey};

/// Registry of active stream buffers
pub struct BufferManager {
    config: ManagerConfig,
    streams: RwLock<HashMap<StreamKey, Arc<StreamBuffer>>>,
}

impl BufferManager {
    /// Create a manager with a validated configuration
    pub fn new(config: ManagerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            streams: RwLock::new(HashMap::new()),
        })
    }

    /// Register and start a stream with no event observer
    pub fn create_stream(
        &self,
        key: impl Into<StreamKey>,
        config: StreamBufferConfig,
    ) -> Result<Arc<StreamBuffer>> {
        self.create_stream_with_callback(key, config, noop_callback())
    }

    /// Register and start a stream, delivering its events to `callback`
    ///
    /// The check-and-insert is atomic under the registry write lock: a
    /// duplicate key, the concurrent-stream cap, and the global memory
    /// budget all reject the new stream and leave existing streams
    /// untouched.
    pub fn create_stream_with_callback(
        &self,
        key: impl Into<StreamKey>,
        config: StreamBufferConfig,
        callback: StreamEventCallback,
    ) -> Result<Arc<StreamBuffer>> {
        let key = key.into();
        config.validate()?;

        let mut streams = self.streams.write();
        if streams.contains_key(&key) {
            return Err(BufferError::StreamAlreadyExists { key });
        }
        if streams.len() >= self.config.max_concurrent_streams {
            return Err(BufferError::CapacityExceeded {
                active: streams.len(),
                limit: self.config.max_concurrent_streams,
            });
        }

        let reserved: usize = streams
            .values()
            .map(|stream| stream.memory_reservation())
            .sum();
        let requested = config.memory_reservation();
        if reserved + requested > self.config.max_memory_bytes {
            return Err(BufferError::MemoryBudgetExceeded {
                requested,
                available: self.config.max_memory_bytes.saturating_sub(reserved),
            });
        }

        let stream = Arc::new(StreamBuffer::new(key.clone(), config, callback)?);
        streams.insert(key.clone(), Arc::clone(&stream));
        let active = streams.len();
        drop(streams);

        // The first dispatch (Idle -> Filling) runs on this thread; the
        // registry lock must be released before the callback fires so a
        // callback may call back into the manager.
        Arc::clone(&stream).start();
        info!("created stream {} ({} active)", key, active);
        Ok(stream)
    }

    /// Look up a registered stream
    pub fn get(&self, key: &str) -> Option<Arc<StreamBuffer>> {
        self.streams.read().get(key).cloned()
    }

    /// Number of registered streams
    pub fn stream_count(&self) -> usize {
        self.streams.read().len()
    }

    /// Submit a produced chunk to a stream
    ///
    /// Returns `false` when the stream is unknown or the chunk was not
    /// accepted (overrun or draining).
    pub fn submit_chunk(
        &self,
        key: &str,
        payload: Bytes,
        duration: Duration,
        quality: AudioQuality,
        kind: ChunkKind,
    ) -> bool {
        match self.get(key) {
            Some(stream) => stream.push(payload, duration, quality, kind),
            None => false,
        }
    }

    /// Transport feedback for a delivered chunk
    pub fn report_delivery(&self, key: &str, latency: Duration, bytes: u64) -> Result<()> {
        let stream = self.get(key).ok_or_else(|| BufferError::StreamNotFound {
            key: key.to_string(),
        })?;
        stream.report_delivery(latency, bytes);
        Ok(())
    }

    /// Request a cooperative stop with a bounded drain
    pub fn stop_stream(&self, key: &str, drain_timeout: Duration) -> Result<()> {
        let stream = self.get(key).ok_or_else(|| BufferError::StreamNotFound {
            key: key.to_string(),
        })?;
        stream.stop(drain_timeout);
        Ok(())
    }

    /// Tear down and deregister a stream; idempotent
    pub fn remove(&self, key: &str) {
        let removed = self.streams.write().remove(key);
        if let Some(stream) = removed {
            stream.shutdown();
            debug!("removed stream {}", key);
        }
    }

    /// Per-stream statistics, if the stream exists
    pub fn stats(&self, key: &str) -> Option<crate::stats::StreamStats> {
        self.get(key).map(|stream| stream.stats())
    }

    /// Aggregate statistics across all registered streams
    ///
    /// Snapshot-only: each stream is sampled under its own short lock,
    /// never blocking the push/pop paths for long.
    pub fn global_stats(&self) -> GlobalStats {
        let streams: Vec<Arc<StreamBuffer>> =
            self.streams.read().values().cloned().collect();

        let mut stats = GlobalStats {
            active_streams: streams.len(),
            memory_budget_bytes: self.config.max_memory_bytes,
            ..Default::default()
        };

        let mut latency_sum = 0.0;
        let mut latency_count = 0usize;
        for stream in &streams {
            let s = stream.stats();
            stats.total_occupancy += s.occupancy;
            stats.total_released += s.chunks_released;
            stats.total_dropped += s.chunks_dropped;
            stats.total_overruns += s.producer_overruns;
            stats.total_underruns += s.underruns;
            stats.memory_reserved_bytes += stream.memory_reservation();
            if let Some(avg) = s.avg_latency_ms {
                latency_sum += avg;
                latency_count += 1;
            }
        }
        if latency_count > 0 {
            stats.avg_latency_ms = Some(latency_sum / latency_count as f64);
        }
        stats
    }

    /// Tear down every stream and empty the registry
    pub fn shutdown(&self) {
        let drained: Vec<(StreamKey, Arc<StreamBuffer>)> =
            self.streams.write().drain().collect();
        for (key, stream) in drained {
            stream.shutdown();
            debug!("shut down stream {}", key);
        }
        info!("buffer manager shut down");
    }
}
