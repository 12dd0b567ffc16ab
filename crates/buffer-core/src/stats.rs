//! Per-stream and aggregate statistics

use serde::{Deserialize, Serialize};

use crate::types::{AudioQuality, BufferState};

/// Snapshot of one stream's counters and current posture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamStats {
    /// Current lifecycle state
    pub state: BufferState,

    /// Chunks currently queued
    pub occupancy: usize,

    /// Queue depth the controller is aiming for
    pub target_occupancy: usize,

    /// Quality level currently hinted to the producer
    pub quality: AudioQuality,

    /// Total chunks accepted from the producer
    pub chunks_pushed: u64,

    /// Total chunks released to the consumer
    pub chunks_released: u64,

    /// Total chunks dropped (overrun rejections, resize drops, drain discards)
    pub chunks_dropped: u64,

    /// Pushes rejected because the ring was full
    pub producer_overruns: u64,

    /// Pops that found the ring empty while in steady state
    pub underruns: u64,

    /// Mean delivery latency over the window, in milliseconds
    pub avg_latency_ms: Option<f64>,

    /// p95 delivery latency over the window, in milliseconds
    pub p95_latency_ms: Option<f64>,

    /// Window throughput in bytes per second
    pub avg_throughput_bps: Option<f64>,
}

/// Aggregate view across all registered streams
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalStats {
    /// Number of registered streams
    pub active_streams: usize,

    /// Sum of per-stream occupancy
    pub total_occupancy: usize,

    /// Sum of per-stream released chunks
    pub total_released: u64,

    /// Sum of per-stream dropped chunks
    pub total_dropped: u64,

    /// Sum of per-stream producer overruns
    pub total_overruns: u64,

    /// Sum of per-stream underruns
    pub total_underruns: u64,

    /// Mean of per-stream average latencies, where available
    pub avg_latency_ms: Option<f64>,

    /// Memory currently reserved against the global budget, in bytes
    pub memory_reserved_bytes: usize,

    /// Configured global memory budget, in bytes
    pub memory_budget_bytes: usize,
}

/// Internal mutable counters owned by a stream buffer
#[derive(Debug, Default, Clone)]
pub(crate) struct StreamCounters {
    pub chunks_pushed: u64,
    pub chunks_released: u64,
    pub chunks_dropped: u64,
    pub producer_overruns: u64,
    pub underruns: u64,
}
