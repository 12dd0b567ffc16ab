//! Rolling-window latency and throughput estimation
//!
//! Fed by transport delivery reports; read by the adaptive controller.
//! The window is bounded, so derived values never require unbounded
//! history. Throughput is computed from cumulative bytes over cumulative
//! media duration across the window so a single noisy sample cannot
//! dominate the estimate.

use std::collections::VecDeque;
use std::time::Duration;

/// One delivery observation
#[derive(Debug, Clone, Copy)]
struct LatencySample {
    latency_ms: f64,
    bytes: u64,
    duration: Duration,
}

/// Derived view over the current window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySnapshot {
    /// Mean delivery latency in milliseconds
    pub avg_latency_ms: f64,
    /// Latency below which 95% of window samples fall, in milliseconds
    pub p95_latency_ms: f64,
    /// Cumulative-bytes-over-cumulative-duration throughput, bytes/second
    pub avg_throughput_bps: f64,
    /// Number of samples currently in the window
    pub sample_count: usize,
}

/// Rolling-window estimator of end-to-end delay and throughput for one stream
#[derive(Debug)]
pub struct LatencyTracker {
    window: VecDeque<LatencySample>,
    window_size: usize,
}

impl LatencyTracker {
    /// Create a tracker holding at most `window_size` samples
    pub fn new(window_size: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(window_size),
            window_size,
        }
    }

    /// Record a delivery observation, evicting the oldest sample when full
    pub fn record(&mut self, latency: Duration, bytes: u64, duration: Duration) {
        if self.window.len() >= self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(LatencySample {
            latency_ms: latency.as_secs_f64() * 1000.0,
            bytes,
            duration,
        });
    }

    /// Derived statistics over the window
    ///
    /// Returns `None` with fewer than 2 samples; callers must treat that
    /// as "do not adjust yet" rather than fabricating values.
    pub fn snapshot(&self) -> Option<LatencySnapshot> {
        if self.window.len() < 2 {
            return None;
        }

        let count = self.window.len();
        let sum: f64 = self.window.iter().map(|s| s.latency_ms).sum();
        let avg_latency_ms = sum / count as f64;

        let mut sorted: Vec<f64> = self.window.iter().map(|s| s.latency_ms).collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let p95_index = ((count as f64 * 0.95).ceil() as usize).min(count) - 1;
        let p95_latency_ms = sorted[p95_index];

        let total_bytes: u64 = self.window.iter().map(|s| s.bytes).sum();
        let total_duration: Duration = self.window.iter().map(|s| s.duration).sum();
        let avg_throughput_bps = if total_duration.is_zero() {
            0.0
        } else {
            total_bytes as f64 / total_duration.as_secs_f64()
        };

        Some(LatencySnapshot {
            avg_latency_ms,
            p95_latency_ms,
            avg_throughput_bps,
            sample_count: count,
        })
    }

    /// Number of samples currently held
    pub fn sample_count(&self) -> usize {
        self.window.len()
    }

    /// Discard all samples (used when a stream restarts after recovery)
    pub fn reset(&mut self) {
        self.window.clear();
    }
}
