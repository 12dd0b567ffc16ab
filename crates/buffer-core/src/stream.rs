//! Per-stream orchestration: intake, paced release, adaptation
//!
//! A `StreamBuffer` composes one ring, one latency tracker, and one
//! controller, none of which are shared across streams. Release happens
//! on a pacing task that ticks at the current chunk duration; `tick`
//! itself is synchronous so its behavior is directly testable.
//!
//! Per-chunk problems (overrun, underrun) are reported as events and
//! counters and never abort the stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::adaptive::AdaptiveQualityController;
use crate::config::StreamBufferConfig;
use crate::error::Result;
use crate::events::{StreamEvent, StreamEventCallback};
use crate::latency::LatencyTracker;
use crate::ring::ChunkRing;
use crate::stats::{StreamCounters, StreamStats};
use crate::types::{AudioQuality, BufferState, ChunkKind, MediaChunk, StreamKey};

struct StreamInner {
    config: StreamBufferConfig,
    state: BufferState,
    ring: ChunkRing,
    tracker: LatencyTracker,
    controller: AdaptiveQualityController,
    next_sequence: u64,
    target_occupancy: usize,
    chunk_duration: Duration,
    counters: StreamCounters,
    drain_deadline: Option<Instant>,
    last_evaluation: Instant,
}

impl StreamInner {
    fn recovery_threshold(&self) -> usize {
        let threshold =
            (self.target_occupancy as f64 * self.config.recovery_threshold_fraction).ceil();
        (threshold as usize).clamp(1, self.target_occupancy.max(1))
    }

    fn set_state(&mut self, key: &StreamKey, to: BufferState, events: &mut Vec<StreamEvent>) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        debug!("stream {} state changed: {} -> {}", key, from, to);
        events.push(StreamEvent::StateChanged {
            key: key.clone(),
            from,
            to,
        });
    }
}

/// Buffer, pacer, and adaptation loop for a single stream
pub struct StreamBuffer {
    key: StreamKey,
    inner: Mutex<StreamInner>,
    callback: StreamEventCallback,
    pacing_task: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

impl std::fmt::Debug for StreamBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamBuffer")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl StreamBuffer {
    /// Create a stream buffer with a validated configuration
    pub fn new(
        key: StreamKey,
        config: StreamBufferConfig,
        callback: StreamEventCallback,
    ) -> Result<Self> {
        config.validate()?;
        let inner = StreamInner {
            state: BufferState::Idle,
            ring: ChunkRing::new(config.capacity_min, config.capacity_max),
            tracker: LatencyTracker::new(config.latency_window),
            controller: AdaptiveQualityController::new(&config),
            next_sequence: 0,
            target_occupancy: config.initial_target_occupancy,
            chunk_duration: config.initial_chunk_duration,
            counters: StreamCounters::default(),
            drain_deadline: None,
            last_evaluation: Instant::now(),
            config,
        };
        Ok(Self {
            key,
            inner: Mutex::new(inner),
            callback,
            pacing_task: Mutex::new(None),
            running: AtomicBool::new(false),
        })
    }

    /// Stream key this buffer is registered under
    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    /// Current lifecycle state
    pub fn state(&self) -> BufferState {
        self.inner.lock().state
    }

    /// Chunks currently queued
    pub fn occupancy(&self) -> usize {
        self.inner.lock().ring.occupancy()
    }

    /// Queue depth the controller is currently aiming for
    pub fn target_occupancy(&self) -> usize {
        self.inner.lock().target_occupancy
    }

    /// Current pacing cadence / nominal chunk duration
    pub fn chunk_duration(&self) -> Duration {
        self.inner.lock().chunk_duration
    }

    /// Quality hint the producer should use for subsequent chunks
    pub fn quality_hint(&self) -> AudioQuality {
        self.inner.lock().controller.quality()
    }

    /// Memory reserved against the manager-wide budget
    pub fn memory_reservation(&self) -> usize {
        self.inner.lock().config.memory_reservation()
    }

    /// Start the pacing task and begin filling
    pub fn start(self: Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.activate();

        let stream = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            loop {
                let interval = stream.chunk_duration();
                tokio::time::sleep(interval).await;
                if !stream.running.load(Ordering::SeqCst) {
                    break;
                }
                if stream.tick() {
                    break;
                }
            }
            debug!("pacing task for stream {} exited", stream.key);
        });
        *self.pacing_task.lock() = Some(handle);
    }

    /// Transition Idle -> Filling (no-op in any other state)
    fn activate(&self) {
        let mut events = Vec::new();
        {
            let mut inner = self.inner.lock();
            if inner.state == BufferState::Idle {
                inner.set_state(&self.key, BufferState::Filling, &mut events);
            }
        }
        self.dispatch(events);
    }

    /// Submit a produced payload
    ///
    /// The buffer stamps the sequence number and production timestamp.
    /// Returns `true` when the chunk was queued. A full ring drops the
    /// incoming chunk (never queued data) and reports a producer
    /// overrun; a stream that is draining or stopped rejects quietly.
    pub fn push(
        &self,
        payload: Bytes,
        duration: Duration,
        quality: AudioQuality,
        kind: ChunkKind,
    ) -> bool {
        let mut events = Vec::new();
        let accepted = {
            let mut inner = self.inner.lock();
            match inner.state {
                BufferState::Idle | BufferState::Draining | BufferState::Stopped => {
                    debug!(
                        "stream {} rejecting push in state {}",
                        self.key, inner.state
                    );
                    false
                }
                BufferState::Filling | BufferState::Steady | BufferState::Recovering => {
                    let sequence = inner.next_sequence;
                    let chunk = MediaChunk::new(sequence, payload, duration, quality, kind);
                    match inner.ring.push(chunk) {
                        Err(_) => {
                            inner.counters.producer_overruns += 1;
                            inner.counters.chunks_dropped += 1;
                            warn!(
                                "stream {} producer overrun at occupancy {}",
                                self.key,
                                inner.ring.occupancy()
                            );
                            events.push(StreamEvent::ProducerOverrun {
                                key: self.key.clone(),
                            });
                            false
                        }
                        Ok(()) => {
                            inner.next_sequence += 1;
                            inner.counters.chunks_pushed += 1;
                            self.check_refill_transitions(&mut inner, &mut events);
                            true
                        }
                    }
                }
            }
        };
        self.dispatch(events);
        accepted
    }

    /// Take the next chunk in sequence order
    ///
    /// Only releases in `Steady` or `Draining`. An empty pop in
    /// `Steady` transitions to `Recovering` and reports a stall; the
    /// consumer is expected to cover the gap by its own policy.
    pub fn pop(&self) -> Option<MediaChunk> {
        let mut events = Vec::new();
        let chunk = {
            let mut inner = self.inner.lock();
            self.pop_locked(&mut inner, &mut events)
        };
        self.dispatch(events);
        chunk
    }

    fn pop_locked(
        &self,
        inner: &mut StreamInner,
        events: &mut Vec<StreamEvent>,
    ) -> Option<MediaChunk> {
        match inner.state {
            BufferState::Steady => match inner.ring.pop() {
                Some(chunk) => {
                    inner.counters.chunks_released += 1;
                    Some(chunk)
                }
                None => {
                    inner.counters.underruns += 1;
                    warn!("stream {} underrun, entering recovery", self.key);
                    inner.set_state(&self.key, BufferState::Recovering, events);
                    events.push(StreamEvent::Stalled {
                        key: self.key.clone(),
                    });
                    None
                }
            },
            BufferState::Draining => {
                let chunk = inner.ring.pop();
                if chunk.is_some() {
                    inner.counters.chunks_released += 1;
                }
                chunk
            }
            _ => None,
        }
    }

    /// One pacing cycle: release at most one chunk, then adapt on the
    /// slower evaluation cadence. Returns `true` once the stream has
    /// reached its terminal state.
    pub fn tick(&self) -> bool {
        let mut events = Vec::new();
        let terminal = {
            let mut inner = self.inner.lock();
            match inner.state {
                BufferState::Stopped => true,
                BufferState::Idle => false,
                BufferState::Draining => {
                    self.tick_draining(&mut inner, &mut events);
                    inner.state == BufferState::Stopped
                }
                BufferState::Steady => {
                    if let Some(chunk) = self.pop_locked(&mut inner, &mut events) {
                        events.push(StreamEvent::ChunkReady {
                            key: self.key.clone(),
                            chunk,
                        });
                    }
                    self.maybe_adapt(&mut inner, &mut events);
                    false
                }
                BufferState::Filling | BufferState::Recovering => {
                    // No release while building depth back up.
                    self.maybe_adapt(&mut inner, &mut events);
                    false
                }
            }
        };
        self.dispatch(events);
        terminal
    }

    fn tick_draining(&self, inner: &mut StreamInner, events: &mut Vec<StreamEvent>) {
        let deadline_passed = inner
            .drain_deadline
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false);

        if deadline_passed {
            let discarded = inner.ring.clear();
            inner.counters.chunks_dropped += discarded as u64;
            if discarded > 0 {
                warn!(
                    "stream {} drain timeout, discarding {} chunks",
                    self.key, discarded
                );
            }
            inner.set_state(&self.key, BufferState::Stopped, events);
            events.push(StreamEvent::Drained {
                key: self.key.clone(),
                discarded,
            });
            return;
        }

        if let Some(chunk) = self.pop_locked(inner, events) {
            events.push(StreamEvent::ChunkReady {
                key: self.key.clone(),
                chunk,
            });
        }
        if inner.ring.is_empty() {
            inner.set_state(&self.key, BufferState::Stopped, events);
            events.push(StreamEvent::Drained {
                key: self.key.clone(),
                discarded: 0,
            });
        }
    }

    /// Consult the controller on the decoupled evaluation cadence
    fn maybe_adapt(&self, inner: &mut StreamInner, events: &mut Vec<StreamEvent>) {
        let evaluation_interval = inner.config.adjustment_cooldown / 2;
        if inner.last_evaluation.elapsed() < evaluation_interval {
            return;
        }
        inner.last_evaluation = Instant::now();

        let Some(snapshot) = inner.tracker.snapshot() else {
            // Insufficient data: do not adjust yet.
            return;
        };

        let previous_quality = inner.controller.quality();
        let occupancy = inner.ring.occupancy();
        if let Some(directive) = inner.controller.evaluate(&snapshot, occupancy) {
            inner.target_occupancy = directive
                .target_occupancy
                .clamp(inner.ring.capacity_min(), inner.ring.capacity_max());
            inner.chunk_duration = directive.chunk_duration;

            if directive.quality != previous_quality {
                events.push(StreamEvent::QualityChanged {
                    key: self.key.clone(),
                    quality: directive.quality,
                });
            }
            // A lowered target can complete a pending fill or recovery.
            self.check_refill_transitions(inner, events);
        }
    }

    fn check_refill_transitions(&self, inner: &mut StreamInner, events: &mut Vec<StreamEvent>) {
        let occupancy = inner.ring.occupancy();
        match inner.state {
            BufferState::Filling if occupancy >= inner.target_occupancy => {
                inner.set_state(&self.key, BufferState::Steady, events);
            }
            BufferState::Recovering if occupancy >= inner.recovery_threshold() => {
                // Stale pre-stall samples would skew the next adaptation.
                inner.tracker.reset();
                inner.set_state(&self.key, BufferState::Steady, events);
                events.push(StreamEvent::Resumed {
                    key: self.key.clone(),
                });
            }
            _ => {}
        }
    }

    /// Transport feedback after an actual send; sole input to the tracker
    pub fn report_delivery(&self, latency: Duration, bytes: u64) {
        let mut inner = self.inner.lock();
        let duration = inner.chunk_duration;
        inner.tracker.record(latency, bytes, duration);
    }

    /// Request a cooperative stop
    ///
    /// Already-queued chunks keep draining at the pacing cadence; new
    /// pushes are rejected. After `drain_timeout` the remainder is
    /// discarded and reported. Idempotent.
    pub fn stop(&self, drain_timeout: Duration) {
        let mut events = Vec::new();
        {
            let mut inner = self.inner.lock();
            match inner.state {
                BufferState::Idle => {
                    inner.set_state(&self.key, BufferState::Stopped, &mut events);
                }
                BufferState::Filling | BufferState::Steady | BufferState::Recovering => {
                    inner.drain_deadline = Some(Instant::now() + drain_timeout);
                    inner.set_state(&self.key, BufferState::Draining, &mut events);
                }
                BufferState::Draining | BufferState::Stopped => {}
            }
        }
        self.dispatch(events);
    }

    /// Force immediate teardown, freeing all queued chunks
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.pacing_task.lock().take() {
            handle.abort();
        }

        let mut events = Vec::new();
        {
            let mut inner = self.inner.lock();
            let discarded = inner.ring.clear();
            inner.counters.chunks_dropped += discarded as u64;
            inner.set_state(&self.key, BufferState::Stopped, &mut events);
            if discarded > 0 {
                events.push(StreamEvent::Drained {
                    key: self.key.clone(),
                    discarded,
                });
            }
        }
        self.dispatch(events);
    }

    /// Adjust ring capacity bounds
    ///
    /// Out-of-range requests are clamped rather than rejected. Returns
    /// the number of oldest chunks dropped to fit the new maximum; the
    /// same count is reported as a `ChunksDropped` event.
    pub fn resize(&self, new_min: usize, new_max: usize) -> usize {
        let mut events = Vec::new();
        let dropped = {
            let mut inner = self.inner.lock();
            let new_min = new_min.max(1);
            let new_max = new_max.max(new_min);
            let dropped = inner.ring.resize(new_min, new_max);
            inner.counters.chunks_dropped += dropped as u64;
            inner.target_occupancy = inner.target_occupancy.clamp(new_min, new_max);
            if dropped > 0 {
                events.push(StreamEvent::ChunksDropped {
                    key: self.key.clone(),
                    dropped,
                });
            }
            dropped
        };
        self.dispatch(events);
        dropped
    }

    /// Snapshot of counters and current posture
    pub fn stats(&self) -> StreamStats {
        let inner = self.inner.lock();
        let snapshot = inner.tracker.snapshot();
        StreamStats {
            state: inner.state,
            occupancy: inner.ring.occupancy(),
            target_occupancy: inner.target_occupancy,
            quality: inner.controller.quality(),
            chunks_pushed: inner.counters.chunks_pushed,
            chunks_released: inner.counters.chunks_released,
            chunks_dropped: inner.counters.chunks_dropped,
            producer_overruns: inner.counters.producer_overruns,
            underruns: inner.counters.underruns,
            avg_latency_ms: snapshot.map(|s| s.avg_latency_ms),
            p95_latency_ms: snapshot.map(|s| s.p95_latency_ms),
            avg_throughput_bps: snapshot.map(|s| s.avg_throughput_bps),
        }
    }

    fn dispatch(&self, events: Vec<StreamEvent>) {
        for event in events {
            (self.callback)(event);
        }
    }
}

impl Drop for StreamBuffer {
    fn drop(&mut self) {
        if let Some(handle) = self.pacing_task.lock().take() {
            handle.abort();
        }
    }
}
