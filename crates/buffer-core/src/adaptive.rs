//! Adaptive occupancy and quality control
//!
//! Per-stream policy engine. It reads latency-tracker snapshots and
//! issues directives; it never touches the ring directly. Adjustments
//! are cooldown-limited to avoid hunting between levels, with one
//! exception: an impending underrun bypasses the cooldown.
//!
//! Signal precedence when latency and throughput disagree: throughput
//! drives quality decisions, latency drives occupancy decisions.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::StreamBufferConfig;
use crate::latency::LatencySnapshot;
use crate::types::AudioQuality;

/// Consecutive clean evaluations required before growing the buffer or
/// stepping quality up.
const SUSTAINED_GOOD_CYCLES: u32 = 3;

/// Fraction of the average-latency ceiling considered "comfortably below".
const COMFORT_FRACTION: f64 = 0.7;

/// Throughput must fall below this fraction of the previous estimate to
/// count as a downward trend.
const FALLING_TREND_FRACTION: f64 = 0.9;

/// Chunk-duration step applied when degrading or restoring.
const CHUNK_DURATION_STEP: Duration = Duration::from_millis(5);

/// Smallest chunk duration the controller will request.
const MIN_CHUNK_DURATION: Duration = Duration::from_millis(10);

/// Why a directive was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustmentReason {
    /// Occupancy is draining toward empty faster than production refills
    ImpendingUnderrun,
    /// p95 latency exceeded its ceiling
    TailLatency,
    /// Throughput fell while latency was acceptable
    ThroughputDrop,
    /// Latency and throughput have been good for a sustained window
    SustainedGood,
}

/// Adjustment decision consumed by the stream buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdjustmentDirective {
    /// Queue depth the stream should aim to hold
    pub target_occupancy: usize,
    /// Chunk duration (and pacing cadence) to produce at
    pub chunk_duration: Duration,
    /// Quality level the producer should use for subsequent chunks
    pub quality: AudioQuality,
    /// What triggered the change
    pub reason: AdjustmentReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ThroughputTrend {
    Falling,
    Stable,
    Improving,
}

/// Per-stream policy engine deciding target occupancy, chunk duration,
/// and quality hints
#[derive(Debug)]
pub struct AdaptiveQualityController {
    capacity_min: usize,
    capacity_max: usize,
    target_occupancy: usize,
    chunk_duration: Duration,
    initial_chunk_duration: Duration,
    quality: AudioQuality,
    avg_ceiling_ms: f64,
    p95_ceiling_ms: f64,
    cooldown: Duration,
    underrun_threshold: usize,
    last_adjustment: Option<Instant>,
    last_throughput_bps: Option<f64>,
    good_cycles: u32,
}

impl AdaptiveQualityController {
    /// Create a controller seeded from the stream configuration
    pub fn new(config: &StreamBufferConfig) -> Self {
        Self {
            capacity_min: config.capacity_min,
            capacity_max: config.capacity_max,
            target_occupancy: config.initial_target_occupancy,
            chunk_duration: config.initial_chunk_duration,
            initial_chunk_duration: config.initial_chunk_duration,
            quality: config.initial_quality,
            avg_ceiling_ms: config.max_latency_ceiling.as_secs_f64() * 1000.0,
            p95_ceiling_ms: config.p95_latency_ceiling.as_secs_f64() * 1000.0,
            cooldown: config.adjustment_cooldown,
            underrun_threshold: config.underrun_threshold,
            last_adjustment: None,
            last_throughput_bps: None,
            good_cycles: 0,
        }
    }

    /// Current target queue depth
    pub fn target_occupancy(&self) -> usize {
        self.target_occupancy
    }

    /// Current chunk duration
    pub fn chunk_duration(&self) -> Duration {
        self.chunk_duration
    }

    /// Current quality hint
    pub fn quality(&self) -> AudioQuality {
        self.quality
    }

    /// Evaluate the latest snapshot against current occupancy
    ///
    /// Returns `None` when rate-limited or when no change is warranted.
    /// The returned directive has already been applied to the
    /// controller's own state.
    pub fn evaluate(
        &mut self,
        snapshot: &LatencySnapshot,
        occupancy: usize,
    ) -> Option<AdjustmentDirective> {
        let trend = self.classify_trend(snapshot.avg_throughput_bps);
        self.last_throughput_bps = Some(snapshot.avg_throughput_bps);

        let urgent =
            occupancy <= self.underrun_threshold && occupancy < self.target_occupancy;

        if !urgent && !self.cooldown_elapsed() {
            return None;
        }

        let prev_target = self.target_occupancy;
        let prev_quality = self.quality;
        let prev_duration = self.chunk_duration;

        let reason = if urgent {
            // Underrun avoidance overrides the normal cooldown: shed load
            // now so production can catch up.
            self.step_target_down();
            self.quality = self.quality.step_down();
            self.reduce_chunk_duration();
            self.good_cycles = 0;
            AdjustmentReason::ImpendingUnderrun
        } else if snapshot.p95_latency_ms > self.p95_ceiling_ms {
            // Tail spike: trade buffer depth for responsiveness.
            self.step_target_down();
            if trend == ThroughputTrend::Falling {
                self.quality = self.quality.step_down();
                self.reduce_chunk_duration();
            }
            self.good_cycles = 0;
            AdjustmentReason::TailLatency
        } else if snapshot.avg_latency_ms < self.avg_ceiling_ms * COMFORT_FRACTION {
            if trend == ThroughputTrend::Falling {
                // Latency looks fine but the pipe is narrowing; quality
                // follows throughput.
                self.quality = self.quality.step_down();
                self.good_cycles = 0;
                AdjustmentReason::ThroughputDrop
            } else {
                self.good_cycles += 1;
                if self.good_cycles < SUSTAINED_GOOD_CYCLES {
                    return None;
                }
                self.step_target_up();
                self.quality = self.quality.step_up();
                self.restore_chunk_duration();
                self.good_cycles = 0;
                AdjustmentReason::SustainedGood
            }
        } else {
            // Neither violating nor comfortable: hold position.
            self.good_cycles = 0;
            return None;
        };

        if self.target_occupancy == prev_target
            && self.quality == prev_quality
            && self.chunk_duration == prev_duration
        {
            // Already pinned at the relevant bound.
            return None;
        }

        self.last_adjustment = Some(Instant::now());
        debug!(
            "adjustment ({:?}): target {} -> {}, quality {} -> {}, chunk {:?} -> {:?}",
            reason,
            prev_target,
            self.target_occupancy,
            prev_quality,
            self.quality,
            prev_duration,
            self.chunk_duration
        );

        Some(AdjustmentDirective {
            target_occupancy: self.target_occupancy,
            chunk_duration: self.chunk_duration,
            quality: self.quality,
            reason,
        })
    }

    fn classify_trend(&self, throughput_bps: f64) -> ThroughputTrend {
        match self.last_throughput_bps {
            None => ThroughputTrend::Stable,
            Some(prev) if prev <= f64::EPSILON => ThroughputTrend::Stable,
            Some(prev) => {
                if throughput_bps < prev * FALLING_TREND_FRACTION {
                    ThroughputTrend::Falling
                } else if throughput_bps > prev {
                    ThroughputTrend::Improving
                } else {
                    ThroughputTrend::Stable
                }
            }
        }
    }

    fn cooldown_elapsed(&self) -> bool {
        match self.last_adjustment {
            None => true,
            Some(at) => at.elapsed() >= self.cooldown,
        }
    }

    fn occupancy_step(&self) -> usize {
        ((self.capacity_max - self.capacity_min) / 4).max(1)
    }

    fn step_target_down(&mut self) {
        self.target_occupancy = self
            .target_occupancy
            .saturating_sub(self.occupancy_step())
            .max(self.capacity_min);
    }

    fn step_target_up(&mut self) {
        self.target_occupancy =
            (self.target_occupancy + self.occupancy_step()).min(self.capacity_max);
    }

    fn reduce_chunk_duration(&mut self) {
        self.chunk_duration = self
            .chunk_duration
            .saturating_sub(CHUNK_DURATION_STEP)
            .max(MIN_CHUNK_DURATION);
    }

    fn restore_chunk_duration(&mut self) {
        self.chunk_duration =
            (self.chunk_duration + CHUNK_DURATION_STEP).min(self.initial_chunk_duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StreamBufferConfig {
        StreamBufferConfig {
            capacity_min: 5,
            capacity_max: 30,
            initial_target_occupancy: 15,
            adjustment_cooldown: Duration::from_millis(100),
            ..Default::default()
        }
    }

    fn snapshot(avg_ms: f64, p95_ms: f64, throughput: f64) -> LatencySnapshot {
        LatencySnapshot {
            avg_latency_ms: avg_ms,
            p95_latency_ms: p95_ms,
            avg_throughput_bps: throughput,
            sample_count: 10,
        }
    }

    #[test]
    fn tail_latency_violation_reacts_within_one_cycle() {
        let mut controller = AdaptiveQualityController::new(&config());
        let directive = controller
            .evaluate(&snapshot(50.0, 400.0, 10_000.0), 15)
            .expect("directive expected");
        assert_eq!(directive.reason, AdjustmentReason::TailLatency);
        assert!(directive.target_occupancy < 15);
    }

    #[test]
    fn cooldown_limits_to_one_change() {
        let mut controller = AdaptiveQualityController::new(&config());
        assert!(controller
            .evaluate(&snapshot(50.0, 400.0, 10_000.0), 15)
            .is_some());
        // Second violation inside the cooldown window is suppressed.
        assert!(controller
            .evaluate(&snapshot(50.0, 400.0, 10_000.0), 15)
            .is_none());
    }

    #[test]
    fn impending_underrun_bypasses_cooldown() {
        let mut controller = AdaptiveQualityController::new(&config());
        assert!(controller
            .evaluate(&snapshot(50.0, 400.0, 10_000.0), 15)
            .is_some());

        let directive = controller
            .evaluate(&snapshot(50.0, 50.0, 10_000.0), 2)
            .expect("underrun override must not be rate-limited");
        assert_eq!(directive.reason, AdjustmentReason::ImpendingUnderrun);
        assert!(directive.quality < AudioQuality::High);
    }

    #[test]
    fn sustained_good_conditions_never_decrease_target() {
        let mut controller = AdaptiveQualityController::new(&config());
        let mut last_target = controller.target_occupancy();

        for _ in 0..20 {
            if let Some(directive) = controller.evaluate(&snapshot(20.0, 40.0, 10_000.0), 15) {
                assert!(directive.target_occupancy >= last_target);
                last_target = directive.target_occupancy;
            }
            // Step past the cooldown between evaluations.
            controller.last_adjustment =
                controller.last_adjustment.map(|at| at - Duration::from_secs(1));
        }
        assert!(last_target <= 30);
    }

    #[test]
    fn quality_moves_one_step_per_directive() {
        let mut controller = AdaptiveQualityController::new(&config());
        // Three good cycles earn a single upgrade step.
        assert!(controller.evaluate(&snapshot(20.0, 40.0, 10_000.0), 15).is_none());
        assert!(controller.evaluate(&snapshot(20.0, 40.0, 10_000.0), 15).is_none());
        let directive = controller
            .evaluate(&snapshot(20.0, 40.0, 10_000.0), 15)
            .expect("third good cycle should adjust");
        assert_eq!(directive.quality, AudioQuality::Ultra);
        assert_eq!(directive.reason, AdjustmentReason::SustainedGood);
    }

    #[test]
    fn falling_throughput_downgrades_quality_despite_low_latency() {
        let mut controller = AdaptiveQualityController::new(&config());
        // Establish a throughput baseline.
        assert!(controller.evaluate(&snapshot(20.0, 40.0, 100_000.0), 15).is_none());
        controller.last_adjustment = None;

        let directive = controller
            .evaluate(&snapshot(20.0, 40.0, 50_000.0), 15)
            .expect("throughput drop should adjust");
        assert_eq!(directive.reason, AdjustmentReason::ThroughputDrop);
        assert_eq!(directive.quality, AudioQuality::Medium);
        // Occupancy decisions follow latency, which is fine here.
        assert_eq!(directive.target_occupancy, 15);
    }

    #[test]
    fn no_directive_when_pinned_at_bounds() {
        let mut controller = AdaptiveQualityController::new(&StreamBufferConfig {
            capacity_min: 5,
            capacity_max: 30,
            initial_target_occupancy: 5,
            initial_quality: AudioQuality::Low,
            initial_chunk_duration: Duration::from_millis(10),
            ..Default::default()
        });
        // Tail violation with stable throughput: target already at the
        // minimum, quality untouched, so nothing changes.
        assert!(controller
            .evaluate(&snapshot(50.0, 400.0, 10_000.0), 5)
            .is_none());
    }

    #[test]
    fn middling_conditions_hold_position() {
        let mut controller = AdaptiveQualityController::new(&config());
        // Between comfort and ceiling: no adjustment either way.
        assert!(controller.evaluate(&snapshot(90.0, 120.0, 10_000.0), 15).is_none());
        assert_eq!(controller.target_occupancy(), 15);
        assert_eq!(controller.quality(), AudioQuality::High);
    }
}
