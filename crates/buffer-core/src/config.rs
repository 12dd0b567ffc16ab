//! Buffer engine configuration
//!
//! Both config structs validate on use and reject unknown keys when
//! deserialized; a silently ignored option is treated as a caller bug.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BufferError, Result};
use crate::types::AudioQuality;

/// Per-stream buffer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamBufferConfig {
    /// Minimum queue depth in chunks
    pub capacity_min: usize,

    /// Maximum queue depth in chunks; pushes beyond this are rejected
    pub capacity_max: usize,

    /// Queue depth the controller aims for at stream start
    pub initial_target_occupancy: usize,

    /// Nominal playback duration of one chunk; also the pacing cadence
    pub initial_chunk_duration: Duration,

    /// Quality level to start producing at
    pub initial_quality: AudioQuality,

    /// Average-latency ceiling the controller adapts against
    pub max_latency_ceiling: Duration,

    /// Stricter ceiling applied to p95 latency to catch tail spikes
    pub p95_latency_ceiling: Duration,

    /// Minimum interval between adaptation changes (underrun override excepted)
    pub adjustment_cooldown: Duration,

    /// Fraction of target occupancy that must refill before a recovering
    /// stream resumes release, in (0, 1]
    pub recovery_threshold_fraction: f64,

    /// Occupancy at or below which an underrun is considered impending
    pub underrun_threshold: usize,

    /// Upper bound on a single chunk payload, used for memory accounting
    pub max_chunk_bytes: usize,

    /// Number of delivery samples kept in the latency window
    pub latency_window: usize,
}

impl Default for StreamBufferConfig {
    fn default() -> Self {
        Self {
            capacity_min: 5,
            capacity_max: 50,
            initial_target_occupancy: 20,
            initial_chunk_duration: Duration::from_millis(20),
            initial_quality: AudioQuality::High,
            max_latency_ceiling: Duration::from_millis(100),
            p95_latency_ceiling: Duration::from_millis(150),
            adjustment_cooldown: Duration::from_millis(500),
            recovery_threshold_fraction: 0.5,
            underrun_threshold: 3,
            max_chunk_bytes: 4096,
            latency_window: 50,
        }
    }
}

impl StreamBufferConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.capacity_min == 0 {
            return Err(BufferError::InvalidConfig {
                details: "capacity_min must be at least 1".to_string(),
            });
        }
        if self.capacity_min > self.capacity_max {
            return Err(BufferError::InvalidConfig {
                details: format!(
                    "capacity_min ({}) exceeds capacity_max ({})",
                    self.capacity_min, self.capacity_max
                ),
            });
        }
        if self.initial_target_occupancy < self.capacity_min
            || self.initial_target_occupancy > self.capacity_max
        {
            return Err(BufferError::InvalidConfig {
                details: format!(
                    "initial_target_occupancy ({}) outside [{}, {}]",
                    self.initial_target_occupancy, self.capacity_min, self.capacity_max
                ),
            });
        }
        if self.initial_chunk_duration.is_zero() {
            return Err(BufferError::InvalidConfig {
                details: "initial_chunk_duration must be non-zero".to_string(),
            });
        }
        if self.max_latency_ceiling.is_zero() || self.p95_latency_ceiling.is_zero() {
            return Err(BufferError::InvalidConfig {
                details: "latency ceilings must be non-zero".to_string(),
            });
        }
        if !(self.recovery_threshold_fraction > 0.0 && self.recovery_threshold_fraction <= 1.0) {
            return Err(BufferError::InvalidConfig {
                details: format!(
                    "recovery_threshold_fraction ({}) outside (0, 1]",
                    self.recovery_threshold_fraction
                ),
            });
        }
        if self.max_chunk_bytes == 0 {
            return Err(BufferError::InvalidConfig {
                details: "max_chunk_bytes must be non-zero".to_string(),
            });
        }
        if self.latency_window < 2 {
            return Err(BufferError::InvalidConfig {
                details: "latency_window must hold at least 2 samples".to_string(),
            });
        }
        Ok(())
    }

    /// Memory this stream reserves against the manager-wide budget
    pub fn memory_reservation(&self) -> usize {
        self.capacity_max * self.max_chunk_bytes
    }
}

/// Manager-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManagerConfig {
    /// Maximum number of concurrently registered streams
    pub max_concurrent_streams: usize,

    /// Global memory budget covering all streams' reserved capacity
    pub max_memory_bytes: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_streams: 10,
            max_memory_bytes: 512 * 1024 * 1024,
        }
    }
}

impl ManagerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_streams == 0 {
            return Err(BufferError::InvalidConfig {
                details: "max_concurrent_streams must be at least 1".to_string(),
            });
        }
        if self.max_memory_bytes == 0 {
            return Err(BufferError::InvalidConfig {
                details: "max_memory_bytes must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(StreamBufferConfig::default().validate().is_ok());
        assert!(ManagerConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_capacities() {
        let config = StreamBufferConfig {
            capacity_min: 30,
            capacity_max: 10,
            initial_target_occupancy: 30,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BufferError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn rejects_zero_capacity_min() {
        let config = StreamBufferConfig {
            capacity_min: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_target_outside_bounds() {
        let config = StreamBufferConfig {
            initial_target_occupancy: 100,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_recovery_fraction() {
        for fraction in [0.0, -0.5, 1.5] {
            let config = StreamBufferConfig {
                recovery_threshold_fraction: fraction,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "fraction {fraction} accepted");
        }
    }

    #[test]
    fn rejects_unknown_keys() {
        let json = r#"{
            "max_concurrent_streams": 4,
            "max_memory_bytes": 1048576,
            "turbo_mode": true
        }"#;
        let parsed: std::result::Result<ManagerConfig, _> = serde_json::from_str(json);
        assert!(parsed.is_err());
    }

    #[test]
    fn memory_reservation_scales_with_capacity() {
        let config = StreamBufferConfig {
            capacity_max: 30,
            max_chunk_bytes: 1000,
            ..Default::default()
        };
        assert_eq!(config.memory_reservation(), 30_000);
    }
}
