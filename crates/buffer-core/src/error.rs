//! Error handling for the buffer engine
//!
//! Per-chunk conditions (overrun, underrun) are reported as events and
//! counters, never as errors; only creation-time and control-surface
//! failures surface through this module.

use thiserror::Error;

/// Result type alias for buffer engine operations
pub type Result<T> = std::result::Result<T, BufferError>;

/// Error type for buffer engine operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// Push rejected because the ring is at its maximum capacity
    #[error("buffer full: {occupancy} of {capacity_max} chunks queued")]
    BufferFull { occupancy: usize, capacity_max: usize },

    /// A stream with this key is already registered
    #[error("stream already exists: {key}")]
    StreamAlreadyExists { key: String },

    /// Creating another stream would exceed the concurrent-stream limit
    #[error("stream capacity exceeded: {active} active, limit {limit}")]
    CapacityExceeded { active: usize, limit: usize },

    /// Creating another stream would exceed the global memory budget
    #[error("memory budget exceeded: {requested} bytes requested, {available} available")]
    MemoryBudgetExceeded { requested: usize, available: usize },

    /// No stream registered under this key
    #[error("stream not found: {key}")]
    StreamNotFound { key: String },

    /// Invalid configuration
    #[error("invalid configuration: {details}")]
    InvalidConfig { details: String },
}
