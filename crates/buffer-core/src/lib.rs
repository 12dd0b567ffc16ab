//! Low-latency adaptive streaming buffer engine
//!
//! This crate is the buffering and pacing layer between a media source
//! (decoder, network fetch, capture, or bridged stream) and an outbound
//! real-time transport. It accepts irregularly produced chunks, holds a
//! bounded per-stream queue, adapts target occupancy and quality from
//! observed delivery latency and throughput, and releases chunks to the
//! transport at a steady cadence.
//!
//! The engine is purely in-memory and has no wire format of its own.
//! Signaling, codecs, packetization, and device capture are external
//! collaborators: producers feed chunks in through
//! [`BufferManager::submit_chunk`], the transport reports delivery
//! timing through [`BufferManager::report_delivery`], and releases and
//! state changes flow out as [`StreamEvent`] callbacks.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use bytes::Bytes;
//! use tgmedia_buffer_core::{
//!     AudioQuality, BufferManager, ChunkKind, ManagerConfig, StreamBufferConfig,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = BufferManager::new(ManagerConfig::default())?;
//! manager.create_stream("chat-42", StreamBufferConfig::default())?;
//!
//! // Producer side: submit chunks as they are decoded.
//! manager.submit_chunk(
//!     "chat-42",
//!     Bytes::from(vec![0u8; 960]),
//!     Duration::from_millis(20),
//!     AudioQuality::High,
//!     ChunkKind::Audio,
//! );
//!
//! // Transport side: report how the last send went.
//! manager.report_delivery("chat-42", Duration::from_millis(35), 960)?;
//! # Ok(())
//! # }
//! ```

pub mod adaptive;
pub mod config;
pub mod error;
pub mod events;
pub mod latency;
pub mod manager;
pub mod ring;
pub mod stats;
pub mod stream;
pub mod types;

pub use adaptive::{AdaptiveQualityController, AdjustmentDirective, AdjustmentReason};
pub use config::{ManagerConfig, StreamBufferConfig};
pub use error::{BufferError, Result};
pub use events::{StreamEvent, StreamEventCallback};
pub use latency::{LatencySnapshot, LatencyTracker};
pub use manager::BufferManager;
pub use ring::ChunkRing;
pub use stats::{GlobalStats, StreamStats};
pub use stream::StreamBuffer;
pub use types::{AudioQuality, BufferState, ChunkKind, MediaChunk, StreamKey};
