//! # TagRelay Ingestion Service
//!
//! ## Purpose
//!
//! The inbound half of TagRelay: accepts raw gateway traffic over TCP or UDP,
//! offloads decoding to a bounded worker pool, and maintains per-gateway /
//! per-tag aggregate state with merge and rate-tracking semantics.
//!
//! ## Data Flow
//!
//! ```text
//! raw bytes → transport → decode workers → (gateway mac, readings)
//!     → aggregator task → aggregate state → list/tag queries, CSV export
//! ```
//!
//! Decoding runs in parallel on the blocking pool; merges are applied by one
//! aggregator task only, so the aggregate maps never see concurrent writers.
//! The same task runs the one-second flush tick that rotates throughput
//! figures and appends raw packet hex to the per-gateway cache logs.

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod export;
pub mod service;
pub mod worker;

pub use config::IngestOptions;
pub use export::{ExportError, ExportMode, ExportOptions};
pub use service::{GatewaySummary, IngestError, IngestService};
pub use worker::{decode_datagram, DecodedBatch};

/// Current time in milliseconds since the unix epoch.
pub(crate) fn now_ms() -> types::TimestampMs {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
