//! # TagRelay Load Generator
//!
//! ## Purpose
//!
//! The outbound half of TagRelay: simulates a fleet of gateways, each
//! relaying synthetic tag advertisements upstream at a configured per-tag
//! rate. Traffic is byte-compatible with real gateway firmware, so the
//! ingestion side cannot tell the difference.
//!
//! ## Data Flow
//!
//! ```text
//! per-tag tick → synthetic record → per-gateway batch (26 records)
//!     → gateway frame → transport send → traffic ledger
//! ```
//!
//! Every tag runs its own interval task; a gateway's tasks share one batch
//! buffer and one client connection. Only frames that were actually sent are
//! reported to the traffic ledger, which mirrors the ingestion side's
//! merge-by-mac view so the two can be compared directly.

pub mod config;
pub mod coordinator;
pub mod service;
pub mod simulator;
pub mod synth;

pub use config::{GeneratorOptions, TagVendor};
pub use coordinator::{GatewayTraffic, SentBatch, TrafficLedger};
pub use service::{GeneratorError, GeneratorService, TrafficSummary};
pub use simulator::GatewayFailure;
pub use synth::{gateway_mac, tag_mac, GeneratorContext};

/// Current time in milliseconds since the unix epoch.
pub(crate) fn now_ms() -> types::TimestampMs {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
