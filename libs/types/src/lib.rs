//! # TagRelay Type System
//!
//! ## Purpose
//!
//! Pure data structures shared by the codec, the ingestion pipeline, and the
//! load generator. This crate holds no I/O and no async code: it defines MAC
//! identifiers, the per-tag aggregate record with its merge semantics, and the
//! per-gateway aggregate record that owns the tag records.
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → libs/codec → libs/network
//!     ↑            ↓             ↓
//! Pure Data   Wire Rules     Transport
//! ```
//!
//! ## What This Crate Contains
//! - [`Mac`]: 6-byte device identifier with `aa:bb:cc:dd:ee:ff` text form
//! - [`TagReading`]: per-tag aggregate record and its `merge_from` overlay
//! - [`GatewayRecord`]: per-gateway aggregate with ordered tag list + mac index
//! - [`loss_percentage`]: packet-loss figure used by the merged CSV export
//!
//! ## What This Crate Does NOT Contain
//! - Wire encoding/decoding (belongs in libs/codec)
//! - Socket management or connection handling (belongs in libs/network)

pub mod gateway;
pub mod mac;
pub mod reading;

pub use gateway::GatewayRecord;
pub use mac::{Mac, MacParseError};
pub use reading::{loss_percentage, TagReading};

/// Milliseconds since the unix epoch, the timestamp unit used across all
/// aggregate records.
pub type TimestampMs = u64;
