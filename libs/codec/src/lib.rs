//! # TagRelay Wire Codec
//!
//! ## Purpose
//!
//! This crate contains the "Rules" layer of the TagRelay system: the binary
//! wire protocol spoken by gateway devices. It knows how to decode an inbound
//! buffer into a [`GatewayFrame`] carrying fixed-size [`TagRecord`]s, how the
//! manufacturer discriminant selects between the two incompatible vendor
//! payload layouts, and how to re-encode frames with a freshly computed length
//! and checksum.
//!
//! ## Wire Format
//!
//! All multi-byte integers are big-endian; checksum arithmetic is byte-wise
//! mod 256.
//!
//! ```text
//! GatewayFrame: magic(4)=0x02030405 | length(2) | dev_id(6) | cmd(1) | sn(1)
//!               | flags(1) | data(length-16) | checksum(1)
//! data layout:  count(1) | TagRecord x count
//! TagRecord(38B): mac(6) | declared_len(1) | adv_type(1) | manufacturer(2)
//!                 | payload(27) | rssi(1, signed)
//! ```
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → [codec] → libs/network
//!     ↑           ↓           ↓
//! Pure Data   Wire Rules   Transport
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Network transport logic (belongs in libs/network)
//! - Aggregate state or merge logic (belongs in libs/types / services)

pub mod error;
pub mod frame;
pub mod tag;

pub use error::{ProtocolError, ProtocolResult};
pub use frame::GatewayFrame;
pub use tag::{IotBoxPayload, SotoaPayload, TagPayload, TagRecord};

/// Frame magic constant, first four bytes of every gateway frame.
pub const FRAME_MAGIC: u32 = 0x0203_0405;

/// Fixed bytes of a frame besides the payload: magic(4) + length(2) +
/// dev_id(6) + cmd(1) + sn(1) + flags(1) + checksum(1).
pub const FRAME_OVERHEAD: usize = 16;

/// Every tag record is exactly this many bytes on the wire.
pub const TAG_RECORD_LEN: usize = 38;

/// Vendor payload section of a tag record.
pub const TAG_PAYLOAD_LEN: usize = 27;

/// Manufacturer discriminant for the IotBox payload layout.
pub const MANUFACTURER_IOTBOX: u16 = 0x0D00;

/// Manufacturer discriminant for the Sotoa payload layout.
pub const MANUFACTURER_SOTOA: u16 = 0x0911;

/// Fixed advertisement-type marker byte carried by every tag record.
pub const ADV_TYPE_MARKER: u8 = 0xFF;
