//! Synthetic device identity and payload generation.
//!
//! Macs are derived, not random: the configured 2-byte prefix followed by the
//! device index in big-endian, so a run's device population is deterministic
//! and repeatable. Gateway macs and tag macs are distinct namespaces that can
//! overlap (gateway 0 and tag (0, 0) share a mac, as real deployments key them
//! in separate tables). Sensor values are random within the ranges real
//! firmware produces.

use crate::config::TagVendor;
use byteorder::{BigEndian, ByteOrder};
use codec::{IotBoxPayload, SotoaPayload, TagPayload, TagRecord, ADV_TYPE_MARKER};
use codec::{MANUFACTURER_IOTBOX, MANUFACTURER_SOTOA};
use rand::Rng;
use std::sync::atomic::{AtomicU8, Ordering};
use types::Mac;

/// Fixed 20-byte filler real IotBox firmware puts after the crc.
const IOTBOX_RESERVED: [u8; 20] = [
    0x2F, 0x61, 0xAC, 0xCC, 0x27, 0x45, 0x67, 0xF7, 0xDB, 0x34, 0xC4, 0x03, 0x8E, 0x5C, 0x0B,
    0xAA, 0x97, 0x30, 0x56, 0xE6,
];

/// Declared length byte every IotBox advertisement carries.
const IOTBOX_DECLARED_LEN: u8 = 0x1E;

/// Bytes of Sotoa vendor data the generator fills.
const SOTOA_DATA_LEN: usize = 15;

/// Mac of a simulated gateway: prefix then the gateway index.
pub fn gateway_mac(prefix: u16, index: u32) -> Mac {
    let mut bytes = [0u8; 6];
    BigEndian::write_u16(&mut bytes[0..2], prefix);
    BigEndian::write_u32(&mut bytes[2..6], index);
    Mac(bytes)
}

/// Mac of a simulated tag: prefix, then gateway index, then tag index.
pub fn tag_mac(prefix: u16, gateway_index: u16, tag_index: u16) -> Mac {
    let mut bytes = [0u8; 6];
    BigEndian::write_u16(&mut bytes[0..2], prefix);
    BigEndian::write_u16(&mut bytes[2..4], gateway_index);
    BigEndian::write_u16(&mut bytes[4..6], tag_index);
    Mac(bytes)
}

/// Sequence counters scoped to one generator run.
///
/// Shared by every task of the run and dropped with it, so back-to-back runs
/// restart from zero and runs never bleed into each other.
#[derive(Debug, Default)]
pub struct GeneratorContext {
    frame_sequence: AtomicU8,
}

impl GeneratorContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next frame sequence byte, wrapping at 255.
    pub fn next_frame_sequence(&self) -> u8 {
        self.frame_sequence.fetch_add(1, Ordering::Relaxed)
    }
}

/// Build one synthetic advertisement for the given tag.
///
/// `sotoa_sequence` is the per-gateway reading counter; IotBox records ignore
/// it.
pub fn synth_record<R: Rng>(
    vendor: TagVendor,
    mac: Mac,
    rng: &mut R,
    sotoa_sequence: u8,
) -> TagRecord {
    match vendor {
        TagVendor::IotBox => TagRecord {
            mac,
            declared_length: IOTBOX_DECLARED_LEN,
            adv_type: ADV_TYPE_MARKER,
            manufacturer_id: MANUFACTURER_IOTBOX,
            payload: TagPayload::IotBox(IotBoxPayload {
                package_id: 0x04,
                command: rng.gen_range(0x09..=0x0F),
                user_data: [rng.gen(), rng.gen(), rng.gen()],
                crc: 0x00,
                reserved: IOTBOX_RESERVED,
            }),
            rssi: rng.gen(),
        },
        TagVendor::Sotoa => {
            let data = vec![
                1,                        // firmware version
                1,                        // hardware version
                rng.gen_range(0..=100),   // battery percent
                rng.gen_range(100..=230), // body temperature
                rng.gen(),                // status bits
                rng.gen(),                // heart rate
                rng.gen(),                // blood pressure high
                rng.gen(),                // blood pressure low
                rng.gen(),                // blood oxygen
                rng.gen(),                // step count high
                rng.gen(),                // step count low
                rng.gen_range(0..=2),     // sleep state
                rng.gen(),                // deep sleep
                rng.gen(),                // light sleep
                sotoa_sequence,
            ];
            TagRecord {
                mac,
                declared_length: (data.len() + 8) as u8,
                adv_type: ADV_TYPE_MARKER,
                manufacturer_id: MANUFACTURER_SOTOA,
                payload: TagPayload::Sotoa(SotoaPayload {
                    private_num: 0x1000,
                    event: 0x01,
                    kind: 0x01,
                    data,
                }),
                rssi: rng.gen(),
            }
        }
    }
}
