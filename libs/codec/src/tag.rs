//! Tag record codec and vendor payload dispatch.
//!
//! Every tag record is exactly 38 bytes on the wire; the length check here is
//! the sole place truncated or garbled datagram contents get filtered. The
//! 2-byte manufacturer discriminant selects the payload layout once, at decode
//! time - downstream consumers match on [`TagPayload`] and never re-inspect
//! raw bytes. Unknown manufacturers do not fail decode: their 27 payload bytes
//! are stored verbatim so re-encode is byte-identical (forward compatibility
//! with unseen tag types).

use crate::error::{ProtocolError, ProtocolResult};
use crate::{MANUFACTURER_IOTBOX, MANUFACTURER_SOTOA, TAG_PAYLOAD_LEN, TAG_RECORD_LEN};
use byteorder::{BigEndian, ByteOrder};
use types::{Mac, TagReading, TimestampMs};

/// One fixed-size tag record inside a gateway frame's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRecord {
    pub mac: Mac,
    /// Length byte as declared by the tag firmware. For Sotoa records the
    /// vendor data section spans `declared_length - 8` bytes.
    pub declared_length: u8,
    /// Fixed marker byte (0xFF on every observed device).
    pub adv_type: u8,
    pub manufacturer_id: u16,
    pub payload: TagPayload,
    pub rssi: i8,
}

/// Vendor payload variants, selected by the manufacturer discriminant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagPayload {
    IotBox(IotBoxPayload),
    Sotoa(SotoaPayload),
    /// Unrecognized manufacturer - raw bytes kept for lossless round-trip.
    Unknown([u8; TAG_PAYLOAD_LEN]),
}

/// IotBox vendor payload (manufacturer 0x0D00).
///
/// The command byte discriminates which sensor reading the 3-byte user data
/// section carries; see [`TagRecord::to_reading`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IotBoxPayload {
    pub package_id: u8,
    pub command: u8,
    pub user_data: [u8; 3],
    pub crc: u16,
    pub reserved: [u8; 20],
}

/// Sotoa vendor payload (manufacturer 0x0911).
///
/// `data` spans `declared_length - 8` bytes on decode and is padded back out
/// with 7 trailing zero bytes on encode so the payload section is always 27
/// bytes. The type field is two bytes on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SotoaPayload {
    pub private_num: u16,
    pub event: u8,
    pub kind: u16,
    pub data: Vec<u8>,
}

impl TagRecord {
    /// Decode a tag record from exactly [`TAG_RECORD_LEN`] bytes.
    ///
    /// Any other buffer length is garbage to be discarded with a diagnostic,
    /// not an exception; nothing here touches state.
    pub fn decode(buf: &[u8]) -> ProtocolResult<Self> {
        if buf.len() != TAG_RECORD_LEN {
            return Err(ProtocolError::wrong_length(TAG_RECORD_LEN, buf.len()));
        }
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&buf[0..6]);
        let declared_length = buf[6];
        let adv_type = buf[7];
        let manufacturer_id = BigEndian::read_u16(&buf[8..10]);
        let vendor = &buf[10..10 + TAG_PAYLOAD_LEN];
        let payload = match manufacturer_id {
            MANUFACTURER_IOTBOX => TagPayload::IotBox(IotBoxPayload::decode(vendor)),
            MANUFACTURER_SOTOA => TagPayload::Sotoa(SotoaPayload::decode(declared_length, vendor)),
            _ => {
                let mut raw = [0u8; TAG_PAYLOAD_LEN];
                raw.copy_from_slice(vendor);
                TagPayload::Unknown(raw)
            }
        };
        Ok(Self {
            mac: Mac(mac),
            declared_length,
            adv_type,
            manufacturer_id,
            payload,
            rssi: buf[37] as i8,
        })
    }

    /// Serialize back to the fixed 38-byte wire form.
    pub fn encode(&self) -> [u8; TAG_RECORD_LEN] {
        let mut buf = [0u8; TAG_RECORD_LEN];
        buf[0..6].copy_from_slice(self.mac.as_bytes());
        buf[6] = self.declared_length;
        buf[7] = self.adv_type;
        BigEndian::write_u16(&mut buf[8..10], self.manufacturer_id);
        buf[10..10 + TAG_PAYLOAD_LEN].copy_from_slice(&self.payload.encode());
        buf[37] = self.rssi as u8;
        buf
    }

    /// Transform this record into a per-tag aggregate record fragment.
    ///
    /// Populates only the sensor fields this record actually carries; the
    /// aggregator overlays fragments with merge-by-mac.
    pub fn to_reading(&self, gateway_mac: Mac, now: TimestampMs) -> TagReading {
        let mut reading = TagReading::new(self.mac, gateway_mac, hex::encode(self.encode()), now);
        reading.rssi = Some(self.rssi);
        match &self.payload {
            TagPayload::IotBox(payload) => payload.apply(&mut reading),
            TagPayload::Sotoa(payload) => payload.apply(&mut reading),
            TagPayload::Unknown(_) => {}
        }
        reading
    }
}

impl TagPayload {
    /// Serialize the vendor section to its fixed 27 bytes.
    pub fn encode(&self) -> [u8; TAG_PAYLOAD_LEN] {
        let mut buf = [0u8; TAG_PAYLOAD_LEN];
        match self {
            TagPayload::IotBox(payload) => {
                buf[0] = payload.package_id;
                buf[1] = payload.command;
                buf[2..5].copy_from_slice(&payload.user_data);
                BigEndian::write_u16(&mut buf[5..7], payload.crc);
                buf[7..27].copy_from_slice(&payload.reserved);
            }
            TagPayload::Sotoa(payload) => {
                BigEndian::write_u16(&mut buf[0..2], payload.private_num);
                buf[2] = payload.event;
                BigEndian::write_u16(&mut buf[3..5], payload.kind);
                // data + 7 zero padding bytes, truncated at the section edge
                let end = (5 + payload.data.len()).min(TAG_PAYLOAD_LEN);
                buf[5..end].copy_from_slice(&payload.data[..end - 5]);
            }
            TagPayload::Unknown(raw) => buf.copy_from_slice(raw),
        }
        buf
    }
}

impl IotBoxPayload {
    fn decode(buf: &[u8]) -> Self {
        let mut user_data = [0u8; 3];
        user_data.copy_from_slice(&buf[2..5]);
        let mut reserved = [0u8; 20];
        reserved.copy_from_slice(&buf[7..27]);
        Self {
            package_id: buf[0],
            command: buf[1],
            user_data,
            crc: BigEndian::read_u16(&buf[5..7]),
            reserved,
        }
    }

    /// Map the command discriminant to the sensor fields it carries.
    fn apply(&self, reading: &mut TagReading) {
        let ud = &self.user_data;
        match self.command {
            0x09 => {
                reading.voltage = Some(round2(ud[2] as f64 * 6.6 / 255.0));
                reading.tamper = Some((ud[0] >> 5) & 0x01 == 1);
                reading.button = Some((ud[0] >> 4) & 0x01 == 1);
                reading.shock = Some((ud[0] >> 3) & 0x01 == 1);
            }
            0x0A => {
                reading.heart_rate = Some(ud[0]);
                reading.blood_pressure_high = Some(ud[1]);
                reading.blood_pressure_low = Some(ud[2]);
            }
            0x0B => reading.blood_oxygen = Some(ud[0]),
            0x0C => {
                reading.body_temperature = Some(ud[0]);
                reading.step_count = Some(BigEndian::read_u16(&ud[1..3]));
            }
            0x0D => {
                reading.sleep_state = Some(ud[0]);
                reading.light_sleep_minutes = Some(ud[1]);
                reading.deep_sleep_minutes = Some(ud[2]);
            }
            _ => {}
        }
    }
}

impl SotoaPayload {
    fn decode(declared_length: u8, buf: &[u8]) -> Self {
        // data spans declared_length - 8 bytes; clamp against the fixed
        // section size in case the length byte is garbled
        let data_len = (declared_length as usize).saturating_sub(8).min(TAG_PAYLOAD_LEN - 5);
        Self {
            private_num: BigEndian::read_u16(&buf[0..2]),
            event: buf[2],
            kind: BigEndian::read_u16(&buf[3..5]),
            data: buf[5..5 + data_len].to_vec(),
        }
    }

    /// Sequential sub-field decode over `data`. Short data stops early
    /// without error - partial telemetry is acceptable.
    fn apply(&self, reading: &mut TagReading) {
        let d = &self.data;
        let get = |i: usize| d.get(i).copied();
        reading.firmware = get(0);
        reading.hardware = get(1);
        reading.battery = get(2);
        reading.body_temperature = get(3);
        if let Some(status) = get(4) {
            reading.tamper = Some((status >> 5) & 0x01 == 1);
            reading.button = Some((status >> 4) & 0x01 == 1);
            reading.shock = Some((status >> 3) & 0x01 == 1);
        }
        if self.kind == 0 {
            // reserved(6) then a sequence byte - no vitals in this shape
            return;
        }
        reading.heart_rate = get(5);
        reading.blood_pressure_high = get(6);
        reading.blood_pressure_low = get(7);
        reading.blood_oxygen = get(8);
        if d.len() >= 11 {
            reading.step_count = Some(BigEndian::read_u16(&d[9..11]));
        }
        reading.sleep_state = get(11);
        reading.deep_sleep_minutes = get(12);
        reading.light_sleep_minutes = get(13);
        // d[14] is the per-tag sequence number, carried but not aggregated
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
