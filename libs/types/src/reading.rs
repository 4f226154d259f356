//! Per-tag aggregate records and merge-by-mac semantics.
//!
//! A [`TagReading`] is the union of every sensor field either vendor payload
//! can report. A single decoded record only populates a subset of the optional
//! fields; the aggregator overlays successive readings for the same tag mac
//! with [`TagReading::merge_from`], which keeps previously known fields that
//! the newer reading does not carry.

use crate::{Mac, TimestampMs};
use serde::{Deserialize, Serialize};

/// Aggregate state for one tag, keyed by its mac within a gateway.
///
/// Owned exclusively by the ingestion aggregator (or the load generator's
/// coordinator); never mutated from more than one logical thread of control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagReading {
    pub mac: Mac,
    pub gateway_mac: Mac,

    // IotBox status fields (command 0x09)
    pub voltage: Option<f64>,
    pub tamper: Option<bool>,
    pub button: Option<bool>,
    pub shock: Option<bool>,

    // Vitals, reported by both vendors
    pub heart_rate: Option<u8>,
    pub blood_pressure_high: Option<u8>,
    pub blood_pressure_low: Option<u8>,
    pub blood_oxygen: Option<u8>,
    pub body_temperature: Option<u8>,
    pub step_count: Option<u16>,
    pub sleep_state: Option<u8>,
    pub deep_sleep_minutes: Option<u8>,
    pub light_sleep_minutes: Option<u8>,

    // Sotoa device metadata
    pub firmware: Option<u8>,
    pub hardware: Option<u8>,
    pub battery: Option<u8>,

    pub rssi: Option<i8>,

    /// Set once, on the first observation of this mac.
    pub first_time: Option<TimestampMs>,
    /// Updated on every observation.
    pub last_time: TimestampMs,
    /// Observations merged into this record.
    pub packet_count: u64,
    /// Hex of the last-seen 38-byte wire record.
    pub raw_data: String,
}

impl TagReading {
    /// New record with no sensor fields populated yet.
    pub fn new(mac: Mac, gateway_mac: Mac, raw_data: String, now: TimestampMs) -> Self {
        Self {
            mac,
            gateway_mac,
            voltage: None,
            tamper: None,
            button: None,
            shock: None,
            heart_rate: None,
            blood_pressure_high: None,
            blood_pressure_low: None,
            blood_oxygen: None,
            body_temperature: None,
            step_count: None,
            sleep_state: None,
            deep_sleep_minutes: None,
            light_sleep_minutes: None,
            firmware: None,
            hardware: None,
            battery: None,
            rssi: None,
            first_time: None,
            last_time: now,
            packet_count: 1,
            raw_data,
        }
    }

    /// Overlay the defined fields of `newer` onto this record.
    ///
    /// Only `Some` fields of `newer` overwrite; `first_time` is preserved,
    /// `last_time`/`raw_data` always track the newer reading, and
    /// `packet_count` increments by exactly one.
    pub fn merge_from(&mut self, newer: &TagReading) {
        macro_rules! overlay {
            ($($field:ident),+ $(,)?) => {
                $(if newer.$field.is_some() {
                    self.$field = newer.$field;
                })+
            };
        }
        overlay!(
            voltage,
            tamper,
            button,
            shock,
            heart_rate,
            blood_pressure_high,
            blood_pressure_low,
            blood_oxygen,
            body_temperature,
            step_count,
            sleep_state,
            deep_sleep_minutes,
            light_sleep_minutes,
            firmware,
            hardware,
            battery,
            rssi,
        );
        self.last_time = newer.last_time;
        self.raw_data = newer.raw_data.clone();
        self.packet_count += 1;
    }
}

/// Packet-loss percentage for one tag over the run so far.
///
/// `expected = elapsed_ms * rate / 1000`; the result is clamped at zero when
/// more packets arrived than expected, and is zero when nothing was expected
/// yet.
pub fn loss_percentage(packet_count: u64, rate: u32, elapsed_ms: u64) -> f64 {
    let expected = (elapsed_ms as f64) * (rate as f64) / 1000.0;
    if expected == 0.0 {
        return 0.0;
    }
    let lost = (expected - packet_count as f64).max(0.0);
    lost * 100.0 / expected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(last: u8) -> Mac {
        Mac([0x02, 0x01, 0, 0, 0, last])
    }

    fn reading(now: TimestampMs) -> TagReading {
        TagReading::new(mac(1), mac(0), "aa".into(), now)
    }

    #[test]
    fn test_merge_keeps_undefined_fields() {
        let mut stored = reading(100);
        stored.voltage = Some(3.3);
        stored.first_time = Some(100);

        let mut newer = reading(200);
        newer.heart_rate = Some(72);
        newer.raw_data = "bb".into();

        stored.merge_from(&newer);
        assert_eq!(stored.voltage, Some(3.3));
        assert_eq!(stored.heart_rate, Some(72));
        assert_eq!(stored.packet_count, 2);
        assert_eq!(stored.first_time, Some(100));
        assert_eq!(stored.last_time, 200);
        assert_eq!(stored.raw_data, "bb");
    }

    #[test]
    fn test_merge_overwrites_defined_fields() {
        let mut stored = reading(100);
        stored.blood_oxygen = Some(95);

        let mut newer = reading(200);
        newer.blood_oxygen = Some(98);

        stored.merge_from(&newer);
        assert_eq!(stored.blood_oxygen, Some(98));
    }

    #[test]
    fn test_loss_percentage_known_values() {
        // rate=10, elapsed=10s, 90 received -> expected 100, 10% lost
        let loss = loss_percentage(90, 10, 10_000);
        assert!((loss - 10.0).abs() < f64::EPSILON);

        // more received than expected clamps to 0, never negative
        assert_eq!(loss_percentage(120, 10, 10_000), 0.0);

        // nothing expected yet
        assert_eq!(loss_percentage(0, 10, 0), 0.0);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut original = reading(100);
        original.voltage = Some(2.41);
        original.rssi = Some(-60);

        let json = serde_json::to_string(&original).unwrap();
        assert!(json.contains("\"02:01:00:00:00:01\""));
        let back: TagReading = serde_json::from_str(&json).unwrap();
        assert_eq!(back, original);
    }
}
