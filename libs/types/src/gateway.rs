//! Per-gateway aggregate records.
//!
//! Each gateway owns the aggregate records of the tags it has relayed, in two
//! views over one ownership: an insertion-ordered list that defines iteration
//! and display order, and a mac-keyed index into that list for O(1)
//! merge-by-mac. The index stores list positions, so the list remains the sole
//! owner of the records.

use crate::{Mac, TagReading, TimestampMs};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Aggregate state for one gateway mac.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRecord {
    pub mac: Mac,
    /// Readings ever merged through this gateway.
    pub total: u64,
    /// Bytes received in the current one-second interval.
    pub packet_receive_rate: u64,
    /// Previous interval's byte count, the figure exposed to consumers.
    pub last_packet_receive_rate: u64,
    /// Timestamp of the most recent frame.
    pub update_time: TimestampMs,
    tags: Vec<TagReading>,
    index: HashMap<Mac, usize>,
}

impl GatewayRecord {
    pub fn new(mac: Mac, now: TimestampMs) -> Self {
        Self {
            mac,
            total: 0,
            packet_receive_rate: 0,
            last_packet_receive_rate: 0,
            update_time: now,
            tags: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Number of distinct tag macs seen through this gateway.
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    /// Tags in insertion order.
    pub fn tags(&self) -> &[TagReading] {
        &self.tags
    }

    pub fn tag(&self, mac: &Mac) -> Option<&TagReading> {
        self.index.get(mac).map(|&pos| &self.tags[pos])
    }

    /// Merge one decoded reading into this gateway's state.
    ///
    /// Unseen macs are appended (seeding `first_time`); seen macs get the
    /// field overlay from [`TagReading::merge_from`].
    pub fn merge_reading(&mut self, mut reading: TagReading, now: TimestampMs) {
        match self.index.get(&reading.mac) {
            Some(&pos) => self.tags[pos].merge_from(&reading),
            None => {
                reading.first_time = Some(now);
                self.index.insert(reading.mac, self.tags.len());
                self.tags.push(reading);
            }
        }
    }

    /// Roll the rate accumulator over to the exposed figure. Called once per
    /// flush tick.
    pub fn rotate_receive_rate(&mut self) {
        self.last_packet_receive_rate = self.packet_receive_rate;
        self.packet_receive_rate = 0;
    }
}
