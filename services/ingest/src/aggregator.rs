//! Single-writer aggregate state and the merge/tick task.
//!
//! All aggregate state is owned by one logical writer: the aggregator task
//! applies decoded batches strictly one at a time and runs the periodic flush
//! tick in the same `select!` loop, so merges and rate rotation can never
//! interleave. The state additionally sits behind an `RwLock` purely so query
//! and export callers can take read snapshots without a command channel.

use crate::cache::CacheDir;
use crate::worker::DecodedBatch;
use crate::now_ms;
use codec::TAG_RECORD_LEN;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use types::{GatewayRecord, Mac, TimestampMs};

/// All per-gateway aggregate records for one ingestion run.
///
/// Two views over one ownership: `order` defines iteration/display order
/// (insertion order), `gateways` is the mac-keyed index for O(1) merge.
#[derive(Debug, Default)]
pub struct AggregateState {
    order: Vec<Mac>,
    gateways: HashMap<Mac, GatewayRecord>,
}

impl AggregateState {
    /// Merge one decoded batch. Step order follows the ingestion contract:
    /// register the gateway, overlay each reading by mac, accumulate the
    /// byte-rate figure.
    pub fn apply_batch(&mut self, batch: DecodedBatch, now: TimestampMs) {
        if !self.gateways.contains_key(&batch.gateway_mac) {
            debug!(mac = %batch.gateway_mac, "registering new gateway");
            self.order.push(batch.gateway_mac);
            self.gateways
                .insert(batch.gateway_mac, GatewayRecord::new(batch.gateway_mac, now));
        }
        let Some(gateway) = self.gateways.get_mut(&batch.gateway_mac) else {
            return; // inserted above, cannot happen
        };
        gateway.update_time = now;
        gateway.total += batch.readings.len() as u64;
        gateway.packet_receive_rate += (batch.readings.len() * TAG_RECORD_LEN) as u64;
        for reading in batch.readings {
            gateway.merge_reading(reading, now);
        }
    }

    /// Snapshot each gateway's rate accumulator into the exposed figure and
    /// reset it. Called once per flush tick.
    pub fn rotate_rates(&mut self) {
        for gateway in self.gateways.values_mut() {
            gateway.rotate_receive_rate();
        }
    }

    /// Gateways in insertion order.
    pub fn gateways(&self) -> impl Iterator<Item = &GatewayRecord> {
        self.order.iter().filter_map(|mac| self.gateways.get(mac))
    }

    pub fn gateway(&self, mac: &Mac) -> Option<&GatewayRecord> {
        self.gateways.get(mac)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Run the aggregator loop: apply decoded batches, buffer their raw hex into
/// per-gateway interval buckets, and on every tick rotate rate figures and
/// flush the buckets to the append-only cache logs.
///
/// Terminates when the decoded channel closes, flushing what is pending.
pub(crate) async fn run_aggregator(
    state: Arc<RwLock<AggregateState>>,
    mut decoded_rx: mpsc::Receiver<DecodedBatch>,
    cache: CacheDir,
    flush_interval: Duration,
) {
    let mut buckets: HashMap<Mac, Vec<String>> = HashMap::new();
    let mut tick = tokio::time::interval(flush_interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            batch = decoded_rx.recv() => {
                let Some(batch) = batch else { break };
                let bucket = buckets.entry(batch.gateway_mac).or_default();
                bucket.extend(batch.readings.iter().map(|r| r.raw_data.clone()));
                state.write().apply_batch(batch, now_ms());
            }
            _ = tick.tick() => {
                state.write().rotate_rates();
                flush_buckets(&cache, &mut buckets);
            }
        }
    }
    flush_buckets(&cache, &mut buckets);
    info!("aggregator stopped, pending buckets flushed");
}

fn flush_buckets(cache: &CacheDir, buckets: &mut HashMap<Mac, Vec<String>>) {
    for (mac, lines) in buckets.drain() {
        if let Err(err) = cache.append(&mac, &lines) {
            warn!(error = %err, gateway = %mac, "failed to flush raw cache bucket");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::TagReading;

    fn mac(last: u8) -> Mac {
        Mac([0x02, 0x01, 0, 0, 0, last])
    }

    fn batch(gateway: u8, tags: &[u8], now: TimestampMs) -> DecodedBatch {
        DecodedBatch {
            gateway_mac: mac(gateway),
            readings: tags
                .iter()
                .map(|&t| TagReading::new(mac(t), mac(gateway), format!("{t:02x}"), now))
                .collect(),
        }
    }

    #[test]
    fn test_new_gateway_registered_with_seeded_first_time() {
        let mut state = AggregateState::default();
        state.apply_batch(batch(0, &[1, 2], 100), 100);

        assert_eq!(state.len(), 1);
        let gateway = state.gateway(&mac(0)).unwrap();
        assert_eq!(gateway.total, 2);
        assert_eq!(gateway.tag_count(), 2);
        assert_eq!(gateway.tag(&mac(1)).unwrap().first_time, Some(100));
    }

    #[test]
    fn test_existing_gateway_merges_by_mac() {
        let mut state = AggregateState::default();
        state.apply_batch(batch(0, &[1], 100), 100);
        state.apply_batch(batch(0, &[1, 2], 200), 200);

        let gateway = state.gateway(&mac(0)).unwrap();
        assert_eq!(gateway.total, 3);
        assert_eq!(gateway.tag_count(), 2);
        assert_eq!(gateway.tag(&mac(1)).unwrap().packet_count, 2);
        assert_eq!(gateway.tag(&mac(2)).unwrap().packet_count, 1);
    }

    #[test]
    fn test_rate_accumulates_bytes_and_rotates() {
        let mut state = AggregateState::default();
        state.apply_batch(batch(0, &[1, 2, 3], 100), 100);
        let gateway = state.gateway(&mac(0)).unwrap();
        assert_eq!(gateway.packet_receive_rate, 3 * 38);
        assert_eq!(gateway.last_packet_receive_rate, 0);

        state.rotate_rates();
        let gateway = state.gateway(&mac(0)).unwrap();
        assert_eq!(gateway.packet_receive_rate, 0);
        assert_eq!(gateway.last_packet_receive_rate, 3 * 38);
    }

    #[test]
    fn test_gateway_iteration_order_is_insertion_order() {
        let mut state = AggregateState::default();
        state.apply_batch(batch(3, &[], 1), 1);
        state.apply_batch(batch(1, &[], 2), 2);
        state.apply_batch(batch(3, &[], 3), 3);
        state.apply_batch(batch(2, &[], 4), 4);

        let order: Vec<u8> = state.gateways().map(|g| g.mac.0[5]).collect();
        assert_eq!(order, vec![3, 1, 2]);
    }
}
