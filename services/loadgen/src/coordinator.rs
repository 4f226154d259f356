//! Sent-traffic ledger.
//!
//! The generator keeps its own merge-by-mac view of everything that was
//! actually put on the wire, applying the same overlay semantics the
//! ingestion side uses. Comparing the two views tells you exactly what the
//! network lost. One coordinator task owns all writes; queries take read
//! snapshots through the shared lock.

use crate::now_ms;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use types::{GatewayRecord, Mac, TagReading, TimestampMs};

/// One successfully sent frame, reported by a gateway batcher.
#[derive(Debug, Clone)]
pub struct SentBatch {
    pub gateway_mac: Mac,
    pub readings: Vec<TagReading>,
    /// Hex of the whole frame as it went out.
    pub raw_frame: String,
}

/// Aggregate view of one simulated gateway's sent traffic.
#[derive(Debug)]
pub struct GatewayTraffic {
    pub record: GatewayRecord,
    /// Hex of the most recent frame this gateway sent.
    pub last_frame: String,
}

/// All per-gateway sent-traffic views for one generator run.
#[derive(Debug, Default)]
pub struct TrafficLedger {
    order: Vec<Mac>,
    gateways: HashMap<Mac, GatewayTraffic>,
}

impl TrafficLedger {
    /// Merge one sent frame into the ledger.
    pub fn apply_batch(&mut self, batch: SentBatch, now: TimestampMs) {
        if !self.gateways.contains_key(&batch.gateway_mac) {
            debug!(mac = %batch.gateway_mac, "registering simulated gateway");
            self.order.push(batch.gateway_mac);
            self.gateways.insert(
                batch.gateway_mac,
                GatewayTraffic {
                    record: GatewayRecord::new(batch.gateway_mac, now),
                    last_frame: String::new(),
                },
            );
        }
        let Some(gateway) = self.gateways.get_mut(&batch.gateway_mac) else {
            return; // inserted above, cannot happen
        };
        gateway.record.update_time = now;
        gateway.record.total += batch.readings.len() as u64;
        gateway.last_frame = batch.raw_frame;
        for reading in batch.readings {
            gateway.record.merge_reading(reading, now);
        }
    }

    /// Gateways in insertion order.
    pub fn gateways(&self) -> impl Iterator<Item = &GatewayTraffic> {
        self.order.iter().filter_map(|mac| self.gateways.get(mac))
    }

    pub fn gateway(&self, mac: &Mac) -> Option<&GatewayTraffic> {
        self.gateways.get(mac)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Run the coordinator loop: fold sent frames into the shared ledger until
/// every batcher has hung up.
pub(crate) async fn run_coordinator(
    ledger: Arc<RwLock<TrafficLedger>>,
    mut sent_rx: mpsc::Receiver<SentBatch>,
) {
    while let Some(batch) = sent_rx.recv().await {
        ledger.write().apply_batch(batch, now_ms());
    }
    info!("coordinator stopped, all batchers gone");
}
