//! Stateless decode workers.
//!
//! [`decode_datagram`] is a pure function from one raw inbound buffer to a
//! typed batch of readings; any number of calls may run in parallel with no
//! shared mutable state. The listener dispatches each buffer onto the blocking
//! pool, bounded by a semaphore sized from the machine's parallelism - CPU
//! bound parsing never stalls the socket read loop, and pool size is
//! independent of the number of gateways.

use codec::{GatewayFrame, TagRecord, TAG_RECORD_LEN};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, warn};
use types::{Mac, TagReading, TimestampMs};

/// One decoded inbound buffer: the relaying gateway and the readings its
/// frame carried.
#[derive(Debug, Clone)]
pub struct DecodedBatch {
    pub gateway_mac: Mac,
    pub readings: Vec<TagReading>,
}

/// Decode one raw buffer into a batch of tag readings.
///
/// Returns `None` for buffers that are not gateway frames at all (bad magic,
/// truncated header) - malformed input is expected on UDP and is dropped
/// silently. A frame whose payload fails the `count * 38 + 1` arithmetic is
/// treated as corrupt telemetry: the gateway is still registered, with an
/// empty reading list.
pub fn decode_datagram(raw: &[u8], now: TimestampMs) -> Option<DecodedBatch> {
    let frame = match GatewayFrame::decode(raw) {
        Ok(frame) => frame,
        Err(err) => {
            debug!(error = %err, bytes = raw.len(), "dropping undecodable buffer");
            return None;
        }
    };
    let gateway_mac = frame.device_id;
    let mut readings = Vec::new();
    match frame.payload.split_first() {
        Some((&count, records)) if records.len() == count as usize * TAG_RECORD_LEN => {
            readings.reserve(count as usize);
            for chunk in records.chunks_exact(TAG_RECORD_LEN) {
                match TagRecord::decode(chunk) {
                    Ok(record) => readings.push(record.to_reading(gateway_mac, now)),
                    // unreachable with chunks_exact, but a decode refusal is
                    // still just one dropped record
                    Err(err) => debug!(error = %err, "dropping tag record"),
                }
            }
        }
        _ => {
            warn!(
                gateway = %gateway_mac,
                payload_len = frame.payload.len(),
                "frame payload fails count arithmetic, registering gateway without readings"
            );
        }
    }
    Some(DecodedBatch {
        gateway_mac,
        readings,
    })
}

/// Pump raw buffers from the listener into the decode pool, forwarding
/// results to the aggregator channel. Runs until the inbound channel closes.
pub(crate) async fn run_decode_pump(
    mut inbound: mpsc::Receiver<bytes::Bytes>,
    decoded_tx: mpsc::Sender<DecodedBatch>,
) {
    let parallelism = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    let pool = Arc::new(Semaphore::new(parallelism));
    while let Some(raw) = inbound.recv().await {
        let permit = match Arc::clone(&pool).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break, // semaphore closed, shutting down
        };
        let decoded_tx = decoded_tx.clone();
        tokio::task::spawn_blocking(move || {
            let result = decode_datagram(&raw, crate::now_ms());
            drop(permit);
            if let Some(batch) = result {
                // aggregator gone means shutdown; nothing to do
                let _ = decoded_tx.blocking_send(batch);
            }
        });
    }
    debug!("inbound channel closed, decode pump stopping");
}
