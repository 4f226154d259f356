//! Per-gateway simulation tasks.
//!
//! Each simulated tag is one interval task ticking at the configured rate.
//! All tasks of a gateway share one batch buffer and one upstream client;
//! whichever task fills the batch drains it, wraps the records in a gateway
//! frame, and sends. A batch is reported to the traffic ledger only after the
//! transport accepted it, so the ledger never counts traffic that failed to
//! leave the machine.
//!
//! A send failure is fatal to the whole gateway: the failing task raises the
//! gateway's failure flag, every sibling task stops at its next tick, and the
//! failure is recorded for the service facade to report.

use crate::config::GeneratorOptions;
use crate::coordinator::SentBatch;
use crate::now_ms;
use crate::synth::{gateway_mac, synth_record, tag_mac, GeneratorContext};
use codec::{GatewayFrame, TagRecord};
use network::{connect_client, Result as TransportResult, TagClient};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};
use types::Mac;

/// One gateway's fatal send failure, exposed through the service facade.
#[derive(Debug, Clone)]
pub struct GatewayFailure {
    pub gateway_mac: Mac,
    pub message: String,
}

/// State shared by every tag task of one simulated gateway.
struct GatewayShared {
    mac: Mac,
    client: Box<dyn TagClient>,
    batch: Mutex<Vec<TagRecord>>,
    /// Per-gateway reading counter carried in Sotoa payloads.
    reading_sequence: AtomicU8,
    /// Raised on the first send failure; every tag task checks it each tick.
    failed: AtomicBool,
    context: Arc<GeneratorContext>,
    sent_tx: mpsc::Sender<SentBatch>,
    failures: Arc<RwLock<Vec<GatewayFailure>>>,
}

/// Connect one simulated gateway and spawn its tag tasks.
pub(crate) async fn spawn_gateway(
    options: &GeneratorOptions,
    gateway_index: u16,
    context: Arc<GeneratorContext>,
    sent_tx: mpsc::Sender<SentBatch>,
    failures: Arc<RwLock<Vec<GatewayFailure>>>,
) -> TransportResult<Vec<JoinHandle<()>>> {
    let client = connect_client(options.transport, options.target_addr()).await?;
    Ok(spawn_gateway_tasks(
        options,
        gateway_index,
        client,
        context,
        sent_tx,
        failures,
    ))
}

/// Spawn the tag tasks for one gateway over an already-connected client.
pub(crate) fn spawn_gateway_tasks(
    options: &GeneratorOptions,
    gateway_index: u16,
    client: Box<dyn TagClient>,
    context: Arc<GeneratorContext>,
    sent_tx: mpsc::Sender<SentBatch>,
    failures: Arc<RwLock<Vec<GatewayFailure>>>,
) -> Vec<JoinHandle<()>> {
    let shared = Arc::new(GatewayShared {
        mac: gateway_mac(options.mac_prefix, gateway_index as u32),
        client,
        batch: Mutex::new(Vec::with_capacity(options.batch_size)),
        reading_sequence: AtomicU8::new(0),
        failed: AtomicBool::new(false),
        context,
        sent_tx,
        failures,
    });

    let period = Duration::from_millis((1000 / options.rate.max(1)).max(1) as u64);
    let handles = (0..options.tag_count)
        .map(|tag_index| {
            let mac = tag_mac(options.mac_prefix, gateway_index, tag_index);
            tokio::spawn(run_tag(
                Arc::clone(&shared),
                options.clone(),
                mac,
                period,
            ))
        })
        .collect();
    debug!(gateway = %shared.mac, tags = options.tag_count, "gateway simulation started");
    handles
}

/// One tag's advertisement loop. Stops once the gateway has failed.
async fn run_tag(
    shared: Arc<GatewayShared>,
    options: GeneratorOptions,
    mac: Mac,
    period: Duration,
) {
    let mut tick = tokio::time::interval(period);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tick.tick().await;
        if shared.failed.load(Ordering::Relaxed) {
            break;
        }
        let record = {
            let mut rng = rand::thread_rng();
            let sequence = shared.reading_sequence.fetch_add(1, Ordering::Relaxed);
            synth_record(options.vendor, mac, &mut rng, sequence)
        };
        // the lock is scoped so the drained batch is sent without holding it
        let drained = {
            let mut batch = shared.batch.lock();
            batch.push(record);
            if batch.len() >= options.batch_size {
                Some(std::mem::take(&mut *batch))
            } else {
                None
            }
        };
        let Some(records) = drained else { continue };
        if !relay_batch(&shared, &records).await {
            break;
        }
    }
}

/// Frame and send one drained batch; report it to the ledger on success.
/// Returns false when the transport rejected the send, after marking the
/// gateway failed and recording the failure.
async fn relay_batch(shared: &GatewayShared, records: &[TagRecord]) -> bool {
    let frame = GatewayFrame::from_records(shared.mac, shared.context.next_frame_sequence(), records);
    let bytes = frame.encode();
    if let Err(err) = shared.client.send(&bytes).await {
        error!(gateway = %shared.mac, error = %err, "upstream send failed, stopping gateway");
        shared.failed.store(true, Ordering::Relaxed);
        shared.failures.write().push(GatewayFailure {
            gateway_mac: shared.mac,
            message: err.to_string(),
        });
        return false;
    }
    let now = now_ms();
    let batch = SentBatch {
        gateway_mac: shared.mac,
        readings: records
            .iter()
            .map(|r| r.to_reading(shared.mac, now))
            .collect(),
        raw_frame: hex::encode(&bytes),
    };
    // ledger gone means the run is being torn down
    let _ = shared.sent_tx.send(batch).await;
    true
}
