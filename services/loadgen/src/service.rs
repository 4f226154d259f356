//! Generator service facade.
//!
//! Start spins up the coordinator plus every gateway's tag tasks; stop aborts
//! them and discards partially filled batches - only fully relayed frames
//! ever reach the ledger, so teardown needs no flush.

use crate::config::GeneratorOptions;
use crate::coordinator::{run_coordinator, SentBatch, TrafficLedger};
use crate::simulator::{spawn_gateway, GatewayFailure};
use crate::synth::GeneratorContext;
use network::TransportError;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;
use types::{Mac, TagReading, TimestampMs};

/// Capacity of the sent-batch channel into the coordinator.
const SENT_CHANNEL_CAPACITY: usize = 1024;

/// Generator lifecycle errors.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("generator is not running")]
    NotRunning,

    #[error("generator is already running")]
    AlreadyRunning,
}

/// Gateway list row exposed to consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficSummary {
    pub mac: Mac,
    pub total: u64,
    pub tag_count: usize,
    pub update_time: TimestampMs,
    /// Hex of the most recent frame sent.
    pub last_frame: String,
}

struct Running {
    tag_tasks: Vec<JoinHandle<()>>,
    coordinator: JoinHandle<()>,
    started_at: Instant,
}

/// One simulated gateway fleet.
pub struct GeneratorService {
    ledger: Arc<RwLock<TrafficLedger>>,
    failures: Arc<RwLock<Vec<GatewayFailure>>>,
    running: Option<Running>,
}

impl GeneratorService {
    pub fn new() -> Self {
        Self {
            ledger: Arc::new(RwLock::new(TrafficLedger::default())),
            failures: Arc::new(RwLock::new(Vec::new())),
            running: None,
        }
    }

    /// Connect every gateway and start the fleet.
    ///
    /// Connects sequentially; if any gateway fails to connect, tasks already
    /// started are torn down and the error is returned.
    pub async fn start(&mut self, options: GeneratorOptions) -> Result<(), GeneratorError> {
        if self.running.is_some() {
            return Err(GeneratorError::AlreadyRunning);
        }
        *self.ledger.write() = TrafficLedger::default();
        self.failures.write().clear();

        let context = Arc::new(GeneratorContext::new());
        let (sent_tx, sent_rx) = mpsc::channel::<SentBatch>(SENT_CHANNEL_CAPACITY);
        let coordinator = tokio::spawn(run_coordinator(Arc::clone(&self.ledger), sent_rx));

        let mut tag_tasks = Vec::new();
        for gateway_index in 0..options.gateway_count {
            match spawn_gateway(
                &options,
                gateway_index,
                Arc::clone(&context),
                sent_tx.clone(),
                Arc::clone(&self.failures),
            )
            .await
            {
                Ok(handles) => tag_tasks.extend(handles),
                Err(err) => {
                    for task in &tag_tasks {
                        task.abort();
                    }
                    coordinator.abort();
                    return Err(err.into());
                }
            }
        }
        drop(sent_tx); // coordinator exits once every batcher is gone

        info!(
            gateways = options.gateway_count,
            tags_per_gateway = options.tag_count,
            rate = options.rate,
            "generator started"
        );
        self.running = Some(Running {
            tag_tasks,
            coordinator,
            started_at: Instant::now(),
        });
        Ok(())
    }

    /// Abort every tag task and wait for the coordinator to drain.
    /// Partially filled batches are discarded.
    pub async fn stop(&mut self) -> Result<(), GeneratorError> {
        let running = self.running.take().ok_or(GeneratorError::NotRunning)?;
        for task in &running.tag_tasks {
            task.abort();
        }
        for task in running.tag_tasks {
            let _ = task.await;
        }
        // tag tasks held the only senders; the coordinator drains and exits
        let _ = running.coordinator.await;
        info!("generator stopped");
        Ok(())
    }

    /// Elapsed milliseconds since start, 0 when stopped.
    pub fn runtime_ms(&self) -> u64 {
        self.running
            .as_ref()
            .map(|r| r.started_at.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }

    /// Simulated gateways in insertion order.
    pub fn list_gateways(&self) -> Vec<TrafficSummary> {
        self.ledger
            .read()
            .gateways()
            .map(|g| TrafficSummary {
                mac: g.record.mac,
                total: g.record.total,
                tag_count: g.record.tag_count(),
                update_time: g.record.update_time,
                last_frame: g.last_frame.clone(),
            })
            .collect()
    }

    /// Fatal send failures recorded since start, in occurrence order. A
    /// failed gateway stops sending; the rest of the fleet keeps running.
    pub fn failures(&self) -> Vec<GatewayFailure> {
        self.failures.read().clone()
    }

    /// Sent-traffic aggregate records for one gateway's tags.
    pub fn tag_list(&self, gateway_mac: &Mac) -> Option<Vec<TagReading>> {
        self.ledger
            .read()
            .gateway(gateway_mac)
            .map(|g| g.record.tags().to_vec())
    }
}

impl Default for GeneratorService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TagVendor;
    use codec::GatewayFrame;
    use network::{make_server, TransportKind};
    use std::time::Duration;

    fn options(port: u16, tag_count: u16) -> GeneratorOptions {
        GeneratorOptions {
            transport: TransportKind::Udp,
            vendor: TagVendor::IotBox,
            target_ip: "127.0.0.1".parse().unwrap(),
            target_port: port,
            rate: 50,
            gateway_count: 1,
            tag_count,
            mac_prefix: 0x0201,
            batch_size: 26,
        }
    }

    #[tokio::test]
    async fn fleet_relays_full_batches() {
        let mut server = make_server(TransportKind::Udp, "127.0.0.1:0".parse().unwrap());
        let mut inbound = server.listen().await.unwrap();
        let port = server.local_addr().unwrap().port();

        let mut generator = GeneratorService::new();
        generator.start(options(port, 26)).await.unwrap();

        let raw = tokio::time::timeout(Duration::from_secs(5), inbound.recv())
            .await
            .expect("no frame within timeout")
            .expect("channel closed");
        let frame = GatewayFrame::decode(&raw).unwrap();
        assert_eq!(frame.device_id.0, [0x02, 0x01, 0, 0, 0, 0]);
        assert_eq!(frame.payload[0], 26);

        // ledger reflects only sent traffic
        tokio::time::sleep(Duration::from_millis(200)).await;
        let gateways = generator.list_gateways();
        assert_eq!(gateways.len(), 1);
        assert!(gateways[0].total >= 26);
        assert_eq!(gateways[0].tag_count, 26);
        assert!(!gateways[0].last_frame.is_empty());
        assert!(generator.failures().is_empty());

        let tags = generator.tag_list(&gateways[0].mac).unwrap();
        assert_eq!(tags.len(), 26);
        assert!(tags.iter().all(|t| t.packet_count >= 1));

        generator.stop().await.unwrap();
        assert_eq!(generator.runtime_ms(), 0);
    }

    #[tokio::test]
    async fn small_fleet_never_fills_a_batch() {
        let mut server = make_server(TransportKind::Udp, "127.0.0.1:0".parse().unwrap());
        let mut inbound = server.listen().await.unwrap();
        let port = server.local_addr().unwrap().port();

        let mut generator = GeneratorService::new();
        // 2 tags at a slow rate cannot reach 26 records quickly
        let mut opts = options(port, 2);
        opts.rate = 5;
        generator.start(opts).await.unwrap();

        let received =
            tokio::time::timeout(Duration::from_millis(600), inbound.recv()).await;
        assert!(received.is_err(), "partial batch must not be relayed");
        assert!(generator.list_gateways().is_empty());

        generator.stop().await.unwrap();
    }

    #[tokio::test]
    async fn lifecycle_errors() {
        let mut server = make_server(TransportKind::Udp, "127.0.0.1:0".parse().unwrap());
        let _inbound = server.listen().await.unwrap();
        let port = server.local_addr().unwrap().port();

        let mut generator = GeneratorService::new();
        assert!(matches!(
            generator.stop().await,
            Err(GeneratorError::NotRunning)
        ));
        generator.start(options(port, 1)).await.unwrap();
        assert!(matches!(
            generator.start(options(port, 1)).await,
            Err(GeneratorError::AlreadyRunning)
        ));
        generator.stop().await.unwrap();
    }
}
