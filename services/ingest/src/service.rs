//! Ingestion service facade.
//!
//! The operations the embedding shell drives: start/stop a listener run,
//! query gateways and tags, read the elapsed runtime, and export CSV. Start
//! failures tear down anything partially started before reporting; no
//! operation here retries on its own.

use crate::aggregator::{run_aggregator, AggregateState};
use crate::cache::CacheDir;
use crate::export::{export_merged, export_raw, ExportError, ExportMode, ExportOptions};
use crate::worker::run_decode_pump;
use crate::{now_ms, IngestOptions};
use network::{make_server, TagServer, TransportError};
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;
use types::{Mac, TagReading};

/// Capacity of the decoded-batch channel between workers and aggregator.
const DECODED_CHANNEL_CAPACITY: usize = 1024;

/// Ingestion lifecycle and query errors.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("ingestion is not running")]
    NotRunning,

    #[error("ingestion is already running")]
    AlreadyRunning,
}

/// Gateway list row exposed to consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySummary {
    pub mac: Mac,
    pub total: u64,
    pub last_packet_receive_rate: u64,
    pub tag_count: usize,
}

struct Running {
    server: Box<dyn TagServer>,
    pump: JoinHandle<()>,
    aggregator: JoinHandle<()>,
    started_at: Instant,
    local_addr: Option<SocketAddr>,
}

/// One ingestion pipeline: listener, decode pool, aggregator.
pub struct IngestService {
    state: Arc<RwLock<AggregateState>>,
    cache: Option<CacheDir>,
    running: Option<Running>,
}

impl IngestService {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(AggregateState::default())),
            cache: None,
            running: None,
        }
    }

    /// Bind the listener and start the pipeline.
    ///
    /// Purges stale cache files and resets aggregate state from any previous
    /// run. A bind failure leaves the service stopped with nothing to tear
    /// down - tasks are only spawned after the listener is up.
    pub async fn start(&mut self, options: IngestOptions) -> Result<(), IngestError> {
        if self.running.is_some() {
            return Err(IngestError::AlreadyRunning);
        }
        let cache = CacheDir::new(&options.cache_dir);
        cache.purge();
        *self.state.write() = AggregateState::default();

        let mut server = make_server(options.transport, options.bind_addr());
        let inbound = server.listen().await?;
        let local_addr = server.local_addr();

        let (decoded_tx, decoded_rx) = mpsc::channel(DECODED_CHANNEL_CAPACITY);
        let pump = tokio::spawn(run_decode_pump(inbound, decoded_tx));
        let aggregator = tokio::spawn(run_aggregator(
            Arc::clone(&self.state),
            decoded_rx,
            cache.clone(),
            options.flush_interval,
        ));

        info!(transport = ?options.transport, addr = ?local_addr, "ingestion started");
        self.cache = Some(cache);
        self.running = Some(Running {
            server,
            pump,
            aggregator,
            started_at: Instant::now(),
            local_addr,
        });
        Ok(())
    }

    /// Close the listener, drain the pipeline, flush pending buckets, and
    /// purge the cache.
    pub async fn stop(&mut self) -> Result<(), IngestError> {
        let mut running = self.running.take().ok_or(IngestError::NotRunning)?;
        running.server.close();
        // closing the server drops the inbound sender; the pump then the
        // aggregator drain out, and the aggregator's exit path flushes
        let _ = running.pump.await;
        let _ = running.aggregator.await;
        if let Some(cache) = &self.cache {
            cache.purge();
        }
        info!("ingestion stopped");
        Ok(())
    }

    /// Address the listener actually bound, for ephemeral-port setups.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().and_then(|r| r.local_addr)
    }

    /// Elapsed milliseconds since listen, 0 when stopped.
    pub fn runtime_ms(&self) -> u64 {
        self.running
            .as_ref()
            .map(|r| r.started_at.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }

    /// Gateways in insertion order.
    pub fn list_gateways(&self) -> Vec<GatewaySummary> {
        self.state
            .read()
            .gateways()
            .map(|g| GatewaySummary {
                mac: g.mac,
                total: g.total,
                last_packet_receive_rate: g.last_packet_receive_rate,
                tag_count: g.tag_count(),
            })
            .collect()
    }

    /// Current aggregate records for one gateway's tags, insertion order.
    pub fn tag_list(&self, gateway_mac: &Mac) -> Option<Vec<TagReading>> {
        self.state
            .read()
            .gateway(gateway_mac)
            .map(|g| g.tags().to_vec())
    }

    /// Export one gateway's tags to `<destination>/<gateway-mac>.csv`.
    pub fn export(&self, options: &ExportOptions) -> Result<PathBuf, IngestError> {
        // snapshot the record so file writes never hold the state lock
        let gateway = self
            .state
            .read()
            .gateway(&options.gateway_mac)
            .cloned()
            .ok_or(ExportError::UnknownGateway {
                mac: options.gateway_mac,
            })?;
        let path = match options.mode {
            ExportMode::Merged => export_merged(&gateway, options, self.runtime_ms())?,
            ExportMode::Raw => {
                let cache = self.cache.as_ref().ok_or(IngestError::NotRunning)?;
                export_raw(gateway.mac, cache, options, now_ms())?
            }
        };
        Ok(path)
    }
}

impl Default for IngestService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::{GatewayFrame, IotBoxPayload, TagPayload, TagRecord, ADV_TYPE_MARKER};
    use network::{connect_client, TransportKind};
    use std::time::Duration;

    fn mac(last: u8) -> Mac {
        Mac([0x02, 0x01, 0, 0, 0, last])
    }

    fn record(last: u8) -> TagRecord {
        TagRecord {
            mac: mac(last),
            declared_length: 0x1E,
            adv_type: ADV_TYPE_MARKER,
            manufacturer_id: codec::MANUFACTURER_IOTBOX,
            payload: TagPayload::IotBox(IotBoxPayload {
                package_id: 0x04,
                command: 0x0B,
                user_data: [96, 0, 0],
                crc: 0,
                reserved: [0; 20],
            }),
            rssi: -50,
        }
    }

    fn test_options(cache_dir: &std::path::Path) -> IngestOptions {
        IngestOptions {
            transport: TransportKind::Udp,
            bind_ip: "127.0.0.1".parse().unwrap(),
            bind_port: 0,
            cache_dir: cache_dir.to_path_buf(),
            flush_interval: Duration::from_millis(100),
        }
    }

    #[tokio::test]
    async fn udp_ingestion_pipeline_aggregates() {
        let tmp = tempfile::tempdir().unwrap();
        let mut service = IngestService::new();
        service.start(test_options(tmp.path())).await.unwrap();
        let addr = service.local_addr().unwrap();

        let client = connect_client(TransportKind::Udp, addr).await.unwrap();
        let frame = GatewayFrame::from_records(mac(0), 0, &[record(1), record(2)]);
        client.send(&frame.encode()).await.unwrap();
        let frame = GatewayFrame::from_records(mac(0), 1, &[record(1)]);
        client.send(&frame.encode()).await.unwrap();
        // garbage must be dropped without killing the pipeline
        client.send(b"definitely not a frame").await.unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;

        let gateways = service.list_gateways();
        assert_eq!(gateways.len(), 1);
        assert_eq!(gateways[0].total, 3);
        assert_eq!(gateways[0].tag_count, 2);

        let tags = service.tag_list(&mac(0)).unwrap();
        assert_eq!(tags[0].packet_count, 2);
        assert_eq!(tags[0].blood_oxygen, Some(96));
        assert!(service.runtime_ms() > 0);

        // flush tick must have written the raw cache log
        let export = service
            .export(&ExportOptions {
                gateway_mac: mac(0),
                mode: ExportMode::Raw,
                mac_filter: String::new(),
                destination: tmp.path().join("out"),
                expected_rate: 0,
            })
            .unwrap();
        let content = std::fs::read_to_string(export).unwrap();
        assert_eq!(content.lines().count(), 4); // header + 3 raw packets

        service.stop().await.unwrap();
        assert_eq!(service.runtime_ms(), 0);
    }

    #[tokio::test]
    async fn merged_export_runs_alongside_ingestion() {
        let tmp = tempfile::tempdir().unwrap();
        let mut service = IngestService::new();
        service.start(test_options(tmp.path())).await.unwrap();
        let addr = service.local_addr().unwrap();
        let client = connect_client(TransportKind::Udp, addr).await.unwrap();

        let frame = GatewayFrame::from_records(mac(0), 0, &[record(1)]);
        client.send(&frame.encode()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        // exports must not stall the aggregator: keep writing while traffic
        // is still flowing
        for sequence in 1..4u8 {
            let frame = GatewayFrame::from_records(mac(0), sequence, &[record(1)]);
            client.send(&frame.encode()).await.unwrap();
            service
                .export(&ExportOptions {
                    gateway_mac: mac(0),
                    mode: ExportMode::Merged,
                    mac_filter: String::new(),
                    destination: tmp.path().join(format!("out-{sequence}")),
                    expected_rate: 1,
                })
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(service.tag_list(&mac(0)).unwrap()[0].packet_count, 4);
        service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn start_twice_and_stop_idle_are_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let mut service = IngestService::new();
        assert!(matches!(service.stop().await, Err(IngestError::NotRunning)));

        service.start(test_options(tmp.path())).await.unwrap();
        assert!(matches!(
            service.start(test_options(tmp.path())).await,
            Err(IngestError::AlreadyRunning)
        ));
        service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn bind_conflict_leaves_service_stopped() {
        let tmp = tempfile::tempdir().unwrap();
        let mut first = IngestService::new();
        first.start(test_options(tmp.path())).await.unwrap();
        let taken = first.local_addr().unwrap();

        let mut second = IngestService::new();
        let mut options = test_options(tmp.path());
        options.bind_ip = taken.ip();
        options.bind_port = taken.port();
        let result = second.start(options).await;
        assert!(matches!(
            result,
            Err(IngestError::Transport(TransportError::AddressInUse { .. }))
        ));
        assert!(second.local_addr().is_none());
        assert!(matches!(second.stop().await, Err(IngestError::NotRunning)));
    }

    #[tokio::test]
    async fn export_unknown_gateway_is_an_error() {
        let service = IngestService::new();
        let result = service.export(&ExportOptions {
            gateway_mac: mac(9),
            mode: ExportMode::Merged,
            mac_filter: String::new(),
            destination: std::env::temp_dir(),
            expected_rate: 10,
        });
        assert!(matches!(
            result,
            Err(IngestError::Export(ExportError::UnknownGateway { .. }))
        ));
    }
}
