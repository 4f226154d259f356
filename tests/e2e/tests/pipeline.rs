//! Full pipeline over real sockets: simulated fleet on one side, ingestion
//! listener on the other, both in one process.

use network::TransportKind;
use std::time::Duration;
use tagrelay_ingest::{ExportMode, ExportOptions, IngestOptions, IngestService};
use tagrelay_loadgen::{gateway_mac, GeneratorOptions, GeneratorService, TagVendor};

const MAC_PREFIX: u16 = 0x0201;

fn ingest_options(cache_dir: &std::path::Path, transport: TransportKind) -> IngestOptions {
    IngestOptions {
        transport,
        bind_ip: "127.0.0.1".parse().unwrap(),
        bind_port: 0,
        cache_dir: cache_dir.to_path_buf(),
        flush_interval: Duration::from_millis(200),
    }
}

fn generator_options(
    port: u16,
    transport: TransportKind,
    vendor: TagVendor,
) -> GeneratorOptions {
    GeneratorOptions {
        transport,
        vendor,
        target_ip: "127.0.0.1".parse().unwrap(),
        target_port: port,
        rate: 100,
        gateway_count: 1,
        tag_count: 30,
        mac_prefix: MAC_PREFIX,
        batch_size: 26,
    }
}

async fn run_pipeline(transport: TransportKind, vendor: TagVendor) {
    let tmp = tempfile::tempdir().unwrap();
    let mut ingest = IngestService::new();
    ingest
        .start(ingest_options(tmp.path(), transport))
        .await
        .unwrap();
    let port = ingest.local_addr().unwrap().port();

    let mut generator = GeneratorService::new();
    generator
        .start(generator_options(port, transport, vendor))
        .await
        .unwrap();

    // 30 tags at 100/s fill a 26-record batch many times over in 2 seconds
    tokio::time::sleep(Duration::from_secs(2)).await;

    let gateways = ingest.list_gateways();
    assert_eq!(gateways.len(), 1, "one simulated gateway expected");
    assert_eq!(gateways[0].mac, gateway_mac(MAC_PREFIX, 0));
    assert!(gateways[0].total >= 26);

    let tags = ingest.tag_list(&gateways[0].mac).unwrap();
    assert_eq!(tags.len(), 30, "every simulated tag must be aggregated");
    assert!(tags.iter().all(|t| t.packet_count >= 1));
    assert!(tags.iter().all(|t| t.rssi.is_some()));
    assert!(tags.iter().all(|t| t.first_time.is_some()));

    // sent and received views agree on the tag population
    let sent = generator.tag_list(&gateways[0].mac).unwrap();
    assert_eq!(sent.len(), 30);

    generator.stop().await.unwrap();
    ingest.stop().await.unwrap();
}

#[tokio::test]
async fn udp_iotbox_pipeline() {
    run_pipeline(TransportKind::Udp, TagVendor::IotBox).await;
}

#[tokio::test]
async fn udp_sotoa_pipeline() {
    run_pipeline(TransportKind::Udp, TagVendor::Sotoa).await;
}

#[tokio::test]
async fn udp_pipeline_exports_csv() {
    let tmp = tempfile::tempdir().unwrap();
    let mut ingest = IngestService::new();
    ingest
        .start(ingest_options(tmp.path(), TransportKind::Udp))
        .await
        .unwrap();
    let port = ingest.local_addr().unwrap().port();

    let mut generator = GeneratorService::new();
    generator
        .start(generator_options(port, TransportKind::Udp, TagVendor::IotBox))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    generator.stop().await.unwrap();

    // one more flush interval so the raw cache log is on disk
    tokio::time::sleep(Duration::from_millis(400)).await;

    let gateway = gateway_mac(MAC_PREFIX, 0);
    let merged = ingest
        .export(&ExportOptions {
            gateway_mac: gateway,
            mode: ExportMode::Merged,
            mac_filter: String::new(),
            destination: tmp.path().join("exports"),
            expected_rate: 100,
        })
        .unwrap();
    let content = std::fs::read_to_string(merged).unwrap();
    assert_eq!(content.lines().count(), 31); // header + one row per tag
    assert!(content.starts_with("Mac,Voltage"));

    let raw = ingest
        .export(&ExportOptions {
            gateway_mac: gateway,
            mode: ExportMode::Raw,
            mac_filter: String::new(),
            destination: tmp.path().join("exports-raw"),
            expected_rate: 100,
        })
        .unwrap();
    let content = std::fs::read_to_string(raw).unwrap();
    assert!(content.lines().count() > 26); // header + one row per raw packet

    ingest.stop().await.unwrap();
}
