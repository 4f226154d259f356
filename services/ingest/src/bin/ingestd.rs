//! Standalone ingestion daemon.
//!
//! Binds the configured listener, runs the ingestion pipeline until ctrl-c,
//! then drains and flushes before exiting.

use clap::Parser;
use network::TransportKind;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use tagrelay_ingest::{IngestOptions, IngestService};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "ingestd", about = "TagRelay gateway telemetry listener")]
struct Args {
    /// Listener transport: UDP or TCP
    #[arg(long, default_value = "UDP")]
    transport: TransportKind,

    /// Address to bind the listener to
    #[arg(long, default_value = "0.0.0.0")]
    bind_ip: IpAddr,

    /// Port to bind the listener to
    #[arg(long, default_value_t = 9966)]
    bind_port: u16,

    /// Directory for the per-gateway raw packet logs
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Rate rotation and cache flush interval, milliseconds
    #[arg(long, default_value_t = 1000)]
    flush_interval_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let options = IngestOptions {
        transport: args.transport,
        bind_ip: args.bind_ip,
        bind_port: args.bind_port,
        cache_dir: args
            .cache_dir
            .unwrap_or_else(|| IngestOptions::default().cache_dir),
        flush_interval: Duration::from_millis(args.flush_interval_ms),
    };

    let mut service = IngestService::new();
    service.start(options).await?;
    info!(addr = ?service.local_addr(), "listening, ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested, draining");
    for gateway in service.list_gateways() {
        info!(
            gateway = %gateway.mac,
            total = gateway.total,
            tags = gateway.tag_count,
            "final gateway stats"
        );
    }
    if let Err(err) = service.stop().await {
        error!(error = %err, "shutdown failed");
    }
    Ok(())
}
