//! Standalone load generator.
//!
//! Simulates a gateway fleet against an ingestion endpoint until ctrl-c,
//! then prints final per-gateway traffic stats.

use clap::Parser;
use network::TransportKind;
use std::net::IpAddr;
use tagrelay_loadgen::{GeneratorOptions, GeneratorService, TagVendor};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "loadgen", about = "TagRelay gateway fleet simulator")]
struct Args {
    /// Transport to send over: UDP or TCP
    #[arg(long, default_value = "UDP")]
    transport: TransportKind,

    /// Tag vendor to simulate: IOT_BOX or SOTOA
    #[arg(long, default_value = "IOT_BOX")]
    vendor: TagVendor,

    /// Ingestion endpoint address
    #[arg(long, default_value = "127.0.0.1")]
    target_ip: IpAddr,

    /// Ingestion endpoint port
    #[arg(long, default_value_t = 9966)]
    target_port: u16,

    /// Per-tag advertisement rate, events per second
    #[arg(long, default_value_t = 10)]
    rate: u32,

    /// Number of simulated gateways
    #[arg(long, default_value_t = 1)]
    gateway_count: u16,

    /// Simulated tags per gateway
    #[arg(long, default_value_t = 30)]
    tag_count: u16,

    /// Shared 2-byte mac prefix, hex
    #[arg(long, default_value = "0201")]
    mac_prefix: String,
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
    let mac_prefix = u16::from_str_radix(args.mac_prefix.trim_start_matches("0x"), 16)
        .map_err(|err| anyhow::anyhow!("invalid mac prefix '{}': {err}", args.mac_prefix))?;
    let options = GeneratorOptions {
        transport: args.transport,
        vendor: args.vendor,
        target_ip: args.target_ip,
        target_port: args.target_port,
        rate: args.rate,
        gateway_count: args.gateway_count,
        tag_count: args.tag_count,
        mac_prefix,
        ..GeneratorOptions::default()
    };

    let mut generator = GeneratorService::new();
    generator.start(options).await?;
    info!("fleet running, ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    for gateway in generator.list_gateways() {
        info!(
            gateway = %gateway.mac,
            total = gateway.total,
            tags = gateway.tag_count,
            "final traffic stats"
        );
    }
    if let Err(err) = generator.stop().await {
        error!(error = %err, "shutdown failed");
    }
    Ok(())
}
