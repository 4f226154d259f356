//! Ingestion service configuration.

use network::TransportKind;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Options for one ingestion run, as handed over by the embedding shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOptions {
    /// UDP or TCP listener.
    pub transport: TransportKind,
    /// Address to bind the listener to.
    pub bind_ip: IpAddr,
    pub bind_port: u16,
    /// Directory holding the per-gateway append-only raw logs. Purged on
    /// start and stop.
    pub cache_dir: PathBuf,
    /// Throughput rotation and cache flush interval.
    pub flush_interval: Duration,
}

impl IngestOptions {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.bind_port)
    }
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            transport: TransportKind::Udp,
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            bind_port: 9966,
            cache_dir: std::env::temp_dir().join("tagrelay-cache"),
            flush_interval: Duration::from_secs(1),
        }
    }
}
