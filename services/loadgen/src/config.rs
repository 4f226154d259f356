//! Load generator configuration.

use network::TransportKind;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

/// Which vendor's payload the synthetic tags emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagVendor {
    IotBox,
    Sotoa,
}

impl FromStr for TagVendor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "IOT_BOX" => Ok(Self::IotBox),
            "SOTOA" => Ok(Self::Sotoa),
            other => Err(format!("unknown vendor '{other}', expected IOT_BOX or SOTOA")),
        }
    }
}

/// Options for one generator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorOptions {
    pub transport: TransportKind,
    pub vendor: TagVendor,
    /// Ingestion endpoint to send traffic to.
    pub target_ip: IpAddr,
    pub target_port: u16,
    /// Per-tag advertisement rate, events per second.
    pub rate: u32,
    pub gateway_count: u16,
    /// Simulated tags per gateway.
    pub tag_count: u16,
    /// First two mac bytes shared by every simulated device.
    pub mac_prefix: u16,
    /// Records a gateway accumulates before relaying one frame.
    pub batch_size: usize,
}

impl GeneratorOptions {
    pub fn target_addr(&self) -> SocketAddr {
        SocketAddr::new(self.target_ip, self.target_port)
    }
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            transport: TransportKind::Udp,
            vendor: TagVendor::IotBox,
            target_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            target_port: 9966,
            rate: 10,
            gateway_count: 1,
            tag_count: 30,
            mac_prefix: 0x0201,
            batch_size: 26,
        }
    }
}
