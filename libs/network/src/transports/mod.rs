//! Unified transport layer.
//!
//! One capability set over both supported transports: clients `send` whole
//! outbound buffers, servers `listen` and deliver whole inbound buffers on an
//! mpsc channel, and `close` tears the socket tasks down. Framing belongs to
//! the wire protocol, not to this layer.

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::str::FromStr;
use tokio::sync::mpsc;

pub mod tcp;
pub mod udp;

#[cfg(test)]
mod tests;

/// Capacity of the inbound buffer channel handed out by [`TagServer::listen`].
/// Bursts beyond this apply backpressure to the socket read loop.
pub(crate) const INBOUND_CHANNEL_CAPACITY: usize = 1024;

/// Read buffer size for socket receives. Comfortably above the largest legal
/// frame (26 tags x 38 bytes + header).
pub(crate) const RECV_BUFFER_SIZE: usize = 64 * 1024;

/// Transport selection carried in service configs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportKind {
    Udp,
    Tcp,
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UDP" => Ok(Self::Udp),
            "TCP" => Ok(Self::Tcp),
            other => Err(format!("unknown transport '{other}', expected UDP or TCP")),
        }
    }
}

/// Outbound side: one gateway (real or simulated) sending frames upstream.
#[async_trait]
pub trait TagClient: Send + Sync {
    /// Send one whole buffer. UDP sends a single datagram; TCP writes to the
    /// established stream. A failure is surfaced to the caller, which owns
    /// the decision to stop.
    async fn send(&self, data: &[u8]) -> Result<()>;
}

/// Inbound side: the ingestion listener.
#[async_trait]
pub trait TagServer: Send {
    /// Bind and start receiving. Each inbound buffer arrives on the returned
    /// channel exactly as read from the socket.
    async fn listen(&mut self) -> Result<mpsc::Receiver<Bytes>>;

    /// Stop the socket tasks. Idempotent.
    fn close(&mut self);

    /// Address actually bound, available after `listen`.
    fn local_addr(&self) -> Option<SocketAddr>;
}

/// Connect a client for the given transport.
pub async fn connect_client(kind: TransportKind, remote: SocketAddr) -> Result<Box<dyn TagClient>> {
    match kind {
        TransportKind::Udp => Ok(Box::new(udp::UdpClient::connect(remote).await?)),
        TransportKind::Tcp => Ok(Box::new(tcp::TcpClient::connect(remote).await?)),
    }
}

/// Build an unbound server for the given transport; `listen` binds it.
pub fn make_server(kind: TransportKind, bind: SocketAddr) -> Box<dyn TagServer> {
    match kind {
        TransportKind::Udp => Box::new(udp::UdpServer::new(bind)),
        TransportKind::Tcp => Box::new(tcp::TcpServer::new(bind)),
    }
}
