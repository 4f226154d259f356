//! UDP transport implementation.
//!
//! One datagram per send, no connection state. The receive loop forwards each
//! datagram as one inbound buffer; anything that is not a whole frame gets
//! filtered by the codec downstream, never here.

use super::{TagClient, TagServer, INBOUND_CHANNEL_CAPACITY, RECV_BUFFER_SIZE};
use crate::{Result, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// UDP client bound to an ephemeral local port and connected to the remote.
pub struct UdpClient {
    socket: UdpSocket,
    remote: SocketAddr,
}

impl UdpClient {
    pub async fn connect(remote: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| TransportError::from_io(e, remote))?;
        socket
            .connect(remote)
            .await
            .map_err(|e| TransportError::from_io(e, remote))?;
        Ok(Self { socket, remote })
    }
}

#[async_trait]
impl TagClient for UdpClient {
    async fn send(&self, data: &[u8]) -> Result<()> {
        let sent = self
            .socket
            .send(data)
            .await
            .map_err(|e| TransportError::from_io(e, self.remote))?;
        debug!(bytes = sent, remote = %self.remote, "sent udp datagram");
        Ok(())
    }
}

/// UDP server delivering one inbound buffer per datagram.
pub struct UdpServer {
    bind: SocketAddr,
    local_addr: Option<SocketAddr>,
    recv_task: Option<JoinHandle<()>>,
}

impl UdpServer {
    pub fn new(bind: SocketAddr) -> Self {
        Self {
            bind,
            local_addr: None,
            recv_task: None,
        }
    }
}

#[async_trait]
impl TagServer for UdpServer {
    async fn listen(&mut self) -> Result<mpsc::Receiver<Bytes>> {
        let socket = Arc::new(
            UdpSocket::bind(self.bind)
                .await
                .map_err(|e| TransportError::from_io(e, self.bind))?,
        );
        self.local_addr = socket.local_addr().ok();
        info!(addr = ?self.local_addr, "udp server listening");

        let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let recv_socket = Arc::clone(&socket);
        self.recv_task = Some(tokio::spawn(async move {
            let mut buf = vec![0u8; RECV_BUFFER_SIZE];
            loop {
                match recv_socket.recv_from(&mut buf).await {
                    Ok((len, peer)) => {
                        debug!(bytes = len, %peer, "received udp datagram");
                        if tx
                            .send(Bytes::copy_from_slice(&buf[..len]))
                            .await
                            .is_err()
                        {
                            // listener gone, stop reading
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "udp receive failed, stopping listener");
                        break;
                    }
                }
            }
        }));
        Ok(rx)
    }

    fn close(&mut self) {
        if let Some(task) = self.recv_task.take() {
            task.abort();
            info!(addr = ?self.local_addr, "udp server closed");
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

impl Drop for UdpServer {
    fn drop(&mut self) {
        self.close();
    }
}
