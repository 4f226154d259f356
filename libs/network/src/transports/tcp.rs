//! TCP transport implementation.
//!
//! The server multiplexes every accepted connection's reads through one
//! inbound channel. Each read chunk is forwarded as one buffer: by protocol
//! convention deployed gateways write exactly one frame per segment, and this
//! layer performs no reassembly. A stream may still split or coalesce frames
//! under load; such chunks fail frame decode downstream and are dropped.

use super::{TagClient, TagServer, INBOUND_CHANNEL_CAPACITY, RECV_BUFFER_SIZE};
use crate::{Result, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// TCP client holding one established stream.
pub struct TcpClient {
    stream: Mutex<TcpStream>,
    remote: SocketAddr,
}

impl TcpClient {
    pub async fn connect(remote: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(remote)
            .await
            .map_err(|e| TransportError::from_io(e, remote))?;
        if let Err(err) = stream.set_nodelay(true) {
            warn!(error = %err, "failed to set TCP_NODELAY");
        }
        info!(%remote, "tcp client connected");
        Ok(Self {
            stream: Mutex::new(stream),
            remote,
        })
    }
}

#[async_trait]
impl TagClient for TcpClient {
    async fn send(&self, data: &[u8]) -> Result<()> {
        let mut stream = self.stream.lock().await;
        stream
            .write_all(data)
            .await
            .map_err(|e| TransportError::from_io(e, self.remote))?;
        stream
            .flush()
            .await
            .map_err(|e| TransportError::from_io(e, self.remote))?;
        debug!(bytes = data.len(), remote = %self.remote, "sent tcp buffer");
        Ok(())
    }
}

/// TCP server accepting any number of gateway connections.
pub struct TcpServer {
    bind: SocketAddr,
    local_addr: Option<SocketAddr>,
    accept_task: Option<JoinHandle<()>>,
}

impl TcpServer {
    pub fn new(bind: SocketAddr) -> Self {
        Self {
            bind,
            local_addr: None,
            accept_task: None,
        }
    }
}

#[async_trait]
impl TagServer for TcpServer {
    async fn listen(&mut self) -> Result<mpsc::Receiver<Bytes>> {
        let listener = TcpListener::bind(self.bind)
            .await
            .map_err(|e| TransportError::from_io(e, self.bind))?;
        self.local_addr = listener.local_addr().ok();
        info!(addr = ?self.local_addr, "tcp server listening");

        let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        self.accept_task = Some(tokio::spawn(async move {
            // connection tasks die with the JoinSet when the accept task is
            // aborted
            let mut connections = JoinSet::new();
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        info!(%peer, "gateway connected");
                        connections.spawn(read_loop(stream, peer, tx.clone()));
                    }
                    Err(err) => {
                        warn!(error = %err, "tcp accept failed, stopping listener");
                        break;
                    }
                }
            }
        }));
        Ok(rx)
    }

    fn close(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
            info!(addr = ?self.local_addr, "tcp server closed");
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

impl Drop for TcpServer {
    fn drop(&mut self) {
        self.close();
    }
}

/// Forward each read chunk from one connection as one inbound buffer.
async fn read_loop(mut stream: TcpStream, peer: SocketAddr, tx: mpsc::Sender<Bytes>) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => {
                info!(%peer, "gateway disconnected");
                break;
            }
            Ok(len) => {
                debug!(bytes = len, %peer, "received tcp chunk");
                if tx.send(Bytes::copy_from_slice(&buf[..len])).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                warn!(error = %err, %peer, "tcp read failed, dropping connection");
                break;
            }
        }
    }
}
