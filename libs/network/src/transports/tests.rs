//! Loopback integration tests for both transports.

use super::*;
use crate::TransportError;
use std::time::Duration;
use tokio::time::timeout;

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

#[tokio::test]
async fn udp_send_receive_roundtrip() {
    let mut server = udp::UdpServer::new(loopback());
    let mut inbound = server.listen().await.unwrap();
    let addr = server.local_addr().unwrap();

    let client = connect_client(TransportKind::Udp, addr).await.unwrap();
    client.send(b"one datagram").await.unwrap();

    let buf = timeout(Duration::from_secs(2), inbound.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..], b"one datagram");
}

#[tokio::test]
async fn udp_datagrams_arrive_whole() {
    let mut server = udp::UdpServer::new(loopback());
    let mut inbound = server.listen().await.unwrap();
    let addr = server.local_addr().unwrap();

    let client = connect_client(TransportKind::Udp, addr).await.unwrap();
    client.send(b"first").await.unwrap();
    client.send(b"second").await.unwrap();

    let first = timeout(Duration::from_secs(2), inbound.recv())
        .await
        .unwrap()
        .unwrap();
    let second = timeout(Duration::from_secs(2), inbound.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&first[..], b"first");
    assert_eq!(&second[..], b"second");
}

#[tokio::test]
async fn tcp_send_receive_roundtrip() {
    let mut server = tcp::TcpServer::new(loopback());
    let mut inbound = server.listen().await.unwrap();
    let addr = server.local_addr().unwrap();

    let client = connect_client(TransportKind::Tcp, addr).await.unwrap();
    client.send(b"one frame").await.unwrap();

    let buf = timeout(Duration::from_secs(2), inbound.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..], b"one frame");
}

#[tokio::test]
async fn udp_bind_conflict_is_address_in_use() {
    let mut first = udp::UdpServer::new(loopback());
    let _inbound = first.listen().await.unwrap();
    let taken = first.local_addr().unwrap();

    let mut second = udp::UdpServer::new(taken);
    match second.listen().await {
        Err(TransportError::AddressInUse { addr }) => assert_eq!(addr, taken),
        other => panic!("expected AddressInUse, got {other:?}"),
    }
}

#[tokio::test]
async fn tcp_connect_refused_is_classified() {
    // bind then immediately close to get a port nobody is listening on
    let mut server = tcp::TcpServer::new(loopback());
    let _inbound = server.listen().await.unwrap();
    let addr = server.local_addr().unwrap();
    server.close();
    tokio::time::sleep(Duration::from_millis(50)).await;

    match tcp::TcpClient::connect(addr).await {
        Err(TransportError::ConnectionRefused { .. }) => {}
        // some platforms report a different kind here; Unknown is acceptable
        Err(TransportError::Unknown { .. }) => {}
        other => panic!("expected a connection failure, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn server_close_stops_delivery() {
    let mut server = udp::UdpServer::new(loopback());
    let mut inbound = server.listen().await.unwrap();
    let addr = server.local_addr().unwrap();
    server.close();

    let client = connect_client(TransportKind::Udp, addr).await.unwrap();
    // send may still succeed at the socket level; nothing must be delivered
    let _ = client.send(b"late").await;
    let result = timeout(Duration::from_millis(200), inbound.recv()).await;
    assert!(matches!(result, Ok(None) | Err(_)));
}
