//! # TagRelay Transport Layer
//!
//! Uniform client/server contract over TCP and UDP for gateway traffic.
//!
//! The wire protocol is self-delimiting per buffer: a UDP datagram carries
//! exactly one gateway frame, and deployed gateways write one frame per TCP
//! segment by convention. The transport therefore performs NO framing or
//! reassembly - it hands each inbound buffer to the caller as-is and lets the
//! codec filter anything that does not parse.
//!
//! ## What This Crate Contains
//! - [`TagClient`]: fire-and-forget `send` over a configured transport
//! - [`TagServer`]: bind/listen with inbound buffers delivered on a channel
//! - [`TransportError`]: the `AddressInUse` / `ConnectionRefused` / `Unknown`
//!   taxonomy surfaced to callers
//!
//! ## What This Crate Does NOT Contain
//! - Protocol encoding/decoding (belongs in libs/codec)
//! - Aggregate state (belongs in the services)

pub mod error;
pub mod transports;

pub use error::{Result, TransportError};
pub use transports::{
    connect_client, make_server, TagClient, TagServer, TransportKind,
    tcp::{TcpClient, TcpServer},
    udp::{UdpClient, UdpServer},
};
