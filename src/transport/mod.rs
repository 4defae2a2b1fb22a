//! Transport layer for StreamGoo.
//!
//! Provides the multicast/UDP packet source and the forwarding sink.

mod socket;
mod udp;

pub use socket::{create_udp_socket, SocketConfig};
pub use udp::{PacketSource, UdpSink, MAX_DATAGRAM};

use async_trait::async_trait;

use crate::error::Result;

/// Destination for forwarded datagrams.
#[async_trait]
pub trait DatagramSink: Send + Sync {
    /// Send one datagram.
    async fn send(&self, datagram: &[u8]) -> Result<()>;

    /// Human-readable destination for logs.
    fn describe(&self) -> String;
}
