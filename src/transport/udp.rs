//! UDP ingress and egress.
//!
//! The ingress side joins the configured multicast group (or simply binds when the
//! address is unicast); the egress side is a socket connected to the destination.
//! A unicast receiver that is not listening is reported, not fatal.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket as TokioUdpSocket;
use tracing::{info, warn};

use super::socket::{create_udp_socket, SocketConfig};
use super::DatagramSink;
use crate::config::{InputConfig, OutputConfig};
use crate::error::{Error, Result, TransportError};

/// Largest datagram we expect to receive.
pub const MAX_DATAGRAM: usize = 65_536;

/// Receiving side of the relay.
pub struct PacketSource {
    socket: TokioUdpSocket,
    buf: Vec<u8>,
}

impl PacketSource {
    /// Bind the ingress socket and join the configured group.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(config: &InputConfig) -> Result<Self> {
        let group = config
            .multicast_address
            .ok_or_else(|| Error::InvalidConfig("input multicast address is required".into()))?;
        let interface = config.interface();

        info!(
            "Looking for multicast {}:{} via adapter {}",
            group, config.multicast_port, interface
        );

        let mut socket_config = SocketConfig::receiver(config.recv_buffer_size);
        if group.is_multicast() {
            socket_config = socket_config.with_join(group, interface);
        }

        let bind = config.bind_addr();
        let std_socket = create_udp_socket(bind, &socket_config)?;
        let socket = TokioUdpSocket::from_std(std_socket.into()).map_err(|e| {
            TransportError::BindFailed {
                addr: bind,
                reason: e.to_string(),
            }
        })?;

        Ok(Self::from_socket(socket))
    }

    /// Wrap an already bound socket.
    pub fn from_socket(socket: TokioUdpSocket) -> Self {
        Self {
            socket,
            buf: vec![0u8; MAX_DATAGRAM],
        }
    }

    /// Local address of the ingress socket.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| TransportError::SocketError(e.to_string()).into())
    }

    /// Wait for the next datagram. Cancel-safe.
    pub async fn recv(&mut self) -> Result<Vec<u8>> {
        let (len, _) = self
            .socket
            .recv_from(&mut self.buf)
            .await
            .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
        Ok(self.buf[..len].to_vec())
    }
}

/// Sending side of the relay: a UDP socket connected to the destination.
pub struct UdpSink {
    socket: Arc<TokioUdpSocket>,
    destination: SocketAddr,
}

impl UdpSink {
    /// Open the egress socket.
    ///
    /// Any failure here means the relay has nowhere to forward to and is reported
    /// as [`Error::SinkUnavailable`].
    pub async fn connect(config: &OutputConfig) -> Result<Self> {
        let destination = config
            .destination()
            .ok_or_else(|| Error::SinkUnavailable("no output address configured".into()))?;
        let adapter = config.adapter.unwrap_or(Ipv4Addr::UNSPECIFIED);

        info!(
            "Outputting multicast data to {} via adapter {}",
            destination, adapter
        );

        let mut socket_config = SocketConfig::default();
        if destination.ip().is_multicast() {
            socket_config = socket_config.with_multicast_output(
                adapter,
                config.multicast_ttl,
                config.multicast_loop,
            );
        }

        let bind = config.bind_addr();
        let std_socket = create_udp_socket(bind, &socket_config)
            .map_err(|e| Error::SinkUnavailable(e.to_string()))?;
        let socket = TokioUdpSocket::from_std(std_socket.into())
            .map_err(|e| Error::SinkUnavailable(e.to_string()))?;

        Self::from_socket(socket, destination).await
    }

    /// Connect an already bound socket to `destination`.
    pub async fn from_socket(socket: TokioUdpSocket, destination: SocketAddr) -> Result<Self> {
        socket.connect(destination).await.map_err(|e| {
            Error::SinkUnavailable(
                TransportError::ConnectFailed {
                    addr: destination,
                    reason: e.to_string(),
                }
                .to_string(),
            )
        })?;

        Ok(Self {
            socket: Arc::new(socket),
            destination,
        })
    }

    /// Destination address.
    pub fn destination(&self) -> SocketAddr {
        self.destination
    }
}

#[async_trait]
impl DatagramSink for UdpSink {
    async fn send(&self, datagram: &[u8]) -> Result<()> {
        match self.socket.send(datagram).await {
            Ok(_) => Ok(()),
            // ICMP port unreachable from an earlier datagram
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                warn!("Nothing listening on {}: {}", self.destination, e);
                Ok(())
            }
            Err(e) => Err(TransportError::SendFailed(e.to_string()).into()),
        }
    }

    fn describe(&self) -> String {
        format!("udp://{}", self.destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sink_to_source_loopback() {
        let rx = TokioUdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut source = PacketSource::from_socket(rx);
        let dest = source.local_addr().unwrap();

        let tx = TokioUdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sink = UdpSink::from_socket(tx, dest).await.unwrap();
        assert_eq!(sink.describe(), format!("udp://{dest}"));

        sink.send(&[0x47, 0x1F, 0xFF]).await.unwrap();
        assert_eq!(source.recv().await.unwrap(), vec![0x47, 0x1F, 0xFF]);
    }

    #[tokio::test]
    async fn test_send_to_closed_port_keeps_going() {
        let gone = TokioUdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dest = gone.local_addr().unwrap();
        drop(gone);

        let tx = TokioUdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sink = UdpSink::from_socket(tx, dest).await.unwrap();
        for _ in 0..5 {
            sink.send(&[0x47; 188]).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_unicast_ingress_skips_join() {
        let config = InputConfig {
            multicast_address: Some(Ipv4Addr::LOCALHOST),
            multicast_port: 0,
            ..Default::default()
        };
        let source = PacketSource::bind(&config).unwrap();
        assert!(source.local_addr().unwrap().port() > 0);
    }

    #[tokio::test]
    async fn test_sink_requires_destination() {
        let err = UdpSink::connect(&OutputConfig::default()).await.err().unwrap();
        assert!(matches!(err, Error::SinkUnavailable(_)));
    }
}
