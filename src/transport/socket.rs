//! Low-level socket creation for the ingress and egress sides.

use std::net::{Ipv4Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::debug;

use crate::error::{Result, TransportError};

/// Socket configuration options.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub recv_buffer_size: Option<usize>,
    pub reuse_addr: bool,
    /// Group to join after binding, with the local interface to join on.
    pub multicast_join: Option<(Ipv4Addr, Ipv4Addr)>,
    /// Interface used for outgoing multicast.
    pub multicast_if: Option<Ipv4Addr>,
    pub multicast_ttl: Option<u32>,
    pub multicast_loop: Option<bool>,
}

impl SocketConfig {
    /// Configuration for a receiving socket.
    pub fn receiver(recv_buffer_size: usize) -> Self {
        Self {
            recv_buffer_size: Some(recv_buffer_size),
            ..Default::default()
        }
    }

    /// Join `group` on `interface` once bound.
    pub fn with_join(mut self, group: Ipv4Addr, interface: Ipv4Addr) -> Self {
        self.multicast_join = Some((group, interface));
        self
    }

    /// Send multicast through `interface` with the given TTL.
    pub fn with_multicast_output(mut self, interface: Ipv4Addr, ttl: u32, loopback: bool) -> Self {
        self.multicast_if = Some(interface);
        self.multicast_ttl = Some(ttl);
        self.multicast_loop = Some(loopback);
        self
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            recv_buffer_size: None,
            reuse_addr: true,
            multicast_join: None,
            multicast_if: None,
            multicast_ttl: None,
            multicast_loop: None,
        }
    }
}

/// Create a bound, non-blocking UDP socket.
pub fn create_udp_socket(addr: SocketAddr, config: &SocketConfig) -> Result<Socket> {
    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| TransportError::SocketError(e.to_string()))?;

    configure_socket(&socket, config)?;

    socket
        .bind(&addr.into())
        .map_err(|e| TransportError::BindFailed {
            addr,
            reason: e.to_string(),
        })?;

    if let Some((group, interface)) = config.multicast_join {
        socket
            .join_multicast_v4(&group, &interface)
            .map_err(|e| TransportError::JoinFailed {
                group: group.to_string(),
                reason: e.to_string(),
            })?;
        debug!("Joined multicast group {} via {}", group, interface);
    }

    configure_multicast_output(&socket, config)?;

    socket
        .set_nonblocking(true)
        .map_err(|e| TransportError::SocketError(e.to_string()))?;

    Ok(socket)
}

/// Apply common socket configuration.
fn configure_socket(socket: &Socket, config: &SocketConfig) -> Result<()> {
    if let Some(size) = config.recv_buffer_size {
        socket
            .set_recv_buffer_size(size)
            .map_err(|e| TransportError::SocketError(format!("set recv buffer: {e}")))?;
    }

    if config.reuse_addr {
        socket
            .set_reuse_address(true)
            .map_err(|e| TransportError::SocketError(format!("set reuse addr: {e}")))?;
    }

    Ok(())
}

fn configure_multicast_output(socket: &Socket, config: &SocketConfig) -> Result<()> {
    if let Some(interface) = config.multicast_if {
        socket
            .set_multicast_if_v4(&interface)
            .map_err(|e| TransportError::SocketError(format!("set multicast if: {e}")))?;
    }

    if let Some(ttl) = config.multicast_ttl {
        socket
            .set_multicast_ttl_v4(ttl)
            .map_err(|e| TransportError::SocketError(format!("set multicast ttl: {e}")))?;
    }

    if let Some(enabled) = config.multicast_loop {
        socket
            .set_multicast_loop_v4(enabled)
            .map_err(|e| TransportError::SocketError(format!("set multicast loop: {e}")))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_config_builders() {
        let config = SocketConfig::receiver(1024)
            .with_join(Ipv4Addr::new(239, 1, 1, 1), Ipv4Addr::UNSPECIFIED);

        assert_eq!(config.recv_buffer_size, Some(1024));
        assert_eq!(
            config.multicast_join,
            Some((Ipv4Addr::new(239, 1, 1, 1), Ipv4Addr::UNSPECIFIED))
        );
        assert!(config.reuse_addr);
    }

    #[test]
    fn test_create_udp_socket() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let config = SocketConfig::receiver(64 * 1024);

        let socket = create_udp_socket(addr, &config).unwrap();
        let local = socket.local_addr().unwrap();
        assert!(local.as_socket().is_some());
    }

    #[test]
    fn test_receiver_options_applied() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let socket = create_udp_socket(addr, &SocketConfig::receiver(64 * 1024)).unwrap();

        assert!(socket.reuse_address().unwrap());
        assert!(socket.recv_buffer_size().unwrap() >= 64 * 1024);
    }

    #[test]
    fn test_create_multicast_sender() {
        let addr: SocketAddr = "0.0.0.0:0".parse().unwrap();
        let config = SocketConfig::default().with_multicast_output(Ipv4Addr::UNSPECIFIED, 1, true);

        assert!(create_udp_socket(addr, &config).is_ok());
    }
}
