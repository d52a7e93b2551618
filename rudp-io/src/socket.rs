//! UDP socket wrapper for RUDP
//!
//! Builds the datagram socket through `socket2` so buffer sizes can be set
//! before binding, then does blocking I/O through the standard library socket.

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;
use thiserror::Error;

/// Socket configuration errors
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Options applied when the socket is created
#[derive(Debug, Clone, Default)]
pub struct SocketOptions {
    /// Kernel send buffer size
    pub send_buffer_size: Option<usize>,
    /// Kernel receive buffer size
    pub recv_buffer_size: Option<usize>,
    /// Maximum time a receive blocks; `None` blocks until a datagram arrives
    pub read_timeout: Option<Duration>,
}

/// RUDP socket wrapper
///
/// Blocking UDP socket. All I/O methods take `&self`, so one thread can sit
/// in a receive while others send.
#[derive(Debug)]
pub struct RudpSocket {
    inner: UdpSocket,
}

impl RudpSocket {
    /// Create a new socket bound to the given address
    pub fn bind(addr: SocketAddr, options: &SocketOptions) -> Result<Self, SocketError> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

        if let Some(size) = options.send_buffer_size {
            socket.set_send_buffer_size(size)?;
        }
        if let Some(size) = options.recv_buffer_size {
            socket.set_recv_buffer_size(size)?;
        }

        socket.bind(&addr.into())?;
        socket.set_nonblocking(false)?;
        socket.set_read_timeout(options.read_timeout)?;
        tracing::debug!(local = %addr, ?options, "udp socket bound");

        Ok(RudpSocket {
            inner: socket.into(),
        })
    }

    /// Bind an ephemeral local port of the peer's family and connect to the peer
    pub fn connect(peer: SocketAddr, options: &SocketOptions) -> Result<Self, SocketError> {
        let local: SocketAddr = if peer.is_ipv4() {
            (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = Self::bind(local, options)?;
        socket.inner.connect(peer)?;
        Ok(socket)
    }

    /// Get the local address this socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr, SocketError> {
        Ok(self.inner.local_addr()?)
    }

    /// Get the connected peer address
    pub fn peer_addr(&self) -> Result<SocketAddr, SocketError> {
        Ok(self.inner.peer_addr()?)
    }

    /// Send data to the connected peer
    pub fn send(&self, buf: &[u8]) -> Result<usize, SocketError> {
        Ok(self.inner.send(buf)?)
    }

    /// Send data to the given address
    pub fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize, SocketError> {
        Ok(self.inner.send_to(buf, target)?)
    }

    /// Receive one datagram from the connected peer
    pub fn recv(&self, buf: &mut [u8]) -> Result<usize, SocketError> {
        Ok(self.inner.recv(buf)?)
    }

    /// Receive one datagram and its source address
    pub fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), SocketError> {
        Ok(self.inner.recv_from(buf)?)
    }

    /// Change how long a receive may block
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), SocketError> {
        Ok(self.inner.set_read_timeout(timeout)?)
    }

    /// Get the send buffer size
    pub fn send_buffer_size(&self) -> Result<usize, SocketError> {
        Ok(socket2::SockRef::from(&self.inner).send_buffer_size()?)
    }

    /// Get the receive buffer size
    pub fn recv_buffer_size(&self) -> Result<usize, SocketError> {
        Ok(socket2::SockRef::from(&self.inner).recv_buffer_size()?)
    }

    /// Get a reference to the underlying socket
    pub fn as_udp_socket(&self) -> &UdpSocket {
        &self.inner
    }
}
