//! Endpoint factory and the socket plumbing shared by client and server.

use crate::client::Client;
use crate::config::EndpointConfig;
use crate::error::{Result, RudpError};
use crate::server::Server;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use rudp_io::RudpSocket;
use rudp_protocol::{PacketError, SeqNumber};
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use std::sync::Arc;

/// UDP address family selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    /// Either family, first resolved address wins
    Udp,
    /// IPv4 only
    Udp4,
    /// IPv6 only
    Udp6,
}

impl Network {
    pub fn as_str(self) -> &'static str {
        match self {
            Network::Udp => "udp",
            Network::Udp4 => "udp4",
            Network::Udp6 => "udp6",
        }
    }

    fn accepts(self, addr: &SocketAddr) -> bool {
        match self {
            Network::Udp => true,
            Network::Udp4 => addr.is_ipv4(),
            Network::Udp6 => addr.is_ipv6(),
        }
    }
}

impl FromStr for Network {
    type Err = RudpError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "udp" => Ok(Network::Udp),
            "udp4" => Ok(Network::Udp4),
            "udp6" => Ok(Network::Udp6),
            other => Err(RudpError::Config(format!(
                "unsupported network {other:?}: only udp, udp4 and udp6 are accepted"
            ))),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sent {
    /// Payload bytes written (header excluded)
    pub len: usize,
    /// Sequence number assigned to a reliable send
    pub seq: Option<SeqNumber>,
}

/// Result of a receive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    /// Payload bytes copied to the caller's buffer
    pub len: usize,
    /// Peer's sequence number if the packet was reliable
    pub seq: Option<SeqNumber>,
    /// Our reliable sends newly confirmed by this packet
    pub confirmed: Vec<SeqNumber>,
    /// Source of the packet
    pub peer: SocketAddr,
}

/// Resolve `host:port` to the first address of the requested family
pub fn resolve(network: Network, host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .find(|addr| network.accepts(addr))
        .ok_or_else(|| RudpError::Config(format!("no {network} address found for {host}:{port}")))
}

/// Bind a server to a local address with default configuration
pub fn listen(network: Network, host: &str, port: u16) -> Result<Server> {
    listen_with_config(network, host, port, EndpointConfig::default())
}

/// Bind a server to a local address
pub fn listen_with_config(
    network: Network,
    host: &str,
    port: u16,
    config: EndpointConfig,
) -> Result<Server> {
    let addr = resolve(network, host, port)?;
    let socket = RudpSocket::bind(addr, &config.socket_options())?;
    tracing::info!(local = %socket.local_addr()?, %network, "rudp server listening");
    Ok(Server::new(socket, config))
}

/// Connect a client to a remote server with default configuration
pub fn dial(network: Network, host: &str, port: u16) -> Result<Client> {
    dial_with_config(network, host, port, EndpointConfig::default())
}

/// Connect a client to a remote server
pub fn dial_with_config(
    network: Network,
    host: &str,
    port: u16,
    config: EndpointConfig,
) -> Result<Client> {
    let peer = resolve(network, host, port)?;
    let socket = RudpSocket::connect(peer, &config.socket_options())?;
    tracing::info!(local = %socket.local_addr()?, %peer, "rudp client connected");
    Client::new(socket, peer, config)
}

/// Socket ownership and datagram intake shared by both endpoint kinds
///
/// Closing takes the socket out of the slot; a receive already blocked on it
/// keeps its own reference until the read returns.
#[derive(Debug)]
pub(crate) struct SocketHandle {
    socket: RwLock<Option<Arc<RudpSocket>>>,
    /// Datagram that did not fit the caller's buffer, redelivered first
    pending: Mutex<Option<(Bytes, SocketAddr)>>,
    max_datagram_size: usize,
}

impl SocketHandle {
    pub(crate) fn new(socket: RudpSocket, max_datagram_size: usize) -> Self {
        SocketHandle {
            socket: RwLock::new(Some(Arc::new(socket))),
            pending: Mutex::new(None),
            max_datagram_size,
        }
    }

    pub(crate) fn get(&self) -> Result<Arc<RudpSocket>> {
        self.socket.read().clone().ok_or(RudpError::Closed)
    }

    pub(crate) fn is_open(&self) -> bool {
        self.socket.read().is_some()
    }

    /// Drop the socket; returns false if it was already released
    pub(crate) fn release(&self) -> bool {
        self.pending.lock().take();
        self.socket.write().take().is_some()
    }

    pub(crate) fn max_datagram_size(&self) -> usize {
        self.max_datagram_size
    }

    /// Next datagram to process: the stashed one if any, else a fresh read
    ///
    /// The read buffer has one spare byte, so a datagram the OS would have
    /// cut to the limit is seen as oversized and rejected instead.
    pub(crate) fn next_datagram<F>(&self, socket: &RudpSocket, read: F) -> Result<(Bytes, SocketAddr)>
    where
        F: FnOnce(&RudpSocket, &mut [u8]) -> Result<(usize, SocketAddr)>,
    {
        if let Some(pending) = self.pending.lock().take() {
            return Ok(pending);
        }

        let limit = self.max_datagram_size;
        let mut scratch = vec![0u8; limit + 1];
        let (n, from) = read(socket, &mut scratch)?;
        if n > limit {
            tracing::warn!(peer = %from, limit, "dropping oversized datagram");
            return Err(PacketError::Oversized { size: n, limit }.into());
        }
        scratch.truncate(n);
        Ok((Bytes::from(scratch), from))
    }

    /// Keep a datagram for the next receive call
    pub(crate) fn stash(&self, datagram: Bytes, from: SocketAddr) {
        *self.pending.lock() = Some((datagram, from));
    }
}
