//! RUDP client: one connected socket, one connection to the server

use crate::config::EndpointConfig;
use crate::endpoint::{Received, Sent, SocketHandle};
use crate::error::Result;
use bytes::Bytes;
use parking_lot::Mutex;
use rudp_io::RudpSocket;
use rudp_protocol::{Connection, ConnectionError, ConnectionStats, PacketError};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// RUDP client endpoint
///
/// Every method takes `&self`; share it behind an `Arc` to receive on one
/// thread while sending from others.
#[derive(Debug)]
pub struct Client {
    handle: SocketHandle,
    peer: SocketAddr,
    connection: Mutex<Connection>,
}

impl Client {
    pub(crate) fn new(socket: RudpSocket, peer: SocketAddr, config: EndpointConfig) -> Result<Self> {
        let mut connection = Connection::new(peer, config.retransmit_timeout)
            .with_max_datagram_size(config.max_datagram_size);
        connection.activate()?;

        Ok(Client {
            handle: SocketHandle::new(socket, config.max_datagram_size),
            peer,
            connection: Mutex::new(connection),
        })
    }

    /// Send a payload to the server
    ///
    /// Reliable payloads are numbered and resent until the server confirms them.
    /// A payload whose frame exceeds the configured datagram size fails with
    /// [`crate::RudpError::Protocol`] before anything is written.
    pub fn send(&self, payload: &[u8], reliable: bool) -> Result<Sent> {
        let socket = self.handle.get()?;

        // frame and write under one lock so wire order follows sequence order
        let mut conn = self.connection.lock();
        let outgoing = conn.prepare_send(payload, reliable, Instant::now())?;
        let written = socket.send(&outgoing.frame)?;
        drop(conn);

        let header_len = outgoing.frame.len() - outgoing.payload_len;
        Ok(Sent {
            len: written.saturating_sub(header_len),
            seq: outgoing.seq,
        })
    }

    /// Block until the server sends something and copy its payload into `buf`
    ///
    /// Unconfirmed packets older than the retransmit timeout are resent as a
    /// side effect. If `buf` cannot hold the payload the call fails with
    /// [`crate::RudpError::Capacity`] and the same datagram is delivered by the next
    /// receive.
    pub fn receive(&self, buf: &mut [u8]) -> Result<Received> {
        let socket = self.handle.get()?;
        let peer = self.peer;
        let (datagram, from) = self
            .handle
            .next_datagram(&socket, |s, scratch| Ok((s.recv(scratch)?, peer)))?;

        let result = self
            .connection
            .lock()
            .process_datagram(&datagram, buf, Instant::now());
        let incoming = match result {
            Ok(incoming) => incoming,
            Err(ConnectionError::Packet(e @ PacketError::BufferTooSmall { .. })) => {
                self.handle.stash(datagram, from);
                return Err(e.into());
            }
            Err(e) => {
                tracing::warn!(peer = %from, error = %e, "dropping datagram");
                return Err(e.into());
            }
        };

        self.resend(&socket, &incoming.resend);

        Ok(Received {
            len: incoming.len,
            seq: incoming.seq,
            confirmed: incoming.confirmed,
            peer: from,
        })
    }

    /// Resend stale reliable packets without waiting for inbound traffic
    ///
    /// Returns how many frames were written.
    pub fn tick(&self) -> Result<usize> {
        let socket = self.handle.get()?;
        let stale = self.connection.lock().stale_frames(Instant::now())?;
        Ok(self.resend(&socket, &stale))
    }

    fn resend(&self, socket: &RudpSocket, frames: &[Bytes]) -> usize {
        let mut written = 0;
        for frame in frames {
            match socket.send(frame) {
                Ok(_) => written += 1,
                Err(e) => tracing::warn!(peer = %self.peer, error = %e, "retransmission failed"),
            }
        }
        written
    }

    /// Close the client; later calls fail with [`crate::RudpError::Closed`]
    pub fn close(&self) -> Result<()> {
        self.connection.lock().close();
        if self.handle.release() {
            tracing::info!(peer = %self.peer, "rudp client closed");
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_open() && self.connection.lock().is_active()
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.handle.get()?.local_addr()?)
    }

    /// Address of the server this client talks to
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Change how long `receive` may block
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Ok(self.handle.get()?.set_read_timeout(timeout)?)
    }

    /// Number of reliable packets still awaiting confirmation
    pub fn in_flight(&self) -> usize {
        self.connection.lock().in_flight().len()
    }

    pub fn stats(&self) -> ConnectionStats {
        self.connection.lock().stats()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if self.handle.is_open() {
            let _ = self.close();
        }
    }
}
