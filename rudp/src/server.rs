//! RUDP server: one bound socket, one connection per remote address

use crate::config::EndpointConfig;
use crate::endpoint::{Received, Sent, SocketHandle};
use crate::error::{Result, RudpError};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use rudp_io::{millis_since, RudpSocket};
use rudp_protocol::{Connection, ConnectionError, ConnectionStats, PacketError, PacketHeader};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

type SharedConnection = Arc<Mutex<Connection>>;

/// RUDP server endpoint
///
/// Connections are created the first time a datagram arrives from a new
/// address. Each one has its own lock, so traffic for different peers only
/// contends on the table lookup.
#[derive(Debug)]
pub struct Server {
    handle: SocketHandle,
    connections: RwLock<HashMap<SocketAddr, SharedConnection>>,
    retransmit_timeout: Duration,
}

impl Server {
    pub(crate) fn new(socket: RudpSocket, config: EndpointConfig) -> Self {
        Server {
            handle: SocketHandle::new(socket, config.max_datagram_size),
            connections: RwLock::new(HashMap::new()),
            retransmit_timeout: config.retransmit_timeout,
        }
    }

    fn lookup(&self, addr: SocketAddr) -> Option<SharedConnection> {
        self.connections.read().get(&addr).cloned()
    }

    /// Existing connection for `addr`, or a new active one
    fn connection_for(&self, addr: SocketAddr) -> Result<SharedConnection> {
        let conn = match self.lookup(addr) {
            Some(conn) => conn,
            None => self
                .connections
                .write()
                .entry(addr)
                .or_insert_with(|| {
                    tracing::debug!(peer = %addr, "new peer");
                    let conn = Connection::new(addr, self.retransmit_timeout)
                        .with_max_datagram_size(self.handle.max_datagram_size());
                    Arc::new(Mutex::new(conn))
                })
                .clone(),
        };
        conn.lock().activate()?;
        Ok(conn)
    }

    /// Send a payload to a peer that has already sent us something
    pub fn send_to(&self, payload: &[u8], addr: SocketAddr, reliable: bool) -> Result<Sent> {
        let socket = self.handle.get()?;
        let conn = self.lookup(addr).ok_or(RudpError::UnknownPeer(addr))?;

        let mut guard = conn.lock();
        let outgoing = guard.prepare_send(payload, reliable, Instant::now())?;
        let written = socket.send_to(&outgoing.frame, addr)?;
        drop(guard);

        let header_len = outgoing.frame.len() - outgoing.payload_len;
        Ok(Sent {
            len: written.saturating_sub(header_len),
            seq: outgoing.seq,
        })
    }

    /// Block until any peer sends something and copy its payload into `buf`
    ///
    /// Stale packets for that peer are resent as a side effect. A payload
    /// larger than `buf` fails with [`RudpError::Capacity`] and is delivered
    /// again by the next receive. A malformed datagram from an address with
    /// no connection fails with [`RudpError::Protocol`] and creates none.
    pub fn receive(&self, buf: &mut [u8]) -> Result<Received> {
        let socket = self.handle.get()?;
        let (datagram, from) = self
            .handle
            .next_datagram(&socket, |s, scratch| Ok(s.recv_from(scratch)?))?;

        let conn = match self.lookup(from) {
            Some(conn) => conn,
            None => {
                if let Err(e) = PacketHeader::from_bytes(&datagram) {
                    tracing::warn!(peer = %from, error = %e, "dropping datagram from unknown peer");
                    return Err(e.into());
                }
                self.connection_for(from)?
            }
        };
        let result = conn.lock().process_datagram(&datagram, buf, Instant::now());
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

        resend(&socket, from, &incoming.resend);

        Ok(Received {
            len: incoming.len,
            seq: incoming.seq,
            confirmed: incoming.confirmed,
            peer: from,
        })
    }

    /// Resend stale reliable packets for every peer
    ///
    /// Returns how many frames were written.
    pub fn tick(&self) -> Result<usize> {
        let socket = self.handle.get()?;
        let now = Instant::now();

        let snapshot: Vec<(SocketAddr, SharedConnection)> = self
            .connections
            .read()
            .iter()
            .map(|(addr, conn)| (*addr, Arc::clone(conn)))
            .collect();

        let mut written = 0;
        for (addr, conn) in snapshot {
            let stale = match conn.lock().stale_frames(now) {
                Ok(stale) => stale,
                Err(ConnectionError::Closed) => continue,
                Err(e) => return Err(e.into()),
            };
            written += resend(&socket, addr, &stale);
        }
        Ok(written)
    }

    /// Close the server and every connection; later calls fail with [`RudpError::Closed`]
    pub fn close(&self) -> Result<()> {
        for conn in self.connections.read().values() {
            conn.lock().close();
        }
        if self.handle.release() {
            tracing::info!(peers = self.connections.read().len(), "rudp server closed");
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_open()
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.handle.get()?.local_addr()?)
    }

    /// Change how long `receive` may block
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Ok(self.handle.get()?.set_read_timeout(timeout)?)
    }

    /// Addresses with a connection
    pub fn peers(&self) -> Vec<SocketAddr> {
        self.connections.read().keys().copied().collect()
    }

    pub fn peer_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Forget a peer, dropping its unconfirmed packets
    ///
    /// Returns false if there was no connection for `addr`.
    pub fn remove_peer(&self, addr: SocketAddr) -> bool {
        match self.connections.write().remove(&addr) {
            Some(conn) => {
                conn.lock().close();
                tracing::debug!(peer = %addr, "peer removed");
                true
            }
            None => false,
        }
    }

    /// Remove peers that have not sent or been sent anything for `max_idle`
    pub fn evict_idle(&self, max_idle: Duration) -> Vec<SocketAddr> {
        let now = Instant::now();
        let mut evicted = Vec::new();

        self.connections.write().retain(|addr, conn| {
            let mut conn = conn.lock();
            let idle_ms = millis_since(conn.last_activity(), now);
            if idle_ms as u128 <= max_idle.as_millis() {
                return true;
            }
            tracing::debug!(peer = %addr, idle_ms, "evicting idle peer");
            conn.close();
            evicted.push(*addr);
            false
        });

        evicted
    }

    /// Statistics for one peer's connection
    pub fn connection_stats(&self, addr: SocketAddr) -> Option<ConnectionStats> {
        self.lookup(addr).map(|conn| conn.lock().stats())
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if self.handle.is_open() {
            let _ = self.close();
        }
    }
}

fn resend(socket: &RudpSocket, peer: SocketAddr, frames: &[Bytes]) -> usize {
    let mut written = 0;
    for frame in frames {
        match socket.send_to(frame, peer) {
            Ok(_) => written += 1,
            Err(e) => tracing::warn!(%peer, error = %e, "retransmission failed"),
        }
    }
    written
}
