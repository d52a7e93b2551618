//! RUDP Connection State Machine
//!
//! A connection is the per-peer state of an endpoint: the outgoing sequence
//! counter, the receive-side acknowledgment window and the buffer of reliable
//! packets awaiting confirmation. It never touches a socket; callers write the
//! frames it produces.

use crate::ack::{AckBitfield, SequenceTracker};
use crate::buffer::RetransmitBuffer;
use crate::packet::{self, Delivery, PacketError, PacketHeader};
use crate::sequence::{RemoteSeq, SeqNumber, NO_ACK};
use bytes::Bytes;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, nothing exchanged yet
    Uninitialized,
    /// Sending and receiving
    Active,
    /// Closed by the owner
    Closed,
}

/// Connection errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Connection is closed")]
    Closed,

    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),
}

/// Connection statistics
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    /// Total packets sent (first transmissions only)
    pub packets_sent: u64,
    /// Reliable packets among `packets_sent`
    pub reliable_sent: u64,
    /// Total packets received
    pub packets_received: u64,
    /// Total packets retransmitted
    pub packets_retransmitted: u64,
    /// Reliable packets confirmed by the peer
    pub packets_confirmed: u64,
    /// Datagrams rejected as malformed
    pub protocol_errors: u64,
    /// Total payload bytes sent
    pub bytes_sent: u64,
    /// Total payload bytes received
    pub bytes_received: u64,
}

/// A framed datagram ready for the socket
#[derive(Debug, Clone)]
pub struct Outgoing {
    /// Complete datagram
    pub frame: Bytes,
    /// Sequence number assigned to a reliable packet
    pub seq: Option<SeqNumber>,
    /// Payload length carried by `frame`
    pub payload_len: usize,
}

/// Outcome of processing one inbound datagram
#[derive(Debug, Clone, Default)]
pub struct Incoming {
    /// Payload bytes copied to the caller's buffer
    pub len: usize,
    /// Peer's sequence number if the datagram was reliable
    pub seq: Option<SeqNumber>,
    /// Our reliable packets newly confirmed by the peer
    pub confirmed: Vec<SeqNumber>,
    /// Our stale frames that must be written to the socket again
    pub resend: Vec<Bytes>,
}

/// RUDP Connection
///
/// Per-peer reliability state. Callers serialize access (one owner, or one
/// lock around the whole connection) so that decode, window update and ack
/// processing happen as one step.
#[derive(Debug)]
pub struct Connection {
    /// Connection state
    state: ConnectionState,
    /// Remote address
    remote_addr: SocketAddr,
    /// Last sequence number assigned to an outgoing reliable packet
    local_seq: SeqNumber,
    /// What we have received from the peer
    tracker: SequenceTracker,
    /// Reliable packets the peer has not confirmed
    in_flight: RetransmitBuffer,
    /// Connection statistics
    stats: ConnectionStats,
    /// Last send or receive
    last_activity: Instant,
    /// Largest frame `prepare_send` produces
    max_datagram_size: usize,
    /// Peer has reported receiving something, so its ack field is never unset again
    peer_acked: bool,
}

impl Connection {
    /// Create a new connection
    pub fn new(remote_addr: SocketAddr, retransmit_timeout: Duration) -> Self {
        Connection {
            state: ConnectionState::Uninitialized,
            remote_addr,
            // first increment wraps to 0
            local_seq: SeqNumber::new(u32::MAX),
            tracker: SequenceTracker::new(),
            in_flight: RetransmitBuffer::new(retransmit_timeout),
            stats: ConnectionStats::default(),
            last_activity: Instant::now(),
            max_datagram_size: packet::MAX_DATAGRAM_SIZE,
            peer_acked: false,
        }
    }

    /// Limit outgoing frames, header included, to `limit` bytes
    pub fn with_max_datagram_size(mut self, limit: usize) -> Self {
        self.max_datagram_size = limit;
        self
    }

    /// Start outgoing reliable numbering at `first` instead of 0
    pub fn with_initial_seq(mut self, first: SeqNumber) -> Self {
        self.local_seq = first - 1;
        self
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Move an uninitialized connection to active
    pub fn activate(&mut self) -> Result<(), ConnectionError> {
        match self.state {
            ConnectionState::Closed => Err(ConnectionError::Closed),
            ConnectionState::Active => Ok(()),
            ConnectionState::Uninitialized => {
                tracing::debug!(peer = %self.remote_addr, "connection active");
                self.state = ConnectionState::Active;
                Ok(())
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == ConnectionState::Active
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// Get remote address
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Last sequence number assigned to a reliable packet
    pub fn local_seq(&self) -> SeqNumber {
        self.local_seq
    }

    /// Highest sequence number received from the peer
    pub fn remote_seq(&self) -> RemoteSeq {
        self.tracker.remote_seq()
    }

    pub fn ack_bitfield(&self) -> AckBitfield {
        self.tracker.ack_bitfield()
    }

    pub fn in_flight(&self) -> &RetransmitBuffer {
        &self.in_flight
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Get connection statistics
    pub fn stats(&self) -> ConnectionStats {
        self.stats.clone()
    }

    fn ensure_open(&self) -> Result<(), ConnectionError> {
        if self.state == ConnectionState::Closed {
            return Err(ConnectionError::Closed);
        }
        Ok(())
    }

    pub fn max_datagram_size(&self) -> usize {
        self.max_datagram_size
    }

    /// Frame a payload for sending
    ///
    /// Reliable payloads get the next sequence number and are kept for
    /// retransmission until the peer confirms them. A frame over the datagram
    /// limit fails with [`PacketError::Oversized`] and consumes no sequence
    /// number.
    pub fn prepare_send(
        &mut self,
        payload: &[u8],
        reliable: bool,
        now: Instant,
    ) -> Result<Outgoing, ConnectionError> {
        self.ensure_open()?;

        let header_size = if reliable {
            packet::RELIABLE_HEADER_SIZE
        } else {
            packet::UNRELIABLE_HEADER_SIZE
        };
        let size = header_size + payload.len();
        if size > self.max_datagram_size {
            return Err(PacketError::Oversized {
                size,
                limit: self.max_datagram_size,
            }
            .into());
        }

        let delivery = if reliable {
            self.local_seq.increment();
            Delivery::Reliable(self.local_seq)
        } else {
            Delivery::Unreliable
        };
        let header = PacketHeader::new(
            delivery,
            self.tracker.remote_seq(),
            self.tracker.ack_bitfield(),
        );
        let frame = packet::encode(&header, payload).freeze();

        if let Delivery::Reliable(seq) = delivery {
            self.in_flight.record(seq, frame.clone(), now);
            self.stats.reliable_sent += 1;
        }
        self.stats.packets_sent += 1;
        self.stats.bytes_sent += payload.len() as u64;
        self.last_activity = now;

        tracing::trace!(peer = %self.remote_addr, %header, len = payload.len(), "framed packet");

        Ok(Outgoing {
            frame,
            seq: delivery.seq_number(),
            payload_len: payload.len(),
        })
    }

    /// Process a datagram received from the peer
    ///
    /// The header is validated and the payload copied into `out` before any
    /// state changes, so a malformed datagram or a short buffer leaves the
    /// connection untouched.
    pub fn process_datagram(
        &mut self,
        datagram: &[u8],
        out: &mut [u8],
        now: Instant,
    ) -> Result<Incoming, ConnectionError> {
        self.ensure_open()?;

        let (header, len) = match packet::decode_into(datagram, out) {
            Ok(decoded) => decoded,
            Err(e) => {
                if !matches!(e, PacketError::BufferTooSmall { .. }) {
                    self.stats.protocol_errors += 1;
                }
                return Err(e.into());
            }
        };

        tracing::trace!(peer = %self.remote_addr, %header, len, "received packet");

        let seq = header.delivery.seq_number();
        if let Some(seq) = seq {
            self.tracker.update(seq);
        }
        let ack = self.resolve_ack(header.ack);
        let report = self.in_flight.process_ack(ack, header.ack_bits, now);

        self.stats.packets_received += 1;
        self.stats.bytes_received += len as u64;
        self.stats.packets_confirmed += report.confirmed.len() as u64;
        self.stats.packets_retransmitted += report.resend.len() as u64;
        self.last_activity = now;

        Ok(Incoming {
            len,
            seq,
            confirmed: report.confirmed,
            resend: report.resend,
        })
    }

    /// A peer's highest received sequence never goes back to unset, so once
    /// it has acked anything an unset field on the wire is `u32::MAX`.
    fn resolve_ack(&mut self, ack: RemoteSeq) -> RemoteSeq {
        match ack {
            RemoteSeq::Unset if self.peer_acked => RemoteSeq::Seen(SeqNumber::new(NO_ACK)),
            RemoteSeq::Unset => RemoteSeq::Unset,
            seen => {
                self.peer_acked = true;
                seen
            }
        }
    }

    /// Frames older than the retransmission timeout, for periodic ticking
    pub fn stale_frames(&mut self, now: Instant) -> Result<Vec<Bytes>, ConnectionError> {
        self.ensure_open()?;
        let stale = self.in_flight.stale(now);
        self.stats.packets_retransmitted += stale.len() as u64;
        Ok(stale)
    }

    /// Close the connection, dropping anything still in flight
    pub fn close(&mut self) {
        if self.state != ConnectionState::Closed {
            tracing::debug!(
                peer = %self.remote_addr,
                unconfirmed = self.in_flight.len(),
                "connection closed"
            );
        }
        self.state = ConnectionState::Closed;
        self.in_flight.clear();
    }
}
