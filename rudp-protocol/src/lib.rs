//! RUDP Protocol Core Implementation
//!
//! This crate implements the core of RUDP, a selective-reliability layer over
//! UDP: the packet header that piggybacks acknowledgment state on every
//! datagram, the 32-bit acknowledgment window, the retransmission buffer and
//! the per-peer connection that ties them together.

pub mod ack;
pub mod buffer;
pub mod connection;
pub mod packet;
pub mod sequence;

pub use ack::{update_acknowledgements, AckBitfield, SequenceTracker, ACK_WINDOW};
pub use buffer::{AckReport, RetransmitBuffer, DEFAULT_RETRANSMIT_TIMEOUT};
pub use connection::{
    Connection, ConnectionError, ConnectionState, ConnectionStats, Incoming, Outgoing,
};
pub use packet::{Delivery, Packet, PacketError, PacketHeader};
pub use sequence::{RemoteSeq, SeqNumber};
