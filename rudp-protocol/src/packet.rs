//! RUDP Packet Structures and Serialization
//!
//! Every datagram starts with a one-byte reliability flag. Reliable packets
//! follow it with the sender's 32-bit sequence number. Both kinds then carry
//! the sender's acknowledgment state for the peer (highest sequence received
//! and the 32-bit history below it) before the opaque payload. All fields are
//! big-endian.
//!
//! ```text
//! [flag:1][seq:4, reliable only][peer ack:4][peer ack bitfield:4][payload..]
//! ```

use crate::ack::AckBitfield;
use crate::sequence::{RemoteSeq, SeqNumber, NO_ACK};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use thiserror::Error;

/// Header size of an unreliable packet
pub const UNRELIABLE_HEADER_SIZE: usize = 9;

/// Header size of a reliable packet
pub const RELIABLE_HEADER_SIZE: usize = 13;

/// Maximum payload that fits one Ethernet-sized datagram (1500 - 28 IP/UDP - 13)
pub const MAX_PAYLOAD_SIZE: usize = 1459;

/// Largest reliable frame that fits one Ethernet-sized datagram
pub const MAX_DATAGRAM_SIZE: usize = RELIABLE_HEADER_SIZE + MAX_PAYLOAD_SIZE;

const FLAG_UNRELIABLE: u8 = 0;
const FLAG_RELIABLE: u8 = 1;

/// Delivery class of a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Fire-and-forget, no sequence number
    Unreliable,
    /// Tracked and retransmitted until acknowledged
    Reliable(SeqNumber),
}

impl Delivery {
    pub fn is_reliable(self) -> bool {
        matches!(self, Delivery::Reliable(_))
    }

    pub fn seq_number(self) -> Option<SeqNumber> {
        match self {
            Delivery::Unreliable => None,
            Delivery::Reliable(seq) => Some(seq),
        }
    }

    fn flag(self) -> u8 {
        match self {
            Delivery::Unreliable => FLAG_UNRELIABLE,
            Delivery::Reliable(_) => FLAG_RELIABLE,
        }
    }
}

/// Packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Reliability flag and, for reliable packets, the sender's sequence number
    pub delivery: Delivery,
    /// Highest sequence number the sender has received from us
    pub ack: RemoteSeq,
    /// Receipt history below `ack`
    pub ack_bits: AckBitfield,
}

impl PacketHeader {
    pub fn new(delivery: Delivery, ack: RemoteSeq, ack_bits: AckBitfield) -> Self {
        PacketHeader {
            delivery,
            ack,
            ack_bits,
        }
    }

    /// Encoded size of this header
    pub fn size(&self) -> usize {
        match self.delivery {
            Delivery::Unreliable => UNRELIABLE_HEADER_SIZE,
            Delivery::Reliable(_) => RELIABLE_HEADER_SIZE,
        }
    }

    /// Parse header from bytes (network byte order)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        let flag = match bytes.first() {
            Some(&flag) => flag,
            None => {
                return Err(PacketError::Truncated {
                    expected: UNRELIABLE_HEADER_SIZE,
                    actual: 0,
                })
            }
        };

        let expected = match flag {
            FLAG_UNRELIABLE => UNRELIABLE_HEADER_SIZE,
            FLAG_RELIABLE => RELIABLE_HEADER_SIZE,
            other => return Err(PacketError::InvalidFlag(other)),
        };
        if bytes.len() < expected {
            return Err(PacketError::Truncated {
                expected,
                actual: bytes.len(),
            });
        }

        let mut buf = &bytes[1..expected];
        let delivery = if flag == FLAG_RELIABLE {
            Delivery::Reliable(SeqNumber::new(buf.get_u32()))
        } else {
            Delivery::Unreliable
        };
        let raw_ack = buf.get_u32();
        let ack_bits = AckBitfield::from_bits(buf.get_u32());

        Ok(PacketHeader {
            delivery,
            ack: decode_ack(raw_ack, ack_bits),
            ack_bits,
        })
    }

    /// Serialize header to bytes (network byte order)
    pub fn to_bytes(&self, buf: &mut BytesMut) {
        buf.put_u8(self.delivery.flag());
        if let Delivery::Reliable(seq) = self.delivery {
            buf.put_u32(seq.as_raw());
        }
        buf.put_u32(self.ack.to_wire());
        buf.put_u32(self.ack_bits.bits());
    }
}

/// Header plus payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(header: PacketHeader, payload: Bytes) -> Self {
        Packet { header, payload }
    }

    /// Total size of the packet (header + payload)
    pub fn size(&self) -> usize {
        self.header.size() + self.payload.len()
    }

    /// Serialize the packet to bytes
    pub fn to_bytes(&self) -> BytesMut {
        encode(&self.header, &self.payload)
    }

    /// Parse a packet from bytes, copying the payload
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        let header = PacketHeader::from_bytes(bytes)?;
        let payload = Bytes::copy_from_slice(&bytes[header.size()..]);
        Ok(Packet { header, payload })
    }
}

/// Read the peer-ack field
///
/// `NO_ACK` doubles as sequence `u32::MAX`. A peer that has received nothing
/// has an empty history, so a non-empty one means the value is a real ack.
fn decode_ack(raw: u32, ack_bits: AckBitfield) -> RemoteSeq {
    if raw == NO_ACK && ack_bits.count() > 0 {
        RemoteSeq::Seen(SeqNumber::new(raw))
    } else {
        RemoteSeq::from_wire(raw)
    }
}

/// Frame `payload` behind `header`
pub fn encode(header: &PacketHeader, payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(header.size() + payload.len());
    header.to_bytes(&mut buf);
    buf.put_slice(payload);
    buf
}

/// Parse the header and copy the payload into `out`
///
/// Nothing is written to `out` unless the whole payload fits.
pub fn decode_into(bytes: &[u8], out: &mut [u8]) -> Result<(PacketHeader, usize), PacketError> {
    let header = PacketHeader::from_bytes(bytes)?;
    let payload = &bytes[header.size()..];
    if out.len() < payload.len() {
        return Err(PacketError::BufferTooSmall {
            needed: payload.len(),
            available: out.len(),
        });
    }
    out[..payload.len()].copy_from_slice(payload);
    Ok((header, payload.len()))
}

impl fmt::Display for PacketHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.delivery {
            Delivery::Reliable(seq) => write!(f, "reliable seq={}", seq)?,
            Delivery::Unreliable => write!(f, "unreliable")?,
        }
        write!(f, " ack={} bits={:b}", self.ack, self.ack_bits)
    }
}

/// Packet parsing and validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("Truncated packet: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Invalid reliability flag: {0:#04x}")]
    InvalidFlag(u8),

    #[error("Buffer too small: payload is {needed} bytes, buffer holds {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// Frame larger than the datagram limit. On receive `size` is what was
    /// read, which stops one byte past `limit`.
    #[error("Datagram too large: {size} bytes, limit is {limit}")]
    Oversized { size: usize, limit: usize },
}
