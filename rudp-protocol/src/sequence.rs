//! Sequence Number Handling
//!
//! RUDP uses full 32-bit sequence numbers. This module provides a wrapped
//! sequence number type whose comparisons account for wraparound, plus the
//! "highest received" state, which starts out empty instead of borrowing a
//! value from the sequence space.

use std::fmt;
use std::ops::Sub;

/// Wire value written for the peer-ack field before anything was received
///
/// It is also the raw value of the last sequence number before the wrap, so
/// a header carrying it is read together with its bitfield and the sender's
/// history (see `PacketHeader::from_bytes` and `Connection::process_datagram`).
pub const NO_ACK: u32 = u32::MAX;

/// Sequence number with 32-bit wraparound semantics
///
/// Ordering is defined by the signed distance between two numbers, so
/// `u32::MAX` is "before" `0`.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct SeqNumber(u32);

impl SeqNumber {
    /// Create a new sequence number
    #[inline]
    pub const fn new(value: u32) -> Self {
        SeqNumber(value)
    }

    /// Get the raw sequence number value
    #[inline]
    pub fn as_raw(self) -> u32 {
        self.0
    }

    /// Increment the sequence number by 1
    #[inline]
    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }

    /// Calculate the distance from this sequence number to another
    ///
    /// Returns a signed distance that accounts for wraparound. Positive values
    /// mean `other` is ahead of `self`, negative means `other` is behind.
    #[inline]
    pub fn distance_to(self, other: SeqNumber) -> i32 {
        other.0.wrapping_sub(self.0) as i32
    }

    /// Check if this sequence number is less than another (accounting for wraparound)
    #[inline]
    pub fn lt(self, other: SeqNumber) -> bool {
        self.distance_to(other) > 0
    }

    /// Check if this sequence number is greater than another
    #[inline]
    pub fn gt(self, other: SeqNumber) -> bool {
        other.lt(self)
    }
}

impl fmt::Debug for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeqNumber({})", self.0)
    }
}

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SeqNumber {
    fn from(value: u32) -> Self {
        SeqNumber(value)
    }
}

impl From<SeqNumber> for u32 {
    fn from(seq: SeqNumber) -> u32 {
        seq.0
    }
}

impl Sub<u32> for SeqNumber {
    type Output = SeqNumber;

    fn sub(self, rhs: u32) -> SeqNumber {
        SeqNumber(self.0.wrapping_sub(rhs))
    }
}

impl Sub for SeqNumber {
    type Output = i32;

    /// Calculate the signed distance between two sequence numbers
    fn sub(self, rhs: SeqNumber) -> i32 {
        rhs.distance_to(self)
    }
}

/// Highest sequence number received from a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RemoteSeq {
    /// Nothing received yet
    #[default]
    Unset,
    /// Highest sequence number seen so far
    Seen(SeqNumber),
}

impl RemoteSeq {
    /// Decode the peer-ack wire field
    pub fn from_wire(raw: u32) -> Self {
        if raw == NO_ACK {
            RemoteSeq::Unset
        } else {
            RemoteSeq::Seen(SeqNumber(raw))
        }
    }

    /// Encode for the peer-ack wire field
    pub fn to_wire(self) -> u32 {
        match self {
            RemoteSeq::Unset => NO_ACK,
            RemoteSeq::Seen(seq) => seq.as_raw(),
        }
    }

    pub fn seq(self) -> Option<SeqNumber> {
        match self {
            RemoteSeq::Unset => None,
            RemoteSeq::Seen(seq) => Some(seq),
        }
    }

    pub fn is_set(self) -> bool {
        matches!(self, RemoteSeq::Seen(_))
    }
}

impl fmt::Display for RemoteSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteSeq::Unset => write!(f, "-"),
            RemoteSeq::Seen(seq) => write!(f, "{}", seq),
        }
    }
}
