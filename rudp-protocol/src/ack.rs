//! Acknowledgment window
//!
//! Every outgoing packet carries the highest sequence number received from
//! the peer plus a 32-bit history of the sequence numbers just below it.
//! This module holds that history and the algorithm that updates it as
//! reliable packets arrive.

use crate::sequence::{RemoteSeq, SeqNumber};
use std::fmt;

/// Width of the acknowledgment window
pub const ACK_WINDOW: u32 = 32;

/// Receipt history relative to the highest received sequence number
///
/// Bit `i` set means sequence `highest - i - 1` was received. Indices outside
/// the window are ignored, and shifting by the full width or more empties it.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AckBitfield(u32);

impl AckBitfield {
    pub const fn new() -> Self {
        AckBitfield(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        AckBitfield(bits)
    }

    #[inline]
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Mark the sequence `index + 1` steps behind the baseline as received
    #[inline]
    pub fn set(&mut self, index: u32) {
        if let Some(mask) = 1u32.checked_shl(index) {
            self.0 |= mask;
        }
    }

    #[inline]
    pub fn clear(&mut self, index: u32) {
        if let Some(mask) = 1u32.checked_shl(index) {
            self.0 &= !mask;
        }
    }

    #[inline]
    pub fn has(self, index: u32) -> bool {
        match 1u32.checked_shl(index) {
            Some(mask) => self.0 & mask != 0,
            None => false,
        }
    }

    /// Age the window by `count` positions, dropping the oldest bits
    #[inline]
    pub fn shift(&mut self, count: u32) {
        self.0 = self.0.checked_shl(count).unwrap_or(0);
    }

    /// Number of sequence numbers recorded in the window
    pub fn count(self) -> u32 {
        self.0.count_ones()
    }
}

impl fmt::Debug for AckBitfield {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AckBitfield({:#034b})", self.0)
    }
}

impl fmt::Binary for AckBitfield {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Binary::fmt(&self.0, f)
    }
}

impl From<u32> for AckBitfield {
    fn from(bits: u32) -> Self {
        AckBitfield(bits)
    }
}

/// Record a newly received reliable sequence number
///
/// Returns the new highest received sequence. The first packet only sets the
/// baseline. A newer packet pushes the old baseline into bit 0 and then ages
/// the window across any gap. An older packet sets its own bit. A repeat of
/// the baseline itself changes nothing.
pub fn update_acknowledgements(
    received: SeqNumber,
    remote: RemoteSeq,
    bitfield: &mut AckBitfield,
) -> RemoteSeq {
    let baseline = match remote {
        RemoteSeq::Unset => return RemoteSeq::Seen(received),
        RemoteSeq::Seen(baseline) => baseline,
    };

    let delta = received - baseline;
    if received.gt(baseline) {
        bitfield.shift(1);
        bitfield.set(0);
        bitfield.shift(delta.unsigned_abs() - 1);
        RemoteSeq::Seen(received)
    } else if received.lt(baseline) {
        bitfield.set(delta.unsigned_abs() - 1);
        remote
    } else {
        remote
    }
}

/// Receive-side acknowledgment state for one peer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceTracker {
    remote: RemoteSeq,
    acks: AckBitfield,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a received reliable sequence number, returning the new baseline
    pub fn update(&mut self, received: SeqNumber) -> RemoteSeq {
        self.remote = update_acknowledgements(received, self.remote, &mut self.acks);
        self.remote
    }

    /// Highest sequence number received so far
    pub fn remote_seq(&self) -> RemoteSeq {
        self.remote
    }

    pub fn ack_bitfield(&self) -> AckBitfield {
        self.acks
    }

    /// Whether `seq` is recorded as received, either as the baseline or in the window
    pub fn has_received(&self, seq: SeqNumber) -> bool {
        match self.remote {
            RemoteSeq::Unset => false,
            RemoteSeq::Seen(baseline) if baseline == seq => true,
            RemoteSeq::Seen(baseline) => {
                seq.lt(baseline) && self.acks.has((baseline - seq).unsigned_abs() - 1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(seqs: &[u32]) -> SequenceTracker {
        let mut tracker = SequenceTracker::new();
        for &seq in seqs {
            tracker.update(SeqNumber::new(seq));
        }
        tracker
    }

    #[test]
    fn test_bitfield_set() {
        let mut acks = AckBitfield::new();
        acks.set(2);
        assert_eq!(acks.bits(), 0b100);
    }

    #[test]
    fn test_bitfield_clear() {
        let mut acks = AckBitfield::from_bits(0b111);
        acks.clear(1);
        assert_eq!(acks.bits(), 0b101);
    }

    #[test]
    fn test_bitfield_shift() {
        let mut acks = AckBitfield::from_bits(0b111);
        acks.shift(1);
        assert_eq!(acks.bits(), 0b1110);

        acks.shift(32);
        assert_eq!(acks.bits(), 0);
    }

    #[test]
    fn test_bitfield_every_index() {
        for i in 0..ACK_WINDOW {
            let mut acks = AckBitfield::new();
            acks.set(i);
            assert!(acks.has(i));
            acks.clear(i);
            assert!(!acks.has(i));
        }
    }

    #[test]
    fn test_bitfield_out_of_window() {
        let mut acks = AckBitfield::new();
        acks.set(32);
        acks.set(100);
        assert_eq!(acks.bits(), 0);
        assert!(!acks.has(u32::MAX));
    }

    #[test]
    fn test_update_5_3_2_0() {
        let tracker = track(&[5, 3, 2, 0]);
        assert_eq!(tracker.ack_bitfield().bits(), 0b10110);
        assert_eq!(tracker.remote_seq(), RemoteSeq::Seen(SeqNumber::new(5)));
    }

    #[test]
    fn test_update_first_packet() {
        let tracker = track(&[0]);
        assert_eq!(tracker.ack_bitfield().bits(), 0);
        assert_eq!(tracker.remote_seq(), RemoteSeq::Seen(SeqNumber::new(0)));

        let tracker = track(&[5]);
        assert_eq!(tracker.ack_bitfield().bits(), 0);
        assert_eq!(tracker.remote_seq(), RemoteSeq::Seen(SeqNumber::new(5)));
    }

    #[test]
    fn test_update_in_order() {
        let tracker = track(&[0, 1, 2]);
        assert_eq!(tracker.ack_bitfield().bits(), 0b11);
        assert_eq!(tracker.remote_seq(), RemoteSeq::Seen(SeqNumber::new(2)));
    }

    #[test]
    fn test_update_gap() {
        // 1 and 2 missing
        let tracker = track(&[0, 3]);
        assert_eq!(tracker.ack_bitfield().bits(), 0b100);
        assert!(tracker.has_received(SeqNumber::new(0)));
        assert!(!tracker.has_received(SeqNumber::new(1)));
        assert!(!tracker.has_received(SeqNumber::new(2)));
        assert!(tracker.has_received(SeqNumber::new(3)));
    }

    #[test]
    fn test_update_duplicate_baseline_is_noop() {
        let tracker = track(&[0, 1, 2, 2]);
        assert_eq!(tracker.ack_bitfield().bits(), 0b11);
        assert_eq!(tracker.remote_seq(), RemoteSeq::Seen(SeqNumber::new(2)));
    }

    #[test]
    fn test_update_too_old_is_ignored() {
        let tracker = track(&[100, 10]);
        assert_eq!(tracker.ack_bitfield().bits(), 0);
        assert_eq!(tracker.remote_seq(), RemoteSeq::Seen(SeqNumber::new(100)));
    }

    #[test]
    fn test_update_large_jump_clears_window() {
        let tracker = track(&[0, 1, 2, 1000]);
        assert_eq!(tracker.ack_bitfield().bits(), 0);
        assert_eq!(tracker.remote_seq(), RemoteSeq::Seen(SeqNumber::new(1000)));
    }

    #[test]
    fn test_update_across_wraparound() {
        let tracker = track(&[u32::MAX - 1, u32::MAX, 0]);
        assert_eq!(tracker.ack_bitfield().bits(), 0b11);
        assert_eq!(tracker.remote_seq(), RemoteSeq::Seen(SeqNumber::new(0)));
        assert!(tracker.has_received(SeqNumber::new(u32::MAX)));
    }
}
