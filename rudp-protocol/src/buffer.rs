//! Retransmission buffer for reliable packets
//!
//! Holds every reliable frame sent to one peer until the peer's piggybacked
//! acknowledgment state confirms it. Frames are kept fully encoded so a resend
//! is a verbatim copy of the original datagram.

use crate::ack::AckBitfield;
use crate::sequence::{RemoteSeq, SeqNumber};
use bytes::Bytes;
use std::time::{Duration, Instant};

/// Default age after which an unconfirmed packet is resent
pub const DEFAULT_RETRANSMIT_TIMEOUT: Duration = Duration::from_millis(200);

/// Stored packet with metadata
#[derive(Debug, Clone)]
struct InFlight {
    /// Sequence number assigned at send time
    seq: SeqNumber,
    /// The framed datagram as sent
    raw: Bytes,
    /// Time when packet was last (re)sent
    sent_at: Instant,
    /// Number of retransmissions so far
    resend_count: u32,
}

/// Result of processing one acknowledgment
#[derive(Debug, Default, Clone)]
pub struct AckReport {
    /// Sequence numbers newly confirmed by the peer, in no particular order
    pub confirmed: Vec<SeqNumber>,
    /// Frames that timed out and must be written to the socket again
    pub resend: Vec<Bytes>,
}

/// Unordered store of unacknowledged reliable packets for one peer
#[derive(Debug, Clone)]
pub struct RetransmitBuffer {
    packets: Vec<InFlight>,
    timeout: Duration,
}

impl RetransmitBuffer {
    /// Create a new buffer
    ///
    /// # Arguments
    /// * `timeout` - Age after which an unconfirmed packet is resent
    pub fn new(timeout: Duration) -> Self {
        RetransmitBuffer {
            packets: Vec::with_capacity(16),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Track a reliable packet that was just sent
    pub fn record(&mut self, seq: SeqNumber, raw: Bytes, now: Instant) {
        self.packets.push(InFlight {
            seq,
            raw,
            sent_at: now,
            resend_count: 0,
        });
    }

    /// Apply the peer's acknowledgment state
    ///
    /// A packet is confirmed when its sequence is `ack` itself or when its bit
    /// is set in `ack_bits`. Confirmed packets are dropped. Every packet still
    /// unconfirmed and older than the timeout is queued for resend and its
    /// send time restarted.
    pub fn process_ack(&mut self, ack: RemoteSeq, ack_bits: AckBitfield, now: Instant) -> AckReport {
        let mut report = AckReport::default();

        let mut i = 0;
        while i < self.packets.len() {
            if is_confirmed(self.packets[i].seq, ack, ack_bits) {
                let packet = self.packets.swap_remove(i);
                report.confirmed.push(packet.seq);
                continue;
            }

            if let Some(raw) = self.take_if_stale(i, now) {
                report.resend.push(raw);
            }
            i += 1;
        }

        report
    }

    /// Collect frames due for resend without any acknowledgment input
    pub fn stale(&mut self, now: Instant) -> Vec<Bytes> {
        (0..self.packets.len())
            .filter_map(|i| self.take_if_stale(i, now))
            .collect()
    }

    fn take_if_stale(&mut self, index: usize, now: Instant) -> Option<Bytes> {
        let packet = &mut self.packets[index];
        if now.saturating_duration_since(packet.sent_at) <= self.timeout {
            return None;
        }

        packet.sent_at = now;
        packet.resend_count += 1;
        tracing::debug!(
            seq = packet.seq.as_raw(),
            attempt = packet.resend_count,
            "retransmitting reliable packet"
        );
        Some(packet.raw.clone())
    }

    /// Number of packets awaiting confirmation
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn contains(&self, seq: SeqNumber) -> bool {
        self.packets.iter().any(|p| p.seq == seq)
    }

    /// Retransmission count of a pending packet
    pub fn resend_count(&self, seq: SeqNumber) -> Option<u32> {
        self.packets
            .iter()
            .find(|p| p.seq == seq)
            .map(|p| p.resend_count)
    }

    /// Sequence numbers currently awaiting confirmation
    pub fn pending(&self) -> impl Iterator<Item = SeqNumber> + '_ {
        self.packets.iter().map(|p| p.seq)
    }

    pub fn clear(&mut self) {
        self.packets.clear();
    }
}

impl Default for RetransmitBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_RETRANSMIT_TIMEOUT)
    }
}

fn is_confirmed(seq: SeqNumber, ack: RemoteSeq, ack_bits: AckBitfield) -> bool {
    match ack {
        RemoteSeq::Unset => false,
        RemoteSeq::Seen(ack) if ack == seq => true,
        RemoteSeq::Seen(ack) => seq.lt(ack) && ack_bits.has((ack - seq).unsigned_abs() - 1),
    }
}
