//! Packet reorder buffer.
//!
//! Sits between RTP reception and frame reassembly. Packets are released in
//! ascending sequence order (16-bit wraparound aware). When a gap is not
//! filled within the drop timeout, the missing sequence numbers are skipped
//! for good and delivery resumes at the next packet held.
//!
//! There is no timer: time is sampled when a packet is inserted and the
//! timeout is evaluated against that sample on the next drain.
//!
//! A packet more than [`MAX_MISORDER`] behind the expected sequence is not
//! a straggler but a new numbering (sender restart or a large jump, RFC 3550
//! Appendix A.1). Two consecutive packets of the new numbering re-anchor the
//! buffer; a lone stray is ignored.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::media::rtp::{RtpPacket, seq_before, seq_distance};

/// Default time a gap is waited for before it is skipped.
pub const DEFAULT_DROP_TIMEOUT: Duration = Duration::from_millis(50);

/// Packets this far behind the expected sequence are still treated as late.
pub const MAX_MISORDER: u16 = 100;

#[derive(Debug)]
struct Pending {
    packet: RtpPacket,
    arrived: Instant,
}

#[derive(Debug)]
pub struct ReorderBuffer {
    drop_timeout: Duration,
    pending: HashMap<u16, Pending>,
    next_seq: Option<u16>,
    now: Option<Instant>,
    /// First packet of a suspected new numbering, waiting for its successor.
    restart: Option<Pending>,
}

impl ReorderBuffer {
    pub fn new(drop_timeout: Duration) -> Self {
        tracing::debug!(timeout_ms = drop_timeout.as_millis() as u64, "reorder buffer created");
        Self {
            drop_timeout,
            pending: HashMap::new(),
            next_seq: None,
            now: None,
            restart: None,
        }
    }

    pub fn drop_timeout(&self) -> Duration {
        self.drop_timeout
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Insert a packet, sampling the wall clock.
    pub fn insert(&mut self, packet: RtpPacket) {
        self.insert_at(packet, Instant::now());
    }

    /// Insert a packet that arrived at `now`.
    ///
    /// Packets older than the next expected sequence number (already
    /// delivered or skipped) and duplicates are discarded.
    pub fn insert_at(&mut self, packet: RtpPacket, now: Instant) {
        let seq = packet.header.sequence;
        self.now = Some(now);

        let next = *self.next_seq.get_or_insert(seq);
        if seq_before(seq, next) {
            if next.wrapping_sub(seq) > MAX_MISORDER {
                self.consider_restart(Pending { packet, arrived: now });
            } else {
                tracing::trace!(seq, next, "late packet discarded");
            }
            return;
        }
        self.restart = None;
        if self.pending.contains_key(&seq) {
            tracing::trace!(seq, "duplicate packet discarded");
            return;
        }
        self.pending.insert(seq, Pending { packet, arrived: now });
    }

    /// Re-anchor on a new numbering once two consecutive packets of it
    /// have arrived.
    fn consider_restart(&mut self, candidate: Pending) {
        let seq = candidate.packet.header.sequence;
        let confirmed = self
            .restart
            .as_ref()
            .is_some_and(|prev| prev.packet.header.sequence.wrapping_add(1) == seq);
        if !confirmed {
            tracing::trace!(seq, "far out-of-range packet held as possible restart");
            self.restart = Some(candidate);
            return;
        }
        let Some(first) = self.restart.take() else {
            return;
        };
        let anchor = first.packet.header.sequence;
        tracing::debug!(
            from = ?self.next_seq,
            to = anchor,
            discarded = self.pending.len(),
            "sequence discontinuity, reorder buffer re-anchored"
        );
        self.pending.clear();
        self.next_seq = Some(anchor);
        self.pending.insert(anchor, first);
        self.pending.insert(seq, candidate);
    }

    /// Release every packet that is ready, in sequence order.
    pub fn drain_ready(&mut self) -> Vec<RtpPacket> {
        let mut ready = Vec::new();
        let Some(mut next) = self.next_seq else {
            return ready;
        };

        loop {
            if let Some(p) = self.pending.remove(&next) {
                ready.push(p.packet);
                next = next.wrapping_add(1);
                continue;
            }
            if self.pending.is_empty() || !self.gap_expired() {
                break;
            }
            let Some(resume) = self.nearest_pending(next) else {
                break;
            };
            tracing::debug!(
                from = next,
                to = resume,
                skipped = seq_distance(next, resume),
                "reorder gap timed out, skipping"
            );
            next = resume;
        }

        self.next_seq = Some(next);
        ready
    }

    /// Discard all pending packets and forget the expected sequence.
    pub fn clear(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!(discarded = self.pending.len(), "reorder buffer cleared");
        }
        self.pending.clear();
        self.next_seq = None;
        self.restart = None;
    }

    /// Whether any held packet has waited longer than the drop timeout.
    fn gap_expired(&self) -> bool {
        let Some(now) = self.now else {
            return false;
        };
        self.pending
            .values()
            .map(|p| p.arrived)
            .min()
            .is_some_and(|oldest| now.saturating_duration_since(oldest) >= self.drop_timeout)
    }

    /// Held sequence number closest after `next`.
    fn nearest_pending(&self, next: u16) -> Option<u16> {
        self.pending
            .keys()
            .copied()
            .min_by_key(|&seq| seq.wrapping_sub(next))
    }
}
