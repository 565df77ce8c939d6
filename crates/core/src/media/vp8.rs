//! VP8 RTP payload format (RFC 7741).
//!
//! Only the first byte of the payload descriptor is used:
//!
//! ```text
//!  0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+
//! |X|R|N|S|R| PID |
//! +-+-+-+-+-+-+-+-+
//! ```
//!
//! The packetizer sets **S** (start of partition) on the first packet of a
//! frame and writes zero on all others. No picture ID, TL0PICIDX or
//! temporal layer extensions are emitted. The depacketizer skips the
//! extension bytes if a sender does include them.

use super::rtp::RtpPacket;
use super::{Codec, Depacketizer, Fragment, Packetizer, chunks};

/// Start-of-partition bit of the payload descriptor.
pub const START_OF_PARTITION: u8 = 0x10;

#[derive(Debug, Clone, Copy, Default)]
pub struct Vp8Packetizer;

impl Packetizer for Vp8Packetizer {
    fn packetize(&self, frame: &[u8], max_fragment_size: usize) -> Vec<Fragment> {
        let parts: Vec<&[u8]> = chunks(frame, max_fragment_size).collect();
        let count = parts.len();

        parts
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                let descriptor = if i == 0 { START_OF_PARTITION } else { 0 };
                let mut payload = Vec::with_capacity(1 + chunk.len());
                payload.push(descriptor);
                payload.extend_from_slice(chunk);
                Fragment::new(payload, i + 1 == count)
            })
            .collect()
    }

    fn codec(&self) -> Codec {
        Codec::Vp8
    }
}

/// Length of the payload descriptor at the start of `payload`, including
/// any optional extension bytes (RFC 7741 §4.2).
fn descriptor_len(payload: &[u8]) -> Option<usize> {
    let first = *payload.first()?;
    let mut len = 1;
    if first & 0x80 != 0 {
        let ext = *payload.get(1)?;
        len += 1;
        if ext & 0x80 != 0 {
            // M bit selects a 15-bit picture ID
            let pid = *payload.get(len)?;
            len += if pid & 0x80 != 0 { 2 } else { 1 };
        }
        if ext & 0x40 != 0 {
            len += 1;
        }
        if ext & 0x30 != 0 {
            len += 1;
        }
    }
    (len <= payload.len()).then_some(len)
}

/// Accumulates VP8 payloads keyed by RTP timestamp until the marker bit.
#[derive(Debug, Default)]
pub struct Vp8Depacketizer {
    timestamp: Option<u32>,
    frame: Vec<u8>,
}

impl Vp8Depacketizer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Depacketizer for Vp8Depacketizer {
    fn push(&mut self, packet: &RtpPacket) -> Option<Vec<u8>> {
        let timestamp = packet.header.timestamp;
        if self.timestamp != Some(timestamp) {
            if !self.frame.is_empty() {
                tracing::debug!(
                    stale_ts = ?self.timestamp,
                    ts = timestamp,
                    "incomplete VP8 frame discarded"
                );
                self.frame.clear();
            }
            self.timestamp = Some(timestamp);
        }

        match descriptor_len(&packet.payload) {
            Some(len) => self.frame.extend_from_slice(&packet.payload[len..]),
            None => tracing::trace!(seq = packet.header.sequence, "VP8 payload too short"),
        }

        if packet.header.marker && !self.frame.is_empty() {
            return Some(std::mem::take(&mut self.frame));
        }
        None
    }

    fn codec(&self) -> Codec {
        Codec::Vp8
    }

    fn has_pending_data(&self) -> bool {
        !self.frame.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::rtp::RtpHeader;

    fn packet(payload: Vec<u8>, ts: u32, marker: bool) -> RtpPacket {
        RtpPacket::new(RtpHeader::new(96, 0, ts, 1).with_marker(marker), payload)
    }

    #[test]
    fn descriptor_start_bit_only_on_first() {
        let frame = vec![0xAB; 2500];
        let fragments = Vp8Packetizer.packetize(&frame, 1000);
        assert_eq!(fragments.len(), 3);
        assert_eq!(fragments[0].payload[0], START_OF_PARTITION);
        assert_eq!(fragments[1].payload[0], 0);
        assert_eq!(fragments[2].payload[0], 0);
        assert_eq!(fragments[2].payload.len(), 501);
    }

    #[test]
    fn marker_on_last_chunk() {
        let fragments = Vp8Packetizer.packetize(&[1; 3000], 1000);
        let markers: Vec<bool> = fragments.iter().map(|f| f.marker).collect();
        assert_eq!(markers, vec![false, false, true]);
    }

    #[test]
    fn small_frame_single_fragment() {
        let fragments = Vp8Packetizer.packetize(&[1, 2, 3], 1200);
        assert_eq!(fragments, vec![Fragment::new(vec![0x10, 1, 2, 3], true)]);
    }

    #[test]
    fn round_trip() {
        let frame: Vec<u8> = (0..5000u32).map(|i| (i * 7 % 256) as u8).collect();
        let mut d = Vp8Depacketizer::new();
        let mut out = None;
        for f in Vp8Packetizer.packetize(&frame, 1200) {
            out = d.push(&packet(f.payload, 9000, f.marker));
        }
        assert_eq!(out.unwrap(), frame);
        assert!(!d.has_pending_data());
    }

    #[test]
    fn extended_descriptor_skipped() {
        let mut d = Vp8Depacketizer::new();
        // X=1, S=1; I=1; 15-bit picture id
        let payload = vec![0x90, 0x80, 0x81, 0x23, 0xDE, 0xAD];
        assert_eq!(d.push(&packet(payload, 0, true)).unwrap(), vec![0xDE, 0xAD]);
    }

    #[test]
    fn timestamp_change_discards_partial_frame() {
        let mut d = Vp8Depacketizer::new();
        d.push(&packet(vec![0x10, 1, 2], 100, false));
        assert!(d.has_pending_data());
        let frame = d.push(&packet(vec![0x10, 9], 200, true)).unwrap();
        assert_eq!(frame, vec![9]);
    }
}
