//! Audio payloads (RFC 3551 / RFC 7587).
//!
//! PCMU, PCMA, G.722 and Opus frames are carried without a payload header.
//! An encoded frame normally fits in one packet; oversized frames are split
//! at `max_fragment_size` with the marker on the final chunk. On receive,
//! every packet payload is a complete frame.

use super::rtp::RtpPacket;
use super::{Codec, Depacketizer, Fragment, Packetizer, chunks};

#[derive(Debug, Clone, Copy)]
pub struct AudioPacketizer {
    codec: Codec,
}

impl AudioPacketizer {
    pub fn new(codec: Codec) -> Self {
        Self { codec }
    }
}

impl Packetizer for AudioPacketizer {
    fn packetize(&self, frame: &[u8], max_fragment_size: usize) -> Vec<Fragment> {
        let parts: Vec<&[u8]> = chunks(frame, max_fragment_size).collect();
        let count = parts.len();
        parts
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| Fragment::new(chunk.to_vec(), i + 1 == count))
            .collect()
    }

    fn codec(&self) -> Codec {
        self.codec
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AudioDepacketizer {
    codec: Codec,
}

impl AudioDepacketizer {
    pub fn new(codec: Codec) -> Self {
        Self { codec }
    }
}

impl Depacketizer for AudioDepacketizer {
    fn push(&mut self, packet: &RtpPacket) -> Option<Vec<u8>> {
        (!packet.payload.is_empty()).then(|| packet.payload.clone())
    }

    fn codec(&self) -> Codec {
        self.codec
    }

    fn has_pending_data(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::rtp::RtpHeader;

    #[test]
    fn twenty_ms_pcmu_is_one_packet() {
        let fragments = AudioPacketizer::new(Codec::Pcmu).packetize(&[0x7f; 160], 1200);
        assert_eq!(fragments, vec![Fragment::new(vec![0x7f; 160], true)]);
    }

    #[test]
    fn every_packet_is_a_frame() {
        let mut d = AudioDepacketizer::new(Codec::Opus);
        let p = RtpPacket::new(RtpHeader::new(111, 5, 960, 9), vec![1, 2, 3]);
        assert_eq!(d.push(&p), Some(vec![1, 2, 3]));
        let empty = RtpPacket::new(RtpHeader::new(111, 6, 1920, 9), vec![]);
        assert_eq!(d.push(&empty), None);
    }
}
