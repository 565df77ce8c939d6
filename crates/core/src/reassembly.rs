//! Frame reassembly for one incoming stream.
//!
//! ## State machine
//!
//! ```text
//! Unbound --(first packet with a supported codec)--> Bound(codec)
//! Unbound --(unsupported codec)--> Unbound   (packet dropped)
//! ```
//!
//! Once bound, the reassembler keeps its depacketizer for the lifetime of
//! the stream and never re-binds.

use std::net::SocketAddr;

use crate::format::{Format, MediaKind};
use crate::media::rtp::{HeaderExtension, RtpPacket};
use crate::media::{Codec, Depacketizer, depacketizer_for};

/// A complete frame rebuilt from RTP packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    /// Transport address the packets came from.
    pub endpoint: SocketAddr,
    /// RTP timestamp shared by the frame's packets.
    pub timestamp: u32,
    pub payload: Vec<u8>,
    pub format: Format,
    /// Header extension of the frame's last packet, for capture-time
    /// correlation via [`HeaderExtension::one_byte_element`].
    pub extension: Option<HeaderExtension>,
}

enum ReassemblerState {
    Unbound,
    Bound(Box<dyn Depacketizer>),
}

pub struct FrameReassembler {
    kind: MediaKind,
    state: ReassemblerState,
}

impl FrameReassembler {
    pub fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            state: ReassemblerState::Unbound,
        }
    }

    /// Codec this reassembler is bound to, if any.
    pub fn bound_codec(&self) -> Option<Codec> {
        match &self.state {
            ReassemblerState::Unbound => None,
            ReassemblerState::Bound(d) => Some(d.codec()),
        }
    }

    pub fn has_pending_data(&self) -> bool {
        match &self.state {
            ReassemblerState::Unbound => false,
            ReassemblerState::Bound(d) => d.has_pending_data(),
        }
    }

    /// Feed one in-order packet whose payload type maps to `format`.
    pub fn push(
        &mut self,
        endpoint: SocketAddr,
        packet: &RtpPacket,
        format: &Format,
    ) -> Option<ReceivedFrame> {
        let codec = format.codec();

        if let ReassemblerState::Unbound = self.state {
            match codec.and_then(depacketizer_for) {
                Some(depacketizer) => {
                    tracing::debug!(media = %self.kind, codec = %depacketizer.codec(), "reassembler bound");
                    self.state = ReassemblerState::Bound(depacketizer);
                }
                None => {
                    tracing::warn!(
                        media = %self.kind,
                        format = %format,
                        "unsupported codec for frame reassembly, packet dropped"
                    );
                    return None;
                }
            }
        }

        let ReassemblerState::Bound(depacketizer) = &mut self.state else {
            return None;
        };

        if codec != Some(depacketizer.codec()) {
            tracing::debug!(
                media = %self.kind,
                bound = %depacketizer.codec(),
                format = %format,
                "packet for a different codec than the bound one, dropped"
            );
            return None;
        }

        let payload = depacketizer.push(packet)?;
        tracing::trace!(
            media = %self.kind,
            ts = packet.header.timestamp,
            bytes = payload.len(),
            "frame reassembled"
        );
        Some(ReceivedFrame {
            endpoint,
            timestamp: packet.header.timestamp,
            payload,
            format: format.clone(),
            extension: packet.header.extension.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::rtp::RtpHeader;

    fn endpoint() -> SocketAddr {
        "127.0.0.1:5004".parse().unwrap()
    }

    fn packet(payload: Vec<u8>, ts: u32, marker: bool) -> RtpPacket {
        RtpPacket::new(RtpHeader::new(96, 0, ts, 1).with_marker(marker), payload)
    }

    #[test]
    fn unsupported_codec_stays_unbound() {
        let mut r = FrameReassembler::new(MediaKind::Video);
        let av1 = Format::new("AV1", 45, 90000);
        assert!(r.push(endpoint(), &packet(vec![1, 2], 0, true), &av1).is_none());
        assert_eq!(r.bound_codec(), None);

        // a later, clarified format binds
        let frame = r
            .push(endpoint(), &packet(vec![0x10, 9], 0, true), &Format::vp8(96))
            .unwrap();
        assert_eq!(frame.payload, vec![9]);
        assert_eq!(r.bound_codec(), Some(Codec::Vp8));
    }

    #[test]
    fn bound_codec_never_changes() {
        let mut r = FrameReassembler::new(MediaKind::Video);
        r.push(endpoint(), &packet(vec![0x10, 1], 0, true), &Format::vp8(96));
        assert!(r
            .push(endpoint(), &packet(vec![0x65, 1], 1, true), &Format::h264(97))
            .is_none());
        assert_eq!(r.bound_codec(), Some(Codec::Vp8));
    }

    #[test]
    fn frame_tagged_with_origin() {
        let mut r = FrameReassembler::new(MediaKind::Video);
        let f = Format::vp8(96);
        assert!(r.push(endpoint(), &packet(vec![0x10, 1], 3000, false), &f).is_none());
        assert!(r.has_pending_data());
        let frame = r.push(endpoint(), &packet(vec![0, 2], 3000, true), &f).unwrap();
        assert_eq!(
            frame,
            ReceivedFrame {
                endpoint: endpoint(),
                timestamp: 3000,
                payload: vec![1, 2],
                format: f,
                extension: None,
            }
        );
        assert!(!r.has_pending_data());
    }

    #[test]
    fn capture_time_extension_reaches_frame() {
        let mut r = FrameReassembler::new(MediaKind::Video);
        let abs_capture = HeaderExtension::one_byte(3, &[0, 0, 0, 1, 0, 0, 0, 2]);
        let last = RtpPacket::new(
            RtpHeader::new(96, 1, 9000, 1)
                .with_marker(true)
                .with_extension(abs_capture),
            vec![0x10, 7],
        );
        let frame = r.push(endpoint(), &last, &Format::vp8(96)).unwrap();
        let ext = frame.extension.expect("extension carried");
        assert_eq!(ext.one_byte_element(3), Some(&[0, 0, 0, 1, 0, 0, 0, 2][..]));
    }

    #[test]
    fn telephone_event_is_not_reassembled() {
        let mut r = FrameReassembler::new(MediaKind::Audio);
        let te = Format::telephone_event(101);
        assert!(r.push(endpoint(), &packet(vec![1, 0, 0, 160], 0, true), &te).is_none());
        assert_eq!(r.bound_codec(), None);
    }
}
