//! MJPEG RTP payload format: abbreviated RFC 2435.
//!
//! - Each JPEG frame maps to one or more RTP packets.
//! - RTP payload starts with an 8-byte JPEG-specific header:
//!
//!   ```text
//!    0                   1                   2                   3
//!    0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//!   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!   | Type-specific |              Fragment Offset                  |
//!   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!   |      Type     |       Q       |     Width     |     Height    |
//!   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!   ```
//!
//! - Width and height are carried in units of 8 pixels.
//! - No restart marker or quantization table headers are emitted, so Q is
//!   limited to 1–127 (table-less range).
//! - Uses static payload type 26: `a=rtpmap:26 JPEG/90000`

use super::rtp::RtpPacket;
use super::{Codec, Depacketizer, Fragment, Packetizer, chunks};

pub const JPEG_HEADER_LEN: usize = 8;

/// Type 1: YUV 4:2:0 baseline (RFC 2435 §4.1).
const JPEG_TYPE: u8 = 1;
const MAX_QUALITY: u8 = 127;
const MAX_DIMENSION: u16 = 255 * 8;
/// Largest frame the 24-bit fragment offset can address.
pub const MAX_FRAME_LEN: usize = 0xFF_FFFF;

/// Per-frame JPEG header parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegParams {
    pub quality: u8,
    pub width: u16,
    pub height: u16,
}

impl Default for JpegParams {
    fn default() -> Self {
        Self {
            quality: 50,
            width: 640,
            height: 480,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct JpegPacketizer {
    params: JpegParams,
}

impl JpegPacketizer {
    pub fn new(params: JpegParams) -> Self {
        if params.width > MAX_DIMENSION || params.height > MAX_DIMENSION {
            tracing::warn!(
                width = params.width,
                height = params.height,
                "JPEG dimensions exceed RFC 2435 range, clamped"
            );
        }
        Self { params }
    }

    fn header(&self, offset: usize) -> [u8; JPEG_HEADER_LEN] {
        let offset = (offset as u32).to_be_bytes();
        [
            0,
            offset[1],
            offset[2],
            offset[3],
            JPEG_TYPE,
            self.params.quality.clamp(1, MAX_QUALITY),
            (self.params.width.min(MAX_DIMENSION) / 8) as u8,
            (self.params.height.min(MAX_DIMENSION) / 8) as u8,
        ]
    }
}

impl Packetizer for JpegPacketizer {
    fn packetize(&self, frame: &[u8], max_fragment_size: usize) -> Vec<Fragment> {
        if frame.len() > MAX_FRAME_LEN {
            tracing::warn!(
                bytes = frame.len(),
                max = MAX_FRAME_LEN,
                "JPEG frame too large for 24-bit fragment offset, dropped"
            );
            return Vec::new();
        }
        let parts: Vec<&[u8]> = chunks(frame, max_fragment_size).collect();
        let count = parts.len();
        let mut offset = 0usize;
        let mut fragments = Vec::with_capacity(count);

        for (i, chunk) in parts.into_iter().enumerate() {
            let mut payload = Vec::with_capacity(JPEG_HEADER_LEN + chunk.len());
            payload.extend_from_slice(&self.header(offset));
            payload.extend_from_slice(chunk);
            fragments.push(Fragment::new(payload, i + 1 == count));
            offset += chunk.len();
        }

        fragments
    }

    fn codec(&self) -> Codec {
        Codec::Jpeg
    }
}

/// Reassembles JPEG scan data by fragment offset.
///
/// A fragment whose offset does not continue the bytes received so far
/// means a packet went missing; the frame is dropped and reassembly waits
/// for the next offset-zero fragment.
#[derive(Debug, Default)]
pub struct JpegDepacketizer {
    frame: Vec<u8>,
    broken: bool,
    params: Option<JpegParams>,
}

impl JpegDepacketizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Header parameters of the most recent fragment.
    pub fn params(&self) -> Option<JpegParams> {
        self.params
    }
}

impl Depacketizer for JpegDepacketizer {
    fn push(&mut self, packet: &RtpPacket) -> Option<Vec<u8>> {
        let payload = &packet.payload;
        if payload.len() < JPEG_HEADER_LEN {
            tracing::trace!(len = payload.len(), "JPEG payload too short");
            return None;
        }
        let offset = u32::from_be_bytes([0, payload[1], payload[2], payload[3]]) as usize;
        self.params = Some(JpegParams {
            quality: payload[5],
            width: payload[6] as u16 * 8,
            height: payload[7] as u16 * 8,
        });

        if offset == 0 {
            self.frame.clear();
            self.broken = false;
        } else if self.broken || offset != self.frame.len() {
            if !self.broken {
                tracing::debug!(offset, have = self.frame.len(), "JPEG fragment gap, frame dropped");
            }
            self.frame.clear();
            self.broken = true;
            return None;
        }

        self.frame.extend_from_slice(&payload[JPEG_HEADER_LEN..]);

        if packet.header.marker {
            return Some(std::mem::take(&mut self.frame));
        }
        None
    }

    fn codec(&self) -> Codec {
        Codec::Jpeg
    }

    fn has_pending_data(&self) -> bool {
        !self.frame.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::rtp::RtpHeader;

    fn packet(payload: Vec<u8>, marker: bool) -> RtpPacket {
        RtpPacket::new(RtpHeader::new(26, 0, 0, 1).with_marker(marker), payload)
    }

    #[test]
    fn header_layout() {
        let p = JpegPacketizer::new(JpegParams {
            quality: 80,
            width: 1280,
            height: 720,
        });
        let fragments = p.packetize(&[0xFF; 2500], 1000);
        assert_eq!(fragments.len(), 3);

        let second = &fragments[1].payload;
        assert_eq!(&second[..4], &[0, 0, 0x03, 0xE8]); // offset 1000
        assert_eq!(second[4], JPEG_TYPE);
        assert_eq!(second[5], 80);
        assert_eq!(second[6], 160);
        assert_eq!(second[7], 90);
        assert!(fragments[2].marker);
        assert!(!fragments[0].marker && !fragments[1].marker);
    }

    #[test]
    fn oversized_frame_rejected() {
        let p = JpegPacketizer::new(JpegParams::default());
        assert!(p.packetize(&vec![0; MAX_FRAME_LEN + 1], 1 << 23).is_empty());

        let fragments = p.packetize(&vec![0; MAX_FRAME_LEN], 1 << 23);
        assert_eq!(fragments.len(), 2);
        assert_eq!(&fragments[1].payload[1..4], &[0x80, 0, 0]);
        assert!(fragments[1].marker);
    }

    #[test]
    fn quality_clamped_to_tableless_range() {
        let p = JpegPacketizer::new(JpegParams {
            quality: 200,
            ..JpegParams::default()
        });
        assert_eq!(p.packetize(&[1], 100)[0].payload[5], MAX_QUALITY);
    }

    #[test]
    fn round_trip() {
        let frame: Vec<u8> = (0..3333u32).map(|i| (i % 256) as u8).collect();
        let mut d = JpegDepacketizer::new();
        let mut out = None;
        for f in JpegPacketizer::new(JpegParams::default()).packetize(&frame, 1000) {
            out = d.push(&packet(f.payload, f.marker));
        }
        assert_eq!(out.unwrap(), frame);
        assert_eq!(d.params(), Some(JpegParams::default()));
    }

    #[test]
    fn gap_drops_frame_until_next_start() {
        let fragments = JpegPacketizer::new(JpegParams::default()).packetize(&[7; 300], 100);
        let mut d = JpegDepacketizer::new();
        d.push(&packet(fragments[0].payload.clone(), false));
        // fragment 1 lost
        assert!(d.push(&packet(fragments[2].payload.clone(), true)).is_none());
        assert!(!d.has_pending_data());

        let again = JpegPacketizer::new(JpegParams::default()).packetize(&[8; 50], 100);
        assert_eq!(d.push(&packet(again[0].payload.clone(), true)).unwrap(), vec![8; 50]);
    }
}
