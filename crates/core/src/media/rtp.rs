use crate::error::{ParseErrorKind, Result};

/// Size of the fixed RTP header without CSRCs or extension.
pub const RTP_HEADER_LEN: usize = 12;

/// Profile identifier of the RFC 8285 one-byte header extension form.
pub const ONE_BYTE_EXTENSION_PROFILE: u16 = 0xBEDE;

/// RTP fixed header (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// |            CSRC list (0-15 items, 32 bits each)               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Version is always 2. Outgoing headers never carry padding; incoming
/// padding is stripped by [`RtpPacket::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    pub marker: bool,
    /// RTP payload type (7-bit, RFC 3551).
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    /// Synchronization source identifier (RFC 3550 §8.1).
    pub ssrc: u32,
    pub csrcs: Vec<u32>,
    pub extension: Option<HeaderExtension>,
}

impl RtpHeader {
    pub fn new(payload_type: u8, sequence: u16, timestamp: u32, ssrc: u32) -> Self {
        Self {
            marker: false,
            payload_type,
            sequence,
            timestamp,
            ssrc,
            csrcs: Vec::new(),
            extension: None,
        }
    }

    /// The `marker` bit (RFC 3550 §5.1) signals the last packet of a frame.
    pub fn with_marker(mut self, marker: bool) -> Self {
        self.marker = marker;
        self
    }

    pub fn with_extension(mut self, extension: HeaderExtension) -> Self {
        self.extension = Some(extension);
        self
    }

    /// Serialized length in bytes.
    pub fn wire_len(&self) -> usize {
        RTP_HEADER_LEN + 4 * self.csrcs.len() + self.extension.as_ref().map_or(0, |e| e.wire_len())
    }

    /// Append the serialized header to `buf`.
    pub fn write(&self, buf: &mut Vec<u8>) {
        let cc = self.csrcs.len().min(15) as u8;
        let x = if self.extension.is_some() { 0x10 } else { 0 };
        buf.push((2 << 6) | x | cc);
        buf.push(((self.marker as u8) << 7) | (self.payload_type & 0x7f));
        buf.extend_from_slice(&self.sequence.to_be_bytes());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.extend_from_slice(&self.ssrc.to_be_bytes());
        for csrc in self.csrcs.iter().take(15) {
            buf.extend_from_slice(&csrc.to_be_bytes());
        }
        if let Some(ext) = &self.extension {
            ext.write(buf);
        }
    }
}

/// RTP header extension block (RFC 3550 §5.3.1).
///
/// `data` is the extension body; it is zero-padded to a 32-bit boundary on
/// the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderExtension {
    pub profile: u16,
    pub data: Vec<u8>,
}

impl HeaderExtension {
    fn wire_len(&self) -> usize {
        4 + self.data.len().div_ceil(4) * 4
    }

    fn write(&self, buf: &mut Vec<u8>) {
        let words = self.data.len().div_ceil(4);
        buf.extend_from_slice(&self.profile.to_be_bytes());
        buf.extend_from_slice(&(words as u16).to_be_bytes());
        buf.extend_from_slice(&self.data);
        buf.resize(buf.len() + words * 4 - self.data.len(), 0);
    }

    /// One-byte-header extension (RFC 8285 §4.2) holding a single element.
    ///
    /// `value` must be 1 to 16 bytes long; longer values are truncated.
    pub fn one_byte(id: u8, value: &[u8]) -> Self {
        let value = &value[..value.len().min(16)];
        let mut data = Vec::with_capacity(1 + value.len());
        data.push(((id & 0x0f) << 4) | (value.len().saturating_sub(1) as u8));
        data.extend_from_slice(value);
        Self {
            profile: ONE_BYTE_EXTENSION_PROFILE,
            data,
        }
    }

    /// Find an element of a one-byte-header extension (RFC 8285 §4.2).
    ///
    /// Used to correlate capture timestamps (e.g. `abs-capture-time`) with
    /// received frames. Returns `None` for other profiles.
    pub fn one_byte_element(&self, id: u8) -> Option<&[u8]> {
        if self.profile != ONE_BYTE_EXTENSION_PROFILE {
            return None;
        }
        let mut i = 0usize;
        while i < self.data.len() {
            let b = self.data[i];
            if b == 0 {
                i += 1;
                continue;
            }
            let elem_id = b >> 4;
            if elem_id == 15 {
                return None;
            }
            let len = (b & 0x0f) as usize + 1;
            let start = i + 1;
            let end = start + len;
            if end > self.data.len() {
                return None;
            }
            if elem_id == id {
                return Some(&self.data[start..end]);
            }
            i = end;
        }
        None
    }
}

/// A parsed or assembled RTP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    pub header: RtpHeader,
    pub payload: Vec<u8>,
}

impl RtpPacket {
    pub fn new(header: RtpHeader, payload: Vec<u8>) -> Self {
        Self { header, payload }
    }

    /// Parse a packet from the wire.
    ///
    /// CSRCs and the header extension are decoded; trailing padding is
    /// removed from the payload.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < RTP_HEADER_LEN {
            return Err(ParseErrorKind::TooShort.into());
        }
        let version = buf[0] >> 6;
        if version != 2 {
            return Err(ParseErrorKind::BadVersion(version).into());
        }
        let padding = buf[0] & 0x20 != 0;
        let has_extension = buf[0] & 0x10 != 0;
        let cc = (buf[0] & 0x0f) as usize;

        let mut header = RtpHeader::new(
            buf[1] & 0x7f,
            u16::from_be_bytes([buf[2], buf[3]]),
            u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        )
        .with_marker(buf[1] & 0x80 != 0);

        let mut offset = RTP_HEADER_LEN;
        if buf.len() < offset + 4 * cc {
            return Err(ParseErrorKind::TooShort.into());
        }
        for chunk in buf[offset..offset + 4 * cc].chunks_exact(4) {
            header
                .csrcs
                .push(u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }
        offset += 4 * cc;

        if has_extension {
            if buf.len() < offset + 4 {
                return Err(ParseErrorKind::BadExtension.into());
            }
            let profile = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
            let words = u16::from_be_bytes([buf[offset + 2], buf[offset + 3]]) as usize;
            let start = offset + 4;
            let end = start + words * 4;
            if buf.len() < end {
                return Err(ParseErrorKind::BadExtension.into());
            }
            header.extension = Some(HeaderExtension {
                profile,
                data: buf[start..end].to_vec(),
            });
            offset = end;
        }

        let mut end = buf.len();
        if padding {
            let pad = buf[buf.len() - 1] as usize;
            if pad == 0 || offset + pad > buf.len() {
                return Err(ParseErrorKind::BadPadding.into());
            }
            end -= pad;
        }

        Ok(Self {
            header,
            payload: buf[offset..end].to_vec(),
        })
    }

    /// Serialize header and payload into one buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.header.wire_len() + self.payload.len());
        self.header.write(&mut buf);
        buf.extend_from_slice(&self.payload);
        buf
    }
}

/// Signed distance from `from` to `to` in 16-bit sequence space.
///
/// Positive when `to` comes after `from`, accounting for wraparound
/// (65535 → 0 is a distance of 1).
pub fn seq_distance(from: u16, to: u16) -> i16 {
    to.wrapping_sub(from) as i16
}

/// Whether `a` precedes `b` in wrapping sequence order.
pub fn seq_before(a: u16, b: u16) -> bool {
    seq_distance(a, b) > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediaError;

    fn make_header() -> RtpHeader {
        RtpHeader::new(96, 1000, 90000, 0xAABBCCDD)
    }

    fn serialize(h: &RtpHeader) -> Vec<u8> {
        let mut buf = Vec::new();
        h.write(&mut buf);
        buf
    }

    #[test]
    fn version_is_2() {
        let buf = serialize(&make_header());
        assert_eq!(buf[0] >> 6, 2);
        assert_eq!(buf.len(), 12);
    }

    #[test]
    fn marker_bit() {
        let no_marker = serialize(&make_header());
        assert_eq!(no_marker[1] & 0x80, 0);

        let with_marker = serialize(&make_header().with_marker(true));
        assert_eq!(with_marker[1] & 0x80, 0x80);
    }

    #[test]
    fn payload_type() {
        let buf = serialize(&make_header());
        assert_eq!(buf[1] & 0x7f, 96);
    }

    #[test]
    fn ssrc_written() {
        let buf = serialize(&make_header());
        let ssrc = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
        assert_eq!(ssrc, 0xAABBCCDD);
    }

    #[test]
    fn parse_reads_fixed_fields() {
        let mut buf = serialize(&make_header().with_marker(true));
        buf.extend_from_slice(&[1, 2, 3]);
        let p = RtpPacket::parse(&buf).unwrap();
        assert!(p.header.marker);
        assert_eq!(p.header.sequence, 1000);
        assert_eq!(p.header.timestamp, 90000);
        assert_eq!(p.header.ssrc, 0xAABBCCDD);
        assert_eq!(p.payload, vec![1, 2, 3]);
    }

    #[test]
    fn parse_with_csrc_and_extension() {
        let mut h = make_header().with_extension(HeaderExtension {
            profile: ONE_BYTE_EXTENSION_PROFILE,
            data: vec![0x11, 0xAA, 0xBB, 0x20, 0xCC],
        });
        h.csrcs.push(0x01020304);
        let packet = RtpPacket::new(h, vec![9, 9]);
        let parsed = RtpPacket::parse(&packet.to_bytes()).unwrap();

        assert_eq!(parsed.header.csrcs, vec![0x01020304]);
        let ext = parsed.header.extension.as_ref().unwrap();
        assert_eq!(ext.data.len(), 8); // padded to 2 words
        assert_eq!(ext.one_byte_element(1), Some(&[0xAA, 0xBB][..]));
        assert_eq!(ext.one_byte_element(2), Some(&[0xCC][..]));
        assert_eq!(ext.one_byte_element(3), None);
        assert_eq!(parsed.payload, vec![9, 9]);
    }

    #[test]
    fn parse_strips_padding() {
        let mut buf = serialize(&make_header());
        buf[0] |= 0x20;
        buf.extend_from_slice(&[7, 7, 0, 0, 3]);
        let p = RtpPacket::parse(&buf).unwrap();
        assert_eq!(p.payload, vec![7, 7]);
    }

    #[test]
    fn parse_rejects_short_and_bad_version() {
        assert!(matches!(
            RtpPacket::parse(&[0x80, 0, 0]),
            Err(MediaError::Parse {
                kind: ParseErrorKind::TooShort
            })
        ));
        let mut buf = serialize(&make_header());
        buf[0] = 0x40;
        assert!(matches!(
            RtpPacket::parse(&buf),
            Err(MediaError::Parse {
                kind: ParseErrorKind::BadVersion(1)
            })
        ));
    }

    #[test]
    fn parse_rejects_truncated_extension() {
        let mut buf = serialize(&make_header());
        buf[0] |= 0x10;
        buf.extend_from_slice(&[0xBE, 0xDE, 0x00, 0x04, 0x10]);
        assert!(matches!(
            RtpPacket::parse(&buf),
            Err(MediaError::Parse {
                kind: ParseErrorKind::BadExtension
            })
        ));
    }

    #[test]
    fn sequence_distance_wraps() {
        assert_eq!(seq_distance(65535, 0), 1);
        assert_eq!(seq_distance(0, 65535), -1);
        assert!(seq_before(65530, 3));
        assert!(!seq_before(3, 65530));
        assert!(!seq_before(7, 7));
    }
}
