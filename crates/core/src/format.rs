//! Media formats and tracks.
//!
//! A [`Track`] is one direction of one media kind within a session. It owns
//! the ordered capability list advertised for that direction and, for local
//! tracks, the RTP send counters (RFC 3550 §5.1):
//!
//! - **SSRC**: chosen once at construction and never changed.
//! - **Sequence number**: 16-bit, wrapping, +1 per packet sent.
//! - **Timestamp**: 32-bit, wrapping, advanced once per frame by the
//!   caller-supplied duration in clock-rate units.

use std::fmt;

use crate::media::Codec;
use crate::media::rtp::RtpHeader;

/// Media kind of a stream (`m=audio` / `m=video`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// A codec capability: name, RTP payload type and clock rate.
///
/// Two formats are compatible when their names match case-insensitively;
/// payload type numbers are allowed to differ between peers for dynamic
/// types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    pub name: String,
    pub payload_type: u8,
    pub clock_rate: u32,
}

impl Format {
    pub fn new(name: &str, payload_type: u8, clock_rate: u32) -> Self {
        Self {
            name: name.to_string(),
            payload_type,
            clock_rate,
        }
    }

    /// G.711 µ-law, static payload type 0 (RFC 3551 §6).
    pub fn pcmu() -> Self {
        Self::new("PCMU", 0, 8000)
    }

    /// G.711 A-law, static payload type 8.
    pub fn pcma() -> Self {
        Self::new("PCMA", 8, 8000)
    }

    /// RFC 4733 telephone events on a dynamic payload type.
    pub fn telephone_event(payload_type: u8) -> Self {
        Self::new("telephone-event", payload_type, 8000)
    }

    pub fn h264(payload_type: u8) -> Self {
        Self::new("H264", payload_type, 90000)
    }

    pub fn vp8(payload_type: u8) -> Self {
        Self::new("VP8", payload_type, 90000)
    }

    /// JPEG, static payload type 26 (RFC 2435).
    pub fn jpeg() -> Self {
        Self::new("JPEG", 26, 90000)
    }

    /// Case-insensitive name comparison.
    pub fn is_compatible(&self, other: &Format) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
    }

    pub fn codec(&self) -> Option<Codec> {
        Codec::from_name(&self.name)
    }

    pub fn is_telephone_event(&self) -> bool {
        self.codec() == Some(Codec::TelephoneEvent)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.payload_type, self.name, self.clock_rate)
    }
}

/// Direction attribute of a track (RFC 3264 §5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

impl StreamStatus {
    pub fn can_send(self) -> bool {
        matches!(self, Self::SendRecv | Self::SendOnly)
    }

    pub fn can_receive(self) -> bool {
        matches!(self, Self::SendRecv | Self::RecvOnly)
    }
}

/// One direction of one media kind.
#[derive(Debug, Clone)]
pub struct Track {
    pub kind: MediaKind,
    pub formats: Vec<Format>,
    pub status: StreamStatus,
    ssrc: u32,
    sequence: u16,
    timestamp: u32,
}

impl Track {
    /// Create a track with a random SSRC.
    ///
    /// Per RFC 3550 §8.1, the SSRC should be chosen randomly to minimize
    /// the probability of collisions between independent sessions.
    pub fn new(kind: MediaKind, formats: Vec<Format>, status: StreamStatus) -> Self {
        Self::with_ssrc(kind, formats, status, rand::random::<u32>())
    }

    /// Create a track with an explicit SSRC.
    pub fn with_ssrc(
        kind: MediaKind,
        formats: Vec<Format>,
        status: StreamStatus,
        ssrc: u32,
    ) -> Self {
        tracing::debug!(
            %kind,
            ssrc = format_args!("{:#010X}", ssrc),
            formats = formats.len(),
            "track created"
        );
        Self {
            kind,
            formats,
            status,
            ssrc,
            sequence: 0,
            timestamp: 0,
        }
    }

    /// Start the send counters from a given sequence number.
    pub fn with_sequence(mut self, sequence: u16) -> Self {
        self.sequence = sequence;
        self
    }

    /// Start the send counters from a given RTP timestamp.
    pub fn with_timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Sequence number the next packet will carry.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Timestamp the next frame will carry.
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Build the header for the next outgoing packet and advance the
    /// sequence number.
    ///
    /// The current frame timestamp is used; call
    /// [`advance_timestamp`](Self::advance_timestamp) once the frame's last
    /// packet has been built.
    pub fn next_header(&mut self, payload_type: u8, marker: bool) -> RtpHeader {
        let header = RtpHeader::new(payload_type, self.sequence, self.timestamp, self.ssrc)
            .with_marker(marker);
        self.sequence = self.sequence.wrapping_add(1);
        header
    }

    /// Same as [`next_header`](Self::next_header) with a caller-chosen
    /// timestamp, leaving the frame timestamp untouched.
    pub fn next_header_at(&mut self, payload_type: u8, marker: bool, timestamp: u32) -> RtpHeader {
        let header = RtpHeader::new(payload_type, self.sequence, timestamp, self.ssrc)
            .with_marker(marker);
        self.sequence = self.sequence.wrapping_add(1);
        header
    }

    /// Advance the RTP timestamp by one frame duration.
    ///
    /// For video at 90 kHz clock rate, the increment per frame is
    /// `90000 / fps` (e.g. 3000 for 30 fps, 3600 for 25 fps).
    pub fn advance_timestamp(&mut self, duration: u32) {
        self.timestamp = self.timestamp.wrapping_add(duration);
    }

    /// Look up the format advertised under a payload type number.
    pub fn format_for_payload_type(&self, payload_type: u8) -> Option<&Format> {
        self.formats.iter().find(|f| f.payload_type == payload_type)
    }
}
