//! Media codecs, RTP packetization and depacketization.
//!
//! This module provides the [`Packetizer`] and [`Depacketizer`] traits and
//! codec-specific implementations. A packetizer turns one encoded frame into
//! an ordered list of RTP payload [`Fragment`]s; the stream core wraps each
//! fragment in an RTP header ([`rtp::RtpHeader`]) built from the track's
//! counters. A depacketizer does the reverse for a single stream.
//!
//! ## RTP overview (RFC 3550)
//!
//! Every RTP packet carries a 12-byte fixed header containing:
//!
//! - **Sequence number** (16-bit, wrapping): for reordering and loss detection.
//! - **Timestamp** (32-bit, wrapping): media clock, 90 kHz for video.
//! - **SSRC** (32-bit): randomly chosen to identify the sender.
//! - **Marker bit**: set on the last packet of a frame.
//!
//! ## Supported codecs
//!
//! | Codec | Module | RFC |
//! |-------|--------|-----|
//! | H.264 | [`h264`] | [RFC 6184](https://tools.ietf.org/html/rfc6184) |
//! | VP8 | [`vp8`] | [RFC 7741](https://tools.ietf.org/html/rfc7741) |
//! | JPEG | [`mjpeg`] | [RFC 2435](https://tools.ietf.org/html/rfc2435) |
//! | PCMU, PCMA, G722, Opus | [`audio`] | [RFC 3551](https://tools.ietf.org/html/rfc3551) |
//! | telephone-event | [`dtmf`] | [RFC 4733](https://tools.ietf.org/html/rfc4733) |

pub mod audio;
pub mod dtmf;
pub mod h264;
pub mod mjpeg;
pub mod rtp;
pub mod vp8;

use std::fmt;

use rtp::RtpPacket;

/// Codecs this library knows how to (de)packetize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    H264,
    Vp8,
    Jpeg,
    Pcmu,
    Pcma,
    G722,
    Opus,
    TelephoneEvent,
}

impl Codec {
    /// Map an SDP encoding name to a codec, ignoring case.
    pub fn from_name(name: &str) -> Option<Codec> {
        let codec = match name.to_ascii_uppercase().as_str() {
            "H264" => Codec::H264,
            "VP8" => Codec::Vp8,
            "JPEG" => Codec::Jpeg,
            "PCMU" => Codec::Pcmu,
            "PCMA" => Codec::Pcma,
            "G722" => Codec::G722,
            "OPUS" => Codec::Opus,
            "TELEPHONE-EVENT" => Codec::TelephoneEvent,
            _ => return None,
        };
        Some(codec)
    }

    pub fn name(self) -> &'static str {
        match self {
            Codec::H264 => "H264",
            Codec::Vp8 => "VP8",
            Codec::Jpeg => "JPEG",
            Codec::Pcmu => "PCMU",
            Codec::Pcma => "PCMA",
            Codec::G722 => "G722",
            Codec::Opus => "OPUS",
            Codec::TelephoneEvent => "telephone-event",
        }
    }

    pub fn is_audio(self) -> bool {
        matches!(
            self,
            Codec::Pcmu | Codec::Pcma | Codec::G722 | Codec::Opus | Codec::TelephoneEvent
        )
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One RTP payload produced by a packetizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub payload: Vec<u8>,
    /// True exactly on the last fragment of the frame.
    pub marker: bool,
}

impl Fragment {
    pub fn new(payload: Vec<u8>, marker: bool) -> Self {
        Self { payload, marker }
    }
}

/// Codec-specific RTP packetizer.
///
/// Packetizers are stateless: they know nothing of sequence numbers,
/// timestamps or SSRCs. The RTP header is composed by the caller from the
/// track state, so one packetizer can serve any number of tracks.
///
/// ## Implementing a new codec
///
/// 1. Create a new module (e.g. `media/aac.rs`)
/// 2. Implement `Packetizer` (and usually [`Depacketizer`]) for your type
/// 3. Map its encoding name in [`Codec::from_name`] and wire it into
///    [`packetizer_for`] / [`depacketizer_for`]
pub trait Packetizer: Send {
    /// Split one encoded frame into RTP payloads of at most
    /// `max_fragment_size` bytes of media data each.
    ///
    /// Codec payload headers are added on top of `max_fragment_size`.
    /// The last returned fragment has `marker` set.
    fn packetize(&self, frame: &[u8], max_fragment_size: usize) -> Vec<Fragment>;

    fn codec(&self) -> Codec;
}

/// Codec-specific reassembly of RTP payloads into frames.
///
/// One instance serves exactly one stream. Packets must be pushed in
/// sequence order; reordering is the job of
/// [`ReorderBuffer`](crate::reorder::ReorderBuffer).
pub trait Depacketizer: Send {
    /// Feed one packet. Returns the complete frame once its last packet
    /// arrives; the internal accumulator is cleared at that point.
    fn push(&mut self, packet: &RtpPacket) -> Option<Vec<u8>>;

    fn codec(&self) -> Codec;

    /// Whether a partially reassembled frame is buffered.
    fn has_pending_data(&self) -> bool;
}

/// Packetizer for an outgoing codec, or `None` if it cannot be sent as
/// media frames.
pub fn packetizer_for(codec: Codec, jpeg: mjpeg::JpegParams) -> Option<Box<dyn Packetizer>> {
    let packetizer: Box<dyn Packetizer> = match codec {
        Codec::H264 => Box::new(h264::H264Packetizer),
        Codec::Vp8 => Box::new(vp8::Vp8Packetizer),
        Codec::Jpeg => Box::new(mjpeg::JpegPacketizer::new(jpeg)),
        Codec::Pcmu | Codec::Pcma | Codec::G722 | Codec::Opus => {
            Box::new(audio::AudioPacketizer::new(codec))
        }
        Codec::TelephoneEvent => return None,
    };
    Some(packetizer)
}

/// Depacketizer for an incoming codec, or `None` if frames of this codec
/// cannot be reassembled.
pub fn depacketizer_for(codec: Codec) -> Option<Box<dyn Depacketizer>> {
    let depacketizer: Box<dyn Depacketizer> = match codec {
        Codec::H264 => Box::new(h264::H264Depacketizer::new()),
        Codec::Vp8 => Box::new(vp8::Vp8Depacketizer::new()),
        Codec::Jpeg => Box::new(mjpeg::JpegDepacketizer::new()),
        Codec::Pcmu | Codec::Pcma | Codec::G722 | Codec::Opus => {
            Box::new(audio::AudioDepacketizer::new(codec))
        }
        Codec::TelephoneEvent => return None,
    };
    Some(depacketizer)
}

/// Split `data` into consecutive chunks of at most `max` bytes.
///
/// A zero `max` is treated as 1 so callers never loop forever.
pub(crate) fn chunks(data: &[u8], max: usize) -> std::slice::Chunks<'_, u8> {
    data.chunks(max.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_names_round_trip() {
        for codec in [
            Codec::H264,
            Codec::Vp8,
            Codec::Jpeg,
            Codec::Pcmu,
            Codec::Pcma,
            Codec::G722,
            Codec::Opus,
            Codec::TelephoneEvent,
        ] {
            assert_eq!(Codec::from_name(codec.name()), Some(codec));
        }
        assert_eq!(Codec::from_name("vp8"), Some(Codec::Vp8));
        assert_eq!(Codec::from_name("AV1"), None);
    }

    #[test]
    fn telephone_event_has_no_strategies() {
        assert!(packetizer_for(Codec::TelephoneEvent, mjpeg::JpegParams::default()).is_none());
        assert!(depacketizer_for(Codec::TelephoneEvent).is_none());
    }

    #[test]
    fn factories_match_codec() {
        let p = packetizer_for(Codec::Vp8, mjpeg::JpegParams::default()).unwrap();
        assert_eq!(p.codec(), Codec::Vp8);
        let d = depacketizer_for(Codec::H264).unwrap();
        assert_eq!(d.codec(), Codec::H264);
    }
}
