//! Error types for the media stream library.

use std::fmt;

use crate::format::MediaKind;
use crate::security::SecurityError;

/// Errors that can occur in the media stream library.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Transport**: [`Io`](Self::Io), socket/network failures.
/// - **Wire**: [`Parse`](Self::Parse), malformed RTP packets.
/// - **Negotiation**: [`MissingTrack`](Self::MissingTrack),
///   [`NoCommonFormat`](Self::NoCommonFormat). These mean the offer/answer
///   exchange upstream let an unusable session through; callers should not
///   retry.
/// - **Send path**: [`UnsupportedCodec`](Self::UnsupportedCodec), and
///   [`MissingTrack`](Self::MissingTrack) with [`TrackSide::Local`] when
///   there is nothing to stamp packets from.
/// - **Security**: [`Security`](Self::Security), a protect hook failed.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse an RTP packet (RFC 3550 §5.1).
    #[error("RTP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// No track on the side an operation needs.
    #[error("no {side} track for {kind} stream")]
    MissingTrack { kind: MediaKind, side: TrackSide },

    /// Local and remote capability lists share no usable format.
    #[error("no common {kind} format between local and remote capabilities")]
    NoCommonFormat { kind: MediaKind },

    /// The negotiated sending format has no packetizer.
    #[error("unsupported outgoing codec: {0}")]
    UnsupportedCodec(String),

    /// An SRTP/SRTCP hook rejected a packet.
    #[error(transparent)]
    Security(#[from] SecurityError),
}

/// Which track an operation found missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSide {
    /// The local track, which owns the send counters.
    Local,
    /// Both: negotiation needs at least one of them.
    Either,
}

impl fmt::Display for TrackSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Either => write!(f, "local or remote"),
        }
    }
}

/// Specific kind of RTP parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Fewer than 12 bytes, or the CSRC list runs past the end.
    TooShort,
    /// Version field was not 2.
    BadVersion(u8),
    /// Header extension length runs past the end of the buffer.
    BadExtension,
    /// Padding count is zero or larger than the payload.
    BadPadding,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => write!(f, "packet too short"),
            Self::BadVersion(v) => write!(f, "unsupported version {v}"),
            Self::BadExtension => write!(f, "truncated header extension"),
            Self::BadPadding => write!(f, "invalid padding"),
        }
    }
}

impl From<ParseErrorKind> for MediaError {
    fn from(kind: ParseErrorKind) -> Self {
        MediaError::Parse { kind }
    }
}

/// Convenience alias for `Result<T, MediaError>`.
pub type Result<T> = std::result::Result<T, MediaError>;
