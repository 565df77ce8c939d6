//! Sending-format negotiation between local and remote capabilities.
//!
//! Capabilities come from the offer/answer exchange (RFC 3264). The first
//! entry of each list is that side's preferred format. Formats are matched
//! by case-insensitive encoding name; payload type numbers may differ.

use crate::error::{MediaError, Result, TrackSide};
use crate::format::{Format, MediaKind};

/// Formats present on both sides, in local priority order.
///
/// Each entry is the remote side's description of the format, because a
/// sender must use the payload type the receiver advertised.
pub fn compatible_formats(local: &[Format], remote: &[Format]) -> Vec<Format> {
    local
        .iter()
        .filter_map(|l| remote.iter().find(|r| l.is_compatible(r)).cloned())
        .collect()
}

/// Pick the format to send media with.
///
/// - Only one side known: that side's first capability.
/// - Both known: the first entry of [`compatible_formats`]. For audio,
///   telephone-event and the `excluded_payload_id` entry are skipped; they
///   can be negotiated for DTMF but never carry the media itself.
///
/// An empty result means upstream negotiation accepted an incompatible
/// session, reported as [`MediaError::NoCommonFormat`].
pub fn get_sending_format(
    local: Option<&[Format]>,
    remote: Option<&[Format]>,
    kind: MediaKind,
    excluded_payload_id: Option<u8>,
) -> Result<Format> {
    let candidates = match (local, remote) {
        (Some(local), Some(remote)) => compatible_formats(local, remote),
        (Some(only), None) | (None, Some(only)) => {
            return only
                .first()
                .cloned()
                .ok_or(MediaError::NoCommonFormat { kind });
        }
        (None, None) => {
            return Err(MediaError::MissingTrack {
                kind,
                side: TrackSide::Either,
            });
        }
    };

    let chosen = match kind {
        MediaKind::Audio => candidates.into_iter().find(|f| {
            !f.is_telephone_event() && excluded_payload_id != Some(f.payload_type)
        }),
        MediaKind::Video => candidates.into_iter().next(),
    };

    match chosen {
        Some(format) => {
            tracing::debug!(%kind, format = %format, "sending format selected");
            Ok(format)
        }
        None => {
            tracing::error!(%kind, "no common format between local and remote capabilities");
            Err(MediaError::NoCommonFormat { kind })
        }
    }
}
