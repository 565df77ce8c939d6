//! DTMF telephone events: RFC 4733 §2.3.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     event     |E|R| volume    |          duration             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Events travel on the `telephone-event` payload type and are never
//! reassembled into media frames.

pub const EVENT_PAYLOAD_LEN: usize = 4;

/// One telephone event report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtmfEvent {
    /// Event code: 0–9 digits, 10 `*`, 11 `#`, 12–15 `A`–`D`.
    pub event: u8,
    pub end: bool,
    /// Power level in -dBm0, 0–63.
    pub volume: u8,
    /// Duration in timestamp units since the event began.
    pub duration: u16,
}

impl DtmfEvent {
    pub fn new(event: u8, volume: u8, duration: u16) -> Self {
        Self {
            event,
            end: false,
            volume,
            duration,
        }
    }

    /// Map a keypad symbol to its event code.
    pub fn from_digit(digit: char, volume: u8, duration: u16) -> Option<Self> {
        let event = match digit {
            '0'..='9' => digit as u8 - b'0',
            '*' => 10,
            '#' => 11,
            'A'..='D' => digit as u8 - b'A' + 12,
            _ => return None,
        };
        Some(Self::new(event, volume, duration))
    }

    pub fn to_bytes(&self) -> [u8; EVENT_PAYLOAD_LEN] {
        let duration = self.duration.to_be_bytes();
        [
            self.event,
            ((self.end as u8) << 7) | (self.volume & 0x3f),
            duration[0],
            duration[1],
        ]
    }

    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < EVENT_PAYLOAD_LEN {
            return None;
        }
        Some(Self {
            event: payload[0],
            end: payload[1] & 0x80 != 0,
            volume: payload[1] & 0x3f,
            duration: u16::from_be_bytes([payload[2], payload[3]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_layout() {
        let mut e = DtmfEvent::from_digit('#', 10, 800).unwrap();
        e.end = true;
        assert_eq!(e.to_bytes(), [11, 0x80 | 10, 0x03, 0x20]);
        assert_eq!(DtmfEvent::parse(&e.to_bytes()), Some(e));
    }

    #[test]
    fn digit_mapping() {
        assert_eq!(DtmfEvent::from_digit('7', 0, 0).unwrap().event, 7);
        assert_eq!(DtmfEvent::from_digit('*', 0, 0).unwrap().event, 10);
        assert_eq!(DtmfEvent::from_digit('C', 0, 0).unwrap().event, 14);
        assert!(DtmfEvent::from_digit('x', 0, 0).is_none());
    }

    #[test]
    fn short_payload_rejected() {
        assert!(DtmfEvent::parse(&[1, 2]).is_none());
    }
}
