use super::rtp::RtpPacket;
use super::{Codec, Depacketizer, Fragment, Packetizer, chunks};

/// FU-A fragmentation unit type (RFC 6184 §5.8).
const FU_A_TYPE: u8 = 28;
/// STAP-A aggregation packet type (RFC 6184 §5.7.1).
const STAP_A_TYPE: u8 = 24;
/// Annex B start code written in front of every reassembled NAL.
pub const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// H.264 RTP packetizer (RFC 6184).
///
/// Converts H.264 Annex B access units into RTP payloads. Supports two
/// packetization modes from RFC 6184:
///
/// - **Single NAL Unit** (§5.6): NALs that fit within the fragment size are
///   sent as-is in a single RTP packet.
///
/// - **FU-A Fragmentation** (§5.8): larger NALs lose their 1-byte header and
///   the rest is split into `max_fragment_size` chunks. Each chunk carries a
///   2-byte FU header rebuilt from the original NAL header:
///
///   ```text
///   FU indicator:  [F|NRI|Type=28]     (1 byte)
///   FU header:     [S|E|R|NAL_Type]    (1 byte)
///   Fragment data: [...]               (up to max_fragment_size bytes)
///   ```
///
///   - **S** (start): set on the first fragment
///   - **E** (end): set on the last fragment
///   - **NAL_Type**: the original NAL unit type from the first byte
///
/// ## Annex B NAL extraction
///
/// H.264 Annex B bitstreams delimit NAL units with start codes:
/// - 4-byte: `0x00 0x00 0x00 0x01`
/// - 3-byte: `0x00 0x00 0x01`
///
/// [`extract_nal_units`](Self::extract_nal_units) handles both formats
/// and tracks each start code's length for correct boundary calculation.
///
/// ## Marker bit
///
/// Per RFC 6184 §5.1, the RTP marker bit is set on the last RTP packet
/// of an H.264 access unit (frame boundary).
#[derive(Debug, Clone, Copy, Default)]
pub struct H264Packetizer;

impl H264Packetizer {
    /// Packetize a single NAL unit into one or more RTP payloads.
    ///
    /// If the NAL fits within `max_fragment_size`, it is sent as a Single
    /// NAL Unit packet (RFC 6184 §5.6). Otherwise, FU-A fragmentation is
    /// used (RFC 6184 §5.8).
    pub fn packetize_nal(nal_unit: &[u8], is_last_nal: bool, max_fragment_size: usize) -> Vec<Fragment> {
        let mut fragments = Vec::new();

        if nal_unit.is_empty() {
            return fragments;
        }

        if nal_unit.len() <= max_fragment_size {
            fragments.push(Fragment::new(nal_unit.to_vec(), is_last_nal));
            return fragments;
        }

        let nal_header = nal_unit[0];
        let nal_type = nal_header & 0x1f;

        // FU indicator: F and NRI from original NAL, type = 28 (FU-A)
        let fu_indicator = (nal_header & 0xe0) | FU_A_TYPE;
        let parts: Vec<&[u8]> = chunks(&nal_unit[1..], max_fragment_size).collect();
        let count = parts.len();

        for (i, chunk) in parts.into_iter().enumerate() {
            let first = i == 0;
            let last = i + 1 == count;

            // FU header: S=start, E=end, R=0, Type=original NAL type
            let start_bit = if first { 0x80 } else { 0x00 };
            let end_bit = if last { 0x40 } else { 0x00 };
            let fu_header = start_bit | end_bit | nal_type;

            let mut payload = Vec::with_capacity(2 + chunk.len());
            payload.push(fu_indicator);
            payload.push(fu_header);
            payload.extend_from_slice(chunk);
            fragments.push(Fragment::new(payload, is_last_nal && last));
        }

        tracing::trace!(
            nal_type,
            nal_size = nal_unit.len(),
            fragments = fragments.len(),
            "FU-A fragmented NAL unit"
        );

        fragments
    }

    /// Extract NAL units from an H.264 Annex B bitstream.
    ///
    /// Scans for start codes (both 4-byte `00 00 00 01` and 3-byte
    /// `00 00 01`) and returns the NAL data between them, excluding
    /// the start codes themselves.
    ///
    /// The start code length is tracked per-NAL to ensure boundaries
    /// between adjacent NALs are computed correctly when mixed 3-byte
    /// and 4-byte start codes appear.
    pub fn extract_nal_units(data: &[u8]) -> Vec<&[u8]> {
        let mut nal_units = Vec::new();
        let mut i = 0usize;

        // (nal_data_start_index, start_code_length)
        let mut start_entries: Vec<(usize, usize)> = Vec::new();

        while i < data.len() {
            if i + 3 < data.len() && data[i..i + 4] == START_CODE {
                start_entries.push((i + 4, 4));
                i += 4;
            } else if i + 2 < data.len() && data[i..i + 3] == [0, 0, 1] {
                start_entries.push((i + 3, 3));
                i += 3;
            } else {
                i += 1;
            }
        }

        for (idx, &(start, _)) in start_entries.iter().enumerate() {
            let end = match start_entries.get(idx + 1) {
                Some(&(next_start, next_sc_len)) => next_start - next_sc_len,
                None => data.len(),
            };

            if start < end {
                nal_units.push(&data[start..end]);
            }
        }

        nal_units
    }
}

impl Packetizer for H264Packetizer {
    fn packetize(&self, frame: &[u8], max_fragment_size: usize) -> Vec<Fragment> {
        let nal_units = Self::extract_nal_units(frame);
        let mut fragments = Vec::new();

        for (i, nal) in nal_units.iter().enumerate() {
            let is_last = i == nal_units.len() - 1;
            fragments.append(&mut Self::packetize_nal(nal, is_last, max_fragment_size));
        }

        tracing::trace!(
            nal_count = nal_units.len(),
            fragments = fragments.len(),
            frame_bytes = frame.len(),
            "access unit packetized"
        );

        fragments
    }

    fn codec(&self) -> Codec {
        Codec::H264
    }
}

/// H.264 RTP depacketizer (RFC 6184).
///
/// Rebuilds Annex B access units. Every NAL is written with a 4-byte start
/// code; the access unit is returned when the packet carrying the RTP
/// marker bit has been processed.
///
/// - Single NAL unit packets are appended as they are.
/// - STAP-A packets are split into their NAL units.
/// - FU-A fragments are accumulated; the S fragment restores the NAL header
///   from the FU indicator and FU header, the E fragment closes the NAL.
///
/// A change of RTP timestamp with data still pending means the previous
/// frame lost its tail; the partial frame is discarded.
#[derive(Debug, Default)]
pub struct H264Depacketizer {
    timestamp: Option<u32>,
    access_unit: Vec<u8>,
    fragmented_nal: Option<Vec<u8>>,
}

impl H264Depacketizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn append_nal(&mut self, nal: &[u8]) {
        self.access_unit.extend_from_slice(&START_CODE);
        self.access_unit.extend_from_slice(nal);
    }

    fn process_fu_a(&mut self, payload: &[u8]) {
        if payload.len() < 2 {
            return;
        }
        let fu_indicator = payload[0];
        let fu_header = payload[1];
        let is_start = fu_header & 0x80 != 0;
        let is_end = fu_header & 0x40 != 0;
        let nal_type = fu_header & 0x1f;

        if is_start {
            let mut nal = Vec::with_capacity(payload.len() - 1);
            nal.push((fu_indicator & 0xe0) | nal_type);
            self.fragmented_nal = Some(nal);
        }

        let Some(nal) = self.fragmented_nal.as_mut() else {
            tracing::trace!(nal_type, "FU-A fragment without start, dropped");
            return;
        };
        nal.extend_from_slice(&payload[2..]);

        if is_end && let Some(nal) = self.fragmented_nal.take() {
            self.append_nal(&nal);
        }
    }

    fn process_stap_a(&mut self, payload: &[u8]) {
        let mut i = 1usize;
        while i + 2 <= payload.len() {
            let size = u16::from_be_bytes([payload[i], payload[i + 1]]) as usize;
            i += 2;
            if size == 0 || i + size > payload.len() {
                tracing::trace!(size, "truncated STAP-A unit, dropped");
                return;
            }
            let nal = &payload[i..i + size];
            self.append_nal(nal);
            i += size;
        }
    }

    fn reset(&mut self) {
        self.access_unit.clear();
        self.fragmented_nal = None;
    }
}

impl Depacketizer for H264Depacketizer {
    fn push(&mut self, packet: &RtpPacket) -> Option<Vec<u8>> {
        let timestamp = packet.header.timestamp;
        let payload = &packet.payload;

        if let Some(current) = self.timestamp
            && current != timestamp
            && self.has_pending_data()
        {
            tracing::debug!(
                stale_ts = current,
                ts = timestamp,
                "incomplete access unit discarded"
            );
            self.reset();
        }
        self.timestamp = Some(timestamp);

        if let Some(&first) = payload.first() {
            match first & 0x1f {
                FU_A_TYPE => self.process_fu_a(payload),
                STAP_A_TYPE => self.process_stap_a(payload),
                1..=23 => self.append_nal(payload),
                other => tracing::trace!(nal_type = other, "unsupported NAL packet type"),
            }
        }

        if !packet.header.marker {
            return None;
        }

        self.fragmented_nal = None;
        if self.access_unit.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.access_unit))
    }

    fn codec(&self) -> Codec {
        Codec::H264
    }

    fn has_pending_data(&self) -> bool {
        !self.access_unit.is_empty() || self.fragmented_nal.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::rtp::RtpHeader;

    const MAX: usize = 1200;

    fn packet(payload: Vec<u8>, seq: u16, ts: u32, marker: bool) -> RtpPacket {
        RtpPacket::new(RtpHeader::new(96, seq, ts, 0x1234).with_marker(marker), payload)
    }

    /// Undo the FU-A transform on a run of fragments.
    fn reconstruct(fragments: &[Fragment]) -> Vec<u8> {
        let mut nal = vec![(fragments[0].payload[0] & 0xe0) | (fragments[0].payload[1] & 0x1f)];
        for f in fragments {
            nal.extend_from_slice(&f.payload[2..]);
        }
        nal
    }

    // --- NAL extraction ---

    #[test]
    fn extract_single_nal_4byte_sc() {
        let data = [0, 0, 0, 1, 0x65, 0xAA, 0xBB];
        let nals = H264Packetizer::extract_nal_units(&data);
        assert_eq!(nals, vec![&[0x65, 0xAA, 0xBB][..]]);
    }

    #[test]
    fn extract_single_nal_3byte_sc() {
        let data = [0, 0, 1, 0x67, 0x42, 0x00];
        let nals = H264Packetizer::extract_nal_units(&data);
        assert_eq!(nals, vec![&[0x67, 0x42, 0x00][..]]);
    }

    #[test]
    fn extract_mixed_start_codes() {
        let mut data = vec![0, 0, 0, 1, 0x67, 0x42];
        data.extend_from_slice(&[0, 0, 1, 0x68, 0xCE]);
        let nals = H264Packetizer::extract_nal_units(&data);
        assert_eq!(nals.len(), 2);
        assert_eq!(nals[0], &[0x67, 0x42]);
        assert_eq!(nals[1], &[0x68, 0xCE]);
    }

    #[test]
    fn extract_empty_data() {
        assert!(H264Packetizer::extract_nal_units(&[]).is_empty());
    }

    #[test]
    fn extract_no_start_code() {
        assert!(H264Packetizer::extract_nal_units(&[0xFF, 0xFE]).is_empty());
    }

    // --- Packetization ---

    #[test]
    fn small_nal_single_packet_follows_last_flag() {
        let nal = vec![0x65, 0xAA, 0xBB, 0xCC];
        let last = H264Packetizer::packetize_nal(&nal, true, MAX);
        assert_eq!(last, vec![Fragment::new(nal.clone(), true)]);

        let not_last = H264Packetizer::packetize_nal(&nal, false, MAX);
        assert_eq!(not_last.len(), 1);
        assert!(!not_last[0].marker);
    }

    #[test]
    fn nal_exactly_max_is_not_fragmented() {
        let nal = vec![0x41; MAX];
        assert_eq!(H264Packetizer::packetize_nal(&nal, true, MAX).len(), 1);
    }

    #[test]
    fn large_nal_fragment_count_and_reconstruction() {
        for size in [MAX + 1, MAX + 2, 2 * MAX + 1, 3000] {
            let mut nal = vec![0x65]; // F=0, NRI=3, type 5
            nal.extend((1..size).map(|i| (i % 251) as u8));
            let fragments = H264Packetizer::packetize_nal(&nal, true, MAX);

            assert_eq!(fragments.len(), (size - 1).div_ceil(MAX), "size {size}");
            assert_eq!(fragments[0].payload[0] & 0x1f, FU_A_TYPE);
            assert_eq!(fragments[0].payload[1] & 0x80, 0x80);
            let last = fragments.last().unwrap();
            assert_eq!(last.payload[1] & 0x40, 0x40);
            assert!(last.marker);
            assert!(fragments[..fragments.len() - 1].iter().all(|f| !f.marker));
            assert!(fragments.iter().all(|f| f.payload.len() <= MAX + 2));
            assert_eq!(reconstruct(&fragments), nal);
        }
    }

    #[test]
    fn fragmented_nal_not_last_has_no_marker() {
        let nal = vec![0x41; 2 * MAX];
        let fragments = H264Packetizer::packetize_nal(&nal, false, MAX);
        assert!(fragments.iter().all(|f| !f.marker));
    }

    #[test]
    fn empty_nal_no_packets() {
        assert!(H264Packetizer::packetize_nal(&[], true, MAX).is_empty());
    }

    #[test]
    fn marker_only_on_last_nal_of_access_unit() {
        let frame = [
            &START_CODE[..],
            &[0x67, 0x42, 0x00, 0x1e],
            &START_CODE[..],
            &[0x68, 0xce, 0x38, 0x80],
            &START_CODE[..],
            &[0x65, 0x88, 0x00],
        ]
        .concat();
        let fragments = H264Packetizer.packetize(&frame, MAX);
        let markers: Vec<bool> = fragments.iter().map(|f| f.marker).collect();
        assert_eq!(markers, vec![false, false, true]);
    }

    // --- Depacketization ---

    #[test]
    fn single_nal_emitted_on_marker() {
        let mut d = H264Depacketizer::new();
        assert!(d.push(&packet(vec![0x67, 1, 2], 1, 1000, false)).is_none());
        let au = d.push(&packet(vec![0x65, 3], 2, 1000, true)).unwrap();
        assert_eq!(au, vec![0, 0, 0, 1, 0x67, 1, 2, 0, 0, 0, 1, 0x65, 3]);
        assert!(!d.has_pending_data());
    }

    #[test]
    fn fu_a_reassembly_restores_header() {
        let mut d = H264Depacketizer::new();
        let indicator = (3 << 5) | FU_A_TYPE;
        assert!(d.push(&packet(vec![indicator, 0x85, 0xAA], 1, 2000, false)).is_none());
        assert!(d.push(&packet(vec![indicator, 0x05, 0xBB], 2, 2000, false)).is_none());
        let au = d.push(&packet(vec![indicator, 0x45, 0xCC], 3, 2000, true)).unwrap();
        assert_eq!(au, vec![0, 0, 0, 1, 0x65, 0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn stap_a_split_into_nals() {
        let mut d = H264Depacketizer::new();
        let payload = vec![STAP_A_TYPE, 0, 2, 0x67, 0x42, 0, 1, 0x68];
        let au = d.push(&packet(payload, 1, 0, true)).unwrap();
        assert_eq!(au, vec![0, 0, 0, 1, 0x67, 0x42, 0, 0, 0, 1, 0x68]);
    }

    #[test]
    fn fragment_without_start_is_dropped() {
        let mut d = H264Depacketizer::new();
        let indicator = (3 << 5) | FU_A_TYPE;
        assert!(d.push(&packet(vec![indicator, 0x45, 0xCC], 1, 0, true)).is_none());
    }

    #[test]
    fn timestamp_change_discards_incomplete_data() {
        let mut d = H264Depacketizer::new();
        let indicator = (3 << 5) | FU_A_TYPE;
        d.push(&packet(vec![indicator, 0x85, 0xAA, 0xBB], 1, 1000, false));
        assert!(d.has_pending_data());

        let au = d.push(&packet(vec![0x67, 1, 2], 2, 2000, true)).unwrap();
        assert_eq!(au, vec![0, 0, 0, 1, 0x67, 1, 2]);
    }

    #[test]
    fn round_trip_access_unit() {
        let small: Vec<u8> = std::iter::once(0x67).chain((0..49).map(|i| i as u8)).collect();
        let large: Vec<u8> = std::iter::once(0x65).chain((0..2999).map(|i| (i % 200) as u8)).collect();
        let frame = [&START_CODE[..], &small, &START_CODE[..], &large].concat();

        let fragments = H264Packetizer.packetize(&frame, MAX);
        assert_eq!(fragments.len(), 1 + 3);

        let mut d = H264Depacketizer::new();
        let mut out = None;
        for (i, f) in fragments.iter().enumerate() {
            out = d.push(&packet(f.payload.clone(), i as u16, 3000, f.marker));
        }
        assert_eq!(out.unwrap(), frame);
    }
}
