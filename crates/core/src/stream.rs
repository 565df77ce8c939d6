//! Media stream core.
//!
//! A [`MediaStream`] is one media kind (audio or video) of a session. It
//! ties together:
//!
//! - the local and remote [`Track`]s supplied by the offer/answer layer,
//! - the destination endpoints and the [`RtpChannel`] packets go out on,
//! - the set-once [`SecurityContext`],
//! - the optional [`ReorderBuffer`] and the [`FrameReassembler`],
//! - the [`RtcpSession`] collaborator and the [`StreamObserver`].
//!
//! ## Send path
//!
//! ```text
//! send_frame -> sending format -> Packetizer -> RtpHeader (track counters)
//!            -> protect_rtp -> RtpChannel::send_to
//! ```
//!
//! One producer per track is expected. Sequence numbers advance per packet,
//! the timestamp advances once per frame after its last packet. All headers
//! of a frame are stamped under the track lock; packets reach the channel
//! only after it is released. A transport failure abandons the rest of the
//! frame (their sequence numbers stay spent) but leaves the stream usable.
//!
//! ## Receive path
//!
//! ```text
//! on_received_rtp -> unprotect_rtp -> RtpPacket::parse -> [ReorderBuffer]
//!                 -> FrameReassembler -> StreamObserver::on_frame_received
//! ```
//!
//! Once [`close`](MediaStream::close) has been called every send is a
//! silent no-op and received packets are ignored.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::error::{MediaError, Result, TrackSide};
use crate::format::{Format, MediaKind, Track};
use crate::media::dtmf::DtmfEvent;
use crate::media::mjpeg::{JpegPacketizer, JpegParams};
use crate::media::rtp::{RtpHeader, RtpPacket};
use crate::media::{Codec, Packetizer, packetizer_for};
use crate::negotiate;
use crate::reassembly::{FrameReassembler, ReceivedFrame};
use crate::reorder::ReorderBuffer;
use crate::security::{SecurityContext, SecuritySlot};
use crate::transport::RtpChannel;

/// Default largest media payload per RTP packet, in bytes.
pub const DEFAULT_MAX_FRAGMENT_SIZE: usize = 1200;

/// Per-stream configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Largest media payload per packet, excluding codec payload headers.
    pub max_fragment_size: usize,
    /// When set, a reorder buffer with this drop timeout is created with
    /// the stream.
    pub reorder_timeout: Option<Duration>,
    /// JPEG header parameters used by [`MediaStream::send_frame`].
    pub jpeg: JpegParams,
    /// How many times the final packet of a DTMF event is sent
    /// (RFC 4733 §2.5.1.4).
    pub dtmf_end_redundancy: u8,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_fragment_size: DEFAULT_MAX_FRAGMENT_SIZE,
            reorder_timeout: None,
            jpeg: JpegParams::default(),
            dtmf_end_redundancy: 3,
        }
    }
}

/// Upward notifications from a stream.
///
/// All methods default to no-ops so observers implement only what they
/// need. Calls are made on the thread that drove the stream (the
/// negotiation caller, the transport receive loop or the RTCP collaborator)
/// and never while stream locks are held.
pub trait StreamObserver: Send + Sync {
    /// Local and remote capabilities are both known; `formats` is their
    /// intersection in local priority order.
    fn on_formats_negotiated(&self, _kind: MediaKind, _formats: &[Format]) {}

    /// A complete frame was reassembled.
    fn on_frame_received(&self, _frame: ReceivedFrame) {}

    /// The RTCP session reported that the remote party went silent.
    fn on_timeout(&self, _kind: MediaKind) {}
}

/// RTCP session collaborator.
///
/// Report generation and statistics live outside this crate. The stream
/// drives its lifecycle, feeds it packet events, and forwards incoming
/// (unprotected) RTCP compound packets. The collaborator signals inactivity
/// by calling [`MediaStream::handle_rtcp_timeout`].
pub trait RtcpSession: Send {
    fn start(&mut self);

    fn close(&mut self, reason: Option<&str>);

    fn record_rtp_sent(&mut self, _header: &RtpHeader, _payload_len: usize) {}

    fn record_rtp_received(&mut self, _header: &RtpHeader, _payload_len: usize) {}

    fn report_received(&mut self, _report: &[u8]) {}
}

/// Remote RTP and RTCP addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Destination {
    pub rtp: SocketAddr,
    pub rtcp: SocketAddr,
}

struct ReceiveState {
    reorder: Option<ReorderBuffer>,
    reassembler: FrameReassembler,
    remote_ssrc: Option<u32>,
}

pub struct MediaStream {
    kind: MediaKind,
    config: StreamConfig,
    local_track: Mutex<Option<Track>>,
    remote_track: RwLock<Option<Track>>,
    destination: RwLock<Option<Destination>>,
    channel: RwLock<Option<Arc<dyn RtpChannel>>>,
    observer: RwLock<Option<Arc<dyn StreamObserver>>>,
    rtcp: Mutex<Option<Box<dyn RtcpSession>>>,
    security: SecuritySlot,
    receive: Mutex<ReceiveState>,
    started: AtomicBool,
    closed: AtomicBool,
}

impl MediaStream {
    pub fn new(kind: MediaKind, config: StreamConfig) -> Self {
        let reorder = config.reorder_timeout.map(ReorderBuffer::new);
        Self {
            kind,
            local_track: Mutex::new(None),
            remote_track: RwLock::new(None),
            destination: RwLock::new(None),
            channel: RwLock::new(None),
            observer: RwLock::new(None),
            rtcp: Mutex::new(None),
            security: SecuritySlot::new(kind),
            receive: Mutex::new(ReceiveState {
                reorder,
                reassembler: FrameReassembler::new(kind),
                remote_ssrc: None,
            }),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            config,
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    // --- wiring ---

    pub fn set_local_track(&self, track: Track) {
        *self.local_track.lock() = Some(track);
    }

    pub fn set_remote_track(&self, track: Track) {
        *self.remote_track.write() = Some(track);
    }

    /// Snapshot of the local track, including its send counters.
    pub fn local_track(&self) -> Option<Track> {
        self.local_track.lock().clone()
    }

    pub fn remote_track(&self) -> Option<Track> {
        self.remote_track.read().clone()
    }

    pub fn set_destination(&self, rtp: SocketAddr, rtcp: SocketAddr) {
        tracing::debug!(media = %self.kind, %rtp, %rtcp, "destination set");
        *self.destination.write() = Some(Destination { rtp, rtcp });
    }

    pub fn destination(&self) -> Option<Destination> {
        *self.destination.read()
    }

    pub fn set_channel(&self, channel: Arc<dyn RtpChannel>) {
        *self.channel.write() = Some(channel);
    }

    pub fn set_observer(&self, observer: Arc<dyn StreamObserver>) {
        *self.observer.write() = Some(observer);
    }

    pub fn set_rtcp_session(&self, session: Box<dyn RtcpSession>) {
        *self.rtcp.lock() = Some(session);
    }

    /// Install the SRTP hooks. A second call is logged and ignored;
    /// returns whether this call installed them.
    pub fn set_security_context(&self, context: SecurityContext) -> bool {
        self.security.set(context)
    }

    pub fn is_security_context_ready(&self) -> bool {
        self.security.is_ready()
    }

    /// Put a reorder buffer in front of the reassembler, replacing any
    /// existing one.
    pub fn enable_reorder_buffer(&self, drop_timeout: Duration) {
        self.receive.lock().reorder = Some(ReorderBuffer::new(drop_timeout));
    }

    /// Drop the reorder buffer and everything it holds. Later packets go
    /// straight to the reassembler.
    pub fn remove_reorder_buffer(&self) {
        if let Some(mut rb) = self.receive.lock().reorder.take() {
            rb.clear();
            tracing::debug!(media = %self.kind, "reorder buffer removed");
        }
    }

    pub fn has_reorder_buffer(&self) -> bool {
        self.receive.lock().reorder.is_some()
    }

    // --- negotiation ---

    /// Format media is sent with, chosen from the local and remote
    /// capability lists.
    pub fn sending_format(&self) -> Result<Format> {
        let local = self.local_track.lock().as_ref().map(|t| t.formats.clone());
        let remote = self.remote_track.read().as_ref().map(|t| t.formats.clone());
        let excluded = remote
            .as_deref()
            .and_then(|formats| formats.iter().find(|f| f.is_telephone_event()))
            .map(|f| f.payload_type);
        negotiate::get_sending_format(local.as_deref(), remote.as_deref(), self.kind, excluded)
    }

    /// Signal that the remote description has been applied.
    ///
    /// Fires [`StreamObserver::on_formats_negotiated`] with the common
    /// formats once the local capabilities are known. Nothing is fired for
    /// an empty intersection.
    pub fn remote_description_applied(&self) {
        let Some(local) = self.local_track.lock().as_ref().map(|t| t.formats.clone()) else {
            return;
        };
        let formats = match self.remote_track.read().as_ref() {
            Some(remote) => negotiate::compatible_formats(&local, &remote.formats),
            None => local,
        };
        if formats.is_empty() {
            tracing::warn!(media = %self.kind, "no common formats after remote description");
            return;
        }
        tracing::debug!(media = %self.kind, count = formats.len(), "formats negotiated");
        if let Some(observer) = self.observer() {
            observer.on_formats_negotiated(self.kind, &formats);
        }
    }

    // --- lifecycle ---

    /// Start the RTCP session. Idempotent.
    pub fn start(&self) {
        if self.is_closed() || self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(rtcp) = self.rtcp.lock().as_mut() {
            rtcp.start();
        }
        tracing::info!(media = %self.kind, "stream started");
    }

    /// Close the stream: stop RTCP, drop buffered packets, turn all further
    /// sends into no-ops. Idempotent.
    pub fn close(&self, reason: Option<&str>) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(rtcp) = self.rtcp.lock().as_mut() {
            rtcp.close(reason);
        }
        if let Some(rb) = self.receive.lock().reorder.as_mut() {
            rb.clear();
        }
        tracing::info!(media = %self.kind, reason = reason.unwrap_or(""), "stream closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Called by the RTCP collaborator when the remote party timed out.
    pub fn handle_rtcp_timeout(&self) {
        tracing::warn!(media = %self.kind, "RTCP timeout");
        if let Some(observer) = self.observer() {
            observer.on_timeout(self.kind);
        }
    }

    // --- send ---

    /// Packetize and send one encoded frame with the negotiated codec, then
    /// advance the track timestamp by `duration` (clock-rate units).
    pub fn send_frame(&self, duration: u32, frame: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        let format = self.sending_format()?;
        let packetizer = format
            .codec()
            .and_then(|codec| packetizer_for(codec, self.config.jpeg))
            .ok_or_else(|| MediaError::UnsupportedCodec(format.name.clone()))?;
        self.send_packetized(packetizer.as_ref(), &format, duration, frame)
    }

    /// Send a JPEG frame with explicit header parameters.
    pub fn send_jpeg_frame(&self, duration: u32, params: JpegParams, frame: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        let format = self.sending_format()?;
        if format.codec() != Some(Codec::Jpeg) {
            return Err(MediaError::UnsupportedCodec(format.name));
        }
        self.send_packetized(&JpegPacketizer::new(params), &format, duration, frame)
    }

    fn send_packetized(
        &self,
        packetizer: &dyn Packetizer,
        format: &Format,
        duration: u32,
        frame: &[u8],
    ) -> Result<()> {
        let fragments = packetizer.packetize(frame, self.config.max_fragment_size);

        let Some(packets) = self.reserve(|track| {
            let packets = fragments
                .into_iter()
                .map(|f| (track.next_header(format.payload_type, f.marker), f.payload))
                .collect();
            track.advance_timestamp(duration);
            packets
        })?
        else {
            return Ok(());
        };

        let sent = self.transmit_all(&packets);
        tracing::trace!(
            media = %self.kind,
            codec = %packetizer.codec(),
            fragments = packets.len(),
            sent,
            frame_bytes = frame.len(),
            "frame sent"
        );
        Ok(())
    }

    /// Send a caller-formed payload with an explicit timestamp, marker and
    /// payload type. Uses the track's SSRC and sequence counter; the frame
    /// timestamp accumulator is not touched.
    pub fn send_rtp_raw(&self, payload: &[u8], timestamp: u32, marker: bool, payload_type: u8) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        if let Some(packets) = self.reserve(|track| {
            vec![(track.next_header_at(payload_type, marker, timestamp), payload.to_vec())]
        })? {
            self.transmit_all(&packets);
        }
        Ok(())
    }

    /// Send a DTMF event (RFC 4733).
    ///
    /// The first packet carries the marker bit; the end packet is repeated
    /// [`dtmf_end_redundancy`](StreamConfig::dtmf_end_redundancy) times. All
    /// packets share the current timestamp, which then advances by the
    /// event duration.
    pub fn send_dtmf_event(&self, event: DtmfEvent) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        let payload_type = self
            .telephone_event_payload_type()
            .ok_or_else(|| MediaError::UnsupportedCodec(Codec::TelephoneEvent.name().to_string()))?;

        let start = DtmfEvent { end: false, ..event };
        let end = DtmfEvent { end: true, ..event };
        let reports = std::iter::once((start, true))
            .chain(std::iter::repeat_n((end, false), self.config.dtmf_end_redundancy.max(1) as usize));

        let Some(packets) = self.reserve(|track| {
            let timestamp = track.timestamp();
            let packets = reports
                .map(|(ev, marker)| (track.next_header_at(payload_type, marker, timestamp), ev.to_bytes().to_vec()))
                .collect();
            track.advance_timestamp(event.duration as u32);
            packets
        })?
        else {
            return Ok(());
        };

        self.transmit_all(&packets);
        tracing::debug!(media = %self.kind, event = event.event, duration = event.duration, "DTMF event sent");
        Ok(())
    }

    /// Stamp outgoing packets from the local track's counters.
    ///
    /// Runs `build` under the track lock and returns `None` when the track
    /// is not sending. The lock is released before anything reaches the
    /// channel, so a channel may call back into this stream.
    fn reserve<F>(&self, build: F) -> Result<Option<Vec<(RtpHeader, Vec<u8>)>>>
    where
        F: FnOnce(&mut Track) -> Vec<(RtpHeader, Vec<u8>)>,
    {
        let mut guard = self.local_track.lock();
        let track = guard.as_mut().ok_or(MediaError::MissingTrack {
            kind: self.kind,
            side: TrackSide::Local,
        })?;
        if !track.status.can_send() {
            tracing::trace!(media = %self.kind, status = ?track.status, "track not sending, packets skipped");
            return Ok(None);
        }
        Ok(Some(build(track)))
    }

    /// Send stamped packets in order. The first failure abandons the rest;
    /// returns how many went out.
    fn transmit_all(&self, packets: &[(RtpHeader, Vec<u8>)]) -> usize {
        let protect = self.security.get();
        for (i, (header, payload)) in packets.iter().enumerate() {
            if let Err(e) = self.transmit(header, payload, protect) {
                tracing::warn!(
                    media = %self.kind,
                    error = %e,
                    seq = header.sequence,
                    abandoned = packets.len() - i - 1,
                    "RTP send failed, rest of frame abandoned"
                );
                return i;
            }
        }
        packets.len()
    }

    fn telephone_event_payload_type(&self) -> Option<u8> {
        let find = |t: &Track| t.formats.iter().find(|f| f.is_telephone_event()).map(|f| f.payload_type);
        self.remote_track
            .read()
            .as_ref()
            .and_then(find)
            .or_else(|| self.local_track.lock().as_ref().and_then(find))
    }

    /// Assemble, protect and hand one packet to the channel.
    fn transmit(&self, header: &RtpHeader, payload: &[u8], protect: Option<&SecurityContext>) -> Result<()> {
        let (channel, destination) = self.outbound()?;

        let mut buf = Vec::with_capacity(header.wire_len() + payload.len());
        header.write(&mut buf);
        buf.extend_from_slice(payload);

        if let Some(ctx) = protect {
            ctx.protect_rtp(&mut buf)?;
        }

        if let Some(rtcp) = self.rtcp.lock().as_mut() {
            rtcp.record_rtp_sent(header, payload.len());
        }
        channel.send_to(&buf, destination.rtp)?;
        Ok(())
    }

    fn outbound(&self) -> Result<(Arc<dyn RtpChannel>, Destination)> {
        let channel = self.channel.read().clone();
        let destination = *self.destination.read();
        match (channel, destination) {
            (Some(c), Some(d)) => Ok((c, d)),
            _ => Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "no channel or destination",
            )
            .into()),
        }
    }

    /// Protect an RTCP compound packet and send it to the RTCP destination.
    pub fn send_rtcp(&self, report: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        let (channel, destination) = self.outbound()?;
        let mut buf = report.to_vec();
        if let Some(ctx) = self.security.get() {
            ctx.protect_rtcp(&mut buf)?;
        }
        channel.send_to(&buf, destination.rtcp)?;
        Ok(())
    }

    // --- receive ---

    /// SSRC of the first RTP packet received from the remote party.
    pub fn remote_ssrc(&self) -> Option<u32> {
        self.receive.lock().remote_ssrc
    }

    /// Entry point for raw RTP datagrams from the transport.
    ///
    /// Packets failing unprotect or parsing are logged and dropped. Complete
    /// frames are delivered to the observer before this returns.
    pub fn on_received_rtp(&self, remote: SocketAddr, buf: Vec<u8>) {
        if self.is_closed() {
            return;
        }
        let Ok(plain) = self.security.unprotect_rtp(buf) else {
            return;
        };
        let packet = match RtpPacket::parse(&plain) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(media = %self.kind, %remote, error = %e, "invalid RTP packet dropped");
                return;
            }
        };

        if let Some(status) = self.local_track.lock().as_ref().map(|t| t.status)
            && !status.can_receive()
        {
            tracing::trace!(media = %self.kind, ?status, "track not receiving, packet dropped");
            return;
        }

        if let Some(rtcp) = self.rtcp.lock().as_mut() {
            rtcp.record_rtp_received(&packet.header, packet.payload.len());
        }

        let frames = {
            let mut rx = self.receive.lock();
            if rx.remote_ssrc.is_none() {
                tracing::debug!(
                    media = %self.kind,
                    ssrc = format_args!("{:#010X}", packet.header.ssrc),
                    "remote SSRC learned"
                );
                rx.remote_ssrc = Some(packet.header.ssrc);
            }

            let ready = match rx.reorder.as_mut() {
                Some(rb) => {
                    rb.insert(packet);
                    rb.drain_ready()
                }
                None => vec![packet],
            };

            ready
                .iter()
                .filter_map(|p| self.reassemble(&mut rx.reassembler, remote, p))
                .collect::<Vec<_>>()
        };

        if frames.is_empty() {
            return;
        }
        if let Some(observer) = self.observer() {
            for frame in frames {
                observer.on_frame_received(frame);
            }
        }
    }

    fn reassemble(
        &self,
        reassembler: &mut FrameReassembler,
        remote: SocketAddr,
        packet: &RtpPacket,
    ) -> Option<ReceivedFrame> {
        let pt = packet.header.payload_type;
        let Some(format) = self.format_for_payload_type(pt) else {
            tracing::warn!(media = %self.kind, pt, "unknown payload type, packet dropped");
            return None;
        };
        if format.is_telephone_event() {
            if let Some(event) = DtmfEvent::parse(&packet.payload) {
                tracing::debug!(media = %self.kind, event = event.event, end = event.end, "DTMF event received");
            }
            return None;
        }
        reassembler.push(remote, packet, &format)
    }

    /// Incoming payload types follow the local description first, since
    /// the remote sends with the numbers we advertised.
    fn format_for_payload_type(&self, pt: u8) -> Option<Format> {
        if let Some(f) = self
            .local_track
            .lock()
            .as_ref()
            .and_then(|t| t.format_for_payload_type(pt).cloned())
        {
            return Some(f);
        }
        self.remote_track
            .read()
            .as_ref()
            .and_then(|t| t.format_for_payload_type(pt).cloned())
    }

    /// Entry point for raw RTCP datagrams from the transport.
    pub fn on_received_rtcp(&self, buf: Vec<u8>) {
        if self.is_closed() {
            return;
        }
        let Ok(plain) = self.security.unprotect_rtcp(buf) else {
            return;
        };
        if let Some(rtcp) = self.rtcp.lock().as_mut() {
            rtcp.report_received(&plain);
        }
    }

    fn observer(&self) -> Option<Arc<dyn StreamObserver>> {
        self.observer.read().clone()
    }
}
