use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use rtpmedia::media::h264::START_CODE;
use rtpmedia::{
    Format, MediaKind, MediaStream, ReceivedFrame, SecurityContext, SecurityHook, StreamConfig,
    StreamObserver, StreamStatus, Track, UdpTransport,
};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CodecArg {
    H264,
    Vp8,
    Jpeg,
    Pcmu,
}

impl CodecArg {
    fn format(self) -> Format {
        match self {
            Self::H264 => Format::h264(96),
            Self::Vp8 => Format::vp8(97),
            Self::Jpeg => Format::jpeg(),
            Self::Pcmu => Format::pcmu(),
        }
    }

    fn kind(self) -> MediaKind {
        match self {
            Self::Pcmu => MediaKind::Audio,
            _ => MediaKind::Video,
        }
    }

    /// Frame duration in clock-rate units: 30 fps video, 20 ms audio.
    fn frame_duration(self) -> u32 {
        match self {
            Self::Pcmu => 160,
            _ => 3000,
        }
    }

    /// Synthetic encoded frame of roughly `size` bytes.
    fn frame(self, index: usize, size: usize) -> Vec<u8> {
        let body = (0..size).map(|i| ((i + index) % 251) as u8);
        match self {
            Self::H264 => {
                let nal_header = if index == 0 { 0x65 } else { 0x41 };
                START_CODE
                    .iter()
                    .copied()
                    .chain(std::iter::once(nal_header))
                    .chain(body)
                    .collect()
            }
            Self::Pcmu => body.take(160).collect(),
            _ => body.collect(),
        }
    }
}

#[derive(Parser)]
#[command(
    name = "rtp-loopback",
    about = "Send synthetic frames between two media streams over UDP loopback"
)]
struct Args {
    /// Codec to packetize with
    #[arg(long, value_enum, default_value = "h264")]
    codec: CodecArg,

    /// Number of frames to send
    #[arg(long, default_value_t = 30)]
    frames: usize,

    /// Bytes per synthetic frame
    #[arg(long, default_value_t = 4000)]
    frame_size: usize,

    /// Largest media payload per RTP packet
    #[arg(long, default_value_t = 1200)]
    max_fragment_size: usize,

    /// Put a reorder buffer with this drop timeout on the receiver
    #[arg(long)]
    reorder_timeout_ms: Option<u64>,

    /// XOR both directions with this key to exercise the security hooks
    #[arg(long)]
    xor_key: Option<u8>,
}

#[derive(Default)]
struct Counter {
    frames: AtomicUsize,
    bytes: AtomicUsize,
}

impl StreamObserver for Counter {
    fn on_formats_negotiated(&self, kind: MediaKind, formats: &[Format]) {
        let list: Vec<String> = formats.iter().map(ToString::to_string).collect();
        tracing::info!(%kind, formats = ?list, "formats negotiated");
    }

    fn on_frame_received(&self, frame: ReceivedFrame) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(frame.payload.len(), Ordering::Relaxed);
        tracing::debug!(ts = frame.timestamp, bytes = frame.payload.len(), from = %frame.endpoint, "frame received");
    }
}

fn xor_context(key: u8) -> SecurityContext {
    let hook: SecurityHook = Arc::new(move |buf: &mut Vec<u8>| {
        buf.iter_mut().for_each(|b| *b ^= key);
        0
    });
    SecurityContext::new(hook.clone(), hook.clone(), hook.clone(), hook)
}

fn run(args: Args) -> rtpmedia::Result<usize> {
    let format = args.codec.format();
    let kind = args.codec.kind();

    let rx_socket = UdpTransport::bind("127.0.0.1:0")?;
    let tx_socket = UdpTransport::bind("127.0.0.1:0")?;
    let rx_addr: SocketAddr = rx_socket.local_addr()?;
    rx_socket.set_read_timeout(Some(Duration::from_millis(100)))?;

    let config = StreamConfig {
        max_fragment_size: args.max_fragment_size,
        reorder_timeout: args.reorder_timeout_ms.map(Duration::from_millis),
        ..StreamConfig::default()
    };

    let receiver = Arc::new(MediaStream::new(kind, config.clone()));
    receiver.set_local_track(Track::new(kind, vec![format.clone()], StreamStatus::RecvOnly));
    receiver.set_remote_track(Track::new(kind, vec![format.clone()], StreamStatus::SendOnly));
    let counter = Arc::new(Counter::default());
    receiver.set_observer(counter.clone());
    receiver.remote_description_applied();

    let sender = MediaStream::new(kind, config);
    sender.set_local_track(Track::new(kind, vec![format.clone()], StreamStatus::SendOnly));
    sender.set_remote_track(Track::new(kind, vec![format], StreamStatus::RecvOnly));
    sender.set_destination(rx_addr, rx_addr);
    sender.set_channel(Arc::new(tx_socket));

    if let Some(key) = args.xor_key {
        sender.set_security_context(xor_context(key));
        receiver.set_security_context(xor_context(key));
    }

    let expected = args.frames;
    let rx_stream = receiver.clone();
    let rx_counter = counter.clone();
    let reader = thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut buf = vec![0u8; 65536];
        while rx_counter.frames.load(Ordering::Relaxed) < expected && Instant::now() < deadline {
            match rx_socket.recv_from(&mut buf) {
                Ok((n, from)) => rx_stream.on_received_rtp(from, buf[..n].to_vec()),
                Err(e) => tracing::trace!(error = %e, "receive timed out"),
            }
        }
    });

    tracing::info!(codec = ?args.codec, frames = args.frames, to = %rx_addr, "sending");
    for i in 0..args.frames {
        let frame = args.codec.frame(i, args.frame_size);
        sender.send_frame(args.codec.frame_duration(), &frame)?;
        thread::sleep(Duration::from_millis(2));
    }

    if reader.join().is_err() {
        tracing::error!("receiver thread panicked");
    }
    sender.close(Some("done"));
    receiver.close(Some("done"));

    let received = counter.frames.load(Ordering::Relaxed);
    tracing::info!(
        sent = args.frames,
        received,
        bytes = counter.bytes.load(Ordering::Relaxed),
        "loopback finished"
    );
    Ok(received)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let expected = args.frames;

    match run(args) {
        Ok(received) if received == expected => ExitCode::SUCCESS,
        Ok(received) => {
            eprintln!("received {received} of {expected} frames");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("loopback failed: {e}");
            ExitCode::FAILURE
        }
    }
}
