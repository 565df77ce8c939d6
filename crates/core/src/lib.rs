pub mod error;
pub mod format;
pub mod media;
pub mod negotiate;
pub mod reassembly;
pub mod reorder;
pub mod security;
pub mod stream;
pub mod transport;

pub use error::{MediaError, Result};
pub use format::{Format, MediaKind, StreamStatus, Track};
pub use media::{Codec, Depacketizer, Packetizer};
pub use reassembly::ReceivedFrame;
pub use security::{SecurityContext, SecurityHook};
pub use stream::{MediaStream, RtcpSession, StreamConfig, StreamObserver};
pub use transport::{RtpChannel, UdpTransport};
