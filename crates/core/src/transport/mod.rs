//! Packet transport seam.
//!
//! The stream core never owns sockets. It hands fully assembled (and, when
//! a security context is set, protected) packets to an [`RtpChannel`]
//! together with the destination address. ICE/DTLS or any other transport
//! plugs in by implementing the trait; [`UdpTransport`] is the plain UDP
//! implementation.

pub mod udp;

use std::io;
use std::net::SocketAddr;

pub use udp::UdpTransport;

/// Outbound datagram sink for RTP and RTCP packets.
pub trait RtpChannel: Send + Sync {
    /// Send one packet. Errors are transient from the stream's point of
    /// view: the current frame is abandoned, the stream stays usable.
    fn send_to(&self, packet: &[u8], destination: SocketAddr) -> io::Result<usize>;
}
