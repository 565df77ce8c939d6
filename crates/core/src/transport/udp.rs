use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use super::RtpChannel;
use crate::error::Result;

/// UDP transport for RTP/RTCP packets.
///
/// Address-only: the transport knows nothing about
/// streams or tracks. The caller resolves destinations before calling
/// [`send_to`](RtpChannel::send_to). Clones share the socket, so one clone
/// can sit in a receive loop while the stream sends through another.
#[derive(Debug, Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind a UDP socket on the given address (`"0.0.0.0:0"` for ephemeral).
    pub fn bind(addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        tracing::debug!(local = %socket.local_addr()?, "UDP transport bound");
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Bound the time [`recv_from`](Self::recv_from) blocks.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Ok(self.socket.set_read_timeout(timeout)?)
    }

    /// Receive one datagram into `buf`.
    pub fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        Ok(self.socket.recv_from(buf)?)
    }
}

impl RtpChannel for UdpTransport {
    fn send_to(&self, packet: &[u8], destination: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(packet, destination)
    }
}
