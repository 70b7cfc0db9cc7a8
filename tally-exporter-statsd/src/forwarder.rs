use std::io;
use std::net::{Ipv4Addr, ToSocketAddrs, UdpSocket};

/// Where emitted payloads go.
///
/// One emission task owns the backend for its whole life and calls it
/// sequentially, so implementations do not need to be safe for concurrent
/// use -- `send` takes `&mut self`.
pub trait Backend: Send {
    /// Sends one payload (one metric line).
    fn send(&mut self, payload: &str) -> io::Result<()>;
}

/// The default backend: a connected UDP socket, one datagram per payload.
pub struct UdpBackend {
    socket: UdpSocket,
}

impl UdpBackend {
    /// Binds an ephemeral local socket and connects it to `remote_addrs`.
    pub fn connect<A: ToSocketAddrs>(remote_addrs: A) -> io::Result<UdpBackend> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect(remote_addrs)?;
        Ok(UdpBackend { socket })
    }
}

impl Backend for UdpBackend {
    fn send(&mut self, payload: &str) -> io::Result<()> {
        self.socket.send(payload.as_bytes()).map(|_| ())
    }
}
