//! Socket primitives shared by the server and the client connector.
//!
//! [Handle::receive] folds the platform-specific receive results (`EAGAIN`,
//! `EWOULDBLOCK`, `WSAEWOULDBLOCK`, zero-length reads, hard errors) into a
//! single [RecvOutcome].

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, SocketAddrV4, TcpStream};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::{Error, Result};

/// Result of a single [Handle::receive] call.
#[derive(Debug)]
pub enum RecvOutcome {
    /// `n > 0` bytes were written to the front of the buffer.
    Data(usize),
    /// The peer performed an orderly shutdown.
    PeerClosed,
    /// A non-blocking socket has no pending bytes yet. Not an error.
    WouldBlock,
    /// Any other transport failure.
    Error(io::Error),
}

impl RecvOutcome {
    /// Returns the number of bytes received, if any.
    pub fn bytes(&self) -> Option<usize> {
        match *self {
            RecvOutcome::Data(n) => Some(n),
            _ => None,
        }
    }

    /// Returns `true` if the connection can no longer deliver data.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecvOutcome::PeerClosed | RecvOutcome::Error(_))
    }

    fn from_read(res: io::Result<usize>) -> Self {
        match res {
            Ok(0) => RecvOutcome::PeerClosed,
            Ok(n) => RecvOutcome::Data(n),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => RecvOutcome::WouldBlock,
            Err(err) => RecvOutcome::Error(err),
        }
    }
}

/// An open TCP endpoint.
///
/// The handle owns its socket: [Handle::close] (or dropping the handle)
/// releases it exactly once.
#[derive(Debug)]
pub struct Handle {
    stream: TcpStream,
}

impl Handle {
    pub(crate) fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Writes from `data` with a single send call.
    ///
    /// Returns the number of bytes accepted by the transport, which may be
    /// less than `data.len()`; short writes are not retried.
    pub fn send(&self, data: &[u8]) -> Result<usize> {
        Ok((&self.stream).write(data)?)
    }

    /// Writes the whole of `data`, retrying short writes.
    pub fn send_all(&self, data: &[u8]) -> Result<()> {
        Ok((&self.stream).write_all(data)?)
    }

    /// Reads at most `buf.len()` bytes from the socket.
    ///
    /// On a blocking handle this waits until data arrives, the peer closes,
    /// or an error occurs; [RecvOutcome::WouldBlock] is only produced by
    /// non-blocking handles. Interrupted reads are retried.
    pub fn receive(&self, buf: &mut [u8]) -> RecvOutcome {
        // A zero-length read would be indistinguishable from peer shutdown.
        if buf.is_empty() {
            return RecvOutcome::Error(io::Error::new(
                io::ErrorKind::InvalidInput,
                "receive buffer is empty",
            ));
        }

        loop {
            match (&self.stream).read(buf) {
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                res => return RecvOutcome::from_read(res),
            }
        }
    }

    /// Switches the handle between blocking and non-blocking mode.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        Ok(self.stream.set_nonblocking(nonblocking)?)
    }

    /// Returns the socket address of the remote peer.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Returns the socket address of the local half of the connection.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.local_addr()?)
    }

    /// Shuts down both halves of the connection without releasing the handle.
    ///
    /// A receive blocked on another handle to the same socket returns
    /// [RecvOutcome::PeerClosed] afterwards.
    pub fn shutdown(&self) -> Result<()> {
        match self.stream.shutdown(Shutdown::Both) {
            // Already disconnected by the peer.
            Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
            res => Ok(res?),
        }
    }

    /// Creates a second handle to the same socket.
    pub(crate) fn try_clone(&self) -> Result<Handle> {
        Ok(Handle::new(self.stream.try_clone()?))
    }

    /// Releases the handle.
    pub fn close(self) {
        drop(self);
    }
}

/// Parses a dotted IPv4 address.
pub(crate) fn parse_ipv4(ip: &str) -> Result<Ipv4Addr> {
    ip.trim()
        .parse()
        .map_err(|_| Error::InvalidAddress(ip.to_string()))
}

/// Creates an IPv4 stream socket.
pub(crate) fn stream_socket() -> Result<Socket> {
    Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).map_err(Error::SocketCreate)
}

/// Opens a blocking TCP connection to `ip:port`.
///
/// The socket is released before returning on every failure path.
pub fn open_client(ip: &str, port: u16) -> Result<Handle> {
    let addr = SocketAddr::V4(SocketAddrV4::new(parse_ipv4(ip)?, port));

    let socket = stream_socket()?;
    socket
        .connect(&SockAddr::from(addr))
        .map_err(|source| Error::Connect { addr, source })?;

    tracing::info!(%addr, "connected");

    Ok(Handle::new(socket.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    use proptest::prelude::*;

    fn pair() -> (Handle, Handle) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let client = open_client("127.0.0.1", port).unwrap();
        let (server, _) = listener.accept().unwrap();

        (client, Handle::new(server))
    }

    proptest! {
        #[test]
        fn parse_ipv4_accepts_dotted_quads(a in any::<u8>(), b in any::<u8>(), c in any::<u8>(), d in any::<u8>()) {
            let ip = format!("{a}.{b}.{c}.{d}");
            prop_assert_eq!(parse_ipv4(&ip).unwrap(), Ipv4Addr::new(a, b, c, d));
        }
    }

    #[test]
    fn parse_ipv4_rejects_hostnames_and_ipv6() {
        assert!(matches!(parse_ipv4("localhost"), Err(Error::InvalidAddress(_))));
        assert!(matches!(parse_ipv4("::1"), Err(Error::InvalidAddress(_))));
        assert!(matches!(parse_ipv4("256.0.0.1"), Err(Error::InvalidAddress(_))));
    }

    #[test]
    fn send_then_receive_returns_bytes() {
        let (client, server) = pair();
        let mut buf = [0u8; 64];

        assert_eq!(client.send(b"ping").unwrap(), 4);

        match server.receive(&mut buf) {
            RecvOutcome::Data(n) => assert_eq!(&buf[..n], b"ping"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn nonblocking_receive_without_data_would_block() {
        let (_client, server) = pair();
        let mut buf = [0u8; 64];

        server.set_nonblocking(true).unwrap();

        let outcome = server.receive(&mut buf);
        assert!(matches!(outcome, RecvOutcome::WouldBlock));
        assert!(!outcome.is_terminal());
        assert_eq!(outcome.bytes(), None);
    }

    #[test]
    fn receive_after_peer_close_reports_peer_closed() {
        let (client, server) = pair();
        let mut buf = [0u8; 64];

        client.close();

        let outcome = server.receive(&mut buf);
        assert!(matches!(outcome, RecvOutcome::PeerClosed));
        assert!(outcome.is_terminal());
    }

    #[test]
    fn nonblocking_receive_distinguishes_data_and_close() {
        let (client, server) = pair();
        let mut buf = [0u8; 64];

        server.set_nonblocking(true).unwrap();
        client.send_all(b"abc").unwrap();

        let mut got = Vec::new();
        while got.len() < 3 {
            match server.receive(&mut buf) {
                RecvOutcome::Data(n) => got.extend_from_slice(&buf[..n]),
                RecvOutcome::WouldBlock => thread::sleep(Duration::from_millis(5)),
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!(got, b"abc");

        client.close();
        loop {
            match server.receive(&mut buf) {
                RecvOutcome::WouldBlock => thread::sleep(Duration::from_millis(5)),
                RecvOutcome::PeerClosed => break,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
    }

    #[test]
    fn receive_into_empty_buffer_is_an_error() {
        let (_client, server) = pair();

        assert!(matches!(server.receive(&mut []), RecvOutcome::Error(_)));
    }

    #[test]
    fn shutdown_unblocks_receive_on_clone() {
        let (_client, server) = pair();
        let clone = server.try_clone().unwrap();

        let reader = thread::spawn(move || {
            let mut buf = [0u8; 16];
            server.receive(&mut buf).is_terminal()
        });

        thread::sleep(Duration::from_millis(50));
        clone.shutdown().unwrap();

        assert!(reader.join().unwrap());
    }

    #[test]
    fn connect_to_closed_port_fails() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = open_client("127.0.0.1", port).unwrap_err();
        assert!(matches!(err, Error::Connect { .. }));
    }
}
