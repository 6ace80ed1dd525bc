//! Blocking client connector.

use std::net::SocketAddr;

use crate::Result;
use crate::net::{self, Handle, RecvOutcome};

/// A blocking connection to a server.
///
/// The underlying socket stays in blocking mode, so [Client::receive] waits
/// until data arrives, the server closes the connection, or an error occurs.
/// It never returns [RecvOutcome::WouldBlock].
#[derive(Debug)]
pub struct Client {
    handle: Handle,
}

impl Client {
    /// Connects to `ip:port`, blocking until the connection is established.
    pub fn connect(ip: &str, port: u16) -> Result<Self> {
        Ok(Self {
            handle: net::open_client(ip, port)?,
        })
    }

    /// Writes from `data` with a single send; see [Handle::send].
    pub fn send(&self, data: &[u8]) -> Result<usize> {
        self.handle.send(data)
    }

    /// Writes the whole of `data`.
    pub fn send_all(&self, data: &[u8]) -> Result<()> {
        self.handle.send_all(data)
    }

    /// Receives at most `buf.len()` bytes.
    pub fn receive(&self, buf: &mut [u8]) -> RecvOutcome {
        self.handle.receive(buf)
    }

    /// Returns the server's address.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.handle.peer_addr()
    }

    /// Returns the local address of the connection.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.handle.local_addr()
    }

    /// Returns the underlying handle.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Converts the client into its underlying handle.
    pub fn into_handle(self) -> Handle {
        self.handle
    }

    /// Closes the connection.
    pub fn close(self) {
        self.handle.close();
    }
}

/// Connects to `ip:port` and returns the raw handle.
pub fn client_connect(ip: &str, port: u16) -> Result<Handle> {
    net::open_client(ip, port)
}
