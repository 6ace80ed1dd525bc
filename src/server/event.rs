//! Lifecycle notifications optionally delivered by a running server.

use std::io;
use std::net::SocketAddr;

/// Why a connection worker closed its connection.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer performed an orderly shutdown.
    PeerClosed,
    /// The handler returned [crate::server::Flow::Close].
    Handler,
    /// The receive failed with a transport error of this kind.
    Error(io::ErrorKind),
    /// The server shut the connection down while stopping.
    Aborted,
    /// The handler panicked; the worker thread unwound.
    Panicked,
}

/// Event emitted by the accept loop or a connection worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// The accept loop started polling on this address.
    Listening(SocketAddr),
    /// A connection was admitted and handed to a new worker.
    Connected(SocketAddr),
    /// A worker closed its connection and exited.
    Disconnected {
        /// Remote address of the closed connection.
        peer: SocketAddr,
        /// Why the connection was closed.
        reason: CloseReason,
    },
    /// A single `accept` failed; the loop keeps running.
    AcceptFailed(io::ErrorKind),
    /// The accept loop exited and closed its listening socket.
    Stopped,
}
