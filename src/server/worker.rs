//! Thread-per-connection receive loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use super::event::{CloseReason, ServerEvent};
use super::handler::{Flow, Handler};
use super::listener::Shared;
use crate::net::{Handle, RecvOutcome};

/// Owns one accepted connection until it closes.
pub(crate) struct Worker {
    pub(crate) conn: Handle,
    pub(crate) peer: SocketAddr,
    pub(crate) handler: Arc<dyn Handler>,
    pub(crate) buf_size: usize,
    pub(crate) idle_wait: Duration,
    pub(crate) events: Option<mpsc::Sender<ServerEvent>>,
    pub(crate) shared: Arc<Shared>,
}

/// Releases the connection from the server's live count and reports the
/// disconnect on every exit path, including a panicking handler.
struct Departure {
    shared: Arc<Shared>,
    peer: SocketAddr,
    events: Option<mpsc::Sender<ServerEvent>>,
    reason: CloseReason,
}

impl Drop for Departure {
    fn drop(&mut self) {
        self.shared.connections.fetch_sub(1, Ordering::AcqRel);

        if let Some(events) = &self.events {
            let _ = events.send(ServerEvent::Disconnected {
                peer: self.peer,
                reason: self.reason,
            });
        }
    }
}

impl Worker {
    /// Runs the receive loop, closes the connection, and reports why.
    ///
    /// The caller must already have counted this connection in
    /// `Shared::connections`.
    pub(crate) fn run(self) -> CloseReason {
        let Worker {
            conn,
            peer,
            handler,
            buf_size,
            idle_wait,
            events,
            shared,
        } = self;

        let mut departure = Departure {
            shared: Arc::clone(&shared),
            peer,
            events,
            reason: CloseReason::Panicked,
        };
        let mut buf = vec![0u8; buf_size.max(1)];

        let mut reason = loop {
            match conn.receive(&mut buf) {
                RecvOutcome::Data(nbytes) => {
                    tracing::debug!("[{peer}] received {nbytes} bytes");

                    if handler.on_message(&conn, &buf[..nbytes]) == Flow::Close {
                        tracing::debug!("[{peer}] handler closed connection");
                        break CloseReason::Handler;
                    }
                }
                RecvOutcome::PeerClosed => {
                    tracing::debug!("[{peer}] peer closed connection");
                    break CloseReason::PeerClosed;
                }
                // The socket is non-blocking, either by configuration or
                // because the handler switched it.
                RecvOutcome::WouldBlock => thread::sleep(idle_wait),
                RecvOutcome::Error(err) => {
                    if !shared.aborting.load(Ordering::Acquire) {
                        tracing::error!("[{peer}] failed to receive: {err}");
                    }
                    break CloseReason::Error(err.kind());
                }
            }
        };

        if reason != CloseReason::Handler && shared.aborting.load(Ordering::Acquire) {
            reason = CloseReason::Aborted;
        }

        conn.close();
        departure.reason = reason;
        drop(departure);

        reason
    }
}
