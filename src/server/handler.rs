//! Per-message callbacks invoked by connection workers.

use crate::net::Handle;

/// Tells the connection worker what to do after a handler returns.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Keep receiving on this connection.
    Continue,
    /// Close this connection.
    Close,
}

/// Callback invoked with every run of bytes received on a connection.
///
/// One registration is shared by all workers of a server run, so
/// implementations are called concurrently from different connections.
/// Calls for the same connection are serialized in receive order.
///
/// `data` is whatever one receive returned: a message sent by the peer may
/// be split across calls, and several messages may arrive in one call.
pub trait Handler: Send + Sync + 'static {
    /// Handles bytes received on `conn`. The handler may reply through
    /// `conn`.
    fn on_message(&self, conn: &Handle, data: &[u8]) -> Flow;
}

impl<F> Handler for F
where
    F: Fn(&Handle, &[u8]) -> Flow + Send + Sync + 'static,
{
    #[inline]
    fn on_message(&self, conn: &Handle, data: &[u8]) -> Flow {
        self(conn, data)
    }
}

/// Sends every received byte back to the same connection.
#[derive(Debug, Default, Copy, Clone)]
pub struct Echo;

impl Handler for Echo {
    fn on_message(&self, conn: &Handle, data: &[u8]) -> Flow {
        match conn.send_all(data) {
            Ok(()) => Flow::Continue,
            Err(err) => {
                tracing::warn!("failed to echo {} bytes: {err}", data.len());
                Flow::Close
            }
        }
    }
}
