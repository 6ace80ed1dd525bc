//! Minimal cross-platform TCP messaging.
//!
//! A process either runs a [Server] that accepts many concurrent clients,
//! handing every run of received bytes to a user-supplied [Handler] on a
//! per-connection thread, or acts as a [Client] that exchanges raw bytes with
//! such a server.
//!
//! Bytes are transported as-is: there is no framing, so one message sent by
//! a peer may be delivered in several pieces, and several messages may be
//! delivered together.
//!
//! ```no_run
//! use ipc::server::{Flow, Server, ServerConfig};
//! use ipc::net::Handle;
//!
//! fn main() -> ipc::Result<()> {
//!     ipc::init()?;
//!
//!     let server = Server::bind(ServerConfig::new("127.0.0.1", 12345))?;
//!     let stop = server.stop_handle();
//!
//!     std::thread::spawn(move || {
//!         std::thread::sleep(std::time::Duration::from_secs(10));
//!         stop.stop();
//!     });
//!
//!     server.run(|conn: &Handle, data: &[u8]| match conn.send_all(data) {
//!         Ok(()) => Flow::Continue,
//!         Err(_) => Flow::Close,
//!     })?;
//!
//!     ipc::cleanup();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

pub mod client;
pub mod error;
pub mod log;
pub mod net;
pub mod server;
mod sys;

pub use client::{Client, client_connect};
pub use error::{Error, Result};
pub use net::{Handle, RecvOutcome};
pub use server::{Handler, Server, ServerConfig, StopHandle, server_start};

/// Initializes the platform socket subsystem.
///
/// Must be called once before any other operation. Does nothing on platforms
/// without such a requirement.
pub fn init() -> Result<()> {
    sys::init().map_err(|err| {
        tracing::error!("failed to initialize socket subsystem: {err}");
        Error::SubsystemInit(err)
    })
}

/// Reverses [init]. Call once at shutdown.
pub fn cleanup() {
    sys::cleanup();
}

/// Stops every running server.
///
/// Only flips a flag, so it may be called from any thread, including a
/// signal handler. Returns without waiting for the accept loops to exit.
pub fn server_stop() {
    server::stop_all();
}
