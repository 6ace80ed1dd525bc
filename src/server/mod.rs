//! Thread-per-connection TCP server.
//!
//! ```text
//! +----------+
//! | Listener |  <- Non-blocking accept loop, polled every `poll_interval`
//! +----------+
//!      |
//!      v
//! +--------+     +---------+
//! | Worker | --> | Handler |  <- One thread per connection
//! +--------+     +---------+
//! ```
//!
//! The accept loop stops cooperatively: [StopHandle::stop] (or
//! [shutdown::stop_all]) flips a flag that the loop checks after every
//! readiness wait, so a stop takes effect within one poll interval.
//!
//! Under the default [ShutdownPolicy::Detach], workers outlive the accept loop
//! and cannot be cancelled; they run until their peer disconnects or a
//! transport error occurs.

pub mod config;
pub mod event;
pub mod handler;
pub mod listener;
pub mod shutdown;
mod worker;

pub use config::{ServerConfig, ShutdownPolicy, WorkerMode};
pub use event::{CloseReason, ServerEvent};
pub use handler::{Echo, Flow, Handler};
pub use listener::{Server, StopHandle, server_start};
pub use shutdown::{ShutdownToken, stop_all};
