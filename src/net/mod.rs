//! Provides the socket-level primitives for TCP messaging.

pub mod socket;
pub use socket::{Handle, RecvOutcome, open_client};
