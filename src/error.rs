//! Error types for socket setup and configuration.

use std::net::SocketAddr;
use std::{io, result};

use thiserror::Error;

/// Creates an [io::Error] with a custom message prefixed to the current
/// `errno` (or `WSAGetLastError`) value.
macro_rules! errno {
    ($($arg:tt)+) => {{
        let errno = ::std::io::Error::last_os_error();
        let prefix = format!($($arg)+);
        let msg = format!("{prefix}: {errno}");
        ::std::io::Error::new(errno.kind(), msg)
    }};
}
pub(crate) use errno;

/// A convenience wrapper around `Result` for [crate::Error].
pub type Result<T> = result::Result<T, Error>;

/// Represents setup-phase failures of the socket subsystem, the server, or
/// the client connector.
///
/// Receive-side conditions (no data yet, peer closed, transport errors) are
/// not errors; see [crate::net::RecvOutcome].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The platform socket subsystem could not be initialized.
    #[error("failed to initialize socket subsystem: {0}")]
    SubsystemInit(#[source] io::Error),
    /// A stream socket could not be created or configured.
    #[error("failed to create socket: {0}")]
    SocketCreate(#[source] io::Error),
    /// The address string is not a dotted IPv4 address.
    #[error("invalid IPv4 address: {0:?}")]
    InvalidAddress(String),
    /// The listening socket could not be bound to the address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address the bind was attempted on.
        addr: SocketAddr,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },
    /// The bound socket could not be switched to listening mode.
    #[error("failed to listen on {addr}: {source}")]
    Listen {
        /// The bound address.
        addr: SocketAddr,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },
    /// A client connection could not be established.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// The peer address.
        addr: SocketAddr,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },
    /// A configuration value could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidConfig {
        /// The configuration key (environment variable name).
        key: &'static str,
        /// The rejected value.
        value: String,
    },
    /// An I/O error occurred on an established socket.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns the numeric status used by the C-style API surface.
    ///
    /// Every failure maps to `-1`.
    pub fn code(&self) -> i32 {
        -1
    }

    /// Returns the underlying OS error, if any.
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            Error::SubsystemInit(e) | Error::SocketCreate(e) | Error::Io(e) => Some(e),
            Error::Bind { source, .. }
            | Error::Listen { source, .. }
            | Error::Connect { source, .. } => Some(source),
            Error::InvalidAddress(_) | Error::InvalidConfig { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::error::Error as _;
    use std::net::{Ipv4Addr, SocketAddrV4};

    fn addr() -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 12345))
    }

    #[test]
    fn bind_error_display_includes_address() {
        let err = Error::Bind {
            addr: addr(),
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };

        let msg = err.to_string();
        assert!(msg.starts_with("failed to bind 127.0.0.1:12345"));
        assert!(err.source().is_some());
        assert_eq!(err.code(), -1);
    }

    #[test]
    fn invalid_address_has_no_io_error() {
        let err = Error::InvalidAddress("localhost".into());

        assert!(err.io_error().is_none());
        assert_eq!(err.to_string(), "invalid IPv4 address: \"localhost\"");
    }

    #[test]
    fn io_error_converts() {
        let err: Error = io::Error::from(io::ErrorKind::BrokenPipe).into();

        assert!(matches!(err, Error::Io(_)));
        assert_eq!(
            err.io_error().map(io::Error::kind),
            Some(io::ErrorKind::BrokenPipe)
        );
    }
}
