//! Platform socket subsystem.
//!
//! Everything the crate needs from the OS beyond what [std::net] and
//! [socket2] already unify lives here: subsystem setup/teardown and a
//! single-socket readiness wait.

#[cfg(not(any(unix, windows)))]
compile_error!("This crate is only compatible with Unix-like systems and Windows.");

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub(crate) use unix::{cleanup, init, poll_readable};

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub(crate) use windows::{cleanup, init, poll_readable};

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;
    use std::net::{TcpListener, TcpStream};
    use std::time::{Duration, Instant};

    #[test]
    fn poll_times_out_without_pending_connection() {
        init().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();

        let start = Instant::now();
        let ready = poll_readable(&listener, Duration::from_millis(50)).unwrap();

        assert!(!ready);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn poll_reports_pending_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let _client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();

        assert!(poll_readable(&listener, Duration::from_millis(1000)).unwrap());
    }

    #[test]
    fn poll_reports_pending_bytes_on_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();

        assert!(!poll_readable(&server, Duration::from_millis(10)).unwrap());

        client.write_all(b"x").unwrap();
        assert!(poll_readable(&server, Duration::from_millis(1000)).unwrap());
    }
}
