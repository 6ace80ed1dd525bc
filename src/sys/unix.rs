use std::io;
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use crate::error::errno;

/// POSIX sockets need no subsystem setup.
#[inline]
pub(crate) fn init() -> io::Result<()> {
    Ok(())
}

#[inline]
pub(crate) fn cleanup() {}

/// Waits up to `timeout` for the socket to become readable.
///
/// Returns `Ok(false)` on timeout. An interrupted wait (`EINTR`) counts as a
/// timeout so the caller gets a chance to re-check its run state. A
/// descriptor that is not open is an error.
pub(crate) fn poll_readable<S: AsRawFd>(sock: &S, timeout: Duration) -> io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd: sock.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };

    let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

    let ready = unsafe { libc::poll(&raw mut pfd, 1, timeout_ms) };
    if ready == -1 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(errno!("failed to poll socket {}", pfd.fd));
    }

    if pfd.revents & libc::POLLNVAL != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("socket {} is not open", pfd.fd),
        ));
    }

    // Errors and hangups are reported as readable so the following
    // `accept`/`recv` surfaces them.
    Ok(ready > 0 && pfd.revents & (libc::POLLIN | libc::POLLERR | libc::POLLHUP) != 0)
}
