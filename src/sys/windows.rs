use std::io;
use std::os::windows::io::AsRawSocket;
use std::time::Duration;

use windows_sys::Win32::Networking::WinSock::{
    POLLNVAL, POLLRDNORM, SOCKET, SOCKET_ERROR, WSACleanup, WSADATA, WSAPOLLFD, WSAPoll,
    WSAStartup,
};

use crate::error::errno;

/// Winsock 2.2.
const WINSOCK_VERSION: u16 = 0x0202;

/// Starts Winsock 2.2 for this process.
pub(crate) fn init() -> io::Result<()> {
    let mut data: WSADATA = unsafe { std::mem::zeroed() };

    let ret = unsafe { WSAStartup(WINSOCK_VERSION, &raw mut data) };
    if ret != 0 {
        // `WSAStartup` returns the error code directly instead of setting
        // `WSAGetLastError`.
        return Err(io::Error::from_raw_os_error(ret));
    }

    Ok(())
}

pub(crate) fn cleanup() {
    unsafe {
        WSACleanup();
    }
}

/// Waits up to `timeout` for the socket to become readable.
///
/// Returns `Ok(false)` on timeout. A socket that is not open is an error.
pub(crate) fn poll_readable<S: AsRawSocket>(sock: &S, timeout: Duration) -> io::Result<bool> {
    let mut pfd = WSAPOLLFD {
        fd: sock.as_raw_socket() as SOCKET,
        events: POLLRDNORM,
        revents: 0,
    };

    let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;

    let ready = unsafe { WSAPoll(&raw mut pfd, 1, timeout_ms) };
    if ready == SOCKET_ERROR {
        return Err(errno!("failed to poll socket {}", pfd.fd));
    }

    if pfd.revents & POLLNVAL != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("socket {} is not open", pfd.fd),
        ));
    }

    Ok(ready > 0 && pfd.revents != 0)
}
