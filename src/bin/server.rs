//! Echo server.
//!
//! Listens on `0.0.0.0:12345` (or `[ip] [port]` from the command line, or the
//! `IPC_*` environment variables) and sends every received message back to
//! its sender. Stop it with `Ctrl+C`.

use std::process::ExitCode;

use ipc::net::Handle;
use ipc::server::{Flow, Server, ServerConfig};

#[cfg(unix)]
extern "C" fn on_signal(_sig: libc::c_int) {
    // Only an atomic increment; safe inside a signal handler.
    ipc::server_stop();
}

#[cfg(unix)]
fn install_signal_handlers() {
    for sig in [libc::SIGINT, libc::SIGTERM] {
        let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
        if unsafe { libc::signal(sig, handler) } == libc::SIG_ERR {
            tracing::warn!("failed to install handler for signal {sig}");
        }
    }
}

#[cfg(not(unix))]
fn install_signal_handlers() {}

fn config() -> ipc::Result<ServerConfig> {
    let mut config = ServerConfig::from_env()?;
    let mut args = std::env::args().skip(1);

    if let Some(ip) = args.next() {
        config.bind_ip = ip;
    }
    if let Some(port) = args.next() {
        config.port = port.parse().map_err(|_| ipc::Error::InvalidConfig {
            key: "port",
            value: port,
        })?;
    }

    Ok(config)
}

fn on_receive(conn: &Handle, data: &[u8]) -> Flow {
    println!("Received from client: {}", String::from_utf8_lossy(data));

    match conn.send_all(data) {
        Ok(()) => Flow::Continue,
        Err(err) => {
            tracing::error!("failed to echo message: {err}");
            Flow::Close
        }
    }
}

fn run() -> ipc::Result<()> {
    let config = config()?;

    ipc::init()?;
    install_signal_handlers();

    tracing::info!("starting server on {}", config.bind_addr());
    let res = Server::bind(config).and_then(|server| server.run(on_receive));

    ipc::cleanup();
    res
}

fn main() -> ExitCode {
    ipc::log::init();

    match run() {
        Ok(()) => {
            tracing::info!("server exited");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
