//! Interactive client for the echo server.
//!
//! Connects to `127.0.0.1:12345` (or `[ip] [port]` from the command line),
//! sends every line read from `stdin`, and prints the reply. Typing `quit`
//! ends the session.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use ipc::{Client, RecvOutcome};

const DEFAULT_IP: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 12345;

/// Size of the reply buffer.
const BUF_SIZE: usize = 1024;

fn run() -> ipc::Result<()> {
    let mut args = std::env::args().skip(1);
    let ip = args.next().unwrap_or_else(|| DEFAULT_IP.to_string());
    let port = match args.next() {
        Some(port) => port.parse().map_err(|_| ipc::Error::InvalidConfig {
            key: "port",
            value: port,
        })?,
        None => DEFAULT_PORT,
    };

    let client = Client::connect(&ip, port)?;

    let stdin = io::stdin();
    let mut line = String::new();
    let mut buf = [0u8; BUF_SIZE];

    loop {
        print!("Input message (or 'quit'): ");
        io::stdout().flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let msg = line.trim_end_matches(['\r', '\n']);
        if msg == "quit" {
            break;
        }

        client.send_all(msg.as_bytes())?;

        match client.receive(&mut buf) {
            RecvOutcome::Data(n) => {
                println!("Received echo: {}", String::from_utf8_lossy(&buf[..n]));
            }
            RecvOutcome::PeerClosed => {
                tracing::info!("server closed the connection");
                break;
            }
            RecvOutcome::Error(err) => return Err(err.into()),
            // The client socket is blocking.
            RecvOutcome::WouldBlock => {}
        }
    }

    client.close();
    Ok(())
}

fn main() -> ExitCode {
    ipc::log::init();

    if let Err(err) = ipc::init() {
        tracing::error!("{err}");
        return ExitCode::FAILURE;
    }

    let res = run();
    ipc::cleanup();

    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
