//! Listening socket and accept loop.

use std::io;
use std::net::{SocketAddr, SocketAddrV4, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use super::config::{ServerConfig, ShutdownPolicy, WorkerMode};
use super::event::{CloseReason, ServerEvent};
use super::handler::Handler;
use super::shutdown::ShutdownToken;
use super::worker::Worker;
use crate::net::Handle;
use crate::net::socket::{parse_ipv4, stream_socket};
use crate::{Error, Result, sys};

/// State shared between a server, its stop handles, and its workers.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub(crate) token: ShutdownToken,
    /// `true` while the accept loop is polling.
    pub(crate) running: AtomicBool,
    /// Number of connections whose worker has not exited yet.
    pub(crate) connections: AtomicUsize,
    /// Set while in-flight connections are being shut down by
    /// [ShutdownPolicy::Abort].
    pub(crate) aborting: AtomicBool,
}

/// Cloneable handle used to stop a [Server] from another thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    /// Asks the accept loop to exit.
    ///
    /// Returns immediately; the loop notices within one poll interval. Does
    /// not allocate or block, so it may be called from a signal handler.
    #[inline]
    pub fn stop(&self) {
        self.shared.token.stop();
    }

    /// Returns `true` once a stop was requested.
    pub fn is_stopped(&self) -> bool {
        self.shared.token.is_stopped()
    }

    /// Returns `true` while the accept loop is polling.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Returns the number of connections whose worker is still running.
    pub fn active_connections(&self) -> usize {
        self.shared.connections.load(Ordering::Acquire)
    }
}

/// A worker tracked by the accept loop.
struct Supervised {
    peer: SocketAddr,
    runner: JoinHandle<CloseReason>,
    /// Second handle to the worker's socket, kept only for
    /// [ShutdownPolicy::Abort]. `None` if the socket could not be cloned;
    /// such a worker is left running on stop.
    conn: Option<Handle>,
}

/// A bound, listening TCP server.
///
/// Created by [Server::bind]; [Server::run] then admits connections until
/// stopped, running every connection on its own thread.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: ServerConfig,
    shared: Arc<Shared>,
    events: Option<mpsc::Sender<ServerEvent>>,
}

impl Server {
    /// Creates the listening socket described by `config`.
    ///
    /// The socket allows immediate rebinding (`SO_REUSEADDR`), listens with
    /// `config.backlog`, and is switched to non-blocking mode. On failure the
    /// socket is closed before returning.
    pub fn bind(config: ServerConfig) -> Result<Self> {
        let addr = SocketAddr::V4(SocketAddrV4::new(parse_ipv4(&config.bind_ip)?, config.port));

        let socket = stream_socket()?;

        // Allow rebinding while old connections sit in TIME_WAIT.
        if let Err(err) = socket.set_reuse_address(true) {
            tracing::warn!("failed to set SO_REUSEADDR on {addr}: {err}");
        }

        socket
            .bind(&addr.into())
            .map_err(|source| Error::Bind { addr, source })?;

        socket
            .listen(config.backlog)
            .map_err(|source| Error::Listen { addr, source })?;

        socket
            .set_nonblocking(true)
            .map_err(|source| Error::Listen { addr, source })?;

        let listener = TcpListener::from(socket);

        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            config,
            shared: Arc::new(Shared::default()),
            events: None,
        })
    }

    /// Returns the address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the configuration the server was bound with.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns a handle that stops this server.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Subscribes to [ServerEvent]s. Without a subscription the server stays
    /// silent about worker termination.
    ///
    /// Only the most recent subscription receives events.
    pub fn events(&mut self) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel();
        self.events = Some(tx);
        rx
    }

    /// Runs the accept loop until a stop is requested, dispatching every
    /// received run of bytes to `handler`.
    ///
    /// Blocks the calling thread. When stopped, the listening socket is
    /// closed and in-flight connections are treated according to
    /// [ServerConfig::shutdown_policy].
    pub fn run<H: Handler>(self, handler: H) -> Result<()> {
        let handler: Arc<dyn Handler> = Arc::new(handler);
        let mut workers: Vec<Supervised> = Vec::new();

        self.shared.running.store(true, Ordering::Release);
        tracing::info!("server listening on {}", self.local_addr);
        self.emit(ServerEvent::Listening(self.local_addr));

        while !self.shared.token.is_stopped() {
            match sys::poll_readable(&self.listener, self.config.poll_interval) {
                Ok(true) => {
                    if let Some(worker) = self.accept(&handler) {
                        workers.push(worker);
                    }
                }
                // Timed out; re-check the stop flag.
                Ok(false) => {}
                Err(err) => {
                    tracing::error!("{err}");
                    // Avoid spinning on a persistent failure.
                    thread::sleep(self.config.poll_interval);
                }
            }

            workers.retain(|worker| !worker.runner.is_finished());
        }

        let Server {
            listener,
            local_addr,
            config,
            shared,
            events,
        } = self;

        drop(listener);
        shared.running.store(false, Ordering::Release);
        tracing::info!("server on {local_addr} stopped accepting");

        shutdown_workers(workers, config.shutdown_policy, &shared);

        tracing::info!("server stopped");
        if let Some(events) = events {
            let _ = events.send(ServerEvent::Stopped);
        }

        Ok(())
    }

    /// Accepts one pending connection and spawns its worker.
    ///
    /// Failures are logged and swallowed.
    fn accept(&self, handler: &Arc<dyn Handler>) -> Option<Supervised> {
        let (stream, peer) = match self.listener.accept() {
            Ok(accepted) => accepted,
            // Readiness was spurious or another thread won the race.
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return None,
            Err(err) => {
                tracing::warn!("failed to accept connection: {err}");
                self.emit(ServerEvent::AcceptFailed(err.kind()));
                return None;
            }
        };

        let conn = Handle::new(stream);

        // Accepted sockets inherit the listener's non-blocking flag on some
        // platforms but not on others; always set the configured mode.
        if let Err(err) = conn.set_nonblocking(self.config.worker_mode == WorkerMode::NonBlocking) {
            tracing::warn!("[{peer}] failed to configure connection: {err}");
            return None;
        }

        let abort_handle = if self.config.shutdown_policy == ShutdownPolicy::Abort {
            match conn.try_clone() {
                Ok(clone) => Some(clone),
                Err(err) => {
                    tracing::warn!("[{peer}] connection cannot be aborted on stop: {err}");
                    None
                }
            }
        } else {
            None
        };

        tracing::info!("[{peer}] client connected");

        let worker = Worker {
            conn,
            peer,
            handler: Arc::clone(handler),
            buf_size: self.config.recv_buffer_size,
            idle_wait: self.config.idle_wait,
            events: self.events.clone(),
            shared: Arc::clone(&self.shared),
        };

        self.shared.connections.fetch_add(1, Ordering::AcqRel);

        let spawned = thread::Builder::new()
            .name(format!("ipc-conn-{peer}"))
            .spawn(move || worker.run());

        match spawned {
            Ok(runner) => {
                self.emit(ServerEvent::Connected(peer));
                Some(Supervised {
                    peer,
                    runner,
                    conn: abort_handle,
                })
            }
            Err(err) => {
                // The closure, and with it the connection, was dropped.
                self.shared.connections.fetch_sub(1, Ordering::AcqRel);
                tracing::error!("[{peer}] failed to spawn connection worker: {err}");
                None
            }
        }
    }

    fn emit(&self, event: ServerEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

/// Applies the shutdown policy to workers still running when the accept loop
/// exits.
fn shutdown_workers(workers: Vec<Supervised>, policy: ShutdownPolicy, shared: &Shared) {
    if workers.is_empty() {
        return;
    }

    match policy {
        ShutdownPolicy::Detach => {
            tracing::debug!("leaving {} connections running", workers.len());
        }
        ShutdownPolicy::Drain => {
            tracing::info!("waiting for {} connections to close", workers.len());
            join_all(workers);
        }
        ShutdownPolicy::Abort => {
            tracing::info!("closing {} in-flight connections", workers.len());
            shared.aborting.store(true, Ordering::Release);

            // Joining a worker whose socket cannot be shut down would block
            // until its peer leaves.
            let (abortable, detached): (Vec<_>, Vec<_>) =
                workers.into_iter().partition(|worker| worker.conn.is_some());

            for worker in &detached {
                tracing::warn!("[{}] leaving connection running", worker.peer);
            }

            for worker in &abortable {
                if let Some(conn) = &worker.conn {
                    if let Err(err) = conn.shutdown() {
                        tracing::warn!("[{}] failed to shut down connection: {err}", worker.peer);
                    }
                }
            }

            join_all(abortable);
        }
    }
}

fn join_all(workers: Vec<Supervised>) {
    for worker in workers {
        let peer = worker.peer;
        match worker.runner.join() {
            Ok(reason) => tracing::debug!("[{peer}] worker exited: {reason:?}"),
            Err(_) => tracing::error!("[{peer}] worker panicked"),
        }
    }
}

/// Binds `ip:port` with default settings and runs the accept loop until
/// [crate::server_stop] is called.
pub fn server_start<H: Handler>(ip: &str, port: u16, handler: H) -> Result<()> {
    Server::bind(ServerConfig::new(ip, port))?.run(handler)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::time::{Duration, Instant};

    use crate::server::{Echo, Flow};

    fn config() -> ServerConfig {
        ServerConfig::new("127.0.0.1", 0).poll_interval(Duration::from_millis(50))
    }

    #[test]
    fn bind_rejects_invalid_address() {
        let err = Server::bind(ServerConfig::new("not-an-ip", 0)).unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(_)));
    }

    #[test]
    fn bind_fails_on_port_in_use() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let err = Server::bind(ServerConfig::new("127.0.0.1", port)).unwrap_err();
        assert!(matches!(err, Error::Bind { .. }));
    }

    #[test]
    fn run_echoes_and_stops() {
        let mut server = Server::bind(config()).unwrap();
        let addr = server.local_addr();
        let stop = server.stop_handle();
        let events = server.events();

        let runner = thread::spawn(move || server.run(Echo));

        assert_eq!(events.recv().unwrap(), ServerEvent::Listening(addr));
        assert!(stop.is_running());

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        assert!(matches!(events.recv().unwrap(), ServerEvent::Connected(_)));

        drop(client);
        assert!(matches!(
            events.recv().unwrap(),
            ServerEvent::Disconnected {
                reason: CloseReason::PeerClosed,
                ..
            }
        ));
        assert_eq!(stop.active_connections(), 0);

        stop.stop();
        runner.join().unwrap().unwrap();

        assert!(!stop.is_running());
        assert_eq!(events.recv().unwrap(), ServerEvent::Stopped);
    }

    #[test]
    fn stop_before_run_returns_promptly() {
        let server = Server::bind(config()).unwrap();
        server.stop_handle().stop();

        let start = Instant::now();
        server.run(Echo).unwrap();
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn listening_socket_is_closed_after_run() {
        let server = Server::bind(config()).unwrap();
        let addr = server.local_addr();
        let stop = server.stop_handle();

        let runner = thread::spawn(move || server.run(Echo));
        stop.stop();
        runner.join().unwrap().unwrap();

        // The port can be bound again right away.
        let again = Server::bind(ServerConfig::new("127.0.0.1", addr.port())).unwrap();
        assert_eq!(again.local_addr().port(), addr.port());
    }

    #[test]
    fn abort_policy_closes_in_flight_connections() {
        let mut server = Server::bind(config().shutdown_policy(ShutdownPolicy::Abort)).unwrap();
        let addr = server.local_addr();
        let stop = server.stop_handle();
        let events = server.events();

        let runner = thread::spawn(move || server.run(|_: &Handle, _: &[u8]| Flow::Continue));

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"hold").unwrap();

        while stop.active_connections() == 0 {
            thread::sleep(Duration::from_millis(5));
        }

        stop.stop();
        runner.join().unwrap().unwrap();

        assert_eq!(stop.active_connections(), 0);

        let mut buf = [0u8; 8];
        assert_eq!(client.read(&mut buf).unwrap_or(0), 0);

        let reasons: Vec<_> = events
            .try_iter()
            .filter_map(|event| match event {
                ServerEvent::Disconnected { reason, .. } => Some(reason),
                _ => None,
            })
            .collect();
        assert_eq!(reasons, vec![CloseReason::Aborted]);
    }

    #[test]
    fn abort_policy_does_not_wait_for_unabortable_workers() {
        let (release, hold) = mpsc::channel::<()>();
        let runner = thread::spawn(move || {
            let _ = hold.recv();
            CloseReason::PeerClosed
        });

        let worker = Supervised {
            peer: "127.0.0.1:1".parse().unwrap(),
            runner,
            conn: None,
        };

        let start = Instant::now();
        shutdown_workers(vec![worker], ShutdownPolicy::Abort, &Shared::default());
        assert!(start.elapsed() < Duration::from_millis(500));

        release.send(()).unwrap();
    }

    #[test]
    fn bound_listener_does_not_block_accept() {
        let server = Server::bind(config()).unwrap();

        let err = server.listener.accept().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn drain_policy_waits_for_connections() {
        let server = Server::bind(config().shutdown_policy(ShutdownPolicy::Drain)).unwrap();
        let addr = server.local_addr();
        let stop = server.stop_handle();

        let runner = thread::spawn(move || server.run(Echo));

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"a").unwrap();
        let mut buf = [0u8; 1];
        client.read_exact(&mut buf).unwrap();

        stop.stop();
        thread::sleep(Duration::from_millis(200));

        // Still draining: the connection is open and served.
        assert!(!runner.is_finished());
        client.write_all(b"b").unwrap();
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"b");

        drop(client);
        runner.join().unwrap().unwrap();
        assert_eq!(stop.active_connections(), 0);
    }
}
