//! Configuration for the server accept loop and its connection workers.

use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

/// Pending-connection queue length passed to `listen`.
pub const DEFAULT_BACKLOG: i32 = 5;

/// Upper bound on how long a stop request can go unnoticed by the accept
/// loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Size of each connection worker's receive buffer.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 1024;

/// Pause between receive attempts of a non-blocking worker with no data.
pub const DEFAULT_IDLE_WAIT: Duration = Duration::from_millis(10);

/// Default bind address (all interfaces).
pub const DEFAULT_BIND_IP: &str = "0.0.0.0";

/// Default port of the sample programs.
pub const DEFAULT_PORT: u16 = 12345;

/// Blocking mode of accepted connection sockets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum WorkerMode {
    /// Receives block until data, peer close, or error.
    #[default]
    Blocking,
    /// Receives return immediately; the worker sleeps for
    /// [ServerConfig::idle_wait] whenever no data is pending.
    NonBlocking,
}

/// What happens to in-flight connections once the accept loop stops.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ShutdownPolicy {
    /// Workers keep running until their peer disconnects. `run` returns
    /// without waiting for them.
    #[default]
    Detach,
    /// `run` waits for every worker to finish on its own.
    Drain,
    /// Every in-flight connection is shut down, then `run` waits for the
    /// workers to exit.
    Abort,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Dotted IPv4 address to bind (`0.0.0.0` for all interfaces).
    pub bind_ip: String,
    /// Port to listen on. `0` picks an ephemeral port.
    pub port: u16,
    /// Listen backlog.
    pub backlog: i32,
    /// Maximum readiness wait per accept loop iteration.
    pub poll_interval: Duration,
    /// Receive buffer size per connection.
    pub recv_buffer_size: usize,
    /// Blocking mode of accepted sockets.
    pub worker_mode: WorkerMode,
    /// Idle wait for [WorkerMode::NonBlocking] workers.
    pub idle_wait: Duration,
    /// Treatment of in-flight connections on stop.
    pub shutdown_policy: ShutdownPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BIND_IP, DEFAULT_PORT)
    }
}

impl ServerConfig {
    /// Environment variable overriding [ServerConfig::bind_ip].
    pub const ENV_BIND_IP: &'static str = "IPC_BIND_IP";
    /// Environment variable overriding [ServerConfig::port].
    pub const ENV_PORT: &'static str = "IPC_PORT";
    /// Environment variable overriding [ServerConfig::backlog].
    pub const ENV_BACKLOG: &'static str = "IPC_BACKLOG";
    /// Environment variable overriding [ServerConfig::poll_interval], in
    /// milliseconds.
    pub const ENV_POLL_INTERVAL_MS: &'static str = "IPC_POLL_INTERVAL_MS";

    /// Creates a configuration for `bind_ip:port` with default settings.
    pub fn new(bind_ip: impl Into<String>, port: u16) -> Self {
        Self {
            bind_ip: bind_ip.into(),
            port,
            backlog: DEFAULT_BACKLOG,
            poll_interval: DEFAULT_POLL_INTERVAL,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            worker_mode: WorkerMode::default(),
            idle_wait: DEFAULT_IDLE_WAIT,
            shutdown_policy: ShutdownPolicy::default(),
        }
    }

    /// Builds a configuration from the `IPC_*` environment variables, using
    /// defaults for the unset ones.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ip) = lookup(Self::ENV_BIND_IP) {
            config.bind_ip = ip;
        }
        if let Some(port) = parse_var::<u16, _>(&lookup, Self::ENV_PORT)? {
            config.port = port;
        }
        if let Some(backlog) = parse_var::<i32, _>(&lookup, Self::ENV_BACKLOG)? {
            config.backlog = backlog;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, Self::ENV_POLL_INTERVAL_MS)? {
            if ms == 0 {
                return Err(Error::InvalidConfig {
                    key: Self::ENV_POLL_INTERVAL_MS,
                    value: ms.to_string(),
                });
            }
            config.poll_interval = Duration::from_millis(ms);
        }

        Ok(config)
    }

    /// Returns the `ip:port` string this configuration binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_ip, self.port)
    }

    /// Sets the listen backlog.
    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Sets the accept loop's readiness wait.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the per-connection receive buffer size (at least one byte).
    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size.max(1);
        self
    }

    /// Sets the blocking mode of accepted sockets.
    pub fn worker_mode(mut self, mode: WorkerMode) -> Self {
        self.worker_mode = mode;
        self
    }

    /// Sets the idle wait of non-blocking workers.
    pub fn idle_wait(mut self, wait: Duration) -> Self {
        self.idle_wait = wait;
        self
    }

    /// Sets the treatment of in-flight connections on stop.
    pub fn shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown_policy = policy;
        self
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::InvalidConfig { key, value }),
    }
}
