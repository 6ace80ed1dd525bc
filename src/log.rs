//! Log output setup for programs built on this crate.
//!
//! Library code only emits [tracing] events; binaries call [init] once to
//! print them.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the filter directives (e.g. `ipc=debug`).
pub const LOG_ENV: &str = "IPC_LOG";

/// Filter applied when [LOG_ENV] is unset or invalid.
const DEFAULT_FILTER: &str = "info";

/// Installs a global formatting subscriber.
///
/// - Events at `INFO` and above are printed to `stderr` with timestamps and
///   their target, so program output on `stdout` stays clean. Set [LOG_ENV]
///   (e.g. `IPC_LOG=ipc=debug`) to see per-connection `DEBUG` events.
/// - Calling this more than once is harmless; only the first call installs.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!("log output initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn default_filter_hides_debug_events() {
        let filter = EnvFilter::new(DEFAULT_FILTER);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::INFO));
    }

    #[test]
    fn init_twice_is_harmless() {
        init();
        init();
    }
}
