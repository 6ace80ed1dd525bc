//! Cooperative stop signalling for the accept loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Bumped by [stop_all]. Every token remembers the value it was created
/// with and counts as stopped once it changes.
static STOP_EPOCH: AtomicU64 = AtomicU64::new(0);

/// Stops every server whose token was created before this call.
///
/// Only performs an atomic increment, so it is safe to call from a signal
/// handler.
pub fn stop_all() {
    STOP_EPOCH.fetch_add(1, Ordering::SeqCst);
}

/// Per-server cancellation flag.
///
/// Clones share the same flag. Once stopped, a token never becomes
/// un-stopped.
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    stopped: Arc<AtomicBool>,
    epoch: u64,
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownToken {
    /// Creates a token that is not stopped.
    pub fn new() -> Self {
        Self {
            stopped: Arc::new(AtomicBool::new(false)),
            epoch: STOP_EPOCH.load(Ordering::SeqCst),
        }
    }

    /// Requests a stop. Neither allocates nor blocks.
    #[inline]
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Returns `true` once [ShutdownToken::stop] or [stop_all] was called.
    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire) || STOP_EPOCH.load(Ordering::SeqCst) != self.epoch
    }
}
