//! Cooperative cancellation: a global interrupt flag plus a per-thread
//! override, polled at block boundaries by the reader, restore loop, and
//! validator. An optional `ctrlc`-installed signal handler sets the global
//! flag for interactive callers; library callers can flip it directly
//! without touching process-wide signal state.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

thread_local! {
    static THREAD_INTERRUPTED: Cell<bool> = Cell::new(false);
}

/// Raised when a cancellation poll observes either flag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "operation cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Shared cancellation state, cloned into every worker thread. Checking it
/// is the cooperative checkpoint polled at block boundaries.
#[derive(Clone, Default)]
pub struct CancellationToken {
    global: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken {
            global: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set the process-wide flag. Called from a signal handler or any
    /// thread that decides to abort the whole run.
    pub fn cancel(&self) {
        self.global.store(true, Ordering::SeqCst);
    }

    /// Set only this thread's override, leaving other workers unaffected.
    pub fn cancel_this_thread() {
        THREAD_INTERRUPTED.with(|flag| flag.set(true));
    }

    pub fn is_cancelled(&self) -> bool {
        self.global.load(Ordering::SeqCst) || THREAD_INTERRUPTED.with(|flag| flag.get())
    }

    /// Poll at a block boundary, failing fatally if cancellation was
    /// requested.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Install a `SIGINT`/`SIGTERM` handler that cancels `token`. Process-wide;
/// call once.
pub fn install_signal_handler(token: CancellationToken) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || token.cancel())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_not_cancelled() {
        let token = CancellationToken::new();
        assert!(token.checkpoint().is_ok());
    }

    #[test]
    fn global_cancel_is_visible_to_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.checkpoint().is_err());
    }
}
