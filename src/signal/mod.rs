//! Cooperative cancellation
//!
//! `CancelToken` is the cancellation capability handed to blocking waits.
//! It is checked at suspension points only (poll boundaries and the
//! inter-poll sleep), never by aborting a request mid-decode. The remote
//! task is left running when a wait is cancelled.
//!
//! `SignalHandler` wires SIGINT/SIGTERM to a token for the CLI:
//! first signal cancels the wait, second exits immediately.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Exit code the CLI uses when a wait is interrupted.
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Shared cancellation flag. Cheap to clone; all clones observe the same
/// flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent; never blocks.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Installs a SIGINT/SIGTERM handler that cancels a token.
pub struct SignalHandler {
    token: CancelToken,
    signal_count: Arc<AtomicU8>,
}

impl SignalHandler {
    pub fn new() -> Self {
        Self {
            token: CancelToken::new(),
            signal_count: Arc::new(AtomicU8::new(0)),
        }
    }

    /// The token the handler will cancel on the first signal.
    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn signal_count(&self) -> u8 {
        self.signal_count.load(Ordering::SeqCst)
    }

    /// Install the handler. Must be called once at program startup.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let token = self.token.clone();
        let count = Arc::clone(&self.signal_count);
        ctrlc::set_handler(move || {
            let seen = count.fetch_add(1, Ordering::SeqCst);
            if seen == 0 {
                eprintln!(
                    "\nInterrupt: abandoning wait (the remote task keeps running); press again to exit"
                );
                token.cancel();
            } else {
                std::process::exit(EXIT_CODE_INTERRUPTED);
            }
        })
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_starts_clear() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_visible_through_clones() {
        let token = CancelToken::new();
        let observer = token.clone();

        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_handler_exposes_its_token() {
        let handler = SignalHandler::new();
        let token = handler.token();

        assert_eq!(handler.signal_count(), 0);
        assert!(!token.is_cancelled());
    }
}
