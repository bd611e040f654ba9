//! Cooperative cancellation.
//!
//! A single shared flag, set once by the caller and checked by task bodies
//! at safe points (before starting expensive per-unit work). Tasks that
//! observe the flag exit early but still report task completion, so stage
//! barriers never deadlock and progress accounting stays consistent.
//! Already-started work is never forcibly interrupted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable handle to a shared cancellation flag.
///
/// Cloning is cheap; all clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Clear the flag for a fresh pipeline run.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn starts_uncancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn clones_share_the_flag() {
        let token = CancellationToken::new();
        let clone = token.clone();

        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn reset_clears_a_previous_cancel() {
        let token = CancellationToken::new();
        token.cancel();
        token.reset();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn visible_across_threads() {
        let token = CancellationToken::new();
        let clone = token.clone();

        let handle = thread::spawn(move || {
            clone.cancel();
        });
        handle.join().unwrap();

        assert!(token.is_cancelled());
    }
}
