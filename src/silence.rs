//! Shared cancellation scope for everything that makes noise.
//!
//! One token is "current" at any time. An operation clones the current token
//! when it starts; a silence request cancels that generation and installs a
//! fresh token, so operations starting afterwards are not born pre-cancelled.

use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

pub struct SilenceScope {
    current: Mutex<CancellationToken>,
}

impl SilenceScope {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(CancellationToken::new()),
        }
    }

    /// Token for an operation starting now.
    pub fn current(&self) -> CancellationToken {
        self.current.lock().unwrap().clone()
    }

    /// Cancel the current generation and replace it with a fresh token.
    /// Returns the fresh token.
    pub fn renew(&self) -> CancellationToken {
        let mut guard = self.current.lock().unwrap();
        let fresh = CancellationToken::new();
        let old = std::mem::replace(&mut *guard, fresh.clone());
        old.cancel();
        fresh
    }
}

impl Default for SilenceScope {
    fn default() -> Self {
        Self::new()
    }
}
