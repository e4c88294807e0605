use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation flag shared between an owner and its background work.
///
/// Clones observe the same flag. Work checks `is_cancelled` between steps
/// and discards its results once the owner has gone away.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Cancels its token when dropped; held by the owner of background work
#[derive(Debug, Default)]
pub struct CancelOnDrop {
    token: CancelToken,
}

impl CancelOnDrop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Cancel outstanding work and start over with a fresh token
    pub fn reset(&mut self) {
        self.token.cancel();
        self.token = CancelToken::new();
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_drop_cancels() {
        let guard = CancelOnDrop::new();
        let token = guard.token();
        drop(guard);
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_reset_cancels_old_token_only() {
        let mut guard = CancelOnDrop::new();
        let old = guard.token();
        guard.reset();
        assert!(old.is_cancelled());
        assert!(!guard.token().is_cancelled());
    }
}
