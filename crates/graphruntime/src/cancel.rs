use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// Holds the one live cancellation token of the active workflow.
///
/// Firing it unwinds every compute call and suspension point that captured
/// it; a fresh token is installed immediately so later runs are unaffected.
pub struct CancellationManager {
    current: Mutex<CancellationToken>,
}

impl CancellationManager {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(CancellationToken::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CancellationToken> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Token that new work should observe
    pub fn token(&self) -> CancellationToken {
        self.lock().clone()
    }

    /// Cancel everything in flight and allocate a fresh token
    pub fn cancel_all(&self) {
        let mut current = self.lock();
        current.cancel();
        *current = CancellationToken::new();
        tracing::info!("Cancelled all in-flight operations");
    }
}

impl Default for CancellationManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_all_fires_old_token_and_rotates() {
        let manager = CancellationManager::new();
        let before = manager.token();

        manager.cancel_all();

        assert!(before.is_cancelled());
        assert!(!manager.token().is_cancelled());
    }
}
