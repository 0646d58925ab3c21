//! Cooperative cancellation.
//!
//! One token is shared by the coordinator and all workers. Cancellation is
//! monotonic: once set it stays set. Long waits are sliced so every sleep
//! observes the token within [`CANCEL_SLICE`].

use crate::constants::timeouts::CANCEL_SLICE;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration`, returning early on cancellation.
    /// Returns `true` when the full duration elapsed.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let mut remaining = duration;
        while remaining > Duration::ZERO {
            if self.is_cancelled() {
                return false;
            }
            let slice = remaining.min(CANCEL_SLICE);
            tokio::time::sleep(slice).await;
            remaining = remaining.saturating_sub(slice);
        }
        !self.is_cancelled()
    }

    /// Convenience for fractional-second step fields.
    pub async fn sleep_secs(&self, seconds: f64) -> bool {
        self.sleep(Duration::from_secs_f64(seconds.max(0.0))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sleep_completes_when_not_cancelled() {
        let token = CancelToken::new();
        assert!(token.sleep(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn sleep_returns_early_on_cancel() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.sleep(Duration::from_secs(30)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
        let completed = handle.await.unwrap();
        assert!(!completed);
    }

    #[test]
    fn cancellation_is_monotonic() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }
}
