//! Cooperative cancellation for one logical call.

use once_cell::sync::OnceCell;
use std::future::Future;
use std::sync::Arc;

use crate::{Error, Result};

/// Cancellation handle shared by every suspension point of a call.
///
/// Clones observe the same state. The first reason given wins. Waiting is scoped:
/// [`cancelled`](Self::cancelled) registers interest only while its future is alive.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: tokio_util::sync::CancellationToken,
    reason: Arc<OnceCell<String>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn cancel_with_reason(&self, reason: impl Into<String>) {
        // Set before waking waiters so they can read it.
        let _ = self.reason.set(reason.into());
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.get().map(String::as_str)
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await
    }

    /// The `Cancelled` error this token represents.
    pub fn to_error(&self) -> Error {
        Error::cancelled(self.reason().map(String::from))
    }

    /// Fail fast if cancellation was already requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(self.to_error())
        } else {
            Ok(())
        }
    }

    /// Drive `fut` until it finishes or the token fires, whichever is first.
    /// Cancellation is polled first, so it wins a tie.
    pub async fn run_until_cancelled<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.inner.cancelled() => Err(self.to_error()),
            out = fut => out,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_first_reason_wins() {
        let token = CancellationToken::new();
        token.cancel_with_reason("first");
        token.cancel_with_reason("second");
        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some("first"));
    }

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(Error::Cancelled { reason: None })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_cancelled_interrupts() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel_with_reason("stop");
        });
        let out: Result<()> = token
            .run_until_cancelled(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;
        match out {
            Err(Error::Cancelled { reason }) => assert_eq!(reason.as_deref(), Some("stop")),
            other => panic!("expected Cancelled, got {:?}", other),
        }
    }
}
