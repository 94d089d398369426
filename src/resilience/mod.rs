//! # Retry and Cancellation
//!
//! A generic executor that runs a zero-argument async operation under a [`RetryPolicy`],
//! sleeping with exponential backoff between attempts, and a [`CancellationToken`] that
//! can interrupt it at any suspension point.
//!
//! ```text
//! Idle ─▶ Attempting ─┬─▶ Success
//!             ▲       ├─▶ Failed      (terminal error, budget spent, or cancelled)
//!             └─ Sleeping ◀┘
//! ```
//!
//! ```rust
//! use std::time::Duration;
//! use unichat::resilience::{execute, RetryPolicy};
//!
//! # async fn demo() -> unichat::Result<()> {
//! let policy = RetryPolicy::new(2).with_initial_delay(Duration::from_millis(50));
//! let value = execute(|| async { Ok::<_, unichat::Error>(42) }, &policy, None).await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod retry;

pub use cancel::CancellationToken;
pub use retry::{RetryAttempt, RetryExecutor, RetryPolicy};

use std::future::Future;

use crate::Result;

/// Run `operation` under `policy`, optionally interruptible through `cancel`.
pub async fn execute<F, Fut, T>(operation: F, policy: &RetryPolicy, cancel: Option<&CancellationToken>) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    RetryExecutor::new(policy.clone()).execute(operation, cancel).await
}
