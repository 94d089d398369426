//! Exponential-backoff retry with jitter, retry-after override and cancellation.

use rand::Rng;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::cancel::CancellationToken;
use crate::error::ErrorClass;
use crate::{Error, Result};

type RetryPredicate = Arc<dyn Fn(&Error) -> bool + Send + Sync>;
type RetryCallback = Arc<dyn Fn(&RetryAttempt<'_>) + Send + Sync>;

/// Passed to the per-attempt callback before each backoff sleep.
#[derive(Debug)]
pub struct RetryAttempt<'a> {
    /// 1-based number of the attempt that just failed.
    pub attempt: u32,
    pub error: &'a Error,
    pub delay: Duration,
}

/// Configuration for retry behavior.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `3` allows four invocations.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: bool,
    /// Separate budget for schema-validation failures. `None` shares `max_retries`.
    pub validation_retries: Option<u32>,
    retry_if: Option<RetryPredicate>,
    on_retry: Option<RetryCallback>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("multiplier", &self.multiplier)
            .field("jitter", &self.jitter)
            .field("validation_retries", &self.validation_retries)
            .field("retry_if", &self.retry_if.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(60_000),
            multiplier: 2.0,
            jitter: true,
            validation_retries: None,
            retry_if: None,
            on_retry: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Create a policy with no retries
    pub fn no_retry() -> Self {
        Self::new(0)
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Multipliers below 1 are raised to 1 so delays never shrink.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = if multiplier.is_finite() { multiplier.max(1.0) } else { 1.0 };
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_validation_retries(mut self, retries: u32) -> Self {
        self.validation_retries = Some(retries);
        self
    }

    /// Replace the default retryability test.
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Error) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Some(Arc::new(predicate));
        self
    }

    pub fn on_retry<F>(mut self, callback: F) -> Self
    where
        F: Fn(&RetryAttempt<'_>) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(callback));
        self
    }

    /// `min(initial * multiplier^attempt, max)`, with `attempt` zero-based.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let raw = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64());
        if capped > 0.0 {
            Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
        } else {
            Duration::ZERO
        }
    }

    /// Scale by a uniform factor in `[0.5, 1.0]`.
    pub fn jittered(&self, delay: Duration) -> Duration {
        let factor: f64 = rand::thread_rng().gen_range(0.5..=1.0);
        Duration::from_nanos((delay.as_nanos() as f64 * factor) as u64)
    }

    /// Delay before the retry following failed attempt `attempt`.
    ///
    /// A server retry-after hint replaces the computed delay as-is: it is neither
    /// jittered nor capped.
    pub fn delay_for(&self, attempt: u32, error: &Error) -> Duration {
        if let Some(hint) = error.retry_after() {
            return hint;
        }
        let base = self.base_delay(attempt);
        if self.jitter {
            self.jittered(base)
        } else {
            base
        }
    }

    /// Whether `error` qualifies for a retry at all. Cancellation never does.
    pub fn is_retryable(&self, error: &Error) -> bool {
        if error.is_cancelled() {
            return false;
        }
        match &self.retry_if {
            Some(predicate) => predicate(error),
            None => error.is_retryable(),
        }
    }
}

/// Runs an operation under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Invoke `operation` until it succeeds, fails terminally or the budget runs out.
    ///
    /// The cancellation token is checked before every attempt and raced against both the
    /// attempt and the backoff sleep. An active cancellation takes precedence over any
    /// other failure. Terminal errors are returned unchanged.
    pub async fn execute<F, Fut, T>(&self, mut operation: F, cancel: Option<&CancellationToken>) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let detached = CancellationToken::new();
        let cancel = cancel.unwrap_or(&detached);
        let policy = &self.policy;

        let mut attempt: u32 = 0;
        let mut transient_used: u32 = 0;
        let mut validation_used: u32 = 0;

        loop {
            cancel.check()?;
            let error = match cancel.run_until_cancelled(operation()).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempts = attempt + 1, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if cancel.is_cancelled() {
                return Err(cancel.to_error());
            }
            if !policy.is_retryable(&error) {
                return Err(error);
            }

            let separate_budget = match (error.class(), policy.validation_retries) {
                (ErrorClass::ValidationFailure, Some(budget)) => Some(budget),
                _ => None,
            };
            let exhausted = match separate_budget {
                Some(budget) => validation_used >= budget,
                None => transient_used >= policy.max_retries,
            };
            if exhausted {
                return Err(error);
            }
            match separate_budget {
                Some(_) => validation_used += 1,
                None => transient_used += 1,
            }

            let delay = policy.delay_for(attempt, &error);
            warn!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error_class = %error.class(),
                error = %error,
                "attempt failed, retrying"
            );
            if let Some(callback) = &policy.on_retry {
                callback(&RetryAttempt {
                    attempt: attempt + 1,
                    error: &error,
                    delay,
                });
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancel.to_error()),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.initial_delay, Duration::from_millis(1000));
        assert_eq!(policy.max_delay, Duration::from_millis(60_000));
        assert_eq!(policy.multiplier, 2.0);
        assert!(policy.jitter);
    }

    #[test]
    fn test_base_delay_doubles_then_caps() {
        let policy = RetryPolicy::default().with_max_delay(Duration::from_millis(5000));
        assert_eq!(policy.base_delay(0), Duration::from_millis(1000));
        assert_eq!(policy.base_delay(1), Duration::from_millis(2000));
        assert_eq!(policy.base_delay(2), Duration::from_millis(4000));
        assert_eq!(policy.base_delay(3), Duration::from_millis(5000));
        assert_eq!(policy.base_delay(200), Duration::from_millis(5000));
    }

    #[test]
    fn test_retry_after_hint_is_not_jittered() {
        let policy = RetryPolicy::default();
        let err = Error::RateLimited {
            retry_after: Some(Duration::from_secs(90)),
            message: "slow down".into(),
        };
        assert_eq!(policy.delay_for(0, &err), Duration::from_secs(90));
    }

    #[test]
    fn test_custom_predicate() {
        let policy = RetryPolicy::default().retry_if(|e| matches!(e, Error::ClientFault { status_code: 409, .. }));
        assert!(policy.is_retryable(&Error::ClientFault {
            status_code: 409,
            message: "conflict".into()
        }));
        assert!(!policy.is_retryable(&Error::network("reset")));
        assert!(!policy.is_retryable(&Error::cancelled(None)));
    }
}
