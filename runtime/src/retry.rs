//! Backoff for transient driver failures on reads.
//!
//! The executor wraps read calls (plain reads, discovery reads, and the
//! existence check of upserts) in [`retry_transient`]. Writes are never
//! retried: a write that timed out may still have been applied.
//!
//! Only errors for which [`StoreError::is_transient`] holds are retried.
//!
//! # Example
//!
//! ```rust
//! use docquery_runtime::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::builder()
//!     .max_retries(4)
//!     .initial_delay(Duration::from_millis(20))
//!     .max_delay(Duration::from_millis(500))
//!     .build();
//!
//! assert_eq!(policy.backoff(0), Duration::from_millis(20));
//! assert_eq!(policy.backoff(1), Duration::from_millis(40));
//! assert_eq!(policy.backoff(10), Duration::from_millis(500));
//! ```

use crate::metrics::QueryMetrics;
use docquery_core::store::StoreError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// How many times, and how patiently, a failed read is reissued.
///
/// Defaults: two retries, 50ms first delay doubling up to 2s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: usize,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Start from the defaults and override selected fields.
    #[must_use]
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder(Self::default())
    }

    /// Fail on the first error.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (zero-based), capped at `max_delay`.
    #[must_use]
    pub fn backoff(&self, retry: usize) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder(RetryPolicy);

impl RetryPolicyBuilder {
    /// Retries after the first attempt.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: usize) -> Self {
        self.0.max_retries = max_retries;
        self
    }

    /// Delay before the first retry.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.0.initial_delay = delay;
        self
    }

    /// Upper bound on any single delay.
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.0.max_delay = delay;
        self
    }

    /// Growth factor between consecutive delays.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.0.multiplier = multiplier;
        self
    }

    /// Finish the policy.
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        self.0
    }
}

/// Run `call` until it succeeds, fails permanently, or `policy` runs out.
///
/// # Errors
///
/// Returns the first error that is not transient, or the last transient
/// error once `max_retries` retries have failed.
pub async fn retry_transient<T, F, Fut>(policy: &RetryPolicy, mut call: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut retry = 0;
    loop {
        let error = match call().await {
            Ok(value) => {
                if retry > 0 {
                    tracing::debug!(retries = retry, "Driver read recovered");
                }
                return Ok(value);
            }
            Err(error) if error.is_transient() => error,
            Err(error) => return Err(error),
        };

        if retry >= policy.max_retries {
            tracing::warn!(retries = retry, %error, "Driver read gave up");
            return Err(error);
        }

        let delay = policy.backoff(retry);
        tracing::debug!(
            retry,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            %error,
            "Driver read failed, backing off"
        );
        QueryMetrics::record_retry();
        tokio::time::sleep(delay).await;
        retry += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn backoff_doubles_then_caps() {
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_millis(100))
            .max_delay(Duration::from_millis(350))
            .build();

        let delays: Vec<_> = (0..4).map(|n| policy.backoff(n).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 350, 350]);
    }

    #[test]
    fn huge_exponents_stay_at_the_cap() {
        let policy = RetryPolicy::builder().multiplier(10.0).build();
        assert_eq!(policy.backoff(usize::MAX), policy.max_delay);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_until_success() {
        let calls = AtomicUsize::new(0);

        let result = retry_transient(&RetryPolicy::default(), || async {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 => Err(StoreError::Unavailable("failover".into())),
                1 => Err(StoreError::Timeout("slow".into())),
                _ => Ok("events"),
            }
        })
        .await;

        assert_eq!(result, Ok("events"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_with_the_last_error() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::builder().max_retries(1).build();

        let result: Result<(), _> = retry_transient(&policy, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable(format!("attempt {n}")))
        })
        .await;

        assert_eq!(result, Err(StoreError::Unavailable("attempt 1".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_errors_return_immediately() {
        let calls = AtomicUsize::new(0);

        let result: Result<(), _> = retry_transient(&RetryPolicy::default(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::PermissionDenied("no".into()))
        })
        .await;

        assert_eq!(result, Err(StoreError::PermissionDenied("no".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn none_policy_never_retries() {
        assert_eq!(RetryPolicy::none().max_retries, 0);
    }
}
