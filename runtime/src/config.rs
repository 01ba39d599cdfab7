//! Executor configuration.
//!
//! Loaded from environment variables with sensible defaults, or built in code
//! with the `with_*` methods.
//!
//! | variable | default |
//! |---|---|
//! | `DOCQUERY_MAX_BATCH_SIZE` | `500` |
//! | `DOCQUERY_BATCH_POLICY` | `chunked` (`chunked` or `fail-fast`) |
//! | `DOCQUERY_WRITE_CONCURRENCY` | `8` |
//! | `DOCQUERY_OPERATION_TIMEOUT_MS` | unset (no timeout) |
//! | `DOCQUERY_READ_RETRIES` | `2` |

use crate::retry::RetryPolicy;
use docquery_core::store::DEFAULT_MAX_BATCH_SIZE;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors from loading configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but its value cannot be used.
    #[error("Invalid value {value:?} for {key}: {reason}")]
    Invalid {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// What to do when update/delete discovery finds more documents than fit in
/// one atomic batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchPolicy {
    /// Commit sequential batches, each atomic on its own.
    #[default]
    Chunked,
    /// Reject the whole operation with `BatchTooLarge` before writing.
    FailFast,
}

impl FromStr for BatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chunked" => Ok(Self::Chunked),
            "fail-fast" | "fail_fast" | "failfast" => Ok(Self::FailFast),
            other => Err(format!("unknown batch policy `{other}`")),
        }
    }
}

impl fmt::Display for BatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chunked => f.write_str("chunked"),
            Self::FailFast => f.write_str("fail-fast"),
        }
    }
}

/// Configuration for query execution.
///
/// # Example
///
/// ```
/// use docquery_runtime::config::{BatchPolicy, ExecutorConfig};
/// use std::time::Duration;
///
/// let config = ExecutorConfig::default()
///     .with_batch_policy(BatchPolicy::FailFast)
///     .with_operation_timeout(Duration::from_secs(5));
/// assert_eq!(config.max_batch_size, 500);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Upper bound on operations per atomic batch. The effective cap is the
    /// smaller of this and the driver's own maximum.
    pub max_batch_size: usize,
    /// Behaviour when a batch exceeds the cap.
    pub batch_policy: BatchPolicy,
    /// Maximum number of per-item insert/upsert writes in flight.
    pub write_concurrency: usize,
    /// Deadline applied to every individual driver call.
    pub operation_timeout: Option<Duration>,
    /// Retry policy for read calls.
    pub read_retry: RetryPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            batch_policy: BatchPolicy::Chunked,
            write_concurrency: 8,
            operation_timeout: None,
            read_retry: RetryPolicy::default(),
        }
    }
}

impl ExecutorConfig {
    /// Load configuration from the process environment.
    ///
    /// Unset variables take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a variable is set to an unusable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a variable is set to an unusable value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_batch_size = parse_var(&lookup, "DOCQUERY_MAX_BATCH_SIZE")?
            .unwrap_or(defaults.max_batch_size);
        if max_batch_size == 0 {
            return Err(invalid("DOCQUERY_MAX_BATCH_SIZE", "0", "must be at least 1"));
        }

        let write_concurrency = parse_var(&lookup, "DOCQUERY_WRITE_CONCURRENCY")?
            .unwrap_or(defaults.write_concurrency);
        if write_concurrency == 0 {
            return Err(invalid("DOCQUERY_WRITE_CONCURRENCY", "0", "must be at least 1"));
        }

        let read_retries = parse_var(&lookup, "DOCQUERY_READ_RETRIES")?
            .unwrap_or(defaults.read_retry.max_retries);

        Ok(Self {
            max_batch_size,
            batch_policy: parse_var(&lookup, "DOCQUERY_BATCH_POLICY")?
                .unwrap_or(defaults.batch_policy),
            write_concurrency,
            operation_timeout: parse_var::<u64>(&lookup, "DOCQUERY_OPERATION_TIMEOUT_MS")?
                .map(Duration::from_millis),
            read_retry: RetryPolicy {
                max_retries: read_retries,
                ..defaults.read_retry
            },
        })
    }

    /// Set the batch cap.
    #[must_use]
    pub const fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// Set the oversized-batch policy.
    #[must_use]
    pub const fn with_batch_policy(mut self, policy: BatchPolicy) -> Self {
        self.batch_policy = policy;
        self
    }

    /// Set the per-item write concurrency.
    #[must_use]
    pub const fn with_write_concurrency(mut self, concurrency: usize) -> Self {
        self.write_concurrency = concurrency;
        self
    }

    /// Set the per-call deadline.
    #[must_use]
    pub const fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Set the read retry policy.
    #[must_use]
    pub fn with_read_retry(mut self, policy: RetryPolicy) -> Self {
        self.read_retry = policy;
        self
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| invalid(key, &raw, &e.to_string()))
        })
        .transpose()
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code: inputs are known-good
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = ExecutorConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ExecutorConfig::default());
    }

    #[test]
    fn reads_every_variable() {
        let config = ExecutorConfig::from_lookup(lookup(&[
            ("DOCQUERY_MAX_BATCH_SIZE", "100"),
            ("DOCQUERY_BATCH_POLICY", "fail-fast"),
            ("DOCQUERY_WRITE_CONCURRENCY", "2"),
            ("DOCQUERY_OPERATION_TIMEOUT_MS", "1500"),
            ("DOCQUERY_READ_RETRIES", "0"),
        ]))
        .unwrap();

        assert_eq!(config.max_batch_size, 100);
        assert_eq!(config.batch_policy, BatchPolicy::FailFast);
        assert_eq!(config.write_concurrency, 2);
        assert_eq!(config.operation_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.read_retry.max_retries, 0);
    }

    #[test]
    fn rejects_unusable_values() {
        let err = ExecutorConfig::from_lookup(lookup(&[("DOCQUERY_MAX_BATCH_SIZE", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key, .. } if key == "DOCQUERY_MAX_BATCH_SIZE"));

        let err = ExecutorConfig::from_lookup(lookup(&[("DOCQUERY_BATCH_POLICY", "yolo")]))
            .unwrap_err();
        assert!(err.to_string().contains("unknown batch policy"));

        assert!(ExecutorConfig::from_lookup(lookup(&[("DOCQUERY_WRITE_CONCURRENCY", "0")])).is_err());
    }
}
