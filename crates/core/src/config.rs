//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and passed into the services by `Arc`.
//! Nothing in this crate reads environment variables during request handling; the
//! `*_from_env_value` helpers take the already-read value so binaries own the environment.

use crate::constants::{DEFAULT_REVIEW_DUE_DAYS, DEFAULT_SYNONYM_CACHE_TTL_SECS, MAX_REVIEW_DUE_DAYS};
use crate::{RegisterError, RegisterResult};
use std::time::Duration;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    review_due_after: chrono::Duration,
    synonym_cache_ttl: Duration,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns `RegisterError::InvalidInput` if `review_due_days` is outside
    /// `1..=MAX_REVIEW_DUE_DAYS` or the synonym TTL is zero.
    pub fn new(review_due_days: i64, synonym_cache_ttl: Duration) -> RegisterResult<Self> {
        if !(1..=MAX_REVIEW_DUE_DAYS).contains(&review_due_days) {
            return Err(RegisterError::InvalidInput(format!(
                "review due offset must be between 1 and {MAX_REVIEW_DUE_DAYS} days, got {review_due_days}"
            )));
        }
        if synonym_cache_ttl.is_zero() {
            return Err(RegisterError::InvalidInput(
                "synonym cache TTL cannot be zero".into(),
            ));
        }

        Ok(Self {
            review_due_after: chrono::Duration::days(review_due_days),
            synonym_cache_ttl,
        })
    }

    /// How long a newly created review task has before it falls due.
    pub fn review_due_after(&self) -> chrono::Duration {
        self.review_due_after
    }

    pub fn synonym_cache_ttl(&self) -> Duration {
        self.synonym_cache_ttl
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            review_due_after: chrono::Duration::days(DEFAULT_REVIEW_DUE_DAYS),
            synonym_cache_ttl: Duration::from_secs(DEFAULT_SYNONYM_CACHE_TTL_SECS),
        }
    }
}

/// Parse the review due offset (days) from an optional string value.
///
/// `None` or blank yields the default.
pub fn review_due_days_from_env_value(value: Option<String>) -> RegisterResult<i64> {
    match non_blank(value) {
        None => Ok(DEFAULT_REVIEW_DUE_DAYS),
        Some(v) => v.parse::<i64>().map_err(|_| {
            RegisterError::InvalidInput(format!("review due days must be an integer, got '{v}'"))
        }),
    }
}

/// Parse the synonym cache TTL (seconds) from an optional string value.
///
/// `None` or blank yields the default.
pub fn synonym_ttl_from_env_value(value: Option<String>) -> RegisterResult<Duration> {
    match non_blank(value) {
        None => Ok(Duration::from_secs(DEFAULT_SYNONYM_CACHE_TTL_SECS)),
        Some(v) => v.parse::<u64>().map(Duration::from_secs).map_err(|_| {
            RegisterError::InvalidInput(format!(
                "synonym cache TTL must be a whole number of seconds, got '{v}'"
            ))
        }),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
