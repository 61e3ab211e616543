//! Bounded exponential retry policy shared by every recognition call site.
//!
//! The policy counts attempts rather than elapsed time: a throttled candidate
//! gets at most `max_attempts` calls, with delays `base`, `base * multiplier`,
//! ... capped at `max_delay`.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::future::retry_notify;
use backoff::ExponentialBackoff;
use futures::TryFutureExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::recognition::{RecognitionError, RecognitionResult};

/// Default number of calls per candidate (first try included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);

/// Default ceiling for a single retry delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(2);

/// Default growth factor between consecutive delays.
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Retry policy for throttling-class errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first call.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Growth factor applied after each retry.
    pub multiplier: f64,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Policy with no delay between attempts, handy for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_millis(1),
            multiplier: 1.0,
            max_delay: Duration::from_millis(1),
        }
    }

    /// Build a fresh backoff schedule for one candidate.
    pub fn backoff(&self) -> AttemptLimited<ExponentialBackoff> {
        let inner = ExponentialBackoff {
            current_interval: self.base_delay,
            initial_interval: self.base_delay,
            randomization_factor: 0.0,
            multiplier: self.multiplier,
            max_interval: self.max_delay,
            max_elapsed_time: None,
            ..Default::default()
        };
        AttemptLimited::new(inner, self.max_attempts)
    }

    /// Delays this policy would sleep through if every attempt were throttled.
    pub fn schedule(&self) -> Vec<Duration> {
        let mut backoff = self.backoff();
        std::iter::from_fn(|| backoff.next_backoff()).collect()
    }
}

/// Run one recognition call under `policy`, retrying throttling only.
///
/// Every other error class is returned on the first failure. When the budget
/// runs out the last `Throttled` error is returned.
pub async fn retry_throttled<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> RecognitionResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RecognitionResult<T>>,
{
    retry_notify(
        policy.backoff(),
        || {
            call().map_err(|e| match e {
                RecognitionError::Throttled(_) => backoff::Error::transient(e),
                other => backoff::Error::permanent(other),
            })
        },
        |err: RecognitionError, delay: Duration| {
            debug!(
                operation,
                error = %err,
                retry_after_ms = delay.as_millis() as u64,
                "Throttled, retry scheduled"
            );
        },
    )
    .await
}

/// Wraps a backoff and stops it after `max_attempts - 1` retries.
#[derive(Debug)]
pub struct AttemptLimited<B> {
    inner: B,
    max_attempts: u32,
    retries: u32,
}

impl<B> AttemptLimited<B> {
    pub fn new(inner: B, max_attempts: u32) -> Self {
        Self {
            inner,
            max_attempts,
            retries: 0,
        }
    }

    /// Retries handed out so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }
}

impl<B: Backoff> Backoff for AttemptLimited<B> {
    fn reset(&mut self) {
        self.retries = 0;
        self.inner.reset();
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.retries + 1 >= self.max_attempts {
            return None;
        }
        self.retries += 1;
        self.inner.next_backoff()
    }
}
