//! Retry with backoff for Azure Resource Manager calls.
//!
//! ARM throttles per subscription and per principal. Every request issued by
//! [`ArmClient`](crate::azure::ArmClient) runs through a [`RetryPolicy`]:
//!
//! - Only transient failures are retried (HTTP 429, 5xx, connect and timeout errors)
//! - Extension installs are retried only when throttled (HTTP 429 or 503)
//! - A server supplied `Retry-After` wins over the computed delay
//! - Otherwise the delay grows exponentially, capped at `max_delay`, with jitter
//!
//! # Example
//!
//! ```rust,ignore
//! use omsdeploy::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::exponential(5, Duration::from_secs(1), Duration::from_secs(60));
//! let vm = policy.execute("get vm", || client.get_vm("rg", "web01")).await?;
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Backoff strategy for calculating delay between retries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Constant delay between retries.
    Constant,

    /// Linear backoff: delay = initial_delay * (attempt + 1)
    Linear,

    /// Exponential backoff: delay = initial_delay * multiplier^attempt
    Exponential {
        /// Multiplier for exponential growth (default: 2.0)
        multiplier: f64,
    },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential { multiplier: 2.0 }
    }
}

impl BackoffStrategy {
    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn calculate_delay(&self, attempt: u32, initial_delay: Duration) -> Duration {
        let base_millis = initial_delay.as_millis() as f64;

        let delay_millis = match self {
            Self::Constant => base_millis,
            Self::Linear => base_millis * (attempt as f64 + 1.0),
            Self::Exponential { multiplier } => base_millis * multiplier.powf(attempt as f64),
        };

        Duration::from_millis(delay_millis.min(u64::MAX as f64) as u64)
    }
}

/// Jitter strategy for adding randomness to delays.
///
/// Many units hitting the same throttle at once would otherwise retry in
/// lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter - use exact calculated delay.
    None,

    /// Full jitter: delay = random(0, calculated_delay)
    Full,

    /// Equal jitter: delay = calculated_delay/2 + random(0, calculated_delay/2)
    Equal,
}

impl Default for JitterStrategy {
    fn default() -> Self {
        Self::Equal
    }
}

impl JitterStrategy {
    /// Apply jitter to a calculated delay.
    pub fn apply(&self, delay: Duration) -> Duration {
        let delay_millis = delay.as_millis() as u64;
        let mut rng = rand::thread_rng();

        let jittered = match self {
            Self::None => delay_millis,
            Self::Full => {
                if delay_millis > 0 {
                    rng.gen_range(0..delay_millis)
                } else {
                    0
                }
            }
            Self::Equal => {
                let half = delay_millis / 2;
                if half > 0 {
                    half + rng.gen_range(0..half)
                } else {
                    delay_millis
                }
            }
        };

        Duration::from_millis(jittered)
    }
}

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 means no retries, just the initial attempt).
    pub max_retries: u32,

    /// Initial delay before the first retry.
    pub initial_delay: Duration,

    /// Maximum delay between retries (caps exponential growth and `Retry-After`).
    pub max_delay: Duration,

    /// Backoff strategy for calculating delays.
    pub backoff: BackoffStrategy,

    /// Jitter strategy for adding randomness.
    pub jitter: JitterStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff: BackoffStrategy::default(),
            jitter: JitterStrategy::default(),
        }
    }
}

impl RetryPolicy {
    /// Create a policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Create a policy with exponential backoff.
    pub fn exponential(max_retries: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            backoff: BackoffStrategy::Exponential { multiplier: 2.0 },
            jitter: JitterStrategy::Equal,
        }
    }

    /// Calculate the delay for a given attempt, preferring the server's hint.
    pub fn delay_for_attempt(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            return hint.min(self.max_delay);
        }
        let base_delay = self.backoff.calculate_delay(attempt, self.initial_delay);
        self.jitter.apply(base_delay.min(self.max_delay))
    }

    /// Execute an async operation, retrying transient failures.
    ///
    /// Non-transient errors are returned immediately. After `max_retries`
    /// retries the last error is returned.
    pub async fn execute<F, Fut, T>(&self, operation: &str, call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_when(operation, Error::is_transient, call).await
    }

    /// Execute an async operation, retrying only errors accepted by `retry_on`.
    ///
    /// Requests that are not safe to repeat after a server fault pass
    /// [`Error::is_throttled`] here so that only rejected requests are resent.
    pub async fn execute_when<F, Fut, T>(
        &self,
        operation: &str,
        retry_on: fn(&Error) -> bool,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            match call().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("{} succeeded after {} retries", operation, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if retry_on(&e) && attempt < self.max_retries => {
                    let delay = self.delay_for_attempt(attempt, e.retry_after());
                    if e.is_throttled() {
                        warn!("{} throttled ({}), retrying in {:?}", operation, e, delay);
                    } else {
                        warn!("{} failed ({}), retrying in {:?}", operation, e, delay);
                    }
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
