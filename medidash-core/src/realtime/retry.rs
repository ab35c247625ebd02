//! Bounded retry for table fetches.

use std::time::Duration;

use super::error::FetchError;
use super::ports::FetchFn;

/// Retry policy applied to transient fetch failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of calls, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay before retry number `retry` (1-based): base * 2^(retry-1), capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Result of a fetch that did not fail transiently.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<R> {
    Fresh(Vec<R>),
    /// The resource cannot be read at all; shown as an empty set.
    Unavailable(FetchError),
}

impl<R> FetchOutcome<R> {
    pub fn into_rows(self) -> Vec<R> {
        match self {
            FetchOutcome::Fresh(rows) => rows,
            FetchOutcome::Unavailable(_) => Vec::new(),
        }
    }
}

/// Calls `fetch` until it succeeds or a failure is not worth retrying,
/// giving up once the policy runs out of attempts.
pub async fn fetch_with_retry<R>(
    fetch: &FetchFn<R>,
    policy: &RetryPolicy,
) -> Result<FetchOutcome<R>, FetchError> {
    let mut attempt = 1;
    loop {
        match fetch().await {
            Ok(rows) => return Ok(FetchOutcome::Fresh(rows)),
            Err(e) if e.is_permanent() => {
                tracing::debug!("fetch failed permanently, not retrying: {}", e);
                return Ok(FetchOutcome::Unavailable(e));
            }
            Err(e) if !e.is_retryable() || attempt >= policy.max_attempts => {
                tracing::warn!("fetch failed after {} attempt(s): {}", attempt, e);
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay_for(attempt);
                tracing::debug!(
                    "fetch attempt {} failed ({}), retrying in {:?}",
                    attempt,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
