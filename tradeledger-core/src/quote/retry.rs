//! Bounded retry with exponential backoff around a single quote lookup.

use std::time::Duration;

use tracing::debug;

use super::provider::{QuoteError, QuoteSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    pub base_delay: Duration,
    /// Upper bound on any single wait, including a provider's Retry-After.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Wait before retry `attempt` after `last` failed.
    ///
    /// A rate-limit response waits at least the provider's Retry-After.
    /// Either way the wait never exceeds `max_delay`.
    pub fn wait_after(&self, attempt: u32, last: Option<&QuoteError>) -> Duration {
        let backoff = self.delay_for(attempt);
        let wait = match last {
            Some(QuoteError::RateLimited { retry_after_secs }) => {
                backoff.max(Duration::from_secs(*retry_after_secs))
            }
            _ => backoff,
        };
        wait.min(self.max_delay)
    }
}

/// Fetch a price, retrying transient failures up to the policy's limit.
///
/// Permanent failures (unknown ticker, tripped breaker) return immediately.
pub fn fetch_with_retry(
    source: &dyn QuoteSource,
    ticker: &str,
    policy: &RetryPolicy,
) -> Result<f64, QuoteError> {
    let mut last_error = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            std::thread::sleep(policy.wait_after(attempt, last_error.as_ref()));
        }

        if !source.is_available() {
            return Err(QuoteError::CircuitBreakerTripped);
        }

        match source.latest_price(ticker) {
            Ok(price) => return Ok(price),
            Err(e) if e.is_transient() => {
                debug!(
                    "{} lookup for {ticker} failed (attempt {}): {e}",
                    source.name(),
                    attempt + 1
                );
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| QuoteError::Other("max retries exceeded".into())))
}
