//! Quote source trait and structured error types.
//!
//! The QuoteSource trait abstracts over price feeds (Yahoo Finance, a CSV
//! price sheet, a fixed in-memory table) so the engine can be run offline and
//! mocked in tests.

use thiserror::Error;

/// Structured error types for quote lookups.
#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("quote request timed out: {0}")]
    Timeout(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("HTTP {status} from quote provider")]
    Http { status: u16 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("no quote for ticker: {ticker}")]
    SymbolNotFound { ticker: String },

    #[error("hard stop: quote provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("price sheet error: {0}")]
    PriceSheet(String),

    #[error("quote error: {0}")]
    Other(String),
}

impl QuoteError {
    /// Whether another attempt might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            QuoteError::NetworkUnreachable(_)
            | QuoteError::Timeout(_)
            | QuoteError::RateLimited { .. } => true,
            QuoteError::Http { status } => *status >= 500,
            _ => false,
        }
    }
}

/// A source of latest prices.
///
/// Implementations make a single attempt per call; retrying is layered on
/// top by [`crate::quote::fetch_with_retry`].
pub trait QuoteSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Latest known price for `ticker`.
    fn latest_price(&self, ticker: &str) -> Result<f64, QuoteError>;

    /// Check if the source is currently accepting requests.
    fn is_available(&self) -> bool {
        true
    }
}
