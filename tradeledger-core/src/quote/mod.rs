//! Quote sources: where the latest price for a ticker comes from.

pub mod circuit_breaker;
pub mod fixed;
pub mod provider;
pub mod retry;
pub mod yahoo;

pub use circuit_breaker::CircuitBreaker;
pub use fixed::StaticQuotes;
pub use provider::{QuoteError, QuoteSource};
pub use retry::{fetch_with_retry, RetryPolicy};
pub use yahoo::YahooQuoteSource;
