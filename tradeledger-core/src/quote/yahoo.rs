//! Yahoo Finance quote source.
//!
//! Reads the latest session close from Yahoo's v8 chart API
//! (`range=1d&interval=1d`). Each call is a single HTTP request bounded by the
//! client timeout; status codes feed the shared circuit breaker.
//!
//! Yahoo Finance has no official API and is subject to unannounced format
//! changes. The CSV price sheet is the fallback when Yahoo is unavailable.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{QuoteError, QuoteSource};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    indicators: Option<Indicators>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

const CHART_BASE_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart/";

pub struct YahooQuoteSource {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl YahooQuoteSource {
    /// Build a source whose every request is bounded by `timeout`.
    pub fn new(circuit_breaker: Arc<CircuitBreaker>, timeout: Duration) -> Result<Self, QuoteError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| QuoteError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            circuit_breaker,
        })
    }

    /// Chart URL with the ticker as a single percent-encoded path segment.
    fn chart_url(ticker: &str) -> Result<reqwest::Url, QuoteError> {
        let mut url = reqwest::Url::parse(CHART_BASE_URL)
            .map_err(|e| QuoteError::Other(format!("bad chart URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| QuoteError::Other("chart URL cannot take a path".into()))?
            .pop_if_empty()
            .push(ticker);
        url.query_pairs_mut()
            .append_pair("range", "1d")
            .append_pair("interval", "1d");
        Ok(url)
    }

    /// Map a transport failure. Only connect and timeout failures are retryable.
    fn send_error(&self, e: reqwest::Error) -> QuoteError {
        if e.is_timeout() {
            self.circuit_breaker.record_failure();
            QuoteError::Timeout(e.to_string())
        } else if e.is_connect() {
            self.circuit_breaker.record_failure();
            QuoteError::NetworkUnreachable(e.to_string())
        } else {
            QuoteError::Other(format!("request failed: {e}"))
        }
    }

    /// Extract the latest session close from a chart response.
    ///
    /// Takes the first non-null close of the returned session, falling back
    /// to `meta.regularMarketPrice` when the bar has no close yet.
    fn parse_response(ticker: &str, resp: ChartResponse) -> Result<f64, QuoteError> {
        let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
            Some(err) if err.code == "Not Found" => QuoteError::SymbolNotFound {
                ticker: ticker.to_string(),
            },
            Some(err) => {
                QuoteError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
            }
            None => QuoteError::ResponseFormatChanged("empty result with no error".into()),
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| QuoteError::ResponseFormatChanged("result array is empty".into()))?;

        let close = data
            .indicators
            .and_then(|ind| ind.quote.into_iter().next())
            .and_then(|q| q.close.into_iter().flatten().next());
        let market_price = data.meta.and_then(|m| m.regular_market_price);

        match close.or(market_price) {
            Some(price) if price.is_finite() && price > 0.0 => Ok(price),
            Some(price) => Err(QuoteError::ResponseFormatChanged(format!(
                "non-positive price {price} for {ticker}"
            ))),
            None => Err(QuoteError::SymbolNotFound {
                ticker: ticker.to_string(),
            }),
        }
    }
}

impl QuoteSource for YahooQuoteSource {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn latest_price(&self, ticker: &str) -> Result<f64, QuoteError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(QuoteError::CircuitBreakerTripped);
        }

        let url = Self::chart_url(ticker)?;
        debug!("GET {url}");

        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| self.send_error(e))?;

        let status = resp.status();

        if status == reqwest::StatusCode::FORBIDDEN {
            // Blocked: stop every further lookup until the cooldown ends
            self.circuit_breaker.trip();
            return Err(QuoteError::CircuitBreakerTripped);
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            self.circuit_breaker.record_failure();
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(QuoteError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(QuoteError::AuthenticationRequired(
                "Yahoo Finance requires authentication".into(),
            ));
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(QuoteError::SymbolNotFound {
                ticker: ticker.to_string(),
            });
        }

        if !status.is_success() {
            self.circuit_breaker.record_failure();
            return Err(QuoteError::Http {
                status: status.as_u16(),
            });
        }

        let chart: ChartResponse = resp.json().map_err(|e| {
            QuoteError::ResponseFormatChanged(format!("failed to parse response for {ticker}: {e}"))
        })?;

        let price = Self::parse_response(ticker, chart)?;
        self.circuit_breaker.record_success();
        Ok(price)
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}
