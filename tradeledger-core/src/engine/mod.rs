//! Position engine: opens positions and evaluates open ones.
//!
//! Every operation is a one-shot read-modify-write over the whole ledger:
//! load, mutate in memory, save once. On any error before the save, the
//! stored ledger is left exactly as it was.
//!
//! The engine assumes a single writer. Two processes running `open` or
//! `evaluate` against the same store at the same time can lose updates;
//! callers must serialize them.

mod evaluate;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::domain::Position;
use crate::ledger::{Ledger, LedgerError, LedgerStore};
use crate::quote::{fetch_with_retry, QuoteError, QuoteSource, RetryPolicy};

pub use evaluate::{ClosedPosition, EvaluationReport, SkippedPosition};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("quote unavailable for {ticker}: {source}")]
    QuoteUnavailable {
        ticker: String,
        #[source]
        source: QuoteError,
    },

    #[error("ledger storage unavailable: {0}")]
    StorageUnavailable(#[from] LedgerError),

    #[error("operation {operation_id} not found in ledger")]
    NotFound { operation_id: u64 },

    #[error("invalid thresholds (stop_loss={stop_loss}, take_profit={take_profit}): {reason}")]
    InvalidThresholds {
        stop_loss: f64,
        take_profit: f64,
        reason: &'static str,
    },

    #[error("failed to start quote worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// How `open` treats the stop-loss / take-profit pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdPolicy {
    /// Accept any pair; direction is derived from the ordering alone.
    #[default]
    Permissive,
    /// Require finite, positive, distinct thresholds.
    Strict,
}

impl ThresholdPolicy {
    pub fn check(&self, stop_loss: f64, take_profit: f64) -> Result<(), EngineError> {
        if *self == ThresholdPolicy::Permissive {
            return Ok(());
        }
        let reason = if !stop_loss.is_finite() || !take_profit.is_finite() {
            Some("thresholds must be finite")
        } else if stop_loss <= 0.0 || take_profit <= 0.0 {
            Some("thresholds must be positive prices")
        } else if stop_loss == take_profit {
            Some("stop_loss and take_profit must differ")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(EngineError::InvalidThresholds {
                stop_loss,
                take_profit,
                reason,
            }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineOptions {
    pub retry: RetryPolicy,
    /// Upper bound on concurrent quote lookups during evaluation.
    pub max_concurrency: usize,
    pub threshold_policy: ThresholdPolicy,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_concurrency: 4,
            threshold_policy: ThresholdPolicy::Permissive,
        }
    }
}

pub struct PositionEngine<'a> {
    store: &'a dyn LedgerStore,
    quotes: &'a dyn QuoteSource,
    options: EngineOptions,
}

impl<'a> PositionEngine<'a> {
    pub fn new(store: &'a dyn LedgerStore, quotes: &'a dyn QuoteSource, options: EngineOptions) -> Self {
        Self {
            store,
            quotes,
            options,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Open a position for `user_id` on `ticker` at the current quoted price.
    ///
    /// Appends exactly one record. Fails without writing if the quote or the
    /// ledger is unavailable.
    pub fn open(
        &self,
        user_id: &str,
        ticker: &str,
        stop_loss: f64,
        take_profit: f64,
    ) -> Result<Position, EngineError> {
        self.options.threshold_policy.check(stop_loss, take_profit)?;

        let mut ledger = Ledger::load(self.store)?;
        let operation_id = ledger.next_operation_id();

        let price = self.quote(ticker)?;
        let position = Position::open(
            user_id,
            operation_id,
            ticker,
            stop_loss,
            take_profit,
            price,
            now(),
        );

        ledger.append(position.clone());
        ledger.save(self.store)?;

        info!(
            "Opened #{} {} {} for {} at {:.4} (SL {}, TP {})",
            position.operation_id,
            position.operation,
            position.ticker,
            position.user_id,
            position.price_purchased,
            position.stop_loss,
            position.take_profit
        );
        Ok(position)
    }

    /// Full ledger, for read-only consumers such as reports.
    pub fn ledger(&self) -> Result<Ledger, EngineError> {
        Ok(Ledger::load(self.store)?)
    }

    /// A single position by operation id.
    pub fn position(&self, operation_id: u64) -> Result<Position, EngineError> {
        self.ledger()?
            .get(operation_id)
            .cloned()
            .ok_or(EngineError::NotFound { operation_id })
    }

    fn quote(&self, ticker: &str) -> Result<f64, EngineError> {
        fetch_with_retry(self.quotes, ticker, &self.options.retry).map_err(|source| {
            EngineError::QuoteUnavailable {
                ticker: ticker.to_string(),
                source,
            }
        })
    }
}

fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}
