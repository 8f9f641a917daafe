//! Batch evaluation of every active position.
//!
//! Quote lookups fan out over a private rayon pool bounded by
//! `max_concurrency`; the results are applied in ledger order on the calling
//! thread and the ledger is written once at the end. A failed lookup only
//! skips its own record.

use chrono::NaiveDateTime;
use rayon::prelude::*;
use tracing::{info, warn};

use super::{now, EngineError, PositionEngine};
use crate::domain::{CloseReason, Evaluation};
use crate::ledger::Ledger;
use crate::quote::{fetch_with_retry, QuoteError};

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedPosition {
    pub operation_id: u64,
    pub ticker: String,
    pub reason: CloseReason,
    pub profitability: f64,
}

/// A record left untouched because its quote could not be fetched.
#[derive(Debug)]
pub struct SkippedPosition {
    pub operation_id: u64,
    pub ticker: String,
    pub error: QuoteError,
}

#[derive(Debug)]
pub struct EvaluationReport {
    /// When the batch's quotes were all in; used as the exit time of every close.
    pub evaluated_at: NaiveDateTime,
    /// Active records that were refreshed and stayed active.
    pub held: Vec<u64>,
    pub closed: Vec<ClosedPosition>,
    pub skipped: Vec<SkippedPosition>,
}

impl EvaluationReport {
    fn new(evaluated_at: NaiveDateTime) -> Self {
        Self {
            evaluated_at,
            held: Vec::new(),
            closed: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Number of records whose price was refreshed.
    pub fn evaluated(&self) -> usize {
        self.held.len() + self.closed.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.skipped.is_empty()
    }
}

impl PositionEngine<'_> {
    /// Refresh every active position and close those whose thresholds are breached.
    ///
    /// Closed records are not looked up. The ledger is saved once, and only
    /// if at least one record changed.
    pub fn evaluate(&self) -> Result<EvaluationReport, EngineError> {
        let mut ledger = Ledger::load(self.store)?;

        let targets: Vec<(usize, String)> = ledger
            .positions()
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_active())
            .map(|(i, p)| (i, p.ticker.clone()))
            .collect();

        if targets.is_empty() {
            info!("No active positions to evaluate ({} on ledger)", ledger.len());
            return Ok(EvaluationReport::new(now()));
        }

        let quotes = self.fetch_all(&targets)?;
        // Stamped after every quote is in, so no exit precedes its price.
        let mut report = EvaluationReport::new(now());
        let positions = ledger.positions_mut();

        for ((index, ticker), quote) in targets.into_iter().zip(quotes) {
            let position = &mut positions[index];
            let operation_id = position.operation_id;

            let price = match quote {
                Ok(price) => price,
                Err(error) => {
                    warn!("Skipping #{operation_id} {ticker}: {error}");
                    report.skipped.push(SkippedPosition {
                        operation_id,
                        ticker,
                        error,
                    });
                    continue;
                }
            };

            match position.apply_quote(price, report.evaluated_at) {
                Evaluation::Held { .. } => report.held.push(operation_id),
                Evaluation::Closed {
                    profitability,
                    reason,
                } => {
                    info!(
                        "Closed #{operation_id} {ticker} on {reason} at {price:.4} ({profitability:+.2}%)"
                    );
                    report.closed.push(ClosedPosition {
                        operation_id,
                        ticker,
                        reason,
                        profitability,
                    });
                }
                Evaluation::AlreadyClosed => {}
            }
        }

        if report.evaluated() > 0 {
            ledger.save(self.store)?;
        }

        info!(
            "Evaluated {} positions: {} held, {} closed, {} skipped",
            report.evaluated() + report.skipped.len(),
            report.held.len(),
            report.closed.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// One lookup per target, results in target order.
    fn fetch_all(
        &self,
        targets: &[(usize, String)],
    ) -> Result<Vec<Result<f64, QuoteError>>, EngineError> {
        let fetch = |ticker: &String| fetch_with_retry(self.quotes, ticker, &self.options.retry);

        let threads = self.options.max_concurrency.min(targets.len());
        if threads <= 1 {
            return Ok(targets.iter().map(|(_, ticker)| fetch(ticker)).collect());
        }

        // Private pool so the bound holds regardless of the global rayon pool.
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
        Ok(pool.install(|| targets.par_iter().map(|(_, ticker)| fetch(ticker)).collect()))
    }
}
