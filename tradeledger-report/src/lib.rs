//! TradeLedger Report: per-user ranking over the position ledger.
//!
//! Reads the ledger through `tradeledger-core` and owns all aggregation:
//! - trailing-window filter on `timestamp_entry`
//! - per-user product of `profitability`
//! - CSV export of the ranking

pub mod ranking;

pub use ranking::{export_ranking_csv, rank_users, window_start, write_ranking, UserRanking};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write ranking CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
