//! Trailing-window user ranking.
//!
//! A user's score is the product of the `profitability` values of every
//! position they opened inside the window, active or closed. Users appear in
//! ascending `user_id` order.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{Duration, NaiveDateTime};
use tracing::info;
use tradeledger_core::Position;

use crate::ReportError;

#[derive(Debug, Clone, PartialEq)]
pub struct UserRanking {
    pub user_id: String,
    pub profitability: f64,
    /// Positions that contributed to the product. Not exported.
    pub positions: usize,
}

/// Oldest entry time excluded from a window of `window_days` ending at `as_of`.
pub fn window_start(as_of: NaiveDateTime, window_days: u32) -> NaiveDateTime {
    as_of - Duration::days(i64::from(window_days))
}

/// Rank users by the product of their position returns over the window.
///
/// Positions with `timestamp_entry` strictly after `as_of - window_days`
/// count. Users with no position in the window are omitted.
pub fn rank_users(positions: &[Position], as_of: NaiveDateTime, window_days: u32) -> Vec<UserRanking> {
    let since = window_start(as_of, window_days);

    let mut by_user: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for p in positions.iter().filter(|p| p.timestamp_entry > since) {
        let entry = by_user.entry(p.user_id.as_str()).or_insert((1.0, 0));
        entry.0 *= p.profitability;
        entry.1 += 1;
    }

    by_user
        .into_iter()
        .map(|(user_id, (profitability, positions))| UserRanking {
            user_id: user_id.to_string(),
            profitability,
            positions,
        })
        .collect()
}

/// Serialize a ranking as CSV with a `user_id,profitability` header.
pub fn export_ranking_csv(ranking: &[UserRanking]) -> Result<String, ReportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    // Written by hand so an empty ranking still carries the header.
    wtr.write_record(["user_id", "profitability"])?;
    for row in ranking {
        wtr.write_record([row.user_id.as_str(), &row.profitability.to_string()])?;
    }
    let bytes = wtr.into_inner().map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Write the ranking CSV to `path`, creating parent directories.
pub fn write_ranking(path: &Path, ranking: &[UserRanking]) -> Result<(), ReportError> {
    let io_err = |source: std::io::Error| ReportError::Io {
        path: path.to_path_buf(),
        source,
    };

    let csv = export_ranking_csv(ranking)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut file = fs::File::create(path).map_err(io_err)?;
    file.write_all(csv.as_bytes()).map_err(io_err)?;

    info!("Wrote ranking of {} users to {}", ranking.len(), path.display());
    Ok(())
}
