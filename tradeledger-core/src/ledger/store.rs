//! Ledger stores: whole-table read and whole-table replace.
//!
//! Layout of the CSV store: one header row with [`LEDGER_COLUMNS`], then one
//! row per position in insertion order.
//!
//! Writes are atomic: the full table goes to `{file}.tmp`, is synced, then
//! renamed over the ledger. A reader sees either the old table or the new one.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use super::LedgerError;
use crate::domain::Position;

/// Column names, in persisted order.
pub const LEDGER_COLUMNS: [&str; 12] = [
    "user_id",
    "operation_id",
    "timestamp_entry",
    "timestamp_exit",
    "ticker",
    "operation",
    "current_price",
    "price_purchased",
    "profitability",
    "stop_loss",
    "take_profit",
    "status_transaction",
];

/// Durable home of the ledger.
///
/// Implementations never expose partial updates: `save` replaces everything.
pub trait LedgerStore: Send + Sync {
    /// Human-readable location, used in logs.
    fn describe(&self) -> String;

    /// Read every record in row order.
    fn load(&self) -> Result<Vec<Position>, LedgerError>;

    /// Replace every record.
    fn save(&self, positions: &[Position]) -> Result<(), LedgerError>;
}

/// CSV file on disk.
#[derive(Debug, Clone)]
pub struct CsvLedgerStore {
    path: PathBuf,
}

impl CsvLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create an empty ledger (header only) if none exists yet.
    ///
    /// Returns `Ok(true)` if a file was created, `Ok(false)` if one was already there.
    pub fn init(&self) -> Result<bool, LedgerError> {
        if self.path.exists() {
            return Ok(false);
        }
        self.save(&[])?;
        Ok(true)
    }

    fn tmp_path(&self) -> Result<PathBuf, LedgerError> {
        let mut name = self
            .path
            .file_name()
            .ok_or_else(|| self.write_error("ledger path has no file name"))?
            .to_os_string();
        name.push(".tmp");
        Ok(self.path.with_file_name(name))
    }

    fn read_error(&self, reason: impl ToString) -> LedgerError {
        LedgerError::Read {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    fn write_error(&self, reason: impl ToString) -> LedgerError {
        LedgerError::Write {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    fn write_table(&self, tmp_path: &Path, positions: &[Position]) -> Result<(), LedgerError> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(tmp_path)
            .map_err(|e| self.write_error(e))?;

        wtr.write_record(LEDGER_COLUMNS)
            .map_err(|e| self.write_error(e))?;
        for position in positions {
            wtr.serialize(position).map_err(|e| self.write_error(e))?;
        }

        let file = wtr
            .into_inner()
            .map_err(|e| self.write_error(format!("flush failed: {e}")))?;
        file.sync_all().map_err(|e| self.write_error(e))
    }
}

impl LedgerStore for CsvLedgerStore {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<Vec<Position>, LedgerError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(LedgerError::Missing {
                    path: self.path.clone(),
                })
            }
            Err(e) => return Err(self.read_error(e)),
        };

        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(file);

        let headers = rdr.headers().map_err(|e| self.read_error(e))?.clone();
        if let Some(missing) = LEDGER_COLUMNS
            .iter()
            .find(|col| !headers.iter().any(|h| h == **col))
        {
            return Err(LedgerError::Malformed {
                row: 0,
                reason: format!("header is missing column '{missing}'"),
            });
        }

        let mut positions = Vec::new();
        for (i, record) in rdr.deserialize::<Position>().enumerate() {
            let position = record.map_err(|e| LedgerError::Malformed {
                row: i + 1,
                reason: e.to_string(),
            })?;
            positions.push(position);
        }

        debug!("Loaded {} positions from {}", positions.len(), self.describe());
        Ok(positions)
    }

    fn save(&self, positions: &[Position]) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.write_error(e))?;
        }

        let tmp_path = self.tmp_path()?;
        if let Err(e) = self.write_table(&tmp_path, positions) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        // Atomic rename
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            self.write_error(format!("atomic rename failed: {e}"))
        })?;

        debug!("Saved {} positions to {}", positions.len(), self.describe());
        Ok(())
    }
}

/// Ledger held in process memory. Starts empty.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    positions: Mutex<Vec<Position>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_positions(positions: Vec<Position>) -> Self {
        Self {
            positions: Mutex::new(positions),
        }
    }

    /// Copy of the current stored table.
    pub fn snapshot(&self) -> Vec<Position> {
        self.positions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn load(&self) -> Result<Vec<Position>, LedgerError> {
        Ok(self.snapshot())
    }

    fn save(&self, positions: &[Position]) -> Result<(), LedgerError> {
        *self.positions.lock().unwrap_or_else(PoisonError::into_inner) = positions.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Direction, Status};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn opened(id: u64, stop_loss: f64, take_profit: f64) -> Position {
        let at = NaiveDate::from_ymd_opt(2024, 2, 1)
            .unwrap()
            .and_hms_micro_opt(14, 5, 6, 789_012)
            .unwrap();
        Position::open(format!("user{id}"), id, "MSFT", stop_loss, take_profit, 410.25, at)
    }

    #[test]
    fn init_writes_header_only_once() {
        let tmp = TempDir::new().unwrap();
        let store = CsvLedgerStore::new(tmp.path().join("transactions.csv"));

        assert!(store.init().unwrap());
        assert!(!store.init().unwrap());

        let content = fs::read_to_string(store.path()).unwrap();
        assert_eq!(content.trim_end(), LEDGER_COLUMNS.join(","));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn init_does_not_clobber_existing_rows() {
        let tmp = TempDir::new().unwrap();
        let store = CsvLedgerStore::new(tmp.path().join("transactions.csv"));
        store.save(&[opened(0, 400.0, 450.0)]).unwrap();

        assert!(!store.init().unwrap());
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn save_then_load_preserves_every_field() {
        let tmp = TempDir::new().unwrap();
        let store = CsvLedgerStore::new(tmp.path().join("transactions.csv"));

        let active = opened(0, 400.0, 450.0);
        let mut closed = opened(1, 420.0, 380.0);
        let exit_at = closed.timestamp_entry + chrono::Duration::hours(3);
        closed.apply_quote(377.5, exit_at);
        assert_eq!(closed.status_transaction, Status::Closed);

        store.save(&[active.clone(), closed.clone()]).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded, vec![active, closed]);
        assert_eq!(loaded[1].operation, Direction::Short);
        assert_eq!(loaded[1].timestamp_exit, Some(exit_at));
    }

    #[test]
    fn persisted_rows_use_flag_and_lowercase_direction() {
        let tmp = TempDir::new().unwrap();
        let store = CsvLedgerStore::new(tmp.path().join("transactions.csv"));
        store.save(&[opened(0, 400.0, 450.0)]).unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        let row = content.lines().nth(1).unwrap();
        assert_eq!(
            row,
            "user0,0,2024-02-01 14:05:06.789012,,MSFT,long,410.25,410.25,0.0,400.0,450.0,1"
        );
    }

    #[test]
    fn loads_rows_written_by_other_tools() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("transactions.csv");
        fs::write(
            &path,
            "user_id,operation_id,timestamp_entry,timestamp_exit,ticker,operation,\
             current_price,price_purchased,profitability,stop_loss,take_profit,status_transaction\n\
             7,0,2024-01-05 10:00:00.123456,,AAPL,long,185.1,185.1,0,180,200,1\n\
             7,1,2024-01-06 10:00:00,2024-01-07 11:30:00,TSLA,short,250,238.4,-4.87,245,220,0\n",
        )
        .unwrap();

        let loaded = CsvLedgerStore::new(&path).load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].user_id, "7");
        assert!(loaded[0].timestamp_exit.is_none());
        assert_eq!(loaded[1].status_transaction, Status::Closed);
        assert!(loaded[1].timestamp_exit.is_some());
        assert_eq!(loaded[1].profitability, -4.87);
    }

    #[test]
    fn missing_file_is_reported_as_missing() {
        let tmp = TempDir::new().unwrap();
        let store = CsvLedgerStore::new(tmp.path().join("nope.csv"));
        assert!(matches!(store.load(), Err(LedgerError::Missing { .. })));
    }

    #[test]
    fn missing_column_is_malformed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("transactions.csv");
        fs::write(&path, "user_id,operation_id\n1,0\n").unwrap();

        let err = CsvLedgerStore::new(&path).load().unwrap_err();
        assert!(matches!(err, LedgerError::Malformed { row: 0, .. }));
    }

    #[test]
    fn bad_row_reports_its_position() {
        let tmp = TempDir::new().unwrap();
        let store = CsvLedgerStore::new(tmp.path().join("transactions.csv"));
        store.save(&[opened(0, 400.0, 450.0)]).unwrap();

        let mut content = fs::read_to_string(store.path()).unwrap();
        content.push_str("user1,1,not-a-time,,MSFT,long,1,1,0,1,2,1\n");
        fs::write(store.path(), content).unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err, LedgerError::Malformed { row: 2, .. }));
    }

    #[test]
    fn save_leaves_no_temp_file_behind() {
        let tmp = TempDir::new().unwrap();
        let store = CsvLedgerStore::new(tmp.path().join("transactions.csv"));
        store.save(&[opened(0, 400.0, 450.0)]).unwrap();

        let names: Vec<String> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["transactions.csv".to_string()]);
    }

    #[test]
    fn save_creates_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let store = CsvLedgerStore::new(tmp.path().join("nested/dir/transactions.csv"));
        store.save(&[]).unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn failed_write_keeps_previous_table() {
        let tmp = TempDir::new().unwrap();
        let store = CsvLedgerStore::new(tmp.path().join("transactions.csv"));
        store.save(&[opened(0, 400.0, 450.0)]).unwrap();

        // A directory squatting on the temp path makes the write fail
        fs::create_dir(tmp.path().join("transactions.csv.tmp")).unwrap();
        let err = store.save(&[opened(0, 400.0, 450.0), opened(1, 1.0, 2.0)]);
        assert!(matches!(err, Err(LedgerError::Write { .. })));

        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn memory_store_replaces_whole_table() {
        let store = MemoryLedgerStore::with_positions(vec![opened(0, 1.0, 2.0)]);
        store.save(&[opened(0, 1.0, 2.0), opened(1, 1.0, 2.0)]).unwrap();
        assert_eq!(store.load().unwrap().len(), 2);
        store.save(&[]).unwrap();
        assert!(store.snapshot().is_empty());
    }
}
