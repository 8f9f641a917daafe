//! Position ledger: the ordered collection of every position ever opened.
//!
//! The ledger is append-only. Row order is insertion order, and operation
//! ids are derived from the row count, so removing a row would let a later
//! open reuse an existing id. Nothing in this crate deletes rows.

pub mod store;

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::Position;

pub use store::{CsvLedgerStore, LedgerStore, MemoryLedgerStore, LEDGER_COLUMNS};

/// Storage-level failures. Any of these makes the ledger unavailable.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("no ledger at {} (run `init` to create one)", .path.display())]
    Missing { path: PathBuf },

    #[error("failed to read ledger {}: {reason}", .path.display())]
    Read { path: PathBuf, reason: String },

    #[error("failed to write ledger {}: {reason}", .path.display())]
    Write { path: PathBuf, reason: String },

    #[error("malformed ledger row {row}: {reason}")]
    Malformed { row: usize, reason: String },
}

/// Identity for the next position: the number of records already present.
pub fn next_operation_id(positions: &[Position]) -> u64 {
    positions.len() as u64
}

/// In-memory ledger state between a load and a save.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    positions: Vec<Position>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_positions(positions: Vec<Position>) -> Self {
        Self { positions }
    }

    /// Read the whole ledger from a store.
    pub fn load(store: &dyn LedgerStore) -> Result<Self, LedgerError> {
        store.load().map(Self::from_positions)
    }

    /// Replace the whole stored ledger with this state.
    pub fn save(&self, store: &dyn LedgerStore) -> Result<(), LedgerError> {
        store.save(&self.positions)
    }

    pub fn next_operation_id(&self) -> u64 {
        next_operation_id(&self.positions)
    }

    pub fn append(&mut self, position: Position) {
        self.positions.push(position);
    }

    pub fn get(&self, operation_id: u64) -> Option<&Position> {
        self.positions.iter().find(|p| p.operation_id == operation_id)
    }

    pub fn active(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter().filter(|p| p.is_active())
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub(crate) fn positions_mut(&mut self) -> &mut [Position] {
        &mut self.positions
    }

    pub fn into_positions(self) -> Vec<Position> {
        self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
