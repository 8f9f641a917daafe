//! TradeLedger Core: position ledger, quote sources, and the open/evaluate engine.
//!
//! This crate contains the position lifecycle:
//! - Domain types (positions, direction, lifecycle status, close reasons)
//! - Ledger with whole-table load/save over a pluggable store (CSV file, memory)
//! - Quote sources (Yahoo Finance, price sheet) with retry and a circuit breaker
//! - Engine that opens positions and re-evaluates open ones against thresholds
//! - TOML configuration

pub mod config;
pub mod domain;
pub mod engine;
pub mod ledger;
pub mod quote;

pub use config::{ConfigError, TradeLedgerConfig};
pub use domain::{CloseReason, Direction, Evaluation, Position, Status};
pub use engine::{
    ClosedPosition, EngineError, EngineOptions, EvaluationReport, PositionEngine,
    SkippedPosition, ThresholdPolicy,
};
pub use ledger::{CsvLedgerStore, Ledger, LedgerError, LedgerStore, MemoryLedgerStore};
pub use quote::{QuoteError, QuoteSource, RetryPolicy, StaticQuotes, YahooQuoteSource};
