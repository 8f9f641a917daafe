//! Domain types for the position ledger

pub mod position;
pub mod timestamp;

pub use position::{CloseReason, Direction, Evaluation, InvalidStatus, Position, Status};
