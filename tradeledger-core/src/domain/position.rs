//! Position record and its lifecycle rules.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::timestamp;

/// Trade direction, derived once from the threshold ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// `Long` when the stop sits below the target, `Short` otherwise.
    ///
    /// Equal thresholds resolve to `Short`.
    pub fn from_thresholds(stop_loss: f64, take_profit: f64) -> Self {
        if stop_loss < take_profit {
            Direction::Long
        } else {
            Direction::Short
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

/// Lifecycle flag, persisted as `1` (active) / `0` (closed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Status {
    Active,
    Closed,
}

#[derive(Debug, Error)]
#[error("invalid status_transaction value {0} (expected 1 or 0)")]
pub struct InvalidStatus(pub u8);

impl From<Status> for u8 {
    fn from(status: Status) -> u8 {
        match status {
            Status::Active => 1,
            Status::Closed => 0,
        }
    }
}

impl TryFrom<u8> for Status {
    type Error = InvalidStatus;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Status::Active),
            0 => Ok(Status::Closed),
            other => Err(InvalidStatus(other)),
        }
    }
}

/// Which threshold closed a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::StopLoss => write!(f, "stop-loss"),
            CloseReason::TakeProfit => write!(f, "take-profit"),
        }
    }
}

/// Outcome of applying one quote to a position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Evaluation {
    /// Price and profitability refreshed, still active.
    Held { profitability: f64 },
    /// A threshold was breached; the position is now closed.
    Closed {
        profitability: f64,
        reason: CloseReason,
    },
    /// The position was already closed and was left untouched.
    AlreadyClosed,
}

/// One tracked trade. Field order is the ledger column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub user_id: String,
    pub operation_id: u64,
    #[serde(with = "timestamp::required")]
    pub timestamp_entry: NaiveDateTime,
    #[serde(with = "timestamp::optional")]
    pub timestamp_exit: Option<NaiveDateTime>,
    pub ticker: String,
    pub operation: Direction,
    pub current_price: f64,
    pub price_purchased: f64,
    pub profitability: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub status_transaction: Status,
}

impl Position {
    /// A freshly opened position at `price`.
    pub fn open(
        user_id: impl Into<String>,
        operation_id: u64,
        ticker: impl Into<String>,
        stop_loss: f64,
        take_profit: f64,
        price: f64,
        opened_at: NaiveDateTime,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            operation_id,
            timestamp_entry: opened_at,
            timestamp_exit: None,
            ticker: ticker.into(),
            operation: Direction::from_thresholds(stop_loss, take_profit),
            current_price: price,
            price_purchased: price,
            profitability: 0.0,
            stop_loss,
            take_profit,
            status_transaction: Status::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status_transaction == Status::Active
    }

    /// Signed percentage return at `price`, rounded to two decimals.
    ///
    /// A non-positive purchase price yields 0.
    pub fn profitability_at(&self, price: f64) -> f64 {
        if self.price_purchased <= 0.0 {
            return 0.0;
        }
        let delta = match self.operation {
            Direction::Long => price - self.price_purchased,
            Direction::Short => self.price_purchased - price,
        };
        round2(100.0 * delta / self.price_purchased)
    }

    /// Threshold breached at `price`, if any. Stop-loss is tested first.
    pub fn close_trigger(&self, price: f64) -> Option<CloseReason> {
        let (stop_hit, target_hit) = match self.operation {
            Direction::Long => (price < self.stop_loss, price > self.take_profit),
            Direction::Short => (price > self.stop_loss, price < self.take_profit),
        };
        if stop_hit {
            Some(CloseReason::StopLoss)
        } else if target_hit {
            Some(CloseReason::TakeProfit)
        } else {
            None
        }
    }

    /// Refresh the position against a new quote and apply the close rule.
    ///
    /// Closed positions are terminal: nothing is modified.
    pub fn apply_quote(&mut self, price: f64, at: NaiveDateTime) -> Evaluation {
        if !self.is_active() {
            return Evaluation::AlreadyClosed;
        }

        let profitability = self.profitability_at(price);
        self.profitability = profitability;
        self.current_price = price;

        match self.close_trigger(price) {
            Some(reason) => {
                self.status_transaction = Status::Closed;
                self.timestamp_exit = Some(at);
                Evaluation::Closed {
                    profitability,
                    reason,
                }
            }
            None => Evaluation::Held { profitability },
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
