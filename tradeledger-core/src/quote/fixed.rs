//! Fixed price table, filled in code or from a `ticker,price` CSV sheet.
//!
//! Used for offline runs and as the deterministic source in tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use serde::Deserialize;

use super::provider::{QuoteError, QuoteSource};

#[derive(Debug, Deserialize)]
struct SheetRow {
    ticker: String,
    price: f64,
}

/// Prices keyed by upper-cased ticker.
#[derive(Debug, Default)]
pub struct StaticQuotes {
    prices: RwLock<HashMap<String, f64>>,
}

impl StaticQuotes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        let prices = pairs
            .into_iter()
            .map(|(ticker, price)| (normalize(ticker.as_ref()), price))
            .collect();
        Self {
            prices: RwLock::new(prices),
        }
    }

    /// Load a price sheet with a `ticker,price` header.
    pub fn from_csv(path: &Path) -> Result<Self, QuoteError> {
        let mut rdr = csv::Reader::from_path(path)
            .map_err(|e| QuoteError::PriceSheet(format!("{}: {e}", path.display())))?;

        let mut prices = HashMap::new();
        for (i, row) in rdr.deserialize::<SheetRow>().enumerate() {
            let row = row.map_err(|e| {
                QuoteError::PriceSheet(format!("{} row {}: {e}", path.display(), i + 1))
            })?;
            prices.insert(normalize(&row.ticker), row.price);
        }

        Ok(Self {
            prices: RwLock::new(prices),
        })
    }

    /// Set or replace the price for `ticker`.
    pub fn set(&self, ticker: &str, price: f64) {
        self.prices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalize(ticker), price);
    }

    pub fn remove(&self, ticker: &str) {
        self.prices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&normalize(ticker));
    }

    pub fn len(&self) -> usize {
        self.prices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl QuoteSource for StaticQuotes {
    fn name(&self) -> &str {
        "static"
    }

    fn latest_price(&self, ticker: &str) -> Result<f64, QuoteError> {
        self.prices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&normalize(ticker))
            .copied()
            .ok_or_else(|| QuoteError::SymbolNotFound {
                ticker: ticker.to_string(),
            })
    }
}

fn normalize(ticker: &str) -> String {
    ticker.trim().to_ascii_uppercase()
}
