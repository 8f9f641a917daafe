//! Ledger timestamp format.
//!
//! Timestamps are naive local times written as `YYYY-MM-DD HH:MM:SS.ffffff`.
//! Parsing also accepts the ISO `T` separator and a missing fraction, so
//! ledgers produced by other tools load unchanged.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serializer};

/// Format used when writing timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Parse a ledger timestamp in any accepted layout.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    let raw = raw.trim();
    // `%.f` also matches a missing fraction
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, ISO_FORMAT))
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Serde adapter for a required timestamp column.
pub mod required {
    use super::*;

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for an optional timestamp column (empty field = unset).
pub mod optional {
    use super::*;

    pub fn serialize<S: Serializer>(ts: &Option<NaiveDateTime>, s: S) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => s.serialize_some(&format_timestamp(ts)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDateTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") | Some("NaN") | Some("nan") | Some("NaT") => Ok(None),
            Some(s) => parse_timestamp(s).map(Some).map_err(serde::de::Error::custom),
        }
    }
}
