//! Second-precision timestamps as stored in the ledger.
//!
//! Movements carry a naive local date-time rendered as `YYYY-MM-DD HH:MM:SS`.
//! The string form sorts lexicographically in chronological order, which the
//! SQLite backend relies on.

use chrono::{Local, NaiveDateTime, SubsecRound};

use crate::{Error, Result};

/// Canonical on-disk format.
pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Formats accepted on input, tried in order. `%.f` also matches an absent
/// fractional part.
const ACCEPTED: &[&str] = &[
  "%Y-%m-%d %H:%M:%S%.f",
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%d %H:%M",
  "%Y-%m-%dT%H:%M",
];

/// The current local time, truncated to whole seconds.
pub fn now() -> NaiveDateTime { Local::now().naive_local().trunc_subsecs(0) }

pub fn format(ts: NaiveDateTime) -> String { ts.format(FORMAT).to_string() }

/// Parse a combined timestamp; sub-second precision is discarded.
pub fn parse(raw: &str) -> Result<NaiveDateTime> {
  let trimmed = raw.trim();
  ACCEPTED
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
    .map(|ts| ts.trunc_subsecs(0))
    .ok_or_else(|| Error::InvalidTimestamp(raw.to_owned()))
}

/// Build a timestamp from the legacy separate `date` and `time` fields.
pub fn combine(date: &str, time: &str) -> Result<NaiveDateTime> {
  parse(&format!("{} {}", date.trim(), time.trim()))
}

/// `#[serde(with = "...")]` adapter for the canonical format.
pub mod serde_format {
  use chrono::NaiveDateTime;
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(
    ts: &NaiveDateTime,
    serializer: S,
  ) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&super::format(*ts))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(
    deserializer: D,
  ) -> Result<NaiveDateTime, D::Error> {
    let raw = String::deserialize(deserializer)?;
    super::parse(&raw).map_err(serde::de::Error::custom)
  }
}
