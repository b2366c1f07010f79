//! Feature extraction for anomaly scoring.
//!
//! Rows arrive loosely typed: they may come straight from the ledger or from
//! an external JSON export in either the canonical or the legacy layout.
//! Column presence is checked across the whole input before any row is
//! looked at.

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  movement::{Movement, MovementId, MovementType},
  product::ProductId,
  timestamp,
};

/// Columns per feature row: quantity, is_exit, hour_of_day, day_of_week.
pub const FEATURE_COUNT: usize = 4;

pub type Features = [f64; FEATURE_COUNT];

/// A ledger row as seen by the detector. Every field is optional so that
/// incomplete exports can be diagnosed instead of failing to parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerRow {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id:            Option<MovementId>,
  #[serde(
    default,
    alias = "datetime",
    alias = "Fecha_Hora",
    skip_serializing_if = "Option::is_none"
  )]
  pub timestamp:     Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub date:          Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub time:          Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub product_id:    Option<ProductId>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub product_name:  Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub movement_type: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub quantity:      Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub stock_after:   Option<i64>,
}

impl From<&Movement> for LedgerRow {
  fn from(m: &Movement) -> Self {
    Self {
      id:            Some(m.id),
      timestamp:     Some(timestamp::format(m.timestamp)),
      date:          None,
      time:          None,
      product_id:    Some(m.product_id),
      product_name:  Some(m.product_name.clone()),
      movement_type: Some(m.movement_type.as_str().to_owned()),
      quantity:      Some(m.quantity as f64),
      stock_after:   Some(m.stock_after),
    }
  }
}

impl LedgerRow {
  /// Resolve the row's timestamp, preferring the combined field.
  fn resolve_timestamp(&self) -> Option<NaiveDateTime> {
    match (&self.timestamp, &self.date, &self.time) {
      (Some(ts), _, _) => timestamp::parse(ts).ok(),
      (None, Some(date), Some(time)) => timestamp::combine(date, time).ok(),
      _ => None,
    }
  }

  fn is_exit(&self) -> bool {
    self
      .movement_type
      .as_deref()
      .and_then(|t| t.parse::<MovementType>().ok())
      .is_some_and(MovementType::is_exit)
  }
}

/// A row that survived timestamp parsing, with its numeric features.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
  pub row:       LedgerRow,
  pub timestamp: NaiveDateTime,
  pub features:  Features,
}

impl FeatureRow {
  pub fn quantity(&self) -> f64 { self.features[0] }

  pub fn is_exit(&self) -> bool { self.features[1] > 0.5 }
}

/// Feature rows in chronological order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSet {
  pub rows: Vec<FeatureRow>,
}

impl FeatureSet {
  pub fn len(&self) -> usize { self.rows.len() }

  pub fn is_empty(&self) -> bool { self.rows.is_empty() }

  pub fn matrix(&self) -> Vec<Features> { self.rows.iter().map(|r| r.features).collect() }
}

/// Build the feature matrix for `rows`.
///
/// Fails if no time source or a required column is absent from every row.
/// Rows whose timestamp does not parse are dropped; an unparseable quantity
/// counts as zero.
pub fn build_features(rows: &[LedgerRow]) -> Result<FeatureSet> {
  if rows.is_empty() {
    return Ok(FeatureSet::default());
  }
  check_columns(rows)?;

  let mut out: Vec<FeatureRow> = rows
    .iter()
    .filter_map(|row| {
      let timestamp = row.resolve_timestamp()?;
      let quantity = row.quantity.filter(|q| q.is_finite()).unwrap_or(0.0);
      let features = [
        quantity,
        if row.is_exit() { 1.0 } else { 0.0 },
        f64::from(timestamp.hour()),
        f64::from(timestamp.weekday().num_days_from_monday()),
      ];
      Some(FeatureRow { row: row.clone(), timestamp, features })
    })
    .collect();

  out.sort_by_key(|r| r.timestamp);
  Ok(FeatureSet { rows: out })
}

fn check_columns(rows: &[LedgerRow]) -> Result<()> {
  let has = |f: fn(&LedgerRow) -> bool| rows.iter().any(f);

  let has_combined = has(|r| r.timestamp.is_some());
  let has_date = has(|r| r.date.is_some());
  let has_time = has(|r| r.time.is_some());
  if !has_combined && !(has_date && has_time) {
    let mut missing = vec!["timestamp".to_owned()];
    if !has_date {
      missing.push("date".to_owned());
    }
    if !has_time {
      missing.push("time".to_owned());
    }
    return Err(Error::MissingTimeColumns(missing));
  }

  let mut missing = Vec::new();
  if !has(|r| r.quantity.is_some()) {
    missing.push("quantity".to_owned());
  }
  if !has(|r| r.movement_type.is_some()) {
    missing.push("movement_type".to_owned());
  }
  if !missing.is_empty() {
    return Err(Error::MissingRequiredColumns(missing));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn row(ts: &str, kind: &str, quantity: f64) -> LedgerRow {
    LedgerRow {
      timestamp: Some(ts.to_owned()),
      movement_type: Some(kind.to_owned()),
      quantity: Some(quantity),
      ..Default::default()
    }
  }

  #[test]
  fn features_are_quantity_direction_hour_weekday() {
    // 2025-06-04 is a Wednesday.
    let set = build_features(&[row("2025-06-04 17:30:00", "Salida", 4.0)]).unwrap();
    assert_eq!(set.matrix(), vec![[4.0, 1.0, 17.0, 2.0]]);
  }

  #[test]
  fn rows_are_sorted_and_unparseable_dropped() {
    let set = build_features(&[
      row("2025-06-04 17:30:00", "Ingreso", 1.0),
      row("not a date", "Ingreso", 2.0),
      row("2025-06-03 08:00:00", "Ingreso", 3.0),
    ])
    .unwrap();
    let quantities: Vec<_> = set.rows.iter().map(FeatureRow::quantity).collect();
    assert_eq!(quantities, vec![3.0, 1.0]);
  }

  #[test]
  fn legacy_date_and_time_pair_is_accepted() {
    let legacy = LedgerRow {
      date: Some("2025-06-02".into()),
      time: Some("09:15".into()),
      movement_type: Some("Ingreso".into()),
      quantity: Some(5.0),
      ..Default::default()
    };
    let set = build_features(&[legacy]).unwrap();
    assert_eq!(set.rows[0].features, [5.0, 0.0, 9.0, 0.0]);
  }

  #[test]
  fn missing_time_columns_are_listed() {
    let no_time = LedgerRow {
      date: Some("2025-06-02".into()),
      movement_type: Some("Salida".into()),
      quantity: Some(1.0),
      ..Default::default()
    };
    match build_features(&[no_time]) {
      Err(Error::MissingTimeColumns(cols)) => {
        assert_eq!(cols, vec!["timestamp".to_owned(), "time".to_owned()]);
      }
      other => panic!("unexpected result: {other:?}"),
    }
  }

  #[test]
  fn missing_required_columns_are_listed() {
    let bare = LedgerRow {
      timestamp: Some("2025-06-02 09:00:00".into()),
      ..Default::default()
    };
    match build_features(&[bare]) {
      Err(Error::MissingRequiredColumns(cols)) => {
        assert_eq!(cols, vec!["quantity".to_owned(), "movement_type".to_owned()]);
      }
      other => panic!("unexpected result: {other:?}"),
    }
  }

  #[test]
  fn rows_deserialize_from_exported_json() {
    let rows: Vec<LedgerRow> = serde_json::from_str(
      r#"[{"Fecha_Hora": "2025-06-02 09:00:00", "movement_type": "salida",
           "quantity": 2, "product_id": 7}]"#,
    )
    .unwrap();
    let set = build_features(&rows).unwrap();
    assert!(set.rows[0].is_exit());
    assert_eq!(set.rows[0].row.product_id, Some(ProductId(7)));
  }
}
