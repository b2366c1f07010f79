//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored in the ledger's `YYYY-MM-DD HH:MM:SS` form, prices as
//! decimal strings, and movement types as their persisted labels.

use std::str::FromStr;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use stockroom_core::{
  anomaly::AnomalyRecord,
  movement::{Movement, MovementType},
  product::{Product, ProductId},
  timestamp,
};

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_ts(ts: NaiveDateTime) -> String { timestamp::format(ts) }

pub fn decode_ts(column: &'static str, s: &str) -> Result<NaiveDateTime> {
  timestamp::parse(s).map_err(|_| Error::Decode { column, value: s.to_owned() })
}

pub fn encode_price(price: Decimal) -> String { price.normalize().to_string() }

pub fn decode_price(column: &'static str, s: &str) -> Result<Decimal> {
  Decimal::from_str(s).map_err(|_| Error::Decode { column, value: s.to_owned() })
}

pub fn decode_movement_type(s: &str) -> Result<MovementType> {
  s.parse()
    .map_err(|_| Error::Decode { column: "movement_type", value: s.to_owned() })
}

/// Text form of [`AnomalyRecord::dedup_key`], backing the archive's UNIQUE
/// constraint.
pub fn encode_dedup_key(record: &AnomalyRecord) -> String {
  let (product_id, ts, movement_type, quantity) = record.dedup_key();
  let product_id = product_id.map(|p| p.to_string()).unwrap_or_default();
  format!("{product_id}|{}|{movement_type}|{quantity}", encode_ts(ts))
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const PRODUCT_COLUMNS: &str =
  "product_id, name, category, price, minimum_stock, stock";

/// Raw values read directly from a `products` row.
pub struct RawProduct {
  pub product_id:    i64,
  pub name:          String,
  pub category:      String,
  pub price:         String,
  pub minimum_stock: i64,
  pub stock:         i64,
}

impl RawProduct {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      product_id:    row.get(0)?,
      name:          row.get(1)?,
      category:      row.get(2)?,
      price:         row.get(3)?,
      minimum_stock: row.get(4)?,
      stock:         row.get(5)?,
    })
  }

  pub fn into_product(self) -> Result<Product> {
    Ok(Product {
      product_id:    ProductId(self.product_id),
      name:          self.name,
      category:      self.category,
      price:         decode_price("price", &self.price)?,
      minimum_stock: self.minimum_stock,
      stock:         self.stock,
    })
  }
}

pub const MOVEMENT_COLUMNS: &str = "id, timestamp, product_id, product_name, \
                                    minimum_stock, category, price_per_unit, \
                                    movement_type, quantity, stock_before, \
                                    stock_after";

/// Raw values read directly from a `movements` row.
pub struct RawMovement {
  pub id:             i64,
  pub timestamp:      String,
  pub product_id:     i64,
  pub product_name:   String,
  pub minimum_stock:  i64,
  pub category:       String,
  pub price_per_unit: String,
  pub movement_type:  String,
  pub quantity:       i64,
  pub stock_before:   i64,
  pub stock_after:    i64,
}

impl RawMovement {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:             row.get(0)?,
      timestamp:      row.get(1)?,
      product_id:     row.get(2)?,
      product_name:   row.get(3)?,
      minimum_stock:  row.get(4)?,
      category:       row.get(5)?,
      price_per_unit: row.get(6)?,
      movement_type:  row.get(7)?,
      quantity:       row.get(8)?,
      stock_before:   row.get(9)?,
      stock_after:    row.get(10)?,
    })
  }

  pub fn into_movement(self) -> Result<Movement> {
    Ok(Movement {
      id:             self.id,
      timestamp:      decode_ts("timestamp", &self.timestamp)?,
      product_id:     ProductId(self.product_id),
      product_name:   self.product_name,
      minimum_stock:  self.minimum_stock,
      category:       self.category,
      price_per_unit: decode_price("price_per_unit", &self.price_per_unit)?,
      movement_type:  decode_movement_type(&self.movement_type)?,
      quantity:       self.quantity,
      stock_before:   self.stock_before,
      stock_after:    self.stock_after,
    })
  }
}

pub const ANOMALY_COLUMNS: &str = "movement_id, timestamp, product_id, \
                                   product_name, movement_type, quantity, \
                                   stock_after, anomaly_score, motivo, \
                                   interpretacion, accion_sugerida";

/// Raw values read directly from an `anomalies` row.
pub struct RawAnomaly {
  pub movement_id:      Option<i64>,
  pub timestamp:        String,
  pub product_id:       Option<i64>,
  pub product_name:     Option<String>,
  pub movement_type:    String,
  pub quantity:         i64,
  pub stock_after:      Option<i64>,
  pub anomaly_score:    f64,
  pub reason:           String,
  pub interpretation:   String,
  pub suggested_action: String,
}

impl RawAnomaly {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      movement_id:      row.get(0)?,
      timestamp:        row.get(1)?,
      product_id:       row.get(2)?,
      product_name:     row.get(3)?,
      movement_type:    row.get(4)?,
      quantity:         row.get(5)?,
      stock_after:      row.get(6)?,
      anomaly_score:    row.get(7)?,
      reason:           row.get(8)?,
      interpretation:   row.get(9)?,
      suggested_action: row.get(10)?,
    })
  }

  pub fn into_record(self) -> Result<AnomalyRecord> {
    Ok(AnomalyRecord {
      id:               self.movement_id,
      timestamp:        decode_ts("timestamp", &self.timestamp)?,
      product_id:       self.product_id.map(ProductId),
      product_name:     self.product_name,
      movement_type:    self.movement_type,
      quantity:         self.quantity,
      stock_after:      self.stock_after,
      anomaly_score:    self.anomaly_score,
      reason:           self.reason,
      interpretation:   self.interpretation,
      suggested_action: self.suggested_action,
    })
  }
}
