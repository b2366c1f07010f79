//! Movements: the append-only entries of the stock ledger.
//!
//! A movement is an immutable record of one entry or exit. It snapshots the
//! product's descriptive fields at write time so history stays faithful even
//! if the catalog later changes. Corrections are made by appending a
//! compensating movement, never by editing an existing one.

use std::{fmt, str::FromStr};

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
  Error, Result,
  product::{Catalog, Product, ProductId},
  timestamp,
};

pub type MovementId = i64;

// ─── Movement type ───────────────────────────────────────────────────────────

/// Direction of a movement. Persisted as `"Ingreso"` / `"Salida"`; parsed
/// case-insensitively from English or Spanish spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MovementType {
  Entry,
  Exit,
}

impl MovementType {
  /// The persisted label.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Entry => "Ingreso",
      Self::Exit => "Salida",
    }
  }

  /// Apply this direction's sign to a quantity.
  pub fn signed(self, quantity: i64) -> i64 {
    match self {
      Self::Entry => quantity,
      Self::Exit => -quantity,
    }
  }

  pub fn is_exit(self) -> bool { self == Self::Exit }
}

impl fmt::Display for MovementType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for MovementType {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_lowercase().as_str() {
      "entry" | "entrada" | "ingreso" => Ok(Self::Entry),
      "exit" | "salida" => Ok(Self::Exit),
      _ => Err(Error::InvalidMovementType(s.to_owned())),
    }
  }
}

impl Serialize for MovementType {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.as_str())
  }
}

impl<'de> Deserialize<'de> for MovementType {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
  }
}

// ─── Movement ────────────────────────────────────────────────────────────────

/// One immutable ledger entry. Field order matches the persisted layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
  pub id:             MovementId,
  #[serde(with = "timestamp::serde_format", alias = "datetime")]
  pub timestamp:      NaiveDateTime,
  pub product_id:     ProductId,
  pub product_name:   String,
  pub minimum_stock:  i64,
  pub category:       String,
  #[serde(with = "rust_decimal::serde::float")]
  pub price_per_unit: Decimal,
  pub movement_type:  MovementType,
  pub quantity:       i64,
  pub stock_before:   i64,
  pub stock_after:    i64,
}

impl Movement {
  /// Quantity with the direction's sign applied.
  pub fn signed_quantity(&self) -> i64 { self.movement_type.signed(self.quantity) }

  /// Revenue attributed to this movement; entries never count as sales.
  pub fn sale_value(&self) -> Decimal {
    match self.movement_type {
      MovementType::Exit => Decimal::from(self.quantity) * self.price_per_unit,
      MovementType::Entry => Decimal::ZERO,
    }
  }

  /// Whether `stock_after` follows from `stock_before` and the quantity.
  pub fn is_self_consistent(&self) -> bool {
    self.stock_before + self.signed_quantity() == self.stock_after
  }

  /// Chronological sort key; the id breaks ties within one second.
  pub fn chrono_key(&self) -> (NaiveDateTime, MovementId) { (self.timestamp, self.id) }

  /// Reject entries no append could have produced.
  pub fn validate(&self) -> Result<()> {
    if self.quantity <= 0 {
      return Err(Error::InvalidQuantity(self.quantity));
    }
    Ok(())
  }
}

// ─── Apply step ──────────────────────────────────────────────────────────────

impl Product {
  /// Apply a movement to this product and return the ledger entry to append.
  ///
  /// All-or-nothing: on any error `self.stock` is left untouched.
  pub fn apply(
    &mut self,
    id: MovementId,
    movement_type: MovementType,
    quantity: i64,
    at: NaiveDateTime,
  ) -> Result<Movement> {
    if quantity <= 0 {
      return Err(Error::InvalidQuantity(quantity));
    }

    let stock_before = self.stock;
    let stock_after = match movement_type {
      MovementType::Entry => stock_before
        .checked_add(quantity)
        .ok_or(Error::InvalidQuantity(quantity))?,
      MovementType::Exit => {
        if stock_before < quantity {
          return Err(Error::InsufficientStock {
            product_id: self.product_id,
            available:  stock_before,
            requested:  quantity,
          });
        }
        stock_before - quantity
      }
    };

    self.stock = stock_after;

    Ok(Movement {
      id,
      timestamp: at,
      product_id: self.product_id,
      product_name: self.name.clone(),
      minimum_stock: self.minimum_stock,
      category: self.category.clone(),
      price_per_unit: self.price,
      movement_type,
      quantity,
      stock_before,
      stock_after,
    })
  }
}

/// Reject `at` if it precedes the product's latest recorded movement.
///
/// Appends derive `stock_before` from live stock, so a backdated movement
/// would break the product's replay chain.
pub fn check_not_backdated(
  product_id: ProductId,
  at: NaiveDateTime,
  latest: Option<NaiveDateTime>,
) -> Result<()> {
  match latest {
    Some(latest) if at < latest => Err(Error::BackdatedMovement {
      product_id,
      at: timestamp::format(at),
      latest: timestamp::format(latest),
    }),
    _ => Ok(()),
  }
}

/// Timestamp for an append. A caller-supplied `at` must not be backdated;
/// the default stamp is `now`, held at `latest` when the wall clock sits
/// behind the ledger (a DST fall-back hour, or a future-dated entry).
pub fn stamp(
  product_id: ProductId,
  requested: Option<NaiveDateTime>,
  now: NaiveDateTime,
  latest: Option<NaiveDateTime>,
) -> Result<NaiveDateTime> {
  match requested {
    Some(at) => check_not_backdated(product_id, at, latest).map(|()| at),
    None => Ok(latest.map_or(now, |latest| latest.max(now))),
  }
}

/// Next id for a ledger: `max(existing) + 1`, or 1 when empty.
pub fn next_id<'a>(movements: impl IntoIterator<Item = &'a Movement>) -> MovementId {
  movements.into_iter().map(|m| m.id).max().unwrap_or(0) + 1
}

// ─── In-memory ledger ────────────────────────────────────────────────────────

/// An in-memory ledger over a [`Catalog`]. Backends persist the same
/// semantics; this type is what the projector and tests operate on directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
  movements: Vec<Movement>,
}

impl Ledger {
  pub fn new() -> Self { Self::default() }

  pub fn from_movements(movements: Vec<Movement>) -> Self { Self { movements } }

  /// Entries in append order.
  pub fn movements(&self) -> &[Movement] { &self.movements }

  pub fn len(&self) -> usize { self.movements.len() }

  pub fn is_empty(&self) -> bool { self.movements.is_empty() }

  pub fn next_id(&self) -> MovementId { next_id(&self.movements) }

  /// Validate, apply and append one movement, mutating the catalog's stock.
  pub fn append(
    &mut self,
    catalog: &mut Catalog,
    product_id: ProductId,
    quantity: i64,
    movement_type: MovementType,
    at: NaiveDateTime,
  ) -> Result<&Movement> {
    let id = self.next_id();
    let product = catalog
      .get_mut(product_id)
      .ok_or(Error::ProductNotFound(product_id))?;
    let latest = self
      .movements
      .iter()
      .filter(|m| m.product_id == product_id)
      .map(|m| m.timestamp)
      .max();
    check_not_backdated(product_id, at, latest)?;
    let movement = product.apply(id, movement_type, quantity, at)?;
    self.movements.push(movement);
    Ok(&self.movements[self.movements.len() - 1])
  }

  pub fn into_movements(self) -> Vec<Movement> { self.movements }
}

// ─── Legacy import format ────────────────────────────────────────────────────

/// The older ledger layout: separate `date` and `time` fields and no
/// `stock_before`. Only read on import, never written.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyMovement {
  pub id:             MovementId,
  pub date:           String,
  pub time:           String,
  pub product_id:     ProductId,
  pub product_name:   String,
  pub minimum_stock:  i64,
  pub category:       String,
  #[serde(with = "rust_decimal::serde::float")]
  pub price_per_unit: Decimal,
  pub movement_type:  MovementType,
  pub quantity:       i64,
  pub stock_after:    i64,
}

impl LegacyMovement {
  /// Migrate into the canonical layout, deriving `stock_before`.
  pub fn into_movement(self) -> Result<Movement> {
    if self.quantity <= 0 {
      return Err(Error::InvalidQuantity(self.quantity));
    }
    let timestamp = timestamp::combine(&self.date, &self.time)?;
    let stock_before = self
      .stock_after
      .checked_sub(self.movement_type.signed(self.quantity))
      .ok_or(Error::InvalidQuantity(self.quantity))?;
    Ok(Movement {
      id: self.id,
      timestamp,
      product_id: self.product_id,
      product_name: self.product_name,
      minimum_stock: self.minimum_stock,
      category: self.category,
      price_per_unit: self.price_per_unit,
      movement_type: self.movement_type,
      quantity: self.quantity,
      stock_before,
      stock_after: self.stock_after,
    })
  }
}

/// A ledger record in either supported layout.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LedgerRecord {
  Canonical(Movement),
  Legacy(LegacyMovement),
}

impl LedgerRecord {
  pub fn into_movement(self) -> Result<Movement> {
    match self {
      Self::Canonical(m) => m.validate().map(|()| m),
      Self::Legacy(m) => m.into_movement(),
    }
  }
}
