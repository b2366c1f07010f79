//! Stock projector — replays the ledger into per-product stock timelines.
//!
//! The projection is a pure function of the ledger slice it is given. Each
//! product's movements are replayed in chronological order (timestamp, then
//! id), producing a running signed total and a replayed stock level that is
//! cross-checked against the persisted `stock_before` / `stock_after`.
//! Disagreements are collected as [`Divergence`]s rather than trusted.

use std::{
  collections::{BTreeMap, BTreeSet},
  fmt,
};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  analytics::MovementFilter,
  movement::{Movement, MovementId},
  product::{Product, ProductId},
};

// ─── Divergences ─────────────────────────────────────────────────────────────

/// A disagreement between the replayed ledger and what was persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Divergence {
  /// Two ledger entries share an id.
  DuplicateId { movement_id: MovementId },
  /// `stock_before` does not continue from the previous movement.
  ChainBreak {
    movement_id:     MovementId,
    product_id:      ProductId,
    expected_before: i64,
    recorded_before: i64,
  },
  /// The replayed running stock disagrees with the persisted `stock_after`.
  ReplayMismatch {
    movement_id:    MovementId,
    product_id:     ProductId,
    replayed_after: i64,
    recorded_after: i64,
  },
  NegativeStock {
    movement_id: MovementId,
    product_id:  ProductId,
    stock_after: i64,
  },
  /// A zero or negative quantity, which no append accepts.
  InvalidQuantity {
    movement_id: MovementId,
    product_id:  ProductId,
    quantity:    i64,
  },
  /// The catalog's live stock disagrees with the replayed ledger.
  CatalogMismatch {
    product_id:     ProductId,
    catalog_stock:  i64,
    replayed_stock: i64,
  },
  /// Ledger entries reference a product missing from the catalog.
  UnknownProduct { product_id: ProductId },
}

impl fmt::Display for Divergence {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::DuplicateId { movement_id } => {
        write!(f, "movement id {movement_id} appears more than once")
      }
      Self::ChainBreak { movement_id, product_id, expected_before, recorded_before } => {
        write!(
          f,
          "movement {movement_id} (product {product_id}) starts at {recorded_before}, \
           previous movement left {expected_before}"
        )
      }
      Self::ReplayMismatch { movement_id, product_id, replayed_after, recorded_after } => {
        write!(
          f,
          "movement {movement_id} (product {product_id}) records {recorded_after}, \
           replay gives {replayed_after}"
        )
      }
      Self::NegativeStock { movement_id, product_id, stock_after } => {
        write!(
          f,
          "movement {movement_id} (product {product_id}) leaves negative stock {stock_after}"
        )
      }
      Self::InvalidQuantity { movement_id, product_id, quantity } => {
        write!(
          f,
          "movement {movement_id} (product {product_id}) has non-positive quantity {quantity}"
        )
      }
      Self::CatalogMismatch { product_id, catalog_stock, replayed_stock } => {
        write!(
          f,
          "product {product_id} has catalog stock {catalog_stock}, ledger replays to \
           {replayed_stock}"
        )
      }
      Self::UnknownProduct { product_id } => {
        write!(f, "ledger references unknown product {product_id}")
      }
    }
  }
}

impl Divergence {
  /// Whether the divergence lives in the ledger itself. Those cannot be
  /// repaired without editing history.
  pub fn is_ledger_internal(&self) -> bool {
    !matches!(self, Self::CatalogMismatch { .. } | Self::UnknownProduct { .. })
  }
}

// ─── Timelines ───────────────────────────────────────────────────────────────

/// One movement positioned in its product's replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedMovement {
  #[serde(flatten)]
  pub movement:       Movement,
  /// Signed running sum of quantities from zero.
  pub cumulative:     i64,
  /// `opening_stock + cumulative`.
  pub replayed_stock: i64,
}

/// Chronologically ordered replay of one product's movements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockTimeline {
  pub product_id:    ProductId,
  /// Stock on hand before the first movement (its `stock_before`).
  pub opening_stock: i64,
  pub entries:       Vec<ProjectedMovement>,
}

impl StockTimeline {
  /// Replayed stock after the chronologically last movement.
  pub fn current_stock(&self) -> i64 {
    self
      .entries
      .last()
      .map_or(self.opening_stock, |e| e.replayed_stock)
  }

  pub fn last(&self) -> Option<&ProjectedMovement> { self.entries.last() }

  /// Stock level at `at`, or the opening balance if nothing happened yet.
  pub fn stock_at(&self, at: NaiveDateTime) -> i64 {
    self
      .entries
      .iter()
      .take_while(|e| e.movement.timestamp <= at)
      .last()
      .map_or(self.opening_stock, |e| e.replayed_stock)
  }
}

// ─── Projection ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
  /// Cut-off applied to the ledger, if any.
  #[serde(default, with = "optional_timestamp")]
  pub as_of:       Option<NaiveDateTime>,
  pub timelines:   BTreeMap<ProductId, StockTimeline>,
  pub divergences: Vec<Divergence>,
}

impl Projection {
  pub fn timeline(&self, product_id: ProductId) -> Option<&StockTimeline> {
    self.timelines.get(&product_id)
  }

  /// Replayed current stock; `None` when the product has no movements.
  pub fn current_stock(&self, product_id: ProductId) -> Option<i64> {
    self.timeline(product_id).map(StockTimeline::current_stock)
  }

  /// Current stock, falling back to the catalog value for products without
  /// history.
  pub fn current_stock_or(&self, product: &Product) -> i64 {
    self.current_stock(product.product_id).unwrap_or(product.stock)
  }

  pub fn is_consistent(&self) -> bool { self.divergences.is_empty() }

  /// Fail with [`Error::LedgerCorruption`] if replay found any divergence.
  pub fn verify(&self) -> Result<()> {
    if self.divergences.is_empty() {
      Ok(())
    } else {
      Err(Error::LedgerCorruption(self.divergences.clone()))
    }
  }

  /// Compare the replayed ledger against the catalog's live stock.
  ///
  /// Products without movements are trusted as seeded.
  pub fn reconcile_catalog(&self, catalog: &[Product]) -> Vec<Divergence> {
    let known: BTreeSet<ProductId> = catalog.iter().map(|p| p.product_id).collect();

    let mut out: Vec<Divergence> = catalog
      .iter()
      .filter_map(|p| {
        let replayed = self.current_stock(p.product_id)?;
        (replayed != p.stock).then_some(Divergence::CatalogMismatch {
          product_id:     p.product_id,
          catalog_stock:  p.stock,
          replayed_stock: replayed,
        })
      })
      .collect();

    out.extend(
      self
        .timelines
        .keys()
        .filter(|id| !known.contains(id))
        .map(|&product_id| Divergence::UnknownProduct { product_id }),
    );
    out
  }

  /// Projected movements passing `filter`, grouped by product and in
  /// chronological order within each product.
  pub fn select<'a>(&'a self, filter: &MovementFilter) -> Vec<&'a ProjectedMovement> {
    self
      .timelines
      .values()
      .flat_map(|t| t.entries.iter())
      .filter(|e| filter.matches(&e.movement))
      .collect()
  }

  /// Every projected movement, grouped by product.
  pub fn entries(&self) -> impl Iterator<Item = &ProjectedMovement> {
    self.timelines.values().flat_map(|t| t.entries.iter())
  }
}

/// Replay `ledger` into per-product timelines, optionally ignoring movements
/// after `as_of`.
pub fn project(ledger: &[Movement], as_of: Option<NaiveDateTime>) -> Projection {
  let mut divergences = Vec::new();

  let mut seen = BTreeSet::new();
  let mut duplicated = BTreeSet::new();
  for m in ledger {
    if !seen.insert(m.id) && duplicated.insert(m.id) {
      divergences.push(Divergence::DuplicateId { movement_id: m.id });
    }
  }

  let mut by_product: BTreeMap<ProductId, Vec<&Movement>> = BTreeMap::new();
  for m in ledger.iter().filter(|m| as_of.is_none_or(|cut| m.timestamp <= cut)) {
    by_product.entry(m.product_id).or_default().push(m);
  }

  let timelines = by_product
    .into_iter()
    .map(|(product_id, mut movements)| {
      movements.sort_by_key(|m| m.chrono_key());
      let timeline = replay(product_id, &movements, &mut divergences);
      (product_id, timeline)
    })
    .collect();

  Projection { as_of, timelines, divergences }
}

fn replay(
  product_id: ProductId,
  movements: &[&Movement],
  divergences: &mut Vec<Divergence>,
) -> StockTimeline {
  let opening_stock = movements.first().map_or(0, |m| m.stock_before);

  let mut cumulative = 0_i64;
  let mut expected_before = opening_stock;
  // Re-anchored on every divergence so one bad row does not cascade.
  let mut baseline = opening_stock;
  let mut entries = Vec::with_capacity(movements.len());

  for m in movements {
    if m.stock_before != expected_before {
      divergences.push(Divergence::ChainBreak {
        movement_id: m.id,
        product_id,
        expected_before,
        recorded_before: m.stock_before,
      });
      baseline = m.stock_before - cumulative;
    }

    if m.quantity <= 0 {
      divergences.push(Divergence::InvalidQuantity {
        movement_id: m.id,
        product_id,
        quantity: m.quantity,
      });
    }

    cumulative += m.signed_quantity();
    let checked = baseline + cumulative;
    if checked != m.stock_after {
      divergences.push(Divergence::ReplayMismatch {
        movement_id: m.id,
        product_id,
        replayed_after: checked,
        recorded_after: m.stock_after,
      });
      baseline += m.stock_after - checked;
    }

    if m.stock_after < 0 {
      divergences.push(Divergence::NegativeStock {
        movement_id: m.id,
        product_id,
        stock_after: m.stock_after,
      });
    }

    expected_before = m.stock_after;
    entries.push(ProjectedMovement {
      movement: (*m).clone(),
      cumulative,
      replayed_stock: opening_stock + cumulative,
    });
  }

  StockTimeline { product_id, opening_stock, entries }
}

mod optional_timestamp {
  use chrono::NaiveDateTime;
  use serde::{Deserialize, Deserializer, Serializer};

  use crate::timestamp;

  pub fn serialize<S: Serializer>(
    ts: &Option<NaiveDateTime>,
    serializer: S,
  ) -> Result<S::Ok, S::Error> {
    match ts {
      Some(ts) => serializer.serialize_some(&timestamp::format(*ts)),
      None => serializer.serialize_none(),
    }
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(
    deserializer: D,
  ) -> Result<Option<NaiveDateTime>, D::Error> {
    Option::<String>::deserialize(deserializer)?
      .map(|raw| timestamp::parse(&raw).map_err(serde::de::Error::custom))
      .transpose()
  }
}
