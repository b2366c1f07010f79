//! The `InventoryStore` trait and supporting types.
//!
//! The trait is implemented by storage backends (e.g.
//! `stockroom-store-sqlite`). Higher layers (`stockroom-api`,
//! `stockroom-cli`) depend on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{
  anomaly::AnomalyRecord,
  movement::{Movement, MovementType},
  product::{Product, ProductId, ProductRef},
  projector::Divergence,
};

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Backend errors that may carry a domain error underneath.
///
/// Lets callers tell a business rejection (unknown product, insufficient
/// stock, …) apart from an I/O or database fault without knowing the
/// backend's concrete error type.
pub trait BackendError: std::error::Error + Send + Sync + 'static {
  fn domain(&self) -> Option<&crate::Error>;
}

// ─── Reconciliation ──────────────────────────────────────────────────────────

/// Outcome of [`InventoryStore::reconcile`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
  /// Divergences found before any repair.
  pub divergences: Vec<Divergence>,
  /// Catalog entries whose stock was reset to the replayed ledger value.
  pub repaired:    Vec<ProductId>,
  /// Whether appends are accepted after this run.
  pub writable:    bool,
}

impl ReconcileReport {
  pub fn is_clean(&self) -> bool { self.divergences.is_empty() }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Stockroom inventory backend.
///
/// The ledger is append-only: no method edits or removes a movement. The
/// catalog's `stock` column changes only as a side effect of
/// [`append_movement`](Self::append_movement) (or a reconciliation repair),
/// atomically with the ledger write.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait InventoryStore: Send + Sync {
  type Error: BackendError;

  // ── Catalog ───────────────────────────────────────────────────────────

  /// Insert a seed product. Fails on a duplicate id or invalid figures.
  fn add_product(
    &self,
    product: Product,
  ) -> impl Future<Output = Result<Product, Self::Error>> + Send + '_;

  /// Retrieve a product by id. Returns `None` if not found.
  fn get_product(
    &self,
    id: ProductId,
  ) -> impl Future<Output = Result<Option<Product>, Self::Error>> + Send + '_;

  /// Case-insensitive lookup by display name.
  fn find_product_by_name(
    &self,
    name: String,
  ) -> impl Future<Output = Result<Option<Product>, Self::Error>> + Send + '_;

  /// All products ordered by id.
  fn list_products(
    &self,
  ) -> impl Future<Output = Result<Vec<Product>, Self::Error>> + Send + '_;

  // ── Ledger ────────────────────────────────────────────────────────────

  /// Validate and append one movement, updating the product's stock in the
  /// same transaction. `at` defaults to the current local time.
  ///
  /// Rejections (unknown product, non-positive quantity, insufficient stock)
  /// leave both the ledger and the catalog untouched. Fails with
  /// `LedgerCorruption` while a previous integrity check is unresolved.
  fn append_movement(
    &self,
    product: ProductRef,
    quantity: i64,
    movement_type: MovementType,
    at: Option<NaiveDateTime>,
  ) -> impl Future<Output = Result<Movement, Self::Error>> + Send + '_;

  /// Append a movement proposed by the detection layer, which names the
  /// product by its detected label. The movement type arrives as free text
  /// and is validated here.
  fn record_detection(
    &self,
    product: ProductRef,
    quantity: i64,
    movement_type: String,
  ) -> impl Future<Output = Result<Movement, Self::Error>> + Send + '_;

  /// The full ledger in append order.
  fn list_movements(
    &self,
  ) -> impl Future<Output = Result<Vec<Movement>, Self::Error>> + Send + '_;

  /// Replay the ledger and compare it against itself and the catalog.
  ///
  /// With `repair`, catalog stock that disagrees with the ledger is reset to
  /// the replayed value. Divergences inside the ledger cannot be repaired and
  /// keep appends blocked.
  fn reconcile(
    &self,
    repair: bool,
  ) -> impl Future<Output = Result<ReconcileReport, Self::Error>> + Send + '_;

  // ── Anomaly archive ───────────────────────────────────────────────────

  /// Append anomaly records, skipping those already archived. Returns how
  /// many were inserted.
  fn archive_anomalies(
    &self,
    records: Vec<AnomalyRecord>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// The archive in insertion order. An unreadable archive reads as empty.
  fn list_anomalies(
    &self,
  ) -> impl Future<Output = Result<Vec<AnomalyRecord>, Self::Error>> + Send + '_;
}
