//! Error types for `stockroom-core`.

use thiserror::Error;

use crate::{product::ProductId, projector::Divergence};

#[derive(Debug, Error)]
pub enum Error {
  #[error("product not found: {0}")]
  ProductNotFound(ProductId),

  #[error("no product named {0:?}")]
  ProductNameNotFound(String),

  #[error("invalid movement type {0:?}; use 'Entrada' or 'Salida'")]
  InvalidMovementType(String),

  #[error("invalid quantity {0}; quantities must be positive")]
  InvalidQuantity(i64),

  #[error(
    "insufficient stock for product {product_id}: {available} on hand, \
     {requested} requested"
  )]
  InsufficientStock {
    product_id: ProductId,
    available:  i64,
    requested:  i64,
  },

  #[error(
    "movement for product {product_id} dated {at} precedes its latest movement \
     at {latest}"
  )]
  BackdatedMovement {
    product_id: ProductId,
    at:         String,
    latest:     String,
  },

  #[error("invalid product: {0}")]
  InvalidProduct(String),

  #[error("duplicate product id: {0}")]
  DuplicateProduct(ProductId),

  #[error("unparseable timestamp: {0:?}")]
  InvalidTimestamp(String),

  #[error("missing time columns: {}", .0.join(", "))]
  MissingTimeColumns(Vec<String>),

  #[error("missing required columns: {}", .0.join(", "))]
  MissingRequiredColumns(Vec<String>),

  #[error("ledger corruption: {} divergence(s), first: {}", .0.len(), first_divergence(.0))]
  LedgerCorruption(Vec<Divergence>),

  #[error("outlier model returned {actual} verdict(s) for {expected} row(s)")]
  ModelOutput { expected: usize, actual: usize },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

fn first_divergence(divergences: &[Divergence]) -> String {
  divergences
    .first()
    .map(ToString::to_string)
    .unwrap_or_else(|| "none".to_owned())
}

impl Error {
  /// Stable machine-readable code, used in structured error bodies.
  pub fn code(&self) -> &'static str {
    match self {
      Self::ProductNotFound(_) | Self::ProductNameNotFound(_) => {
        "product_not_found"
      }
      Self::InvalidMovementType(_) => "invalid_movement_type",
      Self::InvalidQuantity(_) => "invalid_quantity",
      Self::InsufficientStock { .. } => "insufficient_stock",
      Self::BackdatedMovement { .. } => "backdated_movement",
      Self::InvalidProduct(_) => "invalid_product",
      Self::DuplicateProduct(_) => "duplicate_product",
      Self::InvalidTimestamp(_) => "invalid_timestamp",
      Self::MissingTimeColumns(_) => "missing_time_columns",
      Self::MissingRequiredColumns(_) => "missing_required_columns",
      Self::LedgerCorruption(_) => "ledger_corruption",
      Self::ModelOutput { .. } => "model_output",
      Self::Serialization(_) => "serialization",
    }
  }

  /// Whether this is a business-rule rejection rather than a system fault.
  pub fn is_rejection(&self) -> bool {
    matches!(
      self,
      Self::ProductNotFound(_)
        | Self::ProductNameNotFound(_)
        | Self::InvalidMovementType(_)
        | Self::InvalidQuantity(_)
        | Self::InsufficientStock { .. }
        | Self::BackdatedMovement { .. }
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
