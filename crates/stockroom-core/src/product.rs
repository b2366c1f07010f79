//! Product catalog: static reference data owned outside the ledger.
//!
//! Products are created out-of-band (seed data or import). Their `stock`
//! field is mutated only by [`Product::apply`](crate::movement) when a
//! movement is appended; nothing else in the system writes it.

use std::{collections::BTreeMap, fmt, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Identity ────────────────────────────────────────────────────────────────

/// Stable catalog identifier.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ProductId(pub i64);

impl fmt::Display for ProductId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

impl From<i64> for ProductId {
  fn from(id: i64) -> Self { Self(id) }
}

// ─── Product ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
  pub product_id:    ProductId,
  pub name:          String,
  pub category:      String,
  #[serde(with = "rust_decimal::serde::float")]
  pub price:         Decimal,
  pub minimum_stock: i64,
  /// On-hand quantity; only movement application changes it.
  pub stock:         i64,
}

impl Product {
  /// Reject seed data that would break ledger invariants.
  pub fn validate(&self) -> Result<()> {
    if self.name.trim().is_empty() {
      return Err(Error::InvalidProduct(format!(
        "product {} has an empty name",
        self.product_id
      )));
    }
    if self.price < Decimal::ZERO {
      return Err(Error::InvalidProduct(format!(
        "product {} has a negative price",
        self.product_id
      )));
    }
    if self.minimum_stock < 0 || self.stock < 0 {
      return Err(Error::InvalidProduct(format!(
        "product {} has a negative stock figure",
        self.product_id
      )));
    }
    Ok(())
  }

  /// Case-insensitive, whitespace-tolerant name comparison.
  pub fn name_matches(&self, name: &str) -> bool {
    self.name.trim().to_lowercase() == name.trim().to_lowercase()
  }
}

// ─── References ──────────────────────────────────────────────────────────────

/// How a caller names a product: by id, or by display name as the detection
/// layer does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProductRef {
  Id(ProductId),
  Name(String),
}

impl FromStr for ProductRef {
  type Err = std::convert::Infallible;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(match s.trim().parse::<i64>() {
      Ok(id) => Self::Id(ProductId(id)),
      Err(_) => Self::Name(s.trim().to_owned()),
    })
  }
}

impl fmt::Display for ProductRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Id(id) => write!(f, "#{id}"),
      Self::Name(name) => write!(f, "{name:?}"),
    }
  }
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

/// In-memory catalog keyed by product id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
  products: BTreeMap<ProductId, Product>,
}

impl Catalog {
  pub fn new() -> Self { Self::default() }

  /// Build a catalog from seed data, validating every product and rejecting
  /// duplicate ids.
  pub fn from_products(products: impl IntoIterator<Item = Product>) -> Result<Self> {
    let mut catalog = Self::new();
    for product in products {
      catalog.insert(product)?;
    }
    Ok(catalog)
  }

  pub fn insert(&mut self, product: Product) -> Result<()> {
    product.validate()?;
    if self.products.contains_key(&product.product_id) {
      return Err(Error::DuplicateProduct(product.product_id));
    }
    self.products.insert(product.product_id, product);
    Ok(())
  }

  pub fn get(&self, id: ProductId) -> Option<&Product> { self.products.get(&id) }

  pub fn get_mut(&mut self, id: ProductId) -> Option<&mut Product> {
    self.products.get_mut(&id)
  }

  /// Case-insensitive lookup by display name.
  pub fn find_by_name(&self, name: &str) -> Option<&Product> {
    self.products.values().find(|p| p.name_matches(name))
  }

  /// Resolve a [`ProductRef`] to its catalog entry.
  pub fn resolve(&self, product: &ProductRef) -> Result<&Product> {
    match product {
      ProductRef::Id(id) => self.get(*id).ok_or(Error::ProductNotFound(*id)),
      ProductRef::Name(name) => self
        .find_by_name(name)
        .ok_or_else(|| Error::ProductNameNotFound(name.clone())),
    }
  }

  /// Pick the first detected label that names a catalog product, together
  /// with how many instances of it were seen.
  ///
  /// `detections` is in detection order; unknown labels are skipped.
  pub fn match_detections<'a>(
    &'a self,
    detections: &[(String, i64)],
  ) -> Option<(&'a Product, i64)> {
    detections
      .iter()
      .find_map(|(label, count)| self.find_by_name(label).map(|p| (p, *count)))
  }

  pub fn iter(&self) -> impl Iterator<Item = &Product> { self.products.values() }

  pub fn len(&self) -> usize { self.products.len() }

  pub fn is_empty(&self) -> bool { self.products.is_empty() }

  pub fn into_products(self) -> Vec<Product> { self.products.into_values().collect() }
}
