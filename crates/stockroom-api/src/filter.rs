//! Query-string form of [`MovementFilter`].
//!
//! Each parameter is a comma-separated allow-list; an absent or empty
//! parameter allows everything.

use std::collections::BTreeSet;

use serde::Deserialize;
use stockroom_core::{
  analytics::MovementFilter,
  movement::MovementType,
  product::ProductId,
};

use crate::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct FilterParams {
  pub categories:     Option<String>,
  pub products:       Option<String>,
  pub movement_types: Option<String>,
}

impl FilterParams {
  pub fn into_filter(self) -> Result<MovementFilter, ApiError> {
    let categories = split(self.categories.as_deref()).map(str::to_owned).collect();

    let product_ids = split(self.products.as_deref())
      .map(|s| {
        s.parse::<i64>()
          .map(ProductId)
          .map_err(|_| ApiError::BadRequest(format!("invalid product id {s:?}")))
      })
      .collect::<Result<BTreeSet<_>, _>>()?;

    let movement_types = split(self.movement_types.as_deref())
      .map(|s| s.parse::<MovementType>().map_err(ApiError::from))
      .collect::<Result<BTreeSet<_>, _>>()?;

    Ok(MovementFilter { categories, product_ids, movement_types })
  }
}

fn split(raw: Option<&str>) -> impl Iterator<Item = &str> {
  raw
    .unwrap_or_default()
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
}
