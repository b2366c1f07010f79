//! Handlers for `/products` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/products` | Ordered by id |
//! | `POST` | `/products` | Body: a full catalog entry; 409 on a duplicate id |
//! | `GET`  | `/products/{id}` | 404 if not found |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use stockroom_core::{
  product::{Product, ProductId},
  store::InventoryStore,
};

use crate::{AppState, error::ApiError};

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /products`
pub async fn list<S>(
  State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<Product>>, ApiError>
where
  S: InventoryStore,
{
  let products = state.store.list_products().await.map_err(ApiError::from_store)?;
  Ok(Json(products))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /products`
pub async fn create<S>(
  State(state): State<Arc<AppState<S>>>,
  Json(product): Json<Product>,
) -> Result<impl IntoResponse, ApiError>
where
  S: InventoryStore,
{
  let product = state.store.add_product(product).await.map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(product)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /products/{id}`
pub async fn get_one<S>(
  State(state): State<Arc<AppState<S>>>,
  Path(id): Path<i64>,
) -> Result<Json<Product>, ApiError>
where
  S: InventoryStore,
{
  state
    .store
    .get_product(ProductId(id))
    .await
    .map_err(ApiError::from_store)?
    .map(Json)
    .ok_or_else(|| ApiError::NotFound(format!("product {id}")))
}
