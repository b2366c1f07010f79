//! Handlers for `/movements` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/movements` | Append order; optional `?categories=&products=&movement_types=` |
//! | `POST` | `/movements` | Body: `{"product_id":1,"quantity":3,"movement_type":"Entrada"}` |
//! | `POST` | `/movements/detected` | Body: `{"detections":[{"label":"..","count":2}],"movement_type":"Salida"}` |
//!
//! Appends name the product by `product_id` or `product_name`; when both are
//! given the id wins.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use stockroom_core::{
  movement::{Movement, MovementType},
  product::{Catalog, ProductId, ProductRef},
  store::InventoryStore,
  timestamp,
};

use crate::{AppState, error::ApiError, filter::FilterParams};

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /movements[?categories=..&products=..&movement_types=..]`
pub async fn list<S>(
  State(state): State<Arc<AppState<S>>>,
  Query(params): Query<FilterParams>,
) -> Result<Json<Vec<Movement>>, ApiError>
where
  S: InventoryStore,
{
  let filter = params.into_filter()?;
  let mut movements = state.store.list_movements().await.map_err(ApiError::from_store)?;
  movements.retain(|m| filter.matches(m));
  Ok(Json(movements))
}

// ─── Append ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AppendBody {
  pub product_id:    Option<i64>,
  pub product_name:  Option<String>,
  pub quantity:      i64,
  pub movement_type: String,
  /// `YYYY-MM-DD HH:MM[:SS]`; defaults to now.
  pub timestamp:     Option<String>,
}

impl AppendBody {
  fn product(&self) -> Result<ProductRef, ApiError> {
    match (self.product_id, &self.product_name) {
      (Some(id), _) => Ok(ProductRef::Id(ProductId(id))),
      (None, Some(name)) => Ok(ProductRef::Name(name.clone())),
      (None, None) => Err(ApiError::BadRequest(
        "either product_id or product_name is required".to_owned(),
      )),
    }
  }
}

/// `POST /movements`
pub async fn create<S>(
  State(state): State<Arc<AppState<S>>>,
  Json(body): Json<AppendBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: InventoryStore,
{
  let product = body.product()?;
  let movement_type: MovementType = body.movement_type.parse()?;
  let at = body.timestamp.as_deref().map(timestamp::parse).transpose()?;

  let movement = state
    .store
    .append_movement(product, body.quantity, movement_type, at)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(movement)))
}

// ─── Detection ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct Detection {
  pub label: String,
  pub count: i64,
}

#[derive(Debug, Deserialize)]
pub struct DetectedBody {
  /// Detected classes in detection order.
  pub detections:    Vec<Detection>,
  pub movement_type: String,
}

/// `POST /movements/detected`
///
/// Records one movement for the first detected label that names a catalog
/// product, using that label's count as the quantity.
pub async fn detected<S>(
  State(state): State<Arc<AppState<S>>>,
  Json(body): Json<DetectedBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: InventoryStore,
{
  let products = state.store.list_products().await.map_err(ApiError::from_store)?;
  let catalog = Catalog::from_products(products)?;
  let detections: Vec<(String, i64)> =
    body.detections.into_iter().map(|d| (d.label, d.count)).collect();

  let (product_id, quantity) = catalog
    .match_detections(&detections)
    .map(|(p, count)| (p.product_id, count))
    .ok_or_else(|| {
      ApiError::NotFound("no detected label matches a catalog product".to_owned())
    })?;

  let movement = state
    .store
    .record_detection(ProductRef::Id(product_id), quantity, body.movement_type)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(movement)))
}
