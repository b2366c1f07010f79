//! Handlers for `/reconcile`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/reconcile` | Report only |
//! | `POST` | `/reconcile` | `?repair=true` resets drifted catalog stock |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use serde::Deserialize;
use stockroom_core::store::{InventoryStore, ReconcileReport};

use crate::{AppState, error::ApiError};

/// `GET /reconcile`
pub async fn check<S>(
  State(state): State<Arc<AppState<S>>>,
) -> Result<Json<ReconcileReport>, ApiError>
where
  S: InventoryStore,
{
  let report = state.store.reconcile(false).await.map_err(ApiError::from_store)?;
  Ok(Json(report))
}

#[derive(Debug, Default, Deserialize)]
pub struct RunParams {
  #[serde(default)]
  pub repair: bool,
}

/// `POST /reconcile[?repair=true]`
pub async fn run<S>(
  State(state): State<Arc<AppState<S>>>,
  Query(params): Query<RunParams>,
) -> Result<Json<ReconcileReport>, ApiError>
where
  S: InventoryStore,
{
  let report = state
    .store
    .reconcile(params.repair)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(report))
}
