//! `GET /projection[?as_of=YYYY-MM-DD HH:MM:SS]`
//!
//! Replays the ledger into per-product stock timelines. Divergences found
//! during replay are part of the response, not an error.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use serde::Deserialize;
use stockroom_core::{
  projector::{Projection, project},
  store::InventoryStore,
  timestamp,
};

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct ProjectionParams {
  pub as_of: Option<String>,
}

pub async fn handler<S>(
  State(state): State<Arc<AppState<S>>>,
  Query(params): Query<ProjectionParams>,
) -> Result<Json<Projection>, ApiError>
where
  S: InventoryStore,
{
  let as_of = params.as_of.as_deref().map(timestamp::parse).transpose()?;
  let movements = state.store.list_movements().await.map_err(ApiError::from_store)?;
  Ok(Json(project(&movements, as_of)))
}
