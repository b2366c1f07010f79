//! `GET /reports[?categories=..&products=..&movement_types=..]`
//!
//! KPIs, per-product summaries, ABC ranking and activity heatmap over the
//! filtered ledger.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use stockroom_core::{
  analytics::{Report, summarize},
  projector::project,
  store::InventoryStore,
};

use crate::{AppState, error::ApiError, filter::FilterParams};

pub async fn handler<S>(
  State(state): State<Arc<AppState<S>>>,
  Query(params): Query<FilterParams>,
) -> Result<Json<Report>, ApiError>
where
  S: InventoryStore,
{
  let filter = params.into_filter()?;
  let movements = state.store.list_movements().await.map_err(ApiError::from_store)?;
  let projection = project(&movements, None);
  Ok(Json(summarize(&projection, &filter)))
}
