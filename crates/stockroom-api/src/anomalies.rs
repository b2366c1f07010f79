//! Handlers for `/anomalies` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/anomalies` | The archive in insertion order |
//! | `POST` | `/anomalies/scan` | Optional body `{"sensitivity":0.15}` |
//!
//! A scan scores the whole ledger, archives the anomalous rows it has not
//! seen before and returns every scored row.

use std::sync::Arc;

use axum::{Json, extract::State};
use serde::Deserialize;
use stockroom_core::{
  anomaly::{AnomalyRecord, AnomalySummary, ScanReport, archive_candidates},
  store::InventoryStore,
};

use crate::{AppState, error::ApiError};

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /anomalies`
pub async fn list<S>(
  State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<AnomalyRecord>>, ApiError>
where
  S: InventoryStore,
{
  let records = state.store.list_anomalies().await.map_err(ApiError::from_store)?;
  Ok(Json(records))
}

// ─── Scan ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ScanBody {
  /// Expected anomalous fraction; clamped to the supported range.
  pub sensitivity: Option<f64>,
}

/// `POST /anomalies/scan`
pub async fn scan<S>(
  State(state): State<Arc<AppState<S>>>,
  body: Option<Json<ScanBody>>,
) -> Result<Json<ScanReport>, ApiError>
where
  S: InventoryStore,
{
  let sensitivity = body.and_then(|Json(b)| b.sensitivity);
  let detector = state.anomaly.with_sensitivity(sensitivity).detector();
  let movements = state.store.list_movements().await.map_err(ApiError::from_store)?;

  let rows = tokio::task::spawn_blocking(move || detector.detect_movements(&movements))
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))??;

  let summary = AnomalySummary::of(&rows);
  let archived = state
    .store
    .archive_anomalies(archive_candidates(&rows))
    .await
    .map_err(ApiError::from_store)?;
  tracing::info!(
    total = summary.total,
    anomalies = summary.anomalies,
    archived,
    "anomaly scan finished"
  );

  Ok(Json(ScanReport { summary, archived, rows }))
}
