//! JSON REST API for Stockroom.
//!
//! Exposes an axum [`Router`] backed by any
//! [`stockroom_core::store::InventoryStore`]. Auth, TLS, and transport
//! concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", stockroom_api::api_router(state.clone()))
//! ```

pub mod anomalies;
pub mod error;
pub mod filter;
pub mod movements;
pub mod products;
pub mod projection;
pub mod reconcile;
pub mod reports;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use stockroom_core::{anomaly::AnomalySettings, store::InventoryStore};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct AppState<S> {
  pub store:   Arc<S>,
  /// Detector settings used when a scan does not override them.
  pub anomaly: AnomalySettings,
}

impl<S> AppState<S> {
  pub fn new(store: Arc<S>, anomaly: AnomalySettings) -> Self { Self { store, anomaly } }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router over `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: Arc<AppState<S>>) -> Router<()>
where
  S: InventoryStore + 'static,
{
  Router::new()
    // Catalog
    .route("/products", get(products::list::<S>).post(products::create::<S>))
    .route("/products/{id}", get(products::get_one::<S>))
    // Ledger
    .route("/movements", get(movements::list::<S>).post(movements::create::<S>))
    .route("/movements/detected", post(movements::detected::<S>))
    // Read models
    .route("/projection", get(projection::handler::<S>))
    .route("/reports", get(reports::handler::<S>))
    // Anomalies
    .route("/anomalies", get(anomalies::list::<S>))
    .route("/anomalies/scan", post(anomalies::scan::<S>))
    // Integrity
    .route("/reconcile", get(reconcile::check::<S>).post(reconcile::run::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
