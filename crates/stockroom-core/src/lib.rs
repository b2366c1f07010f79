//! Core types and pure pipeline stages for the Stockroom inventory ledger.
//!
//! This crate has no HTTP or database dependencies. It owns
//! the catalog and movement types, the ledger apply step, the stock projector,
//! the analytics aggregator and the anomaly feature builder. Storage backends
//! implement [`store::InventoryStore`]; everything else here is a pure
//! function over immutable input.

pub mod analytics;
pub mod anomaly;
pub mod error;
pub mod movement;
pub mod product;
pub mod projector;
pub mod store;
pub mod timestamp;

pub use error::{Error, Result};
