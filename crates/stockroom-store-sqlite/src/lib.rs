//! SQLite backend for the Stockroom inventory ledger.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. The [`interchange`] module reads and
//! writes the JSON file layouts used to seed and export a store.

mod encode;
mod schema;
mod store;

pub mod error;
pub mod interchange;

pub use error::{Error, Result};
pub use store::{ImportSummary, SqliteStore};

#[cfg(test)]
mod tests;
