//! Error type for `stockroom-store-sqlite`.

use std::path::PathBuf;

use stockroom_core::store::BackendError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] stockroom_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("i/o error on {path}: {source}")]
  Io {
    path:   PathBuf,
    source: std::io::Error,
  },

  /// A column held a value that does not decode into its domain type.
  #[error("corrupt column {column}: {value:?}")]
  Decode {
    column: &'static str,
    value:  String,
  },
}

impl BackendError for Error {
  fn domain(&self) -> Option<&stockroom_core::Error> {
    match self {
      Self::Core(e) => Some(e),
      _ => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
