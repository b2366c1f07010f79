//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Domain failures keep their stable code in the body:
//! `{"error": "<message>", "code": "<code>"}`.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use stockroom_core::{Error as CoreError, store::BackendError};
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// A business rule or integrity check refused the request.
  #[error("{message}")]
  Rejected {
    status:  StatusCode,
    code:    &'static str,
    message: String,
  },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Map a backend failure, surfacing the domain error underneath if any.
  pub fn from_store<E: BackendError>(e: E) -> Self {
    let rejection = e
      .domain()
      .filter(|d| domain_status(d) != StatusCode::INTERNAL_SERVER_ERROR)
      .map(Self::rejected);
    rejection.unwrap_or_else(|| Self::Store(Box::new(e)))
  }

  fn rejected(e: &CoreError) -> Self {
    Self::Rejected {
      status:  domain_status(e),
      code:    e.code(),
      message: e.to_string(),
    }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      Self::NotFound(_) => StatusCode::NOT_FOUND,
      Self::BadRequest(_) => StatusCode::BAD_REQUEST,
      Self::Rejected { status, .. } => *status,
      Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn code(&self) -> &'static str {
    match self {
      Self::NotFound(_) => "not_found",
      Self::BadRequest(_) => "bad_request",
      Self::Rejected { code, .. } => *code,
      Self::Store(_) => "store_error",
    }
  }
}

impl From<CoreError> for ApiError {
  fn from(e: CoreError) -> Self {
    match domain_status(&e) {
      StatusCode::INTERNAL_SERVER_ERROR => Self::Store(Box::new(e)),
      _ => Self::rejected(&e),
    }
  }
}

fn domain_status(e: &CoreError) -> StatusCode {
  match e {
    CoreError::ProductNotFound(_) | CoreError::ProductNameNotFound(_) => {
      StatusCode::NOT_FOUND
    }
    CoreError::InvalidMovementType(_)
    | CoreError::InvalidQuantity(_)
    | CoreError::InvalidProduct(_)
    | CoreError::InvalidTimestamp(_)
    | CoreError::MissingTimeColumns(_)
    | CoreError::MissingRequiredColumns(_) => StatusCode::BAD_REQUEST,
    CoreError::InsufficientStock { .. }
    | CoreError::BackdatedMovement { .. }
    | CoreError::DuplicateProduct(_)
    | CoreError::LedgerCorruption(_) => StatusCode::CONFLICT,
    CoreError::ModelOutput { .. } | CoreError::Serialization(_) => {
      StatusCode::INTERNAL_SERVER_ERROR
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }
    let body = json!({ "error": self.to_string(), "code": self.code() });
    (status, Json(body)).into_response()
  }
}
