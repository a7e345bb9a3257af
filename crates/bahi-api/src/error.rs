//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use bahi_core::{Error as CoreError, store::StoreError, validator::Shortage};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  /// Rendered as `409` with the itemised shortages in the body.
  #[error("insufficient stock")]
  InsufficientStock(Vec<Shortage>),

  /// A write lost a lock race even after retries; the client may try again.
  #[error("unavailable: {0}")]
  Unavailable(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Classify a store failure by the domain error underneath it, if any.
  pub fn store<E: StoreError>(e: E) -> Self {
    let mapped = match e.core() {
      Some(CoreError::InsufficientStock(shortages)) => {
        Some(Self::InsufficientStock(shortages.clone()))
      }
      Some(c) if c.is_not_found() => Some(Self::NotFound(c.to_string())),
      Some(CoreError::InvalidInput(m)) => Some(Self::BadRequest(m.clone())),
      Some(c @ (CoreError::OrderClosed(_) | CoreError::PiecesInUse(_))) => {
        Some(Self::Conflict(c.to_string()))
      }
      Some(CoreError::ConcurrencyConflict(m)) => Some(Self::Unavailable(m.clone())),
      _ => None,
    };
    mapped.unwrap_or_else(|| Self::Store(Box::new(e)))
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::InsufficientStock(shortages) => {
        let body = json!({ "error": self.to_string(), "shortages": shortages });
        return (StatusCode::CONFLICT, Json(body)).into_response();
      }
      ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store failure");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
