//! Handlers for `/productions` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/productions` | Body: [`NewProduction`]; returns 201 + stored event |
//! | `GET`    | `/productions/:id` | 404 if not found |
//! | `PUT`    | `/productions/:id` | Replaces the slip; supply is unapplied and re-applied |
//! | `DELETE` | `/productions/:id` | 409 while any of its rolls is sold |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use bahi_core::{
  production::{NewProduction, ProductionEvent},
  store::InventoryStore,
};
use uuid::Uuid;

use crate::error::ApiError;

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /productions`
pub async fn create<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewProduction>,
) -> Result<impl IntoResponse, ApiError>
where
  S: InventoryStore,
{
  let event = store.record_production(body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(event)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /productions/:id`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<ProductionEvent>, ApiError>
where
  S: InventoryStore,
{
  let event = store
    .get_production(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("production {id} not found")))?;
  Ok(Json(event))
}

// ─── Update ───────────────────────────────────────────────────────────────────

/// `PUT /productions/:id`
pub async fn update<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<NewProduction>,
) -> Result<Json<ProductionEvent>, ApiError>
where
  S: InventoryStore,
{
  let event = store.update_production(id, body).await.map_err(ApiError::store)?;
  Ok(Json(event))
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// `DELETE /productions/:id`
pub async fn delete<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: InventoryStore,
{
  store.delete_production(id).await.map_err(ApiError::store)?;
  Ok(StatusCode::NO_CONTENT)
}
