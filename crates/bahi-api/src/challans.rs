//! Handlers for `/challans` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/challans` | Body: [`NewChallan`]; 201, or 409 with shortages |
//! | `POST`   | `/challans/validate` | Dry run; always 200 with an [`Availability`] |
//! | `GET`    | `/challans/:id` | 404 if not found |
//! | `PUT`    | `/challans/:id` | Reverts and recommits; on 409 the old challan stands |
//! | `DELETE` | `/challans/:id` | Reverts every allocation |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use bahi_core::{
  challan::{Challan, NewChallan},
  store::InventoryStore,
  validator::Availability,
};
use uuid::Uuid;

use crate::error::ApiError;

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /challans`
pub async fn create<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewChallan>,
) -> Result<impl IntoResponse, ApiError>
where
  S: InventoryStore,
{
  let challan = store.create_challan(body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(challan)))
}

/// `POST /challans/validate`
pub async fn validate<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewChallan>,
) -> Result<Json<Availability>, ApiError>
where
  S: InventoryStore,
{
  let availability = store.validate_dispatch(body).await.map_err(ApiError::store)?;
  Ok(Json(availability))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /challans/:id`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Challan>, ApiError>
where
  S: InventoryStore,
{
  let challan = store
    .get_challan(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("challan {id} not found")))?;
  Ok(Json(challan))
}

// ─── Update / delete ──────────────────────────────────────────────────────────

/// `PUT /challans/:id`
pub async fn update<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<NewChallan>,
) -> Result<Json<Challan>, ApiError>
where
  S: InventoryStore,
{
  let challan = store.update_challan(id, body).await.map_err(ApiError::store)?;
  Ok(Json(challan))
}

/// `DELETE /challans/:id`
pub async fn delete<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: InventoryStore,
{
  store.delete_challan(id).await.map_err(ApiError::store)?;
  Ok(StatusCode::NO_CONTENT)
}
