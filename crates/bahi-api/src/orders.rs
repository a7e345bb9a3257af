//! Handlers for `/orders` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/orders` | Body: [`NewOrder`]; optional `?enforce_stock=true`; returns 201 |
//! | `POST` | `/orders/check` | Body: `{"lines":[...]}`; always 200 with an [`Availability`] |
//! | `GET`  | `/orders/:id` | 404 if not found |
//! | `POST` | `/orders/:id/cancel` | Releases what is still reserved |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use bahi_core::{
  order::{NewOrder, NewOrderLine, Order},
  store::InventoryStore,
  validator::Availability,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

// ─── Place ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct PlaceParams {
  /// Refuse the order (409, nothing written) when stock cannot cover it.
  #[serde(default)]
  pub enforce_stock: bool,
}

/// `POST /orders[?enforce_stock=true]`
pub async fn place<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<PlaceParams>,
  Json(body): Json<NewOrder>,
) -> Result<impl IntoResponse, ApiError>
where
  S: InventoryStore,
{
  let order = store
    .place_order(body, params.enforce_stock)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(order)))
}

// ─── Check ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CheckBody {
  pub lines: Vec<NewOrderLine>,
}

/// `POST /orders/check` — a shortfall is data, not an error.
pub async fn check<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<CheckBody>,
) -> Result<Json<Availability>, ApiError>
where
  S: InventoryStore,
{
  let availability = store.check(body.lines).await.map_err(ApiError::store)?;
  Ok(Json(availability))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /orders/:id`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Order>, ApiError>
where
  S: InventoryStore,
{
  let order = store
    .get_order(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("order {id} not found")))?;
  Ok(Json(order))
}

// ─── Cancel ───────────────────────────────────────────────────────────────────

/// `POST /orders/:id/cancel`
pub async fn cancel<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Order>, ApiError>
where
  S: InventoryStore,
{
  let order = store.cancel_order(id).await.map_err(ApiError::store)?;
  Ok(Json(order))
}
