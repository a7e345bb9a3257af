//! Handlers for `/pieces` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/pieces` | Optional [`PieceFilter`] fields; creation order |
//! | `GET`  | `/pieces/:id` | 404 if not found |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use bahi_core::{
  piece::{PieceFilter, StockPiece},
  store::InventoryStore,
};
use uuid::Uuid;

use crate::error::ApiError;

/// `GET /pieces[?status=available][&fabric_id=..][&label=..]`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Query(filter): Query<PieceFilter>,
) -> Result<Json<Vec<StockPiece>>, ApiError>
where
  S: InventoryStore,
{
  let pieces = store.list_pieces(&filter).await.map_err(ApiError::store)?;
  Ok(Json(pieces))
}

/// `GET /pieces/:id`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<StockPiece>, ApiError>
where
  S: InventoryStore,
{
  let piece = store
    .get_piece(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("piece {id} not found")))?;
  Ok(Json(piece))
}
