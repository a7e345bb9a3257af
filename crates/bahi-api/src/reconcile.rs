//! Handlers for `/reconcile` endpoints. Both run with exclusive write access
//! and may take a while on a large ledger.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/reconcile` | Full recompute; returns a [`RecomputeReport`] |
//! | `POST` | `/reconcile/pieces` | Piece status resync only |

use std::sync::Arc;

use axum::{Json, extract::State};
use bahi_core::{reconcile::RecomputeReport, store::InventoryStore};
use serde::Serialize;

use crate::error::ApiError;

/// `POST /reconcile`
pub async fn recompute<S>(State(store): State<Arc<S>>) -> Result<Json<RecomputeReport>, ApiError>
where
  S: InventoryStore,
{
  let report = store.recompute_all().await.map_err(ApiError::store)?;
  Ok(Json(report))
}

#[derive(Debug, Serialize)]
pub struct ResyncResponse {
  pub pieces_resynced: usize,
}

/// `POST /reconcile/pieces`
pub async fn resync_pieces<S>(
  State(store): State<Arc<S>>,
) -> Result<Json<ResyncResponse>, ApiError>
where
  S: InventoryStore,
{
  let pieces_resynced = store.resync_pieces().await.map_err(ApiError::store)?;
  Ok(Json(ResyncResponse { pieces_resynced }))
}
