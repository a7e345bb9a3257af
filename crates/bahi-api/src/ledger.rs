//! Handlers for `/ledger` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/ledger` | Optional [`LedgerFilter`] fields as query parameters |
//! | `DELETE` | `/ledger/:id` | Administrative; run `/reconcile` afterwards |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
};
use bahi_core::{
  ledger::{LedgerFilter, LedgerView},
  store::InventoryStore,
};
use uuid::Uuid;

use crate::error::ApiError;

/// `GET /ledger[?fabric_id=..][&design_id=..][&factory_id=..][&matching_id=..][&kind=..][&cut=..]`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Query(filter): Query<LedgerFilter>,
) -> Result<Json<Vec<LedgerView>>, ApiError>
where
  S: InventoryStore,
{
  let records = store.list_ledger(&filter).await.map_err(ApiError::store)?;
  Ok(Json(records.into_iter().map(LedgerView::from).collect()))
}

/// `DELETE /ledger/:id`
pub async fn delete<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: InventoryStore,
{
  store.delete_ledger_record(id).await.map_err(ApiError::store)?;
  Ok(StatusCode::NO_CONTENT)
}
