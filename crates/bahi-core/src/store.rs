//! The `InventoryStore` trait — the async surface consumed by the API and the
//! binaries.
//!
//! Every mutating method runs as one atomic unit: either all of its counter,
//! piece and order changes land, or none do. Backends implement it by running
//! the engine functions of this crate inside a storage transaction.

use std::future::Future;

use uuid::Uuid;

use crate::{
  challan::{Challan, NewChallan},
  ledger::{LedgerFilter, LedgerRecord},
  order::{NewOrder, NewOrderLine, Order},
  piece::{PieceFilter, StockPiece},
  production::{NewProduction, ProductionEvent},
  reconcile::RecomputeReport,
  validator::Availability,
};

/// Store errors must expose the domain error they carry, if any, so callers
/// can tell a shortage from a broken database.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  fn core(&self) -> Option<&crate::Error>;
}

pub trait InventoryStore: Send + Sync {
  type Error: StoreError;

  // ── Production intake ─────────────────────────────────────────────────

  fn record_production(
    &self,
    input: NewProduction,
  ) -> impl Future<Output = Result<ProductionEvent, Self::Error>> + Send + '_;

  /// Unapply the existing event and apply `input` in its place.
  fn update_production(
    &self,
    id: Uuid,
    input: NewProduction,
  ) -> impl Future<Output = Result<ProductionEvent, Self::Error>> + Send + '_;

  fn delete_production(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_production(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<ProductionEvent>, Self::Error>> + Send + '_;

  // ── Orders ────────────────────────────────────────────────────────────

  /// Persist an order and reserve its lines. With `enforce_stock`, refuse it
  /// when [`check`](Self::check) would report shortages.
  fn place_order(
    &self,
    input: NewOrder,
    enforce_stock: bool,
  ) -> impl Future<Output = Result<Order, Self::Error>> + Send + '_;

  fn cancel_order(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Order, Self::Error>> + Send + '_;

  fn get_order(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Order>, Self::Error>> + Send + '_;

  /// Read-only availability check for prospective order lines.
  fn check(
    &self,
    lines: Vec<NewOrderLine>,
  ) -> impl Future<Output = Result<Availability, Self::Error>> + Send + '_;

  // ── Challans ──────────────────────────────────────────────────────────

  /// Dry-run a challan; nothing is written.
  fn validate_dispatch(
    &self,
    input: NewChallan,
  ) -> impl Future<Output = Result<Availability, Self::Error>> + Send + '_;

  fn create_challan(
    &self,
    input: NewChallan,
  ) -> impl Future<Output = Result<Challan, Self::Error>> + Send + '_;

  fn update_challan(
    &self,
    id: Uuid,
    input: NewChallan,
  ) -> impl Future<Output = Result<Challan, Self::Error>> + Send + '_;

  fn delete_challan(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_challan(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Challan>, Self::Error>> + Send + '_;

  // ── Reconciliation ────────────────────────────────────────────────────

  fn recompute_all(
    &self,
  ) -> impl Future<Output = Result<RecomputeReport, Self::Error>> + Send + '_;

  /// Returns the number of pieces whose status was corrected.
  fn resync_pieces(
    &self,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Reads & administration ────────────────────────────────────────────

  fn list_ledger<'a>(
    &'a self,
    filter: &'a LedgerFilter,
  ) -> impl Future<Output = Result<Vec<LedgerRecord>, Self::Error>> + Send + 'a;

  fn list_pieces<'a>(
    &'a self,
    filter: &'a PieceFilter,
  ) -> impl Future<Output = Result<Vec<StockPiece>, Self::Error>> + Send + 'a;

  fn get_piece(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<StockPiece>, Self::Error>> + Send + '_;

  /// Remove a ledger record outright. Reconciliation re-derives whatever the
  /// event history still attributes to its key.
  fn delete_ledger_record(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
