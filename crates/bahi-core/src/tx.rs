//! The `LedgerTx` trait — synchronous access to every persisted aggregate from
//! inside one storage transaction.
//!
//! All engines in this crate are written against this trait. A backend opens a
//! transaction, hands a `LedgerTx` to an engine function, and commits only if
//! the function returns `Ok`. Nothing an engine writes is visible to other
//! callers until then, so an engine may freely read-then-write.

use uuid::Uuid;

use crate::{
  Result,
  challan::{Allocation, Challan},
  ledger::{Counters, LedgerDelta, LedgerFilter, LedgerKey, LedgerRecord},
  order::Order,
  piece::{NewPiece, PieceFilter, PieceStatus, StockPiece},
  production::ProductionEvent,
};

pub trait LedgerTx {
  // ── Ledger records ────────────────────────────────────────────────────

  fn get_ledger(&mut self, ledger_id: Uuid) -> Result<Option<LedgerRecord>>;

  /// Exact-key lookup.
  fn find_ledger(&mut self, key: &LedgerKey) -> Result<Option<LedgerRecord>>;

  /// Records matching a loose key, in creation order.
  fn list_ledger(&mut self, filter: &LedgerFilter) -> Result<Vec<LedgerRecord>>;

  /// Insert a zeroed record for `key`. The key must not exist yet.
  fn insert_ledger(&mut self, key: &LedgerKey) -> Result<LedgerRecord>;

  /// Add `delta` to a record's counters and return the updated record.
  fn apply_delta(&mut self, ledger_id: Uuid, delta: &LedgerDelta) -> Result<LedgerRecord>;

  /// Replace a record's counters wholesale. Reserved for reconciliation.
  fn overwrite_counters(&mut self, ledger_id: Uuid, counters: &Counters) -> Result<()>;

  fn delete_ledger(&mut self, ledger_id: Uuid) -> Result<bool>;

  fn find_or_create_ledger(&mut self, key: &LedgerKey) -> Result<LedgerRecord> {
    match self.find_ledger(key)? {
      Some(record) => Ok(record),
      None => self.insert_ledger(key),
    }
  }

  // ── Pieces ────────────────────────────────────────────────────────────

  /// Mint one `Available` piece per entry, owned by `production`.
  fn insert_pieces(
    &mut self,
    production: &ProductionEvent,
    pieces: &[NewPiece],
  ) -> Result<Vec<StockPiece>>;

  fn get_piece(&mut self, piece_id: Uuid) -> Result<Option<StockPiece>>;

  /// Pieces matching `filter`, in creation (FIFO) order.
  fn list_pieces(&mut self, filter: &PieceFilter) -> Result<Vec<StockPiece>>;

  /// Set status and challan assignment for the given pieces.
  fn set_piece_status(
    &mut self,
    piece_ids: &[Uuid],
    status: PieceStatus,
    challan_id: Option<Uuid>,
  ) -> Result<()>;

  fn delete_pieces_by_production(&mut self, production_id: Uuid) -> Result<()>;

  fn mark_sold(&mut self, piece_ids: &[Uuid], challan_id: Uuid) -> Result<()> {
    self.set_piece_status(piece_ids, PieceStatus::Sold, Some(challan_id))
  }

  fn mark_available(&mut self, piece_ids: &[Uuid]) -> Result<()> {
    self.set_piece_status(piece_ids, PieceStatus::Available, None)
  }

  // ── Productions ───────────────────────────────────────────────────────

  fn insert_production(&mut self, event: &ProductionEvent) -> Result<()>;

  fn replace_production(&mut self, event: &ProductionEvent) -> Result<()>;

  fn get_production(&mut self, production_id: Uuid) -> Result<Option<ProductionEvent>>;

  fn delete_production(&mut self, production_id: Uuid) -> Result<()>;

  /// Every production event, oldest first.
  fn all_productions(&mut self) -> Result<Vec<ProductionEvent>>;

  // ── Orders ────────────────────────────────────────────────────────────

  fn insert_order(&mut self, order: &Order) -> Result<()>;

  /// Persist status and line state of an existing order.
  fn save_order(&mut self, order: &Order) -> Result<()>;

  fn get_order(&mut self, order_id: Uuid) -> Result<Option<Order>>;

  /// Every order, oldest first.
  fn all_orders(&mut self) -> Result<Vec<Order>>;

  // ── Challans ──────────────────────────────────────────────────────────

  fn insert_challan(&mut self, challan: &Challan) -> Result<()>;

  fn save_challan(&mut self, challan: &Challan) -> Result<()>;

  fn get_challan(&mut self, challan_id: Uuid) -> Result<Option<Challan>>;

  fn delete_challan(&mut self, challan_id: Uuid) -> Result<()>;

  /// Every committed challan, oldest first.
  fn all_challans(&mut self) -> Result<Vec<Challan>>;

  /// Replace the allocations of one challan line.
  fn set_allocations(
    &mut self,
    challan_id: Uuid,
    line_id: Uuid,
    allocations: &[Allocation],
  ) -> Result<()> {
    let mut challan = self
      .get_challan(challan_id)?
      .ok_or(crate::Error::ChallanNotFound(challan_id))?;
    if let Some(line) = challan.lines.iter_mut().find(|l| l.line_id == line_id) {
      line.allocations = allocations.to_vec();
    }
    self.save_challan(&challan)
  }
}
