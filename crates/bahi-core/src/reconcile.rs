//! Reconciliation — rebuild every ledger counter from the event history.
//!
//! The incremental paths (intake, reservation, dispatch) can drift when data is
//! edited out of band or a record is deleted administratively. This engine
//! ignores the stored counters entirely and replays:
//!
//! 1. every production event into `supplied`,
//! 2. every committed challan allocation out of `supplied`,
//! 3. every open order's undispatched remainder into `reserved`,
//!
//! then clamps at zero and writes back only the records that differ. Running it
//! twice with no new events performs no writes the second time.

use std::collections::{HashMap, HashSet};

use rust_decimal::{Decimal, prelude::ToPrimitive as _};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Result,
  challan::Allocation,
  ledger::{Counters, LedgerDelta, LedgerFilter, LedgerKey, LedgerRecord, StockKind},
  order::{Demand, OrderLine},
  piece::{PieceFilter, PieceStatus},
  tx::LedgerTx,
};

/// A record whose stored counters did not match the replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Correction {
  pub ledger_id: Uuid,
  pub key:       LedgerKey,
  pub before:    Counters,
  pub after:     Counters,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecomputeReport {
  pub records_examined:        usize,
  pub records_created:         usize,
  pub corrections:             Vec<Correction>,
  /// Challan lines whose allocations pointed at a deleted record.
  pub challan_lines_repointed: usize,
  /// Orders whose lines now charge a different record.
  pub orders_repointed:        usize,
  pub pieces_resynced:         usize,
}

// ─── Accumulator ─────────────────────────────────────────────────────────────

/// Every ledger record with a fresh counter accumulator beside it.
struct Book {
  records: Vec<LedgerRecord>,
  acc:     Vec<Counters>,
  by_id:   HashMap<Uuid, usize>,
  by_key:  HashMap<LedgerKey, usize>,
  created: usize,
}

impl Book {
  fn load<T: LedgerTx>(tx: &mut T) -> Result<Self> {
    let records = tx.list_ledger(&LedgerFilter::default())?;
    let by_id = records.iter().enumerate().map(|(i, r)| (r.ledger_id, i)).collect();
    let by_key = records.iter().enumerate().map(|(i, r)| (r.key.clone(), i)).collect();
    let acc = vec![Counters::default(); records.len()];
    Ok(Self { records, acc, by_id, by_key, created: 0 })
  }

  fn index_or_create<T: LedgerTx>(&mut self, tx: &mut T, key: &LedgerKey) -> Result<usize> {
    if let Some(&i) = self.by_key.get(key) {
      return Ok(i);
    }
    let record = tx.insert_ledger(key)?;
    let i = self.records.len();
    self.by_id.insert(record.ledger_id, i);
    self.by_key.insert(key.clone(), i);
    self.records.push(record);
    self.acc.push(Counters::default());
    self.created += 1;
    Ok(i)
  }

  /// Candidate indices for `filter`, most `score` first; ties keep creation
  /// order.
  fn ranked(&self, filter: &LedgerFilter, score: impl Fn(&Counters) -> Decimal) -> Vec<usize> {
    let mut idx: Vec<usize> =
      (0..self.records.len()).filter(|&i| filter.matches(&self.records[i].key)).collect();
    idx.sort_by(|&a, &b| score(&self.acc[b]).cmp(&score(&self.acc[a])));
    idx
  }

  /// Subtract an allocation whose record no longer exists from the
  /// most-stocked matching records. Taka piece counts follow the length taken
  /// proportionally. The pieces keep releasing from the original hold record
  /// until [`rehome_holds`] points them at a live one.
  fn deduct_greedy(&mut self, filter: &LedgerFilter, a: &Allocation) -> Vec<Allocation> {
    let kind = filter.kind.unwrap_or(StockKind::Taka);
    let stock = move |c: &Counters| match kind {
      StockKind::Taka => c.supplied_length,
      StockKind::Saree => Decimal::from(c.supplied_pieces),
    };

    let mut out = Vec::new();
    let mut left_length = a.length;
    let mut left_pieces = a.pieces;
    let mut held_length = a.reserved_length;
    let mut held_pieces = a.reserved_pieces;
    let hold = a.hold_ledger_id();
    for i in self.ranked(filter, stock) {
      let (length, pieces) = match kind {
        StockKind::Taka => {
          if left_length <= Decimal::ZERO {
            break;
          }
          let have = self.acc[i].supplied_length.max(Decimal::ZERO);
          if have <= Decimal::ZERO {
            continue;
          }
          let take = left_length.min(have);
          let share = if a.length > Decimal::ZERO {
            (Decimal::from(a.pieces) * take / a.length).round().to_i64().unwrap_or(0)
          } else {
            0
          };
          (take, share.min(self.acc[i].supplied_pieces.max(0)).min(left_pieces))
        }
        StockKind::Saree => {
          if left_pieces <= 0 {
            break;
          }
          let take = left_pieces.min(self.acc[i].supplied_pieces.max(0));
          if take == 0 {
            continue;
          }
          (self.records[i].key.length_for_units(take), take)
        }
      };
      self.acc[i].apply(&LedgerDelta::supply(-length, -pieces));
      left_length -= length;
      left_pieces -= pieces;
      let reserved_length = held_length.min(length);
      let reserved_pieces = held_pieces.min(pieces);
      held_length -= reserved_length;
      held_pieces -= reserved_pieces;
      out.push(Allocation {
        ledger_id: self.records[i].ledger_id,
        matching_id: a.matching_id,
        length,
        pieces,
        reserved_length,
        reserved_pieces,
        held_ledger_id: (reserved_length > Decimal::ZERO || reserved_pieces > 0).then_some(hold),
        piece_ids: Vec::new(),
      });
    }

    if left_length > Decimal::ZERO || left_pieces > 0 {
      tracing::warn!(
        length = %left_length,
        pieces = left_pieces,
        "dispatched stock exceeds replayed supply; remainder unexplained",
      );
    }
    // Rolls stay attached to the line so a later reversal can release them.
    match out.first_mut() {
      Some(first) => first.piece_ids = a.piece_ids.clone(),
      None if !a.piece_ids.is_empty() => out.push(Allocation {
        length: Decimal::ZERO,
        pieces: 0,
        reserved_length: Decimal::ZERO,
        reserved_pieces: 0,
        held_ledger_id: None,
        ..a.clone()
      }),
      None => {}
    }
    out
  }

  /// The record a line's reservation belongs on: the one it is already
  /// charged to while that still exists and matches, else the most-available
  /// record for `filter` on the accumulators, else a placeholder.
  fn reserve_target<T: LedgerTx>(
    &mut self,
    tx: &mut T,
    filter: &LedgerFilter,
    charged: Option<Uuid>,
    placeholder: LedgerKey,
  ) -> Result<usize> {
    if let Some(&i) = charged.and_then(|id| self.by_id.get(&id))
      && filter.matches(&self.records[i].key)
    {
      return Ok(i);
    }
    let kind = placeholder.kind;
    match self.ranked(filter, |c| c.available_for(kind)).first() {
      Some(&i) => Ok(i),
      None => self.index_or_create(tx, &placeholder),
    }
  }
}

/// A line's pinned factory wins over the challan line's.
fn line_filter(line: &OrderLine, factory_id: Option<Uuid>, matching_id: Option<Uuid>) -> LedgerFilter {
  let base = match matching_id {
    Some(m) => line.matching_filter(m),
    None => line.filter(),
  };
  LedgerFilter { factory_id: base.factory_id.or(factory_id), ..base }
}

/// Point allocations whose hold record is gone at the record their order line
/// is charged to now. Returns whether anything changed.
fn rehome_holds(book: &Book, order_line: Option<&OrderLine>, allocations: &mut [Allocation]) -> bool {
  let mut changed = false;
  for a in allocations {
    let Some(hold) = a.held_ledger_id else { continue };
    if book.by_id.contains_key(&hold) {
      continue;
    }
    let charged = order_line
      .and_then(|l| l.charged_ledger(a.matching_id))
      .filter(|id| book.by_id.contains_key(id));
    a.held_ledger_id = charged.filter(|id| *id != a.ledger_id);
    changed = true;
  }
  changed
}

/// A replayed challan line waiting for its hold records to settle.
struct Replayed {
  challan_id:    Uuid,
  line_id:       Uuid,
  order_line_id: Uuid,
  order:         Option<usize>,
  allocations:   Vec<Allocation>,
  repointed:     bool,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Recompute every ledger record from scratch and resynchronise piece
/// statuses. Must run with exclusive write access to the ledger.
pub fn recompute_all<T: LedgerTx>(tx: &mut T) -> Result<RecomputeReport> {
  let mut book = Book::load(tx)?;
  let mut report = RecomputeReport::default();

  // 1. Supply.
  for event in tx.all_productions()? {
    for (key, delta) in event.supply() {
      let i = book.index_or_create(tx, &key)?;
      book.acc[i].apply(&delta);
    }
  }

  // 2. Dispatch.
  let mut orders = tx.all_orders()?;
  let order_idx: HashMap<Uuid, usize> =
    orders.iter().enumerate().map(|(i, o)| (o.order_id, i)).collect();

  let mut replayed = Vec::new();
  for challan in tx.all_challans()? {
    let order_pos = order_idx.get(&challan.order_id).copied();
    let order = order_pos.map(|i| &orders[i]);
    for line in &challan.lines {
      let mut allocations = Vec::with_capacity(line.allocations.len());
      let mut repointed = false;
      for a in &line.allocations {
        if let Some(&i) = book.by_id.get(&a.ledger_id) {
          book.acc[i].apply(&LedgerDelta::supply(-a.length, -a.pieces));
          allocations.push(a.clone());
          continue;
        }
        repointed = true;
        match order.and_then(|o| o.line(line.order_line_id)) {
          Some(order_line) => {
            let filter = line_filter(order_line, line.factory_id, a.matching_id);
            allocations.extend(book.deduct_greedy(&filter, a));
          }
          None => {
            tracing::warn!(challan_id = %challan.challan_id, "challan line has no order line; allocation dropped");
          }
        }
      }
      replayed.push(Replayed {
        challan_id: challan.challan_id,
        line_id: line.line_id,
        order_line_id: line.order_line_id,
        order: order_pos,
        allocations,
        repointed,
      });
    }
  }

  // 3. Open reservations.
  for order in orders.iter_mut().filter(|o| o.status.is_open()) {
    let mut repointed = false;
    for line in order.lines.iter_mut() {
      let (fabric_id, design_id, factory_id) = (line.fabric_id, line.design_id, line.factory_id);
      match line.taka_outstanding() {
        Some((length, units)) => {
          if length <= Decimal::ZERO && units <= 0 {
            continue;
          }
          let filter = line_filter(line, None, None);
          let charged = line.charged_ledger(None);
          let i = book.reserve_target(tx, &filter, charged, LedgerKey::taka(fabric_id, design_id, factory_id))?;
          book.acc[i].apply(&LedgerDelta::reserve(length, units));
          let target = Some(book.records[i].ledger_id);
          if let Demand::Taka { ledger_id, .. } = &mut line.demand
            && *ledger_id != target
          {
            *ledger_id = target;
            repointed = true;
          }
        }
        None => {
          let filters: Vec<LedgerFilter> = match &line.demand {
            Demand::Saree { matchings, .. } => {
              matchings.iter().map(|m| line_filter(line, None, Some(m.matching_id))).collect()
            }
            Demand::Taka { .. } => Vec::new(),
          };
          let Demand::Saree { cut, matchings } = &mut line.demand else { continue };
          for (m, filter) in matchings.iter_mut().zip(filters) {
            let units = m.outstanding();
            if units <= 0 {
              continue;
            }
            let placeholder = LedgerKey::saree(fabric_id, design_id, factory_id, m.matching_id, *cut);
            let i = book.reserve_target(tx, &filter, m.ledger_id, placeholder)?;
            let length = book.records[i].key.length_for_units(units);
            book.acc[i].apply(&LedgerDelta::reserve(length, units));
            let target = Some(book.records[i].ledger_id);
            if m.ledger_id != target {
              m.ledger_id = target;
              repointed = true;
            }
          }
        }
      }
    }
    if repointed {
      tx.save_order(order)?;
      report.orders_repointed += 1;
    }
  }

  // Challan lines whose supply or hold record was deleted.
  for mut r in replayed {
    let order_line = r.order.and_then(|i| orders[i].line(r.order_line_id));
    let rehomed = rehome_holds(&book, order_line, &mut r.allocations);
    if r.repointed || rehomed {
      tx.set_allocations(r.challan_id, r.line_id, &r.allocations)?;
      report.challan_lines_repointed += 1;
    }
  }

  // Write-back.
  for (record, acc) in book.records.iter().zip(&book.acc) {
    let after = acc.clamped();
    if after != record.counters {
      tracing::warn!(
        ledger_id = %record.ledger_id,
        before = ?record.counters,
        after = ?after,
        "inconsistent ledger counters; overwriting with replayed values",
      );
      tx.overwrite_counters(record.ledger_id, &after)?;
      report.corrections.push(Correction {
        ledger_id: record.ledger_id,
        key: record.key.clone(),
        before: record.counters,
        after,
      });
    }
  }
  report.records_examined = book.records.len();
  report.records_created = book.created;
  report.pieces_resynced = resync_pieces(tx)?;

  tracing::info!(
    examined = report.records_examined,
    corrected = report.corrections.len(),
    created = report.records_created,
    pieces = report.pieces_resynced,
    "ledger recomputed",
  );
  Ok(report)
}

/// Make every piece's status agree with challan assignment: rolls allocated on
/// a committed challan are `Sold` to it, all others are `Available`.
pub fn resync_pieces<T: LedgerTx>(tx: &mut T) -> Result<usize> {
  let mut assigned: HashMap<Uuid, Uuid> = HashMap::new();
  let mut challans = HashSet::new();
  for challan in tx.all_challans()? {
    challans.insert(challan.challan_id);
    for line in &challan.lines {
      for piece_id in line.piece_ids() {
        assigned.insert(piece_id, challan.challan_id);
      }
    }
  }

  let mut changed = 0;
  for piece in tx.list_pieces(&PieceFilter::default())? {
    let challan_id = assigned.get(&piece.piece_id).copied();
    let status = if challan_id.is_some() { PieceStatus::Sold } else { PieceStatus::Available };
    if piece.status != status || piece.challan_id != challan_id {
      tracing::warn!(
        piece_id = %piece.piece_id,
        label = %piece.label,
        from = piece.status.as_str(),
        to = status.as_str(),
        stale_challan = piece.challan_id.is_some_and(|c| !challans.contains(&c)),
        "piece status out of sync; corrected",
      );
      tx.set_piece_status(&[piece.piece_id], status, challan_id)?;
      changed += 1;
    }
  }
  Ok(changed)
}
