//! Dispatch fulfillment — the challan state machine.
//!
//! A challan line is validated against the ledger, committed (counters down,
//! pieces sold, order credited), and on edit or delete reverted by replaying
//! the negation of what was committed. Validation never fails fast: every
//! shortage in the request is collected before the request is refused.
//!
//! A line may draw on the record's free stock plus whatever its own order line
//! still holds reserved there. Sending more than was ordered is allowed as long
//! as stock covers it; each allocation records how much of it came out of the
//! reservation, and from which record, so reversal restores exactly that much.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use rust_decimal::{Decimal, prelude::ToPrimitive as _};
use uuid::Uuid;

use crate::{
  Error, Result,
  challan::{Allocation, Challan, ChallanLine, DispatchRequest, NewChallan, NewChallanLine},
  ledger::{LedgerDelta, LedgerFilter, LedgerKey, LedgerRecord, most_available},
  order::{Demand, DispatchStatus, Order, OrderLine},
  piece::{PieceFilter, StockPiece, fill_fifo},
  tx::LedgerTx,
  validator::{Availability, Claims, Shortage, ShortageUnit},
};

// ─── Planning ────────────────────────────────────────────────────────────────

/// Reservation still held by each order line (and matching) while a request is
/// planned. Drawing on it does not consume free stock.
#[derive(Default)]
struct Holds {
  left:  HashMap<(Uuid, Option<Uuid>), Decimal>,
  rolls: HashMap<Uuid, i64>,
}

impl Holds {
  /// Length for taka lines, unit count for saree matchings.
  fn left(&mut self, line: &OrderLine, matching_id: Option<Uuid>) -> &mut Decimal {
    self.left.entry((line.line_id, matching_id)).or_insert_with(|| match (&line.demand, matching_id) {
      (Demand::Taka { .. }, _) => line.taka_outstanding().map_or(Decimal::ZERO, |(l, _)| l),
      (Demand::Saree { matchings, .. }, Some(mid)) => matchings
        .iter()
        .find(|m| m.matching_id == mid)
        .map_or(Decimal::ZERO, |m| Decimal::from(m.outstanding())),
      (Demand::Saree { .. }, None) => Decimal::ZERO,
    })
  }

  /// Taka roll count still reserved by `line`.
  fn rolls(&mut self, line: &OrderLine) -> &mut i64 {
    self
      .rolls
      .entry(line.line_id)
      .or_insert_with(|| line.taka_outstanding().map_or(0, |(_, units)| units))
  }
}

/// Running state while a whole request is planned.
#[derive(Default)]
struct Planner {
  claims:    Claims,
  holds:     Holds,
  /// Reservation released so far from each charged record, as
  /// `(length, pieces)`. Saree matchings count units in `pieces`.
  released:  HashMap<Uuid, (Decimal, i64)>,
  /// Charged records looked up so far; `None` when the record is gone.
  charged:   HashMap<Uuid, Option<LedgerRecord>>,
  used:      HashSet<Uuid>,
  shortages: Vec<Shortage>,
}

impl Planner {
  /// The record holding the line's reservation when drawing on `record`.
  /// A line with no charged record, or one whose record is gone, releases
  /// from the record it draws on.
  fn hold_record<T: LedgerTx>(
    &mut self,
    tx: &mut T,
    line: &OrderLine,
    matching_id: Option<Uuid>,
    record: &LedgerRecord,
  ) -> Result<LedgerRecord> {
    let Some(id) = line.charged_ledger(matching_id).filter(|id| *id != record.ledger_id) else {
      return Ok(record.clone());
    };
    if !self.charged.contains_key(&id) {
      let found = tx.get_ledger(id)?;
      self.charged.insert(id, found);
    }
    Ok(self.charged.get(&id).cloned().flatten().unwrap_or_else(|| record.clone()))
  }

  /// Held reservation still releasable from `hold`, capped by what that
  /// record actually has reserved.
  fn held(&mut self, line: &OrderLine, matching_id: Option<Uuid>, hold: &LedgerRecord) -> Decimal {
    let (length, pieces) = self.released.get(&hold.ledger_id).copied().unwrap_or_default();
    let reserved = match matching_id {
      None => hold.counters.reserved_length - length,
      Some(_) => Decimal::from(hold.counters.reserved_pieces - pieces),
    };
    (*self.holds.left(line, matching_id)).min(reserved.max(Decimal::ZERO))
  }

  /// How much `line` can draw from `record`. Its hold only adds capacity when
  /// it sits on the same record; a hold elsewhere is released but brings no
  /// stock with it.
  fn capacity(
    &mut self,
    line: &OrderLine,
    matching_id: Option<Uuid>,
    record: &LedgerRecord,
    hold: &LedgerRecord,
  ) -> Decimal {
    let free = self.claims.free(record);
    if hold.ledger_id == record.ledger_id {
      free + self.held(line, matching_id, hold)
    } else {
      free
    }
  }

  /// Book `amount` against `record`, releasing as much of the hold as covers
  /// it. Returns the part released.
  fn take(
    &mut self,
    line: &OrderLine,
    matching_id: Option<Uuid>,
    record: &LedgerRecord,
    hold: &LedgerRecord,
    amount: Decimal,
  ) -> Decimal {
    let from_hold = self.held(line, matching_id, hold).min(amount);
    *self.holds.left(line, matching_id) -= from_hold;
    let released = self.released.entry(hold.ledger_id).or_default();
    match matching_id {
      None => released.0 += from_hold,
      Some(_) => released.1 += from_hold.to_i64().unwrap_or(0),
    }
    let from_free = if hold.ledger_id == record.ledger_id { amount - from_hold } else { amount };
    self.claims.claim(record.ledger_id, from_free);
    from_hold
  }

  /// Book a taka draw of `pieces`, returning an allocation that releases as
  /// much of the line's reservation as it used.
  fn take_rolls(
    &mut self,
    line: &OrderLine,
    record: &LedgerRecord,
    hold: &LedgerRecord,
    pieces: &[StockPiece],
  ) -> Allocation {
    let length: Decimal = pieces.iter().map(|pc| pc.length).sum();
    let rolls = pieces.len() as i64;
    let reserved_length = self.take(line, None, record, hold, length);
    let reserved_pieces = if reserved_length > Decimal::ZERO {
      let released = self.released.entry(hold.ledger_id).or_default();
      let held = self.holds.rolls(line);
      let n = rolls.min(*held).min((hold.counters.reserved_pieces - released.1).max(0));
      *held -= n;
      released.1 += n;
      n
    } else {
      0
    };
    Allocation {
      ledger_id: record.ledger_id,
      matching_id: None,
      length,
      pieces: rolls,
      reserved_length,
      reserved_pieces,
      held_ledger_id: held_elsewhere(record, hold, reserved_length),
      piece_ids: pieces.iter().map(|pc| pc.piece_id).collect(),
    }
  }

  /// Most-capable candidate under `filter`, with its hold record.
  fn best<T: LedgerTx>(
    &mut self,
    tx: &mut T,
    line: &OrderLine,
    matching_id: Option<Uuid>,
    filter: &LedgerFilter,
  ) -> Result<Option<(LedgerRecord, LedgerRecord)>> {
    let candidates = tx.list_ledger(filter)?;
    let mut scored = Vec::with_capacity(candidates.len());
    for r in candidates {
      let hold = self.hold_record(tx, line, matching_id, &r)?;
      scored.push((self.capacity(line, matching_id, &r, &hold), r, hold));
    }
    Ok(most_available(scored, |(score, ..)| *score).map(|(_, r, hold)| (r, hold)))
  }

  fn short(&mut self, idx: usize, line: &OrderLine, unit: ShortageUnit, required: Decimal, available: Decimal) -> &mut Shortage {
    self.shortages.push(Shortage::new(idx, line.fabric_id, unit, required, available));
    let last = self.shortages.len() - 1;
    &mut self.shortages[last]
  }
}

fn held_elsewhere(record: &LedgerRecord, hold: &LedgerRecord, released: Decimal) -> Option<Uuid> {
  (hold.ledger_id != record.ledger_id && released > Decimal::ZERO).then_some(hold.ledger_id)
}

/// Narrow a line's filter to the challan line's factory. A line pinned to
/// one factory cannot be sent from another.
fn restrict(idx: usize, filter: LedgerFilter, factory_id: Option<Uuid>) -> Result<LedgerFilter> {
  match (filter.factory_id, factory_id) {
    (Some(pinned), Some(asked)) if pinned != asked => Err(Error::InvalidInput(format!(
      "line {idx}: order line is pinned to factory {pinned}, not {asked}"
    ))),
    (pinned, asked) => Ok(LedgerFilter { factory_id: pinned.or(asked), ..filter }),
  }
}

fn plan_selected_pieces<T: LedgerTx>(
  tx: &mut T,
  p: &mut Planner,
  idx: usize,
  line: &OrderLine,
  piece_ids: &[Uuid],
) -> Result<Vec<Allocation>> {
  let mut groups: Vec<(LedgerKey, Vec<StockPiece>)> = Vec::new();
  for &piece_id in piece_ids {
    let piece = tx.get_piece(piece_id)?.ok_or(Error::PieceNotFound(piece_id))?;
    if piece.fabric_id != line.fabric_id || line.design_id.is_some_and(|d| Some(d) != piece.design_id) {
      return Err(Error::InvalidInput(format!("piece {} does not belong to line {idx}'s fabric", piece.label)));
    }
    if !p.used.insert(piece_id) {
      return Err(Error::InvalidInput(format!("piece {} selected twice", piece.label)));
    }
    if !piece.is_available() {
      p.short(idx, line, ShortageUnit::Length, piece.length, Decimal::ZERO).piece_id = Some(piece_id);
      continue;
    }
    let key = piece.ledger_key();
    match groups.iter_mut().find(|(k, _)| *k == key) {
      Some((_, group)) => group.push(piece),
      None => groups.push((key, vec![piece])),
    }
  }

  let mut allocations = Vec::new();
  for (key, group) in groups {
    let length: Decimal = group.iter().map(|pc| pc.length).sum();
    let Some(record) = tx.find_ledger(&key)? else {
      p.short(idx, line, ShortageUnit::Length, length, Decimal::ZERO);
      continue;
    };
    let hold = p.hold_record(tx, line, None, &record)?;
    let capacity = p.capacity(line, None, &record, &hold);
    if length > capacity {
      p.short(idx, line, ShortageUnit::Length, length, capacity);
      continue;
    }
    allocations.push(p.take_rolls(line, &record, &hold, &group));
  }
  Ok(allocations)
}

fn plan_fifo<T: LedgerTx>(
  tx: &mut T,
  p: &mut Planner,
  idx: usize,
  line: &OrderLine,
  req: &NewChallanLine,
  length: Decimal,
) -> Result<Vec<Allocation>> {
  if length <= Decimal::ZERO {
    return Err(Error::InvalidInput(format!("line {idx}: dispatch length must be positive")));
  }
  let filter = restrict(idx, line.filter(), req.factory_id)?;
  let Some((record, hold)) = p.best(tx, line, None, &filter)? else {
    p.short(idx, line, ShortageUnit::Length, length, Decimal::ZERO);
    return Ok(Vec::new());
  };
  let capacity = p.capacity(line, None, &record, &hold);
  if length > capacity {
    p.short(idx, line, ShortageUnit::Length, length, capacity);
    return Ok(Vec::new());
  }

  let pieces: Vec<StockPiece> = tx
    .list_pieces(&PieceFilter::available_for(&record.key))?
    .into_iter()
    .filter(|pc| pc.ledger_key() == record.key && !p.used.contains(&pc.piece_id))
    .collect();
  let on_hand: Decimal = pieces.iter().map(|pc| pc.length).sum();
  let Some(picked) = fill_fifo(pieces, length) else {
    p.short(idx, line, ShortageUnit::Length, length, on_hand);
    return Ok(Vec::new());
  };
  // Whole rolls can overshoot the request; the overshoot must fit too.
  let taken: Decimal = picked.iter().map(|pc| pc.length).sum();
  if taken > capacity {
    p.short(idx, line, ShortageUnit::Length, taken, capacity);
    return Ok(Vec::new());
  }

  p.used.extend(picked.iter().map(|pc| pc.piece_id));
  Ok(vec![p.take_rolls(line, &record, &hold, &picked)])
}

fn plan_saree<T: LedgerTx>(
  tx: &mut T,
  p: &mut Planner,
  idx: usize,
  line: &OrderLine,
  req: &NewChallanLine,
  matchings: &[crate::production::MatchingCount],
) -> Result<Vec<Allocation>> {
  let Demand::Saree { matchings: ordered, .. } = &line.demand else {
    return Err(Error::InvalidInput(format!("line {idx}: order line is not a saree line")));
  };

  let mut allocations = Vec::new();
  for m in matchings {
    if m.count <= 0 {
      return Err(Error::InvalidInput(format!("line {idx}: dispatch count must be positive")));
    }
    if !ordered.iter().any(|o| o.matching_id == m.matching_id) {
      return Err(Error::InvalidInput(format!("line {idx}: matching {} was not ordered", m.matching_id)));
    }
    let required = Decimal::from(m.count);
    let filter = restrict(idx, line.matching_filter(m.matching_id), req.factory_id)?;
    let best = p.best(tx, line, Some(m.matching_id), &filter)?;
    let capacity = match &best {
      Some((r, hold)) => p.capacity(line, Some(m.matching_id), r, hold),
      None => Decimal::ZERO,
    };
    match best {
      Some((r, hold)) if required <= capacity => {
        let released = p.take(line, Some(m.matching_id), &r, &hold, required);
        let held = released.to_i64().unwrap_or(0);
        allocations.push(Allocation {
          ledger_id:       r.ledger_id,
          matching_id:     Some(m.matching_id),
          length:          r.key.length_for_units(m.count),
          pieces:          m.count,
          reserved_length: hold.key.length_for_units(held),
          reserved_pieces: held,
          held_ledger_id:  held_elsewhere(&r, &hold, released),
          piece_ids:       Vec::new(),
        });
      }
      _ => {
        p.short(idx, line, ShortageUnit::Pieces, required, capacity).matching_id = Some(m.matching_id);
      }
    }
  }
  Ok(allocations)
}

/// Allocate every requested line. Returns the per-line allocations and all
/// shortages; allocations are meaningless unless the shortage list is empty.
fn plan<T: LedgerTx>(
  tx: &mut T,
  order: &Order,
  lines: &[NewChallanLine],
) -> Result<(Vec<Vec<Allocation>>, Vec<Shortage>)> {
  let mut p = Planner::default();
  let mut planned = Vec::with_capacity(lines.len());

  for (idx, req) in lines.iter().enumerate() {
    let line = order.line(req.order_line_id).ok_or(Error::OrderLineNotFound {
      order: order.order_id,
      line:  req.order_line_id,
    })?;

    let allocations = match (&req.request, &line.demand) {
      (DispatchRequest::Taka { pieces, .. }, Demand::Taka { .. }) if !pieces.is_empty() => {
        plan_selected_pieces(tx, &mut p, idx, line, pieces)?
      }
      (DispatchRequest::Taka { length: Some(length), .. }, Demand::Taka { .. }) => {
        plan_fifo(tx, &mut p, idx, line, req, *length)?
      }
      (DispatchRequest::Taka { length: None, .. }, Demand::Taka { .. }) => {
        return Err(Error::InvalidInput(format!("line {idx}: give a length or select pieces")));
      }
      (DispatchRequest::Saree { matchings }, Demand::Saree { .. }) => {
        plan_saree(tx, &mut p, idx, line, req, matchings)?
      }
      _ => {
        return Err(Error::InvalidInput(format!("line {idx}: stock kind does not match the order line")));
      }
    };
    planned.push(allocations);
  }

  Ok((planned, p.shortages))
}

// ─── Validate / commit / revert ──────────────────────────────────────────────

/// Check a dispatch request without writing anything.
pub fn validate_dispatch<T: LedgerTx>(
  tx: &mut T,
  order: &Order,
  lines: &[NewChallanLine],
) -> Result<Availability> {
  let (_, shortages) = plan(tx, order, lines)?;
  Ok(Availability::from_shortages(shortages))
}

/// Validate and then commit a dispatch request against `order`. Nothing is
/// written if any line is short.
pub fn commit_dispatch<T: LedgerTx>(
  tx: &mut T,
  order: &mut Order,
  challan_id: Uuid,
  lines: &[NewChallanLine],
) -> Result<Vec<ChallanLine>> {
  let (planned, shortages) = plan(tx, order, lines)?;
  if !shortages.is_empty() {
    return Err(Error::InsufficientStock(shortages));
  }

  let mut committed = Vec::with_capacity(lines.len());
  for (req, allocations) in lines.iter().zip(planned) {
    for a in &allocations {
      for (ledger_id, delta) in a.deltas() {
        tx.apply_delta(ledger_id, &delta)?;
      }
      if !a.piece_ids.is_empty() {
        tx.mark_sold(&a.piece_ids, challan_id)?;
      }
    }
    if let Some(line) = order.line_mut(req.order_line_id) {
      credit(line, &allocations, 1);
    }
    committed.push(ChallanLine {
      line_id:       Uuid::new_v4(),
      order_line_id: req.order_line_id,
      factory_id:    req.factory_id,
      request:       req.request.clone(),
      allocations,
    });
  }
  order.recompute_status();
  Ok(committed)
}

/// Undo committed challan lines: counters back up, pieces available again,
/// order line credit removed (floored at zero).
///
/// Lines of a cancelled order get their stock back but no reservation, since
/// the order no longer holds one.
pub fn revert_dispatch<T: LedgerTx>(
  tx: &mut T,
  mut order: Option<&mut Order>,
  lines: &[ChallanLine],
) -> Result<()> {
  let holds_reservation = order.as_ref().is_some_and(|o| o.status != DispatchStatus::Cancelled);

  for line in lines {
    for a in &line.allocations {
      let restore: Vec<(Uuid, LedgerDelta)> = if holds_reservation {
        a.deltas().into_iter().map(|(id, d)| (id, -d)).collect()
      } else {
        vec![(a.ledger_id, LedgerDelta::supply(a.length, a.pieces))]
      };
      for (ledger_id, delta) in restore {
        if tx.get_ledger(ledger_id)?.is_some() {
          tx.apply_delta(ledger_id, &delta)?;
        } else {
          tracing::warn!(%ledger_id, "ledger record missing while reverting dispatch; skipped");
        }
      }
      if !a.piece_ids.is_empty() {
        tx.mark_available(&a.piece_ids)?;
      }
    }
    match order.as_deref_mut().and_then(|o| o.line_mut(line.order_line_id)) {
      Some(order_line) => credit(order_line, &line.allocations, -1),
      None => tracing::warn!(order_line_id = %line.order_line_id, "order line missing while reverting dispatch"),
    }
  }

  if let Some(order) = order {
    order.recompute_status();
  }
  Ok(())
}

/// Add (`sign = 1`) or remove (`sign = -1`) dispatched quantities on an order
/// line. Removal floors at zero.
fn credit(line: &mut OrderLine, allocations: &[Allocation], sign: i64) {
  match &mut line.demand {
    Demand::Taka { dispatched_length, dispatched_units, .. } => {
      let length: Decimal = allocations.iter().map(|a| a.length).sum();
      let units: i64 = allocations.iter().map(|a| a.pieces).sum();
      *dispatched_length = (*dispatched_length + length * Decimal::from(sign)).max(Decimal::ZERO);
      *dispatched_units = (*dispatched_units + units * sign).max(0);
    }
    Demand::Saree { matchings, .. } => {
      for a in allocations {
        if let Some(m) = matchings.iter_mut().find(|m| Some(m.matching_id) == a.matching_id) {
          m.dispatched = (m.dispatched + a.pieces * sign).max(0);
        }
      }
    }
  }
}

// ─── Operations ──────────────────────────────────────────────────────────────

fn open_order<T: LedgerTx>(tx: &mut T, order_id: Uuid) -> Result<Order> {
  let order = tx.get_order(order_id)?.ok_or(Error::OrderNotFound(order_id))?;
  if order.status == DispatchStatus::Cancelled {
    return Err(Error::OrderClosed(order_id));
  }
  Ok(order)
}

/// Dry-run of [`create_challan`].
pub fn check_challan<T: LedgerTx>(tx: &mut T, input: &NewChallan) -> Result<Availability> {
  let order = open_order(tx, input.order_id)?;
  validate_dispatch(tx, &order, &input.lines)
}

pub fn create_challan<T: LedgerTx>(tx: &mut T, input: NewChallan) -> Result<Challan> {
  if input.lines.is_empty() {
    return Err(Error::InvalidInput("challan has no lines".into()));
  }
  let mut order = open_order(tx, input.order_id)?;
  let challan_id = Uuid::new_v4();
  let lines = commit_dispatch(tx, &mut order, challan_id, &input.lines)?;
  tx.save_order(&order)?;

  let now = Utc::now();
  let challan = Challan {
    challan_id,
    challan_no: input.challan_no,
    order_id: input.order_id,
    date: input.date,
    lines,
    created_at: now,
    updated_at: now,
  };
  tx.insert_challan(&challan)?;
  tracing::info!(%challan_id, order_id = %challan.order_id, status = order.status.as_str(), "challan committed");
  Ok(challan)
}

/// Revert the committed challan and commit the new request in its place.
/// If the new request is short the error propagates and the caller's
/// transaction must roll back, leaving the old challan committed.
pub fn update_challan<T: LedgerTx>(tx: &mut T, challan_id: Uuid, input: NewChallan) -> Result<Challan> {
  if input.lines.is_empty() {
    return Err(Error::InvalidInput("challan has no lines".into()));
  }
  let mut challan = tx.get_challan(challan_id)?.ok_or(Error::ChallanNotFound(challan_id))?;
  if input.order_id != challan.order_id {
    return Err(Error::InvalidInput("a challan cannot move to another order".into()));
  }
  let mut order = open_order(tx, challan.order_id)?;

  revert_dispatch(tx, Some(&mut order), &challan.lines)?;
  challan.lines = commit_dispatch(tx, &mut order, challan_id, &input.lines)?;
  challan.challan_no = input.challan_no;
  challan.date = input.date;
  challan.updated_at = Utc::now();

  tx.save_order(&order)?;
  tx.save_challan(&challan)?;
  tracing::info!(%challan_id, status = order.status.as_str(), "challan recommitted");
  Ok(challan)
}

pub fn delete_challan<T: LedgerTx>(tx: &mut T, challan_id: Uuid) -> Result<()> {
  let challan = tx.get_challan(challan_id)?.ok_or(Error::ChallanNotFound(challan_id))?;
  let mut order = tx.get_order(challan.order_id)?;

  revert_dispatch(tx, order.as_mut(), &challan.lines)?;
  if let Some(order) = &order {
    tx.save_order(order)?;
  }
  tx.delete_challan(challan_id)?;
  tracing::info!(%challan_id, "challan reverted and deleted");
  Ok(())
}
