//! Reservation manager — charges order demand against ledger records.

use chrono::Utc;
use uuid::Uuid;

use crate::{
  Error, Result,
  ledger::{LedgerDelta, LedgerFilter, LedgerKey, LedgerRecord, most_available},
  order::{Demand, DispatchStatus, NewOrder, Order, OrderLine},
  tx::LedgerTx,
  validator,
};

/// Pick the most-available record matching `filter`, or create a placeholder
/// for `placeholder` when nothing matches.
pub(crate) fn select_or_create<T: LedgerTx>(
  tx: &mut T,
  filter: &LedgerFilter,
  placeholder: LedgerKey,
) -> Result<LedgerRecord> {
  let candidates = tx.list_ledger(filter)?;
  match most_available(candidates, LedgerRecord::available) {
    Some(record) => {
      tracing::debug!(ledger_id = %record.ledger_id, available = %record.available(), "selected ledger record");
      Ok(record)
    }
    None => {
      tracing::debug!(key = ?placeholder, "no ledger record matches; creating placeholder");
      tx.find_or_create_ledger(&placeholder)
    }
  }
}

/// Increase reserved counters for every line and record the charged ledger
/// record on the line. Sufficiency is not checked here; see
/// [`validator::check`].
pub fn reserve<T: LedgerTx>(tx: &mut T, lines: &mut [OrderLine]) -> Result<()> {
  for line in lines.iter_mut() {
    let filter = line.filter();
    let (fabric_id, design_id, factory_id) = (line.fabric_id, line.design_id, line.factory_id);
    match &mut line.demand {
      Demand::Taka { ordered_length, ordered_units, ledger_id, .. } => {
        let placeholder = LedgerKey::taka(fabric_id, design_id, factory_id);
        let record = select_or_create(tx, &filter, placeholder)?;
        tx.apply_delta(record.ledger_id, &LedgerDelta::reserve(*ordered_length, *ordered_units))?;
        *ledger_id = Some(record.ledger_id);
      }
      Demand::Saree { cut, matchings } => {
        for m in matchings.iter_mut() {
          let filter = LedgerFilter { matching_id: Some(m.matching_id), cut: *cut, ..filter.clone() };
          let placeholder = LedgerKey::saree(fabric_id, design_id, factory_id, m.matching_id, *cut);
          let record = select_or_create(tx, &filter, placeholder)?;
          let length = record.key.length_for_units(m.quantity);
          tx.apply_delta(record.ledger_id, &LedgerDelta::reserve(length, m.quantity))?;
          m.ledger_id = Some(record.ledger_id);
        }
      }
    }
  }
  Ok(())
}

/// Give back the undispatched remainder of a line's reservation.
pub fn release<T: LedgerTx>(tx: &mut T, line: &OrderLine) -> Result<()> {
  match &line.demand {
    Demand::Taka { ledger_id, .. } => {
      let Some(ledger_id) = ledger_id else { return Ok(()) };
      let Some((length, units)) = line.taka_outstanding() else { return Ok(()) };
      release_from(tx, *ledger_id, LedgerDelta::reserve(length, units))
    }
    Demand::Saree { matchings, .. } => {
      for m in matchings {
        let Some(ledger_id) = m.ledger_id else { continue };
        let Some(record) = tx.get_ledger(ledger_id)? else {
          tracing::warn!(%ledger_id, "charged ledger record missing; reservation not released");
          continue;
        };
        let units = m.outstanding();
        let delta = LedgerDelta::reserve(record.key.length_for_units(units), units);
        release_from(tx, ledger_id, delta)?;
      }
      Ok(())
    }
  }
}

fn release_from<T: LedgerTx>(tx: &mut T, ledger_id: Uuid, held: LedgerDelta) -> Result<()> {
  if held.is_zero() {
    return Ok(());
  }
  if tx.get_ledger(ledger_id)?.is_none() {
    tracing::warn!(%ledger_id, "charged ledger record missing; reservation not released");
    return Ok(());
  }
  tx.apply_delta(ledger_id, &-held)?;
  Ok(())
}

// ─── Operations ──────────────────────────────────────────────────────────────

/// Persist an order and reserve stock for all of its lines.
///
/// With `enforce_stock`, the lines are checked first and the order is refused
/// with [`Error::InsufficientStock`] when free stock cannot cover them.
pub fn place_order<T: LedgerTx>(tx: &mut T, input: NewOrder, enforce_stock: bool) -> Result<Order> {
  if input.lines.is_empty() {
    return Err(Error::InvalidInput("order has no lines".into()));
  }
  for (idx, line) in input.lines.iter().enumerate() {
    line.validate(idx)?;
  }
  if enforce_stock {
    let availability = validator::check(tx, &input.lines)?;
    if !availability.valid {
      return Err(Error::InsufficientStock(availability.shortages));
    }
  }

  let mut lines = Vec::with_capacity(input.lines.len());
  for (idx, line) in input.lines.into_iter().enumerate() {
    let demand = line
      .demand
      .into_demand()
      .ok_or_else(|| Error::InvalidInput(format!("line {idx}: taka line needs a length or unit count")))?;
    lines.push(OrderLine {
      line_id: Uuid::new_v4(),
      fabric_id: line.fabric_id,
      design_id: line.design_id,
      factory_id: line.factory_id,
      demand,
    });
  }

  reserve(tx, &mut lines)?;

  let order = Order {
    order_id: Uuid::new_v4(),
    order_no: input.order_no,
    party_id: input.party_id,
    date: input.date,
    status: DispatchStatus::Pending,
    lines,
    created_at: Utc::now(),
  };
  tx.insert_order(&order)?;
  tracing::info!(order_id = %order.order_id, lines = order.lines.len(), "order placed");
  Ok(order)
}

/// Release an order's outstanding reservations and mark it cancelled.
/// Challans already dispatched against it are untouched.
pub fn cancel_order<T: LedgerTx>(tx: &mut T, order_id: Uuid) -> Result<Order> {
  let mut order = tx.get_order(order_id)?.ok_or(Error::OrderNotFound(order_id))?;
  if !order.status.is_open() {
    return Ok(order);
  }
  for line in &order.lines {
    release(tx, line)?;
  }
  order.status = DispatchStatus::Cancelled;
  tx.save_order(&order)?;
  tracing::info!(%order_id, "order cancelled");
  Ok(order)
}
