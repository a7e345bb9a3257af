//! Plain-text tables for terminal output.

use std::fmt::Write as _;

use bahi_core::{
  ledger::LedgerView,
  order::{Demand, Measure, Order},
  piece::StockPiece,
  reconcile::RecomputeReport,
  validator::{Availability, Shortage, ShortageUnit},
};
use uuid::Uuid;

/// First eight hex digits; enough to tell rows apart on screen.
fn short(id: Uuid) -> String { id.simple().to_string()[..8].to_string() }

fn short_opt(id: Option<Uuid>) -> String { id.map(short).unwrap_or_else(|| "-".into()) }

// ─── Ledger ───────────────────────────────────────────────────────────────────

pub fn ledger(rows: &[LedgerView]) -> String {
  let mut out = format!(
    "{:<8} {:<5} {:<8} {:<8} {:<8} {:>6} {:>12} {:>12} {:>12} {:>5} {:>5} {:>5}\n",
    "ledger", "kind", "fabric", "factory", "matching", "cut", "supplied", "reserved", "available",
    "pcs", "res", "free",
  );
  for row in rows {
    let r = &row.record;
    let _ = writeln!(
      out,
      "{:<8} {:<5} {:<8} {:<8} {:<8} {:>6} {:>12} {:>12} {:>12} {:>5} {:>5} {:>5}",
      short(r.ledger_id),
      r.key.kind.as_str(),
      short(r.key.fabric_id),
      short_opt(r.key.factory_id),
      short_opt(r.key.matching_id),
      r.key.cut.map(|c| c.to_string()).unwrap_or_else(|| "-".into()),
      r.counters.supplied_length,
      r.counters.reserved_length,
      row.available_length,
      r.counters.supplied_pieces,
      r.counters.reserved_pieces,
      row.available_pieces,
    );
  }
  out
}

// ─── Pieces ───────────────────────────────────────────────────────────────────

pub fn pieces(rows: &[StockPiece]) -> String {
  let mut out = format!(
    "{:<8} {:<12} {:>10} {:<9} {:<8} {:<8}\n",
    "piece", "label", "length", "status", "fabric", "challan"
  );
  for p in rows {
    let _ = writeln!(
      out,
      "{:<8} {:<12} {:>10} {:<9} {:<8} {:<8}",
      short(p.piece_id),
      p.label,
      p.length,
      p.status.as_str(),
      short(p.fabric_id),
      short_opt(p.challan_id),
    );
  }
  out
}

// ─── Orders ───────────────────────────────────────────────────────────────────

pub fn order(order: &Order) -> String {
  let mut out = format!(
    "order {} ({}) dated {}: {}\n",
    order.order_no,
    order.order_id,
    order.date,
    order.status.as_str()
  );
  for line in &order.lines {
    match &line.demand {
      Demand::Taka { measure, ordered_length, ordered_units, dispatched_length, dispatched_units, .. } => {
        let progress = match measure {
          Measure::Length => format!("{dispatched_length} / {ordered_length} m"),
          Measure::Units => format!("{dispatched_units} / {ordered_units} takas"),
        };
        let _ = writeln!(out, "  {} taka   fabric {}  {progress}", short(line.line_id), short(line.fabric_id));
      }
      Demand::Saree { cut, matchings } => {
        let cut = cut.map(|c| format!("{c} m")).unwrap_or_else(|| "any cut".into());
        let _ = writeln!(out, "  {} saree  fabric {}  {cut}", short(line.line_id), short(line.fabric_id));
        for m in matchings {
          let _ = writeln!(out, "      matching {}  {} / {}", short(m.matching_id), m.dispatched, m.quantity);
        }
      }
    }
  }
  out
}

// ─── Validation ───────────────────────────────────────────────────────────────

pub fn shortages(rows: &[Shortage]) -> String {
  let mut out = String::new();
  for s in rows {
    let unit = match s.unit {
      ShortageUnit::Length => "m",
      ShortageUnit::Pieces => "pcs",
    };
    let subject = match (s.piece_id, s.matching_id) {
      (Some(p), _) => format!("piece {}", short(p)),
      (None, Some(m)) => format!("matching {}", short(m)),
      (None, None) => format!("fabric {}", short(s.fabric_id)),
    };
    let _ = writeln!(
      out,
      "  line {}: {subject} needs {} {unit}, {} free, short {}",
      s.line, s.required, s.available, s.shortage
    );
  }
  out
}

pub fn availability(a: &Availability) -> String {
  if a.valid {
    "stock is sufficient\n".to_string()
  } else {
    format!("insufficient stock:\n{}", shortages(&a.shortages))
  }
}

// ─── Reconciliation ───────────────────────────────────────────────────────────

pub fn report(r: &RecomputeReport) -> String {
  let mut out = format!(
    "examined {} record(s), created {}, corrected {}, repointed {} challan line(s) and {} order(s), resynced {} piece(s)\n",
    r.records_examined,
    r.records_created,
    r.corrections.len(),
    r.challan_lines_repointed,
    r.orders_repointed,
    r.pieces_resynced,
  );
  for c in &r.corrections {
    let _ = writeln!(
      out,
      "  {}: supplied {} -> {}, reserved {} -> {}",
      short(c.ledger_id),
      c.before.supplied_length,
      c.after.supplied_length,
      c.before.reserved_length,
      c.after.reserved_length,
    );
  }
  out
}

#[cfg(test)]
mod tests {
  use bahi_core::validator::Shortage;
  use rust_decimal::Decimal;

  use super::*;

  #[test]
  fn shortage_lines_name_the_subject() {
    let fabric = Uuid::new_v4();
    let mut s = Shortage::new(0, fabric, ShortageUnit::Length, Decimal::from(80), Decimal::from(50));
    let text = shortages(std::slice::from_ref(&s));
    assert!(text.contains(&format!("fabric {}", short(fabric))), "{text}");
    assert!(text.contains("short 30"), "{text}");

    let piece = Uuid::new_v4();
    s.piece_id = Some(piece);
    s.unit = ShortageUnit::Pieces;
    let text = shortages(&[s]);
    assert!(text.contains(&format!("piece {}", short(piece))), "{text}");
    assert!(text.contains("pcs"));
  }

  #[test]
  fn valid_availability_is_one_line() {
    let a = Availability::from_shortages(Vec::new());
    assert_eq!(availability(&a), "stock is sufficient\n");
  }

  #[test]
  fn short_ids_are_eight_hex_digits() {
    let id = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
    assert_eq!(short(id), "67e55044");
    assert_eq!(short_opt(None), "-");
  }
}
