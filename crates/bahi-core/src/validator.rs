//! Stock availability checks. Read-only: nothing here writes.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Result,
  ledger::{LedgerFilter, LedgerRecord, StockKind, most_available},
  order::{NewDemand, NewOrderLine},
  tx::LedgerTx,
};

/// The unit a shortage is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShortageUnit {
  Length,
  Pieces,
}

/// One requested item that free stock cannot cover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shortage {
  /// Position of the offending line in the request.
  pub line:        usize,
  pub fabric_id:   Uuid,
  pub matching_id: Option<Uuid>,
  /// Set when an explicitly selected piece is the problem.
  pub piece_id:    Option<Uuid>,
  pub unit:        ShortageUnit,
  pub required:    Decimal,
  /// Free stock, clamped at zero.
  pub available:   Decimal,
  pub shortage:    Decimal,
}

impl Shortage {
  pub fn new(
    line: usize,
    fabric_id: Uuid,
    unit: ShortageUnit,
    required: Decimal,
    available: Decimal,
  ) -> Self {
    let available = available.max(Decimal::ZERO);
    Self {
      line,
      fabric_id,
      matching_id: None,
      piece_id: None,
      unit,
      required,
      available,
      shortage: required - available,
    }
  }
}

/// Result of a check: `valid` iff `shortages` is empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Availability {
  pub valid:     bool,
  pub shortages: Vec<Shortage>,
}

impl Availability {
  pub fn from_shortages(shortages: Vec<Shortage>) -> Self {
    Self { valid: shortages.is_empty(), shortages }
  }
}

/// Running view of free stock while several lines draw on the same records.
#[derive(Default)]
pub(crate) struct Claims(HashMap<Uuid, Decimal>);

impl Claims {
  pub(crate) fn free(&self, record: &LedgerRecord) -> Decimal {
    record.available() - self.0.get(&record.ledger_id).copied().unwrap_or_default()
  }

  pub(crate) fn claim(&mut self, ledger_id: Uuid, amount: Decimal) {
    *self.0.entry(ledger_id).or_default() += amount;
  }
}

/// Is there enough free stock for every line? Every line is examined; all
/// shortages are reported together.
///
/// Each line is measured against its most-available candidate record. Lines
/// that land on the same record draw on it cumulatively. A malformed line is
/// an `InvalidInput` error rather than a shortage.
pub fn check<T: LedgerTx>(tx: &mut T, lines: &[NewOrderLine]) -> Result<Availability> {
  let mut claims = Claims::default();
  let mut shortages = Vec::new();

  for (idx, line) in lines.iter().enumerate() {
    line.validate(idx)?;
    match &line.demand {
      NewDemand::Taka { .. } => {
        let Some((length, _)) = line.demand.taka_quantity() else { continue };
        let candidates = tx.list_ledger(&line.filter())?;
        let best = most_available(candidates, |r| claims.free(r));
        let free = best.as_ref().map_or(Decimal::ZERO, |r| claims.free(r));
        if length > free {
          shortages.push(Shortage::new(idx, line.fabric_id, ShortageUnit::Length, length, free));
        }
        if let Some(r) = best {
          claims.claim(r.ledger_id, length);
        }
      }
      NewDemand::Saree { cut, matchings } => {
        for m in matchings {
          let filter = LedgerFilter {
            matching_id: Some(m.matching_id),
            kind: Some(StockKind::Saree),
            cut: *cut,
            ..line.filter()
          };
          let candidates = tx.list_ledger(&filter)?;
          let best = most_available(candidates, |r| claims.free(r));
          let free = best.as_ref().map_or(Decimal::ZERO, |r| claims.free(r));
          let required = Decimal::from(m.count);
          if required > free {
            let mut s = Shortage::new(idx, line.fabric_id, ShortageUnit::Pieces, required, free);
            s.matching_id = Some(m.matching_id);
            shortages.push(s);
          }
          if let Some(r) = best {
            claims.claim(r.ledger_id, required);
          }
        }
      }
    }
  }

  Ok(Availability::from_shortages(shortages))
}
