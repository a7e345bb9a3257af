//! Orders and their per-line demand.
//!
//! Order lines carry the ordered and dispatched quantities. Only dispatch
//! fulfillment and its reversal move the dispatched side.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, prelude::ToPrimitive as _};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error,
  Result,
  ledger::{LedgerFilter, StockKind},
  production::MatchingCount,
};

/// Metres in one taka when an order gives only one of length or unit count.
pub const TAKA_LENGTH: i64 = 120;

/// Length equivalent of `units` takas, or `None` if the count is too large.
pub fn units_to_length(units: i64) -> Option<Decimal> {
  units.checked_mul(TAKA_LENGTH).map(Decimal::from)
}

/// Taka count equivalent of `length`, rounded up to whole rolls.
pub fn length_to_units(length: Decimal) -> i64 {
  (length / Decimal::from(TAKA_LENGTH)).ceil().to_i64().unwrap_or(0)
}

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
  #[default]
  Pending,
  Partial,
  Completed,
  Cancelled,
}

impl DispatchStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Partial => "partial",
      Self::Completed => "completed",
      Self::Cancelled => "cancelled",
    }
  }

  /// Whether the order still holds reservations.
  pub fn is_open(self) -> bool { matches!(self, Self::Pending | Self::Partial) }
}

// ─── Demand ──────────────────────────────────────────────────────────────────

/// Which quantity a taka line was ordered in; completion is judged in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Measure {
  Length,
  Units,
}

/// Requested quantity on an incoming order line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NewDemand {
  /// Either or both of `length` and `units`; a missing one is derived from the
  /// other through [`TAKA_LENGTH`].
  Taka {
    length: Option<Decimal>,
    units:  Option<i64>,
  },
  Saree {
    cut:       Option<Decimal>,
    matchings: Vec<MatchingCount>,
  },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingDemand {
  pub matching_id: Uuid,
  pub quantity:    i64,
  pub dispatched:  i64,
  /// Ledger record the reservation was charged to.
  pub ledger_id:   Option<Uuid>,
}

impl MatchingDemand {
  pub fn outstanding(&self) -> i64 { (self.quantity - self.dispatched).max(0) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Demand {
  Taka {
    measure:           Measure,
    ordered_length:    Decimal,
    ordered_units:     i64,
    dispatched_length: Decimal,
    dispatched_units:  i64,
    /// Ledger record the reservation was charged to.
    ledger_id:         Option<Uuid>,
  },
  Saree {
    cut:       Option<Decimal>,
    matchings: Vec<MatchingDemand>,
  },
}

impl Demand {
  pub fn kind(&self) -> StockKind {
    match self {
      Self::Taka { .. } => StockKind::Taka,
      Self::Saree { .. } => StockKind::Saree,
    }
  }
}

impl NewDemand {
  pub fn kind(&self) -> StockKind {
    match self {
      Self::Taka { .. } => StockKind::Taka,
      Self::Saree { .. } => StockKind::Saree,
    }
  }

  /// Length and unit count requested by a taka demand, or `None` for sarees
  /// and for taka demands that give neither.
  pub fn taka_quantity(&self) -> Option<(Decimal, i64)> {
    match self {
      Self::Taka { length: Some(l), units: Some(u) } => Some((*l, *u)),
      Self::Taka { length: Some(l), units: None } => Some((*l, length_to_units(*l))),
      Self::Taka { length: None, units: Some(u) } => Some((units_to_length(*u)?, *u)),
      _ => None,
    }
  }

  /// Normalise into a stored [`Demand`] with nothing dispatched yet.
  pub fn into_demand(self) -> Option<Demand> {
    match self {
      Self::Taka { length, units } => {
        let measure = if length.is_some() { Measure::Length } else { Measure::Units };
        let (ordered_length, ordered_units) = Self::Taka { length, units }.taka_quantity()?;
        Some(Demand::Taka {
          measure,
          ordered_length,
          ordered_units,
          dispatched_length: Decimal::ZERO,
          dispatched_units: 0,
          ledger_id: None,
        })
      }
      Self::Saree { cut, matchings } => Some(Demand::Saree {
        cut,
        matchings: matchings
          .into_iter()
          .map(|m| MatchingDemand {
            matching_id: m.matching_id,
            quantity:    m.count,
            dispatched:  0,
            ledger_id:   None,
          })
          .collect(),
      }),
    }
  }
}

// ─── Lines ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderLine {
  pub fabric_id:  Uuid,
  pub design_id:  Option<Uuid>,
  /// Pin the reservation to one factory's stock.
  pub factory_id: Option<Uuid>,
  pub demand:     NewDemand,
}

impl NewOrderLine {
  /// Reject quantities no reservation can be made against. `idx` is the
  /// line's position in the order, used in the message.
  pub fn validate(&self, idx: usize) -> Result<()> {
    let invalid = |msg: String| Err(Error::InvalidInput(format!("line {idx}: {msg}")));
    match &self.demand {
      NewDemand::Taka { length, units } => {
        if length.is_none() && units.is_none() {
          return invalid("taka line needs a length or unit count".into());
        }
        if let Some(l) = length
          && *l <= Decimal::ZERO
        {
          return invalid(format!("length must be positive, got {l}"));
        }
        if let Some(u) = units {
          if *u <= 0 {
            return invalid(format!("unit count must be positive, got {u}"));
          }
          if units_to_length(*u).is_none() {
            return invalid(format!("unit count {u} is too large"));
          }
        }
      }
      NewDemand::Saree { cut, matchings } => {
        if let Some(c) = cut
          && *c <= Decimal::ZERO
        {
          return invalid(format!("cut must be positive, got {c}"));
        }
        if matchings.is_empty() {
          return invalid("saree line has no matchings".into());
        }
        let mut seen = HashSet::new();
        for m in matchings {
          if m.count <= 0 {
            return invalid(format!("matching {} count must be positive", m.matching_id));
          }
          if !seen.insert(m.matching_id) {
            return invalid(format!("matching {} appears twice", m.matching_id));
          }
        }
      }
    }
    Ok(())
  }

  /// Loose ledger key for this line's stock.
  pub fn filter(&self) -> LedgerFilter {
    LedgerFilter {
      fabric_id: Some(self.fabric_id),
      design_id: self.design_id,
      factory_id: self.factory_id,
      kind: Some(self.demand.kind()),
      ..Default::default()
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
  pub line_id:    Uuid,
  pub fabric_id:  Uuid,
  pub design_id:  Option<Uuid>,
  pub factory_id: Option<Uuid>,
  pub demand:     Demand,
}

impl OrderLine {
  pub fn filter(&self) -> LedgerFilter {
    LedgerFilter {
      fabric_id: Some(self.fabric_id),
      design_id: self.design_id,
      factory_id: self.factory_id,
      kind: Some(self.demand.kind()),
      ..Default::default()
    }
  }

  /// Loose key for one matching of a saree line.
  pub fn matching_filter(&self, matching_id: Uuid) -> LedgerFilter {
    let cut = match &self.demand {
      Demand::Saree { cut, .. } => *cut,
      Demand::Taka { .. } => None,
    };
    LedgerFilter { matching_id: Some(matching_id), cut, ..self.filter() }
  }

  /// Ledger record the reservation for this line (or one of its matchings)
  /// was charged to.
  pub fn charged_ledger(&self, matching_id: Option<Uuid>) -> Option<Uuid> {
    match (&self.demand, matching_id) {
      (Demand::Taka { ledger_id, .. }, None) => *ledger_id,
      (Demand::Saree { matchings, .. }, Some(id)) => {
        matchings.iter().find(|m| m.matching_id == id).and_then(|m| m.ledger_id)
      }
      _ => None,
    }
  }

  pub fn is_fully_dispatched(&self) -> bool {
    match &self.demand {
      Demand::Taka { measure: Measure::Length, ordered_length, dispatched_length, .. } => {
        dispatched_length >= ordered_length
      }
      Demand::Taka { measure: Measure::Units, ordered_units, dispatched_units, .. } => {
        dispatched_units >= ordered_units
      }
      Demand::Saree { matchings, .. } => matchings.iter().all(|m| m.dispatched >= m.quantity),
    }
  }

  pub fn has_dispatch(&self) -> bool {
    match &self.demand {
      Demand::Taka { dispatched_length, dispatched_units, .. } => {
        *dispatched_length > Decimal::ZERO || *dispatched_units > 0
      }
      Demand::Saree { matchings, .. } => matchings.iter().any(|m| m.dispatched > 0),
    }
  }

  /// Undispatched taka remainder as `(length, units)`, each floored at zero.
  pub fn taka_outstanding(&self) -> Option<(Decimal, i64)> {
    match &self.demand {
      Demand::Taka { ordered_length, ordered_units, dispatched_length, dispatched_units, .. } => Some((
        (*ordered_length - *dispatched_length).max(Decimal::ZERO),
        (*ordered_units - *dispatched_units).max(0),
      )),
      Demand::Saree { .. } => None,
    }
  }
}

// ─── Order ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
  pub order_no: String,
  pub party_id: Option<Uuid>,
  pub date:     NaiveDate,
  pub lines:    Vec<NewOrderLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
  pub order_id:   Uuid,
  pub order_no:   String,
  pub party_id:   Option<Uuid>,
  pub date:       NaiveDate,
  pub status:     DispatchStatus,
  pub lines:      Vec<OrderLine>,
  pub created_at: DateTime<Utc>,
}

impl Order {
  pub fn line(&self, line_id: Uuid) -> Option<&OrderLine> {
    self.lines.iter().find(|l| l.line_id == line_id)
  }

  pub fn line_mut(&mut self, line_id: Uuid) -> Option<&mut OrderLine> {
    self.lines.iter_mut().find(|l| l.line_id == line_id)
  }

  /// Derive the dispatch status from the lines. Cancelled orders stay
  /// cancelled.
  pub fn recompute_status(&mut self) -> DispatchStatus {
    if self.status != DispatchStatus::Cancelled {
      self.status = if !self.lines.is_empty() && self.lines.iter().all(OrderLine::is_fully_dispatched) {
        DispatchStatus::Completed
      } else if self.lines.iter().any(OrderLine::has_dispatch) {
        DispatchStatus::Partial
      } else {
        DispatchStatus::Pending
      };
    }
    self.status
  }
}
