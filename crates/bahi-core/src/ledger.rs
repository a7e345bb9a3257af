//! Stock ledger records — one aggregate row per stock variant.
//!
//! A ledger record never stores "available" stock; it is always derived as
//! `supplied - reserved`. Counters change only through [`LedgerDelta`]s, except
//! when the reconciliation engine overwrites them wholesale.

use std::ops::{Add, Neg};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Stock kind ──────────────────────────────────────────────────────────────

/// Continuous rolls (takas) versus discrete finished units (sarees).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockKind {
  /// Tracked by total length and by roll count; each roll is a
  /// [`StockPiece`](crate::piece::StockPiece).
  Taka,
  /// Tracked per matching by unit count at a fixed cut length.
  Saree,
}

impl StockKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Taka => "taka",
      Self::Saree => "saree",
    }
  }
}

// ─── Identity ────────────────────────────────────────────────────────────────

/// The identity of a ledger record. Two events with equal keys always land on
/// the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerKey {
  pub fabric_id:   Uuid,
  pub design_id:   Option<Uuid>,
  pub factory_id:  Option<Uuid>,
  /// Colour variant; only set for sarees.
  pub matching_id: Option<Uuid>,
  pub kind:        StockKind,
  /// Metres per unit; only set for sarees.
  pub cut:         Option<Decimal>,
}

impl LedgerKey {
  pub fn taka(fabric_id: Uuid, design_id: Option<Uuid>, factory_id: Option<Uuid>) -> Self {
    Self {
      fabric_id,
      design_id,
      factory_id,
      matching_id: None,
      kind: StockKind::Taka,
      cut: None,
    }
  }

  pub fn saree(
    fabric_id: Uuid,
    design_id: Option<Uuid>,
    factory_id: Option<Uuid>,
    matching_id: Uuid,
    cut: Option<Decimal>,
  ) -> Self {
    Self {
      fabric_id,
      design_id,
      factory_id,
      matching_id: Some(matching_id),
      kind: StockKind::Saree,
      cut,
    }
  }

  /// Length consumed by `units` sarees of this key; zero when the cut is
  /// unknown.
  pub fn length_for_units(&self, units: i64) -> Decimal {
    self.cut.map_or(Decimal::ZERO, |cut| cut * Decimal::from(units))
  }
}

// ─── Counters ────────────────────────────────────────────────────────────────

/// The four stored counters of a ledger record.
///
/// For takas `*_pieces` counts rolls; for sarees it counts units and
/// `*_length` is `units × cut`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
  pub supplied_length: Decimal,
  pub reserved_length: Decimal,
  pub supplied_pieces: i64,
  pub reserved_pieces: i64,
}

impl Counters {
  pub fn available_length(&self) -> Decimal { self.supplied_length - self.reserved_length }

  pub fn available_pieces(&self) -> i64 { self.supplied_pieces - self.reserved_pieces }

  /// Availability in the unit that matters for `kind`, as a decimal so both
  /// kinds compare on one axis.
  pub fn available_for(&self, kind: StockKind) -> Decimal {
    match kind {
      StockKind::Taka => self.available_length(),
      StockKind::Saree => Decimal::from(self.available_pieces()),
    }
  }

  pub fn apply(&mut self, delta: &LedgerDelta) {
    self.supplied_length += delta.supplied_length;
    self.reserved_length += delta.reserved_length;
    self.supplied_pieces += delta.supplied_pieces;
    self.reserved_pieces += delta.reserved_pieces;
  }

  /// Every counter floored at zero. Used by reconciliation before write-back.
  pub fn clamped(&self) -> Self {
    Self {
      supplied_length: self.supplied_length.max(Decimal::ZERO),
      reserved_length: self.reserved_length.max(Decimal::ZERO),
      supplied_pieces: self.supplied_pieces.max(0),
      reserved_pieces: self.reserved_pieces.max(0),
    }
  }
}

// ─── Delta ───────────────────────────────────────────────────────────────────

/// An additive change to a record's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDelta {
  pub supplied_length: Decimal,
  pub reserved_length: Decimal,
  pub supplied_pieces: i64,
  pub reserved_pieces: i64,
}

impl LedgerDelta {
  /// Stock arriving from production.
  pub fn supply(length: Decimal, pieces: i64) -> Self {
    Self { supplied_length: length, supplied_pieces: pieces, ..Self::default() }
  }

  /// Stock promised to an order.
  pub fn reserve(length: Decimal, pieces: i64) -> Self {
    Self { reserved_length: length, reserved_pieces: pieces, ..Self::default() }
  }

  /// Stock leaving on a challan: consumes supply, and releases whatever part
  /// of it was drawn from a reservation. Within the reservation the two are
  /// equal and availability does not move.
  pub fn dispatch(length: Decimal, pieces: i64, held_length: Decimal, held_pieces: i64) -> Self {
    -(Self::supply(length, pieces) + Self::reserve(held_length, held_pieces))
  }

  pub fn is_zero(&self) -> bool { *self == Self::default() }
}

impl Add for LedgerDelta {
  type Output = Self;

  fn add(self, rhs: Self) -> Self {
    Self {
      supplied_length: self.supplied_length + rhs.supplied_length,
      reserved_length: self.reserved_length + rhs.reserved_length,
      supplied_pieces: self.supplied_pieces + rhs.supplied_pieces,
      reserved_pieces: self.reserved_pieces + rhs.reserved_pieces,
    }
  }
}

impl Neg for LedgerDelta {
  type Output = Self;

  fn neg(self) -> Self {
    Self {
      supplied_length: -self.supplied_length,
      reserved_length: -self.reserved_length,
      supplied_pieces: -self.supplied_pieces,
      reserved_pieces: -self.reserved_pieces,
    }
  }
}

// ─── Record ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
  pub ledger_id:  Uuid,
  pub key:        LedgerKey,
  pub counters:   Counters,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl LedgerRecord {
  pub fn new(key: LedgerKey) -> Self {
    let now = Utc::now();
    Self {
      ledger_id: Uuid::new_v4(),
      key,
      counters: Counters::default(),
      created_at: now,
      updated_at: now,
    }
  }

  pub fn available(&self) -> Decimal { self.counters.available_for(self.key.kind) }
}

/// Read model for reports: raw counters plus availability clamped at zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerView {
  #[serde(flatten)]
  pub record:           LedgerRecord,
  pub available_length: Decimal,
  pub available_pieces: i64,
}

impl From<LedgerRecord> for LedgerView {
  fn from(record: LedgerRecord) -> Self {
    let available_length = record.counters.available_length().max(Decimal::ZERO);
    let available_pieces = record.counters.available_pieces().max(0);
    Self { record, available_length, available_pieces }
  }
}

// ─── Filter ──────────────────────────────────────────────────────────────────

/// A loose key: every `Some` field must match, `None` matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerFilter {
  pub fabric_id:   Option<Uuid>,
  pub design_id:   Option<Uuid>,
  pub factory_id:  Option<Uuid>,
  pub matching_id: Option<Uuid>,
  pub kind:        Option<StockKind>,
  pub cut:         Option<Decimal>,
}

impl LedgerFilter {
  pub fn matches(&self, key: &LedgerKey) -> bool {
    fn opt<T: PartialEq>(want: &Option<T>, have: &Option<T>) -> bool {
      want.as_ref().is_none_or(|w| have.as_ref() == Some(w))
    }

    self.fabric_id.is_none_or(|f| f == key.fabric_id)
      && self.kind.is_none_or(|k| k == key.kind)
      && opt(&self.design_id, &key.design_id)
      && opt(&self.factory_id, &key.factory_id)
      && opt(&self.matching_id, &key.matching_id)
      && opt(&self.cut, &key.cut)
  }
}

impl From<&LedgerKey> for LedgerFilter {
  fn from(key: &LedgerKey) -> Self {
    Self {
      fabric_id:   Some(key.fabric_id),
      design_id:   key.design_id,
      factory_id:  key.factory_id,
      matching_id: key.matching_id,
      kind:        Some(key.kind),
      cut:         key.cut,
    }
  }
}

// ─── Selection ───────────────────────────────────────────────────────────────

/// Greedy candidate choice: the item with the highest `score`. On ties the
/// earliest item wins, so callers control tie-breaking through ordering.
pub fn most_available<T, F>(items: impl IntoIterator<Item = T>, score: F) -> Option<T>
where
  F: Fn(&T) -> Decimal,
{
  let mut best: Option<(Decimal, T)> = None;
  for item in items {
    let s = score(&item);
    if best.as_ref().is_none_or(|(top, _)| s > *top) {
      best = Some((s, item));
    }
  }
  best.map(|(_, item)| item)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(available: i64) -> LedgerRecord {
    let mut r = LedgerRecord::new(LedgerKey::taka(Uuid::nil(), None, None));
    r.counters.supplied_length = Decimal::from(available);
    r
  }

  #[test]
  fn dispatch_delta_leaves_availability_unchanged() {
    let mut c = Counters {
      supplied_length: Decimal::from(310),
      reserved_length: Decimal::from(250),
      supplied_pieces: 3,
      reserved_pieces: 3,
    };
    let before = c.available_length();
    c.apply(&LedgerDelta::dispatch(Decimal::from(220), 2, Decimal::from(220), 2));
    assert_eq!(c.supplied_length, Decimal::from(90));
    assert_eq!(c.reserved_length, Decimal::from(30));
    assert_eq!(c.available_length(), before);
    assert_eq!(c.supplied_pieces, 1);
  }

  #[test]
  fn dispatch_beyond_reservation_spends_free_stock() {
    let mut c = Counters {
      supplied_length: Decimal::from(310),
      reserved_length: Decimal::from(250),
      supplied_pieces: 3,
      reserved_pieces: 3,
    };
    c.apply(&LedgerDelta::dispatch(Decimal::from(310), 3, Decimal::from(250), 3));
    assert_eq!(c, Counters::default());
  }

  #[test]
  fn negated_delta_is_inverse() {
    let mut c = Counters::default();
    let d = LedgerDelta::supply(Decimal::from(10), 1) + LedgerDelta::reserve(Decimal::from(4), 1);
    c.apply(&d);
    c.apply(&-d);
    assert_eq!(c, Counters::default());
  }

  #[test]
  fn clamp_only_floors_negatives() {
    let c = Counters {
      supplied_length: Decimal::from(-5),
      reserved_length: Decimal::from(7),
      supplied_pieces: -1,
      reserved_pieces: 2,
    };
    let k = c.clamped();
    assert_eq!(k.supplied_length, Decimal::ZERO);
    assert_eq!(k.reserved_length, Decimal::from(7));
    assert_eq!(k.supplied_pieces, 0);
    assert_eq!(k.reserved_pieces, 2);
  }

  #[test]
  fn most_available_prefers_highest_then_first() {
    let items = vec![record(50), record(80), record(80), record(10)];
    let first_80 = items[1].ledger_id;
    let picked = most_available(items, LedgerRecord::available).unwrap();
    assert_eq!(picked.ledger_id, first_80);
  }

  #[test]
  fn most_available_of_nothing_is_none() {
    let picked = most_available(Vec::<LedgerRecord>::new(), LedgerRecord::available);
    assert!(picked.is_none());
  }

  #[test]
  fn filter_none_fields_match_anything() {
    let factory = Uuid::new_v4();
    let key = LedgerKey::taka(Uuid::nil(), None, Some(factory));
    let loose = LedgerFilter { fabric_id: Some(Uuid::nil()), ..Default::default() };
    assert!(loose.matches(&key));

    let other = LedgerFilter { factory_id: Some(Uuid::new_v4()), ..loose.clone() };
    assert!(!other.matches(&key));

    let saree = LedgerFilter { kind: Some(StockKind::Saree), ..loose };
    assert!(!saree.matches(&key));
  }
}
