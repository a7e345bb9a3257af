//! Challans (delivery notes) and the allocations they commit.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ledger::LedgerDelta, production::MatchingCount};

/// What one challan line asks to send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DispatchRequest {
  /// Explicit `pieces` win; otherwise rolls are picked FIFO to cover `length`.
  Taka {
    length: Option<Decimal>,
    #[serde(default)]
    pieces: Vec<Uuid>,
  },
  Saree { matchings: Vec<MatchingCount> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewChallanLine {
  pub order_line_id: Uuid,
  /// Draw only from this factory's stock.
  pub factory_id:    Option<Uuid>,
  pub request:       DispatchRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewChallan {
  pub challan_no: String,
  pub order_id:   Uuid,
  pub date:       NaiveDate,
  pub lines:      Vec<NewChallanLine>,
}

/// Exactly what a committed line took from one ledger record. Reversal replays
/// the negation of this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
  pub ledger_id:       Uuid,
  pub matching_id:     Option<Uuid>,
  pub length:          Decimal,
  pub pieces:          i64,
  /// The part of `length`/`pieces` released from the order line's own
  /// reservation; the remainder came out of free stock.
  #[serde(default)]
  pub reserved_length: Decimal,
  #[serde(default)]
  pub reserved_pieces: i64,
  /// Record the reservation was released from, when the order line was
  /// charged somewhere other than `ledger_id` (a placeholder booked before
  /// stock arrived, or another factory's record).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub held_ledger_id:  Option<Uuid>,
  #[serde(default)]
  pub piece_ids:       Vec<Uuid>,
}

impl Allocation {
  pub fn hold_ledger_id(&self) -> Uuid { self.held_ledger_id.unwrap_or(self.ledger_id) }

  /// Counter changes committing this allocation makes, per record: supply
  /// leaves `ledger_id`, reservation leaves the hold record.
  pub fn deltas(&self) -> Vec<(Uuid, LedgerDelta)> {
    let hold = self.hold_ledger_id();
    if hold == self.ledger_id {
      return vec![(
        self.ledger_id,
        LedgerDelta::dispatch(self.length, self.pieces, self.reserved_length, self.reserved_pieces),
      )];
    }
    vec![
      (self.ledger_id, -LedgerDelta::supply(self.length, self.pieces)),
      (hold, -LedgerDelta::reserve(self.reserved_length, self.reserved_pieces)),
    ]
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallanLine {
  pub line_id:       Uuid,
  pub order_line_id: Uuid,
  pub factory_id:    Option<Uuid>,
  pub request:       DispatchRequest,
  pub allocations:   Vec<Allocation>,
}

impl ChallanLine {
  pub fn dispatched_length(&self) -> Decimal { self.allocations.iter().map(|a| a.length).sum() }

  pub fn dispatched_pieces(&self) -> i64 { self.allocations.iter().map(|a| a.pieces).sum() }

  pub fn piece_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
    self.allocations.iter().flat_map(|a| a.piece_ids.iter().copied())
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challan {
  pub challan_id: Uuid,
  pub challan_no: String,
  pub order_id:   Uuid,
  pub date:       NaiveDate,
  pub lines:      Vec<ChallanLine>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}
