//! Stock pieces — individually labelled taka rolls.
//!
//! Pieces are created in bulk by production intake and only ever move between
//! `Available` and `Sold`. Their length is fixed at creation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::LedgerKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PieceStatus {
  Available,
  Sold,
}

impl PieceStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Available => "available",
      Self::Sold => "sold",
    }
  }
}

/// One roll as entered on a production slip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPiece {
  /// Free-text roll number printed on the taka.
  pub label:  String,
  pub length: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockPiece {
  pub piece_id:      Uuid,
  pub label:         String,
  pub length:        Decimal,
  pub status:        PieceStatus,
  pub fabric_id:     Uuid,
  pub design_id:     Option<Uuid>,
  pub factory_id:    Uuid,
  pub production_id: Uuid,
  /// The challan that sold this piece, if any.
  pub challan_id:    Option<Uuid>,
  pub created_at:    DateTime<Utc>,
}

impl StockPiece {
  /// The ledger record this roll is counted in.
  pub fn ledger_key(&self) -> LedgerKey {
    LedgerKey::taka(self.fabric_id, self.design_id, Some(self.factory_id))
  }

  pub fn is_available(&self) -> bool { self.status == PieceStatus::Available }

  /// The status implied by challan assignment alone.
  pub fn expected_status(&self) -> PieceStatus {
    if self.challan_id.is_some() { PieceStatus::Sold } else { PieceStatus::Available }
  }
}

/// Parameters for piece listings. Results are always in creation order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PieceFilter {
  pub fabric_id:     Option<Uuid>,
  pub design_id:     Option<Uuid>,
  pub factory_id:    Option<Uuid>,
  pub status:        Option<PieceStatus>,
  pub production_id: Option<Uuid>,
  pub challan_id:    Option<Uuid>,
  pub label:         Option<String>,
}

impl PieceFilter {
  /// Available rolls counted in the ledger record identified by `key`.
  pub fn available_for(key: &LedgerKey) -> Self {
    Self {
      fabric_id: Some(key.fabric_id),
      design_id: key.design_id,
      factory_id: key.factory_id,
      status: Some(PieceStatus::Available),
      ..Self::default()
    }
  }

  pub fn matches(&self, piece: &StockPiece) -> bool {
    self.fabric_id.is_none_or(|f| f == piece.fabric_id)
      && self.design_id.is_none_or(|d| Some(d) == piece.design_id)
      && self.factory_id.is_none_or(|f| f == piece.factory_id)
      && self.status.is_none_or(|s| s == piece.status)
      && self.production_id.is_none_or(|p| p == piece.production_id)
      && self.challan_id.is_none_or(|c| Some(c) == piece.challan_id)
      && self.label.as_deref().is_none_or(|l| l == piece.label)
  }
}

/// Take pieces in the given (FIFO) order until their summed length covers
/// `length`. Returns `None` when the pieces run out first.
pub fn fill_fifo(pieces: Vec<StockPiece>, length: Decimal) -> Option<Vec<StockPiece>> {
  let mut picked = Vec::new();
  let mut covered = Decimal::ZERO;
  for piece in pieces {
    if covered >= length {
      break;
    }
    covered += piece.length;
    picked.push(piece);
  }
  (covered >= length).then_some(picked)
}
