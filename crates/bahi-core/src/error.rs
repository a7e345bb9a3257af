//! Error types for `bahi-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::validator::Shortage;

#[derive(Debug, Error)]
pub enum Error {
  /// One or more lines cannot be covered by free stock. Nothing was written.
  #[error("insufficient stock: {} line(s) short", .0.len())]
  InsufficientStock(Vec<Shortage>),

  #[error("order not found: {0}")]
  OrderNotFound(Uuid),

  #[error("order line {line} not found on order {order}")]
  OrderLineNotFound { order: Uuid, line: Uuid },

  #[error("challan not found: {0}")]
  ChallanNotFound(Uuid),

  #[error("production not found: {0}")]
  ProductionNotFound(Uuid),

  #[error("stock piece not found: {0}")]
  PieceNotFound(Uuid),

  #[error("ledger record not found: {0}")]
  LedgerNotFound(Uuid),

  /// A production cannot be unapplied while some of its pieces are sold.
  #[error("production {0} has pieces that are already dispatched")]
  PiecesInUse(Uuid),

  #[error("order {0} is cancelled")]
  OrderClosed(Uuid),

  #[error("invalid input: {0}")]
  InvalidInput(String),

  /// A transient write conflict; the whole operation may be retried.
  #[error("concurrency conflict: {0}")]
  ConcurrencyConflict(String),

  #[error("storage error: {0}")]
  Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::ConcurrencyConflict(_))
  }

  pub fn is_not_found(&self) -> bool {
    matches!(
      self,
      Self::OrderNotFound(_)
        | Self::OrderLineNotFound { .. }
        | Self::ChallanNotFound(_)
        | Self::ProductionNotFound(_)
        | Self::PieceNotFound(_)
        | Self::LedgerNotFound(_)
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
