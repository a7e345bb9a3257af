//! Production intake — the only source of supply.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  ledger::{LedgerDelta, LedgerKey},
  piece::{NewPiece, PieceFilter, StockPiece},
  tx::LedgerTx,
};

// ─── Types ───────────────────────────────────────────────────────────────────

/// A count of sarees (or an order quantity) for one matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingCount {
  pub matching_id: Uuid,
  pub count:       i64,
}

/// What a production slip supplies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProductionPayload {
  Taka { pieces: Vec<NewPiece> },
  Saree { cut: Decimal, matchings: Vec<MatchingCount> },
}

/// Input to [`record`]. `recorded_at` and the id are assigned on write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduction {
  pub date:       NaiveDate,
  pub factory_id: Uuid,
  pub fabric_id:  Uuid,
  pub design_id:  Option<Uuid>,
  pub payload:    ProductionPayload,
}

/// An immutable supply event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionEvent {
  pub production_id: Uuid,
  pub date:          NaiveDate,
  pub factory_id:    Uuid,
  pub fabric_id:     Uuid,
  pub design_id:     Option<Uuid>,
  pub payload:       ProductionPayload,
  pub recorded_at:   DateTime<Utc>,
}

impl ProductionEvent {
  pub fn from_new(production_id: Uuid, input: NewProduction) -> Self {
    Self {
      production_id,
      date: input.date,
      factory_id: input.factory_id,
      fabric_id: input.fabric_id,
      design_id: input.design_id,
      payload: input.payload,
      recorded_at: Utc::now(),
    }
  }

  /// Every ledger key this event supplies, with the supply delta for each.
  pub fn supply(&self) -> Vec<(LedgerKey, LedgerDelta)> {
    match &self.payload {
      ProductionPayload::Taka { pieces } => {
        let length = pieces.iter().map(|p| p.length).sum();
        let key = LedgerKey::taka(self.fabric_id, self.design_id, Some(self.factory_id));
        vec![(key, LedgerDelta::supply(length, pieces.len() as i64))]
      }
      ProductionPayload::Saree { cut, matchings } => matchings
        .iter()
        .map(|m| {
          let key = LedgerKey::saree(
            self.fabric_id,
            self.design_id,
            Some(self.factory_id),
            m.matching_id,
            Some(*cut),
          );
          let delta = LedgerDelta::supply(key.length_for_units(m.count), m.count);
          (key, delta)
        })
        .collect(),
    }
  }
}

impl NewProduction {
  fn validate(&self) -> Result<()> {
    match &self.payload {
      ProductionPayload::Taka { pieces } => {
        if pieces.is_empty() {
          return Err(Error::InvalidInput("production has no pieces".into()));
        }
        if let Some(p) = pieces.iter().find(|p| p.length <= Decimal::ZERO) {
          return Err(Error::InvalidInput(format!("piece {:?} has non-positive length", p.label)));
        }
      }
      ProductionPayload::Saree { cut, matchings } => {
        if *cut <= Decimal::ZERO {
          return Err(Error::InvalidInput("cut must be positive".into()));
        }
        if matchings.is_empty() || matchings.iter().any(|m| m.count <= 0) {
          return Err(Error::InvalidInput("every matching needs a positive count".into()));
        }
      }
    }
    Ok(())
  }
}

// ─── Intake ──────────────────────────────────────────────────────────────────

/// Add the event's supply to the ledger and mint its pieces.
pub fn apply<T: LedgerTx>(tx: &mut T, event: &ProductionEvent) -> Result<Vec<StockPiece>> {
  for (key, delta) in event.supply() {
    let record = tx.find_or_create_ledger(&key)?;
    tx.apply_delta(record.ledger_id, &delta)?;
  }

  match &event.payload {
    ProductionPayload::Taka { pieces } => tx.insert_pieces(event, pieces),
    ProductionPayload::Saree { .. } => Ok(Vec::new()),
  }
}

/// Remove the event's supply and delete its pieces. Refused while any of the
/// pieces is on a challan.
pub fn unapply<T: LedgerTx>(tx: &mut T, event: &ProductionEvent) -> Result<()> {
  let filter = PieceFilter { production_id: Some(event.production_id), ..Default::default() };
  let pieces = tx.list_pieces(&filter)?;
  if pieces.iter().any(|p| !p.is_available()) {
    return Err(Error::PiecesInUse(event.production_id));
  }

  for (key, delta) in event.supply() {
    match tx.find_ledger(&key)? {
      Some(record) => {
        tx.apply_delta(record.ledger_id, &-delta)?;
      }
      None => tracing::warn!(
        production_id = %event.production_id,
        ?key,
        "ledger record missing while unapplying production; skipped",
      ),
    }
  }

  tx.delete_pieces_by_production(event.production_id)
}

// ─── Operations ──────────────────────────────────────────────────────────────

/// Persist a new production event and apply it.
pub fn record<T: LedgerTx>(tx: &mut T, input: NewProduction) -> Result<ProductionEvent> {
  input.validate()?;
  let event = ProductionEvent::from_new(Uuid::new_v4(), input);
  tx.insert_production(&event)?;
  let pieces = apply(tx, &event)?;
  tracing::info!(
    production_id = %event.production_id,
    pieces = pieces.len(),
    "production recorded",
  );
  Ok(event)
}

/// Replace a production event: unapply the old one, apply the new one.
pub fn amend<T: LedgerTx>(tx: &mut T, production_id: Uuid, input: NewProduction) -> Result<ProductionEvent> {
  input.validate()?;
  let old = tx.get_production(production_id)?.ok_or(Error::ProductionNotFound(production_id))?;
  unapply(tx, &old)?;

  let mut event = ProductionEvent::from_new(production_id, input);
  event.recorded_at = old.recorded_at;
  tx.replace_production(&event)?;
  apply(tx, &event)?;
  tracing::info!(%production_id, "production amended");
  Ok(event)
}

/// Unapply and delete a production event.
pub fn remove<T: LedgerTx>(tx: &mut T, production_id: Uuid) -> Result<()> {
  let old = tx.get_production(production_id)?.ok_or(Error::ProductionNotFound(production_id))?;
  unapply(tx, &old)?;
  tx.delete_production(production_id)?;
  tracing::info!(%production_id, "production removed");
  Ok(())
}
