//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, calendar dates are `YYYY-MM-DD`, decimals
//! are normalised strings. Order and challan lines and production payloads
//! are stored as compact JSON. UUIDs are hyphenated lowercase strings.

use std::str::FromStr as _;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Row;
use rust_decimal::Decimal;
use uuid::Uuid;

use bahi_core::{
  challan::Challan,
  ledger::{Counters, LedgerKey, LedgerRecord, StockKind},
  order::{DispatchStatus, Order},
  piece::{PieceStatus, StockPiece},
  production::ProductionEvent,
};

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_opt_uuid(id: Option<Uuid>) -> Option<String> { id.map(encode_uuid) }

pub fn decode_opt_uuid(s: Option<&str>) -> Result<Option<Uuid>> {
  s.map(decode_uuid).transpose()
}

// ─── Dates ───────────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Decimal ─────────────────────────────────────────────────────────────────

/// Normalised so that equal quantities always produce equal strings; the
/// ledger key index relies on this for `cut`.
pub fn encode_decimal(d: Decimal) -> String { d.normalize().to_string() }

pub fn decode_decimal(s: &str) -> Result<Decimal> { Ok(Decimal::from_str(s)?) }

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn decode_kind(s: &str) -> Result<StockKind> {
  match s {
    "taka" => Ok(StockKind::Taka),
    "saree" => Ok(StockKind::Saree),
    other => Err(Error::UnknownVariant { what: "stock kind", value: other.to_owned() }),
  }
}

pub fn decode_piece_status(s: &str) -> Result<PieceStatus> {
  match s {
    "available" => Ok(PieceStatus::Available),
    "sold" => Ok(PieceStatus::Sold),
    other => Err(Error::UnknownVariant { what: "piece status", value: other.to_owned() }),
  }
}

pub fn decode_dispatch_status(s: &str) -> Result<DispatchStatus> {
  match s {
    "pending" => Ok(DispatchStatus::Pending),
    "partial" => Ok(DispatchStatus::Partial),
    "completed" => Ok(DispatchStatus::Completed),
    "cancelled" => Ok(DispatchStatus::Cancelled),
    other => Err(Error::UnknownVariant { what: "dispatch status", value: other.to_owned() }),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const LEDGER_COLUMNS: &str = "ledger_id, fabric_id, design_id, factory_id, matching_id, kind, cut,
   supplied_length, reserved_length, supplied_pieces, reserved_pieces, created_at, updated_at";

/// Raw values read directly from a `ledger_records` row.
pub struct RawLedger {
  pub ledger_id:       String,
  pub fabric_id:       String,
  pub design_id:       Option<String>,
  pub factory_id:      Option<String>,
  pub matching_id:     Option<String>,
  pub kind:            String,
  pub cut:             Option<String>,
  pub supplied_length: String,
  pub reserved_length: String,
  pub supplied_pieces: i64,
  pub reserved_pieces: i64,
  pub created_at:      String,
  pub updated_at:      String,
}

impl RawLedger {
  /// Expects the columns in [`LEDGER_COLUMNS`] order.
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      ledger_id:       row.get(0)?,
      fabric_id:       row.get(1)?,
      design_id:       row.get(2)?,
      factory_id:      row.get(3)?,
      matching_id:     row.get(4)?,
      kind:            row.get(5)?,
      cut:             row.get(6)?,
      supplied_length: row.get(7)?,
      reserved_length: row.get(8)?,
      supplied_pieces: row.get(9)?,
      reserved_pieces: row.get(10)?,
      created_at:      row.get(11)?,
      updated_at:      row.get(12)?,
    })
  }

  pub fn into_record(self) -> Result<LedgerRecord> {
    Ok(LedgerRecord {
      ledger_id:  decode_uuid(&self.ledger_id)?,
      key:        LedgerKey {
        fabric_id:   decode_uuid(&self.fabric_id)?,
        design_id:   decode_opt_uuid(self.design_id.as_deref())?,
        factory_id:  decode_opt_uuid(self.factory_id.as_deref())?,
        matching_id: decode_opt_uuid(self.matching_id.as_deref())?,
        kind:        decode_kind(&self.kind)?,
        cut:         self.cut.as_deref().map(decode_decimal).transpose()?,
      },
      counters:   Counters {
        supplied_length: decode_decimal(&self.supplied_length)?,
        reserved_length: decode_decimal(&self.reserved_length)?,
        supplied_pieces: self.supplied_pieces,
        reserved_pieces: self.reserved_pieces,
      },
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

pub const PIECE_COLUMNS: &str = "piece_id, label, length, status, fabric_id, design_id, factory_id,
   production_id, challan_id, created_at";

pub struct RawPiece {
  pub piece_id:      String,
  pub label:         String,
  pub length:        String,
  pub status:        String,
  pub fabric_id:     String,
  pub design_id:     Option<String>,
  pub factory_id:    String,
  pub production_id: String,
  pub challan_id:    Option<String>,
  pub created_at:    String,
}

impl RawPiece {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      piece_id:      row.get(0)?,
      label:         row.get(1)?,
      length:        row.get(2)?,
      status:        row.get(3)?,
      fabric_id:     row.get(4)?,
      design_id:     row.get(5)?,
      factory_id:    row.get(6)?,
      production_id: row.get(7)?,
      challan_id:    row.get(8)?,
      created_at:    row.get(9)?,
    })
  }

  pub fn into_piece(self) -> Result<StockPiece> {
    Ok(StockPiece {
      piece_id:      decode_uuid(&self.piece_id)?,
      label:         self.label,
      length:        decode_decimal(&self.length)?,
      status:        decode_piece_status(&self.status)?,
      fabric_id:     decode_uuid(&self.fabric_id)?,
      design_id:     decode_opt_uuid(self.design_id.as_deref())?,
      factory_id:    decode_uuid(&self.factory_id)?,
      production_id: decode_uuid(&self.production_id)?,
      challan_id:    decode_opt_uuid(self.challan_id.as_deref())?,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

pub const PRODUCTION_COLUMNS: &str =
  "production_id, date, factory_id, fabric_id, design_id, payload_json, recorded_at";

pub struct RawProduction {
  pub production_id: String,
  pub date:          String,
  pub factory_id:    String,
  pub fabric_id:     String,
  pub design_id:     Option<String>,
  pub payload_json:  String,
  pub recorded_at:   String,
}

impl RawProduction {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      production_id: row.get(0)?,
      date:          row.get(1)?,
      factory_id:    row.get(2)?,
      fabric_id:     row.get(3)?,
      design_id:     row.get(4)?,
      payload_json:  row.get(5)?,
      recorded_at:   row.get(6)?,
    })
  }

  pub fn into_event(self) -> Result<ProductionEvent> {
    Ok(ProductionEvent {
      production_id: decode_uuid(&self.production_id)?,
      date:          decode_date(&self.date)?,
      factory_id:    decode_uuid(&self.factory_id)?,
      fabric_id:     decode_uuid(&self.fabric_id)?,
      design_id:     decode_opt_uuid(self.design_id.as_deref())?,
      payload:       serde_json::from_str(&self.payload_json)?,
      recorded_at:   decode_dt(&self.recorded_at)?,
    })
  }
}

pub const ORDER_COLUMNS: &str =
  "order_id, order_no, party_id, date, status, lines_json, created_at";

pub struct RawOrder {
  pub order_id:   String,
  pub order_no:   String,
  pub party_id:   Option<String>,
  pub date:       String,
  pub status:     String,
  pub lines_json: String,
  pub created_at: String,
}

impl RawOrder {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      order_id:   row.get(0)?,
      order_no:   row.get(1)?,
      party_id:   row.get(2)?,
      date:       row.get(3)?,
      status:     row.get(4)?,
      lines_json: row.get(5)?,
      created_at: row.get(6)?,
    })
  }

  pub fn into_order(self) -> Result<Order> {
    Ok(Order {
      order_id:   decode_uuid(&self.order_id)?,
      order_no:   self.order_no,
      party_id:   decode_opt_uuid(self.party_id.as_deref())?,
      date:       decode_date(&self.date)?,
      status:     decode_dispatch_status(&self.status)?,
      lines:      serde_json::from_str(&self.lines_json)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub const CHALLAN_COLUMNS: &str =
  "challan_id, challan_no, order_id, date, lines_json, created_at, updated_at";

pub struct RawChallan {
  pub challan_id: String,
  pub challan_no: String,
  pub order_id:   String,
  pub date:       String,
  pub lines_json: String,
  pub created_at: String,
  pub updated_at: String,
}

impl RawChallan {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      challan_id: row.get(0)?,
      challan_no: row.get(1)?,
      order_id:   row.get(2)?,
      date:       row.get(3)?,
      lines_json: row.get(4)?,
      created_at: row.get(5)?,
      updated_at: row.get(6)?,
    })
  }

  pub fn into_challan(self) -> Result<Challan> {
    Ok(Challan {
      challan_id: decode_uuid(&self.challan_id)?,
      challan_no: self.challan_no,
      order_id:   decode_uuid(&self.order_id)?,
      date:       decode_date(&self.date)?,
      lines:      serde_json::from_str(&self.lines_json)?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decimals_normalise() {
    let a: Decimal = "5.50".parse().unwrap();
    let b: Decimal = "5.5".parse().unwrap();
    assert_eq!(encode_decimal(a), encode_decimal(b));
    assert_eq!(decode_decimal(&encode_decimal(a)).unwrap(), b);
    assert_eq!(encode_decimal(Decimal::from(120)), "120");
  }

  #[test]
  fn unknown_status_is_rejected() {
    assert!(matches!(
      decode_piece_status("lost"),
      Err(Error::UnknownVariant { what: "piece status", .. })
    ));
  }
}
