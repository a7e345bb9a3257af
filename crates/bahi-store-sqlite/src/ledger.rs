//! [`SqliteLedger`] — the [`LedgerTx`] implementation over one open SQLite
//! transaction.
//!
//! Every method here is synchronous and runs on the `tokio_rusqlite` worker
//! thread. Atomicity comes from the caller: [`SqliteStore`](crate::SqliteStore)
//! opens the transaction and commits only when the engine returns `Ok`.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension as _, params, params_from_iter};
use uuid::Uuid;

use bahi_core::{
  challan::Challan,
  ledger::{Counters, LedgerDelta, LedgerFilter, LedgerKey, LedgerRecord},
  order::Order,
  piece::{NewPiece, PieceFilter, PieceStatus, StockPiece},
  production::{ProductionEvent, ProductionPayload},
  tx::LedgerTx,
};

use crate::{
  Result,
  encode::{
    CHALLAN_COLUMNS, LEDGER_COLUMNS, ORDER_COLUMNS, PIECE_COLUMNS, PRODUCTION_COLUMNS, RawChallan,
    RawLedger, RawOrder, RawPiece, RawProduction, encode_date, encode_decimal, encode_dt,
    encode_opt_uuid, encode_uuid,
  },
};

// ─── Query building ──────────────────────────────────────────────────────────

/// A conjunction of `column = ?N` equality conditions over text values.
#[derive(Default)]
struct Where {
  conds:  Vec<String>,
  values: Vec<String>,
}

impl Where {
  fn eq(mut self, column: &str, value: Option<String>) -> Self {
    if let Some(v) = value {
      self.values.push(v);
      self.conds.push(format!("{column} = ?{}", self.values.len()));
    }
    self
  }

  fn clause(&self) -> String {
    if self.conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", self.conds.join(" AND "))
    }
  }
}

// ─── Transaction handle ──────────────────────────────────────────────────────

pub struct SqliteLedger<'c> {
  conn: &'c Connection,
}

impl<'c> SqliteLedger<'c> {
  /// `conn` is normally a [`rusqlite::Transaction`] deref'd to its connection.
  pub fn new(conn: &'c Connection) -> Self { Self { conn } }

  fn ledger_where(&self, sql_where: &Where) -> Result<Vec<LedgerRecord>> {
    let sql = format!(
      "SELECT {LEDGER_COLUMNS} FROM ledger_records {} ORDER BY seq",
      sql_where.clause()
    );
    let mut stmt = self.conn.prepare(&sql)?;
    let raws = stmt
      .query_map(params_from_iter(sql_where.values.iter()), RawLedger::from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(RawLedger::into_record).collect()
  }

  fn ledger_by_id(&self, ledger_id: Uuid) -> Result<Option<LedgerRecord>> {
    let raw = self
      .conn
      .query_row(
        &format!("SELECT {LEDGER_COLUMNS} FROM ledger_records WHERE ledger_id = ?1"),
        params![encode_uuid(ledger_id)],
        RawLedger::from_row,
      )
      .optional()?;
    raw.map(RawLedger::into_record).transpose()
  }

  fn ledger_by_key(&self, key: &LedgerKey) -> Result<Option<LedgerRecord>> {
    // `IS` compares NULLs as equal, matching the unique key index.
    let raw = self
      .conn
      .query_row(
        &format!(
          "SELECT {LEDGER_COLUMNS} FROM ledger_records
           WHERE fabric_id = ?1 AND design_id IS ?2 AND factory_id IS ?3
             AND matching_id IS ?4 AND kind = ?5 AND cut IS ?6"
        ),
        params![
          encode_uuid(key.fabric_id),
          encode_opt_uuid(key.design_id),
          encode_opt_uuid(key.factory_id),
          encode_opt_uuid(key.matching_id),
          key.kind.as_str(),
          key.cut.map(encode_decimal),
        ],
        RawLedger::from_row,
      )
      .optional()?;
    raw.map(RawLedger::into_record).transpose()
  }

  fn insert_record(&self, key: &LedgerKey) -> Result<LedgerRecord> {
    let record = LedgerRecord::new(key.clone());
    self.conn.execute(
      "INSERT INTO ledger_records (
         ledger_id, fabric_id, design_id, factory_id, matching_id, kind, cut,
         created_at, updated_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
      params![
        encode_uuid(record.ledger_id),
        encode_uuid(key.fabric_id),
        encode_opt_uuid(key.design_id),
        encode_opt_uuid(key.factory_id),
        encode_opt_uuid(key.matching_id),
        key.kind.as_str(),
        key.cut.map(encode_decimal),
        encode_dt(record.created_at),
        encode_dt(record.updated_at),
      ],
    )?;
    Ok(record)
  }

  /// Returns `false` when no record has this id.
  fn write_counters(&self, ledger_id: Uuid, counters: &Counters) -> Result<bool> {
    let changed = self.conn.execute(
      "UPDATE ledger_records
       SET supplied_length = ?2, reserved_length = ?3,
           supplied_pieces = ?4, reserved_pieces = ?5, updated_at = ?6
       WHERE ledger_id = ?1",
      params![
        encode_uuid(ledger_id),
        encode_decimal(counters.supplied_length),
        encode_decimal(counters.reserved_length),
        counters.supplied_pieces,
        counters.reserved_pieces,
        encode_dt(Utc::now()),
      ],
    )?;
    Ok(changed > 0)
  }

  fn pieces_where(&self, filter: &PieceFilter) -> Result<Vec<StockPiece>> {
    let sql_where = Where::default()
      .eq("fabric_id", encode_opt_uuid(filter.fabric_id))
      .eq("design_id", encode_opt_uuid(filter.design_id))
      .eq("factory_id", encode_opt_uuid(filter.factory_id))
      .eq("status", filter.status.map(|s| s.as_str().to_owned()))
      .eq("production_id", encode_opt_uuid(filter.production_id))
      .eq("challan_id", encode_opt_uuid(filter.challan_id))
      .eq("label", filter.label.clone());
    let sql = format!("SELECT {PIECE_COLUMNS} FROM pieces {} ORDER BY seq", sql_where.clause());

    let mut stmt = self.conn.prepare(&sql)?;
    let raws = stmt
      .query_map(params_from_iter(sql_where.values.iter()), RawPiece::from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(RawPiece::into_piece).collect()
  }

  fn production_kind(payload: &ProductionPayload) -> &'static str {
    match payload {
      ProductionPayload::Taka { .. } => "taka",
      ProductionPayload::Saree { .. } => "saree",
    }
  }
}

// ─── LedgerTx impl ───────────────────────────────────────────────────────────

impl LedgerTx for SqliteLedger<'_> {
  // ── Ledger records ────────────────────────────────────────────────────────

  fn get_ledger(&mut self, ledger_id: Uuid) -> bahi_core::Result<Option<LedgerRecord>> {
    Ok(self.ledger_by_id(ledger_id)?)
  }

  fn find_ledger(&mut self, key: &LedgerKey) -> bahi_core::Result<Option<LedgerRecord>> {
    Ok(self.ledger_by_key(key)?)
  }

  fn list_ledger(&mut self, filter: &LedgerFilter) -> bahi_core::Result<Vec<LedgerRecord>> {
    let sql_where = Where::default()
      .eq("fabric_id", encode_opt_uuid(filter.fabric_id))
      .eq("design_id", encode_opt_uuid(filter.design_id))
      .eq("factory_id", encode_opt_uuid(filter.factory_id))
      .eq("matching_id", encode_opt_uuid(filter.matching_id))
      .eq("kind", filter.kind.map(|k| k.as_str().to_owned()))
      .eq("cut", filter.cut.map(encode_decimal));
    Ok(self.ledger_where(&sql_where)?)
  }

  fn insert_ledger(&mut self, key: &LedgerKey) -> bahi_core::Result<LedgerRecord> {
    Ok(self.insert_record(key)?)
  }

  fn apply_delta(
    &mut self,
    ledger_id: Uuid,
    delta: &LedgerDelta,
  ) -> bahi_core::Result<LedgerRecord> {
    let mut record = self
      .ledger_by_id(ledger_id)?
      .ok_or(bahi_core::Error::LedgerNotFound(ledger_id))?;
    record.counters.apply(delta);
    self.write_counters(ledger_id, &record.counters)?;
    Ok(record)
  }

  fn overwrite_counters(&mut self, ledger_id: Uuid, counters: &Counters) -> bahi_core::Result<()> {
    if !self.write_counters(ledger_id, counters)? {
      return Err(bahi_core::Error::LedgerNotFound(ledger_id));
    }
    Ok(())
  }

  fn delete_ledger(&mut self, ledger_id: Uuid) -> bahi_core::Result<bool> {
    let changed = self
      .conn
      .execute("DELETE FROM ledger_records WHERE ledger_id = ?1", params![encode_uuid(ledger_id)])
      .map_err(crate::Error::from)?;
    Ok(changed > 0)
  }

  // ── Pieces ────────────────────────────────────────────────────────────────

  fn insert_pieces(
    &mut self,
    production: &ProductionEvent,
    pieces: &[NewPiece],
  ) -> bahi_core::Result<Vec<StockPiece>> {
    let now = Utc::now();
    let mut stmt = self
      .conn
      .prepare_cached(
        "INSERT INTO pieces (
           piece_id, label, length, status, fabric_id, design_id, factory_id,
           production_id, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
      )
      .map_err(crate::Error::from)?;

    let mut minted = Vec::with_capacity(pieces.len());
    for input in pieces {
      let piece = StockPiece {
        piece_id:      Uuid::new_v4(),
        label:         input.label.clone(),
        length:        input.length,
        status:        PieceStatus::Available,
        fabric_id:     production.fabric_id,
        design_id:     production.design_id,
        factory_id:    production.factory_id,
        production_id: production.production_id,
        challan_id:    None,
        created_at:    now,
      };
      stmt
        .execute(params![
          encode_uuid(piece.piece_id),
          piece.label,
          encode_decimal(piece.length),
          piece.status.as_str(),
          encode_uuid(piece.fabric_id),
          encode_opt_uuid(piece.design_id),
          encode_uuid(piece.factory_id),
          encode_uuid(piece.production_id),
          encode_dt(piece.created_at),
        ])
        .map_err(crate::Error::from)?;
      minted.push(piece);
    }
    Ok(minted)
  }

  fn get_piece(&mut self, piece_id: Uuid) -> bahi_core::Result<Option<StockPiece>> {
    let raw = self
      .conn
      .query_row(
        &format!("SELECT {PIECE_COLUMNS} FROM pieces WHERE piece_id = ?1"),
        params![encode_uuid(piece_id)],
        RawPiece::from_row,
      )
      .optional()
      .map_err(crate::Error::from)?;
    Ok(raw.map(RawPiece::into_piece).transpose()?)
  }

  fn list_pieces(&mut self, filter: &PieceFilter) -> bahi_core::Result<Vec<StockPiece>> {
    Ok(self.pieces_where(filter)?)
  }

  fn set_piece_status(
    &mut self,
    piece_ids: &[Uuid],
    status: PieceStatus,
    challan_id: Option<Uuid>,
  ) -> bahi_core::Result<()> {
    let mut stmt = self
      .conn
      .prepare_cached("UPDATE pieces SET status = ?2, challan_id = ?3 WHERE piece_id = ?1")
      .map_err(crate::Error::from)?;
    for &piece_id in piece_ids {
      let changed = stmt
        .execute(params![encode_uuid(piece_id), status.as_str(), encode_opt_uuid(challan_id)])
        .map_err(crate::Error::from)?;
      if changed == 0 {
        return Err(bahi_core::Error::PieceNotFound(piece_id));
      }
    }
    Ok(())
  }

  fn delete_pieces_by_production(&mut self, production_id: Uuid) -> bahi_core::Result<()> {
    self
      .conn
      .execute("DELETE FROM pieces WHERE production_id = ?1", params![encode_uuid(production_id)])
      .map_err(crate::Error::from)?;
    Ok(())
  }

  // ── Productions ───────────────────────────────────────────────────────────

  fn insert_production(&mut self, event: &ProductionEvent) -> bahi_core::Result<()> {
    let payload_json = serde_json::to_string(&event.payload)?;
    self
      .conn
      .execute(
        "INSERT INTO productions (
           production_id, date, factory_id, fabric_id, design_id, kind, payload_json, recorded_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
          encode_uuid(event.production_id),
          encode_date(event.date),
          encode_uuid(event.factory_id),
          encode_uuid(event.fabric_id),
          encode_opt_uuid(event.design_id),
          Self::production_kind(&event.payload),
          payload_json,
          encode_dt(event.recorded_at),
        ],
      )
      .map_err(crate::Error::from)?;
    Ok(())
  }

  fn replace_production(&mut self, event: &ProductionEvent) -> bahi_core::Result<()> {
    let payload_json = serde_json::to_string(&event.payload)?;
    let changed = self
      .conn
      .execute(
        "UPDATE productions
         SET date = ?2, factory_id = ?3, fabric_id = ?4, design_id = ?5, kind = ?6,
             payload_json = ?7, recorded_at = ?8
         WHERE production_id = ?1",
        params![
          encode_uuid(event.production_id),
          encode_date(event.date),
          encode_uuid(event.factory_id),
          encode_uuid(event.fabric_id),
          encode_opt_uuid(event.design_id),
          Self::production_kind(&event.payload),
          payload_json,
          encode_dt(event.recorded_at),
        ],
      )
      .map_err(crate::Error::from)?;
    if changed == 0 {
      return Err(bahi_core::Error::ProductionNotFound(event.production_id));
    }
    Ok(())
  }

  fn get_production(&mut self, production_id: Uuid) -> bahi_core::Result<Option<ProductionEvent>> {
    let raw = self
      .conn
      .query_row(
        &format!("SELECT {PRODUCTION_COLUMNS} FROM productions WHERE production_id = ?1"),
        params![encode_uuid(production_id)],
        RawProduction::from_row,
      )
      .optional()
      .map_err(crate::Error::from)?;
    Ok(raw.map(RawProduction::into_event).transpose()?)
  }

  fn delete_production(&mut self, production_id: Uuid) -> bahi_core::Result<()> {
    self
      .conn
      .execute("DELETE FROM productions WHERE production_id = ?1", params![encode_uuid(production_id)])
      .map_err(crate::Error::from)?;
    Ok(())
  }

  fn all_productions(&mut self) -> bahi_core::Result<Vec<ProductionEvent>> {
    let mut stmt = self
      .conn
      .prepare(&format!("SELECT {PRODUCTION_COLUMNS} FROM productions ORDER BY seq"))
      .map_err(crate::Error::from)?;
    let raws = stmt
      .query_map([], RawProduction::from_row)
      .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
      .map_err(crate::Error::from)?;
    Ok(raws.into_iter().map(RawProduction::into_event).collect::<Result<_>>()?)
  }

  // ── Orders ────────────────────────────────────────────────────────────────

  fn insert_order(&mut self, order: &Order) -> bahi_core::Result<()> {
    let lines_json = serde_json::to_string(&order.lines)?;
    self
      .conn
      .execute(
        "INSERT INTO orders (order_id, order_no, party_id, date, status, lines_json, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
          encode_uuid(order.order_id),
          order.order_no,
          encode_opt_uuid(order.party_id),
          encode_date(order.date),
          order.status.as_str(),
          lines_json,
          encode_dt(order.created_at),
        ],
      )
      .map_err(crate::Error::from)?;
    Ok(())
  }

  fn save_order(&mut self, order: &Order) -> bahi_core::Result<()> {
    let lines_json = serde_json::to_string(&order.lines)?;
    let changed = self
      .conn
      .execute(
        "UPDATE orders SET status = ?2, lines_json = ?3 WHERE order_id = ?1",
        params![encode_uuid(order.order_id), order.status.as_str(), lines_json],
      )
      .map_err(crate::Error::from)?;
    if changed == 0 {
      return Err(bahi_core::Error::OrderNotFound(order.order_id));
    }
    Ok(())
  }

  fn get_order(&mut self, order_id: Uuid) -> bahi_core::Result<Option<Order>> {
    let raw = self
      .conn
      .query_row(
        &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = ?1"),
        params![encode_uuid(order_id)],
        RawOrder::from_row,
      )
      .optional()
      .map_err(crate::Error::from)?;
    Ok(raw.map(RawOrder::into_order).transpose()?)
  }

  fn all_orders(&mut self) -> bahi_core::Result<Vec<Order>> {
    let mut stmt = self
      .conn
      .prepare(&format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY seq"))
      .map_err(crate::Error::from)?;
    let raws = stmt
      .query_map([], RawOrder::from_row)
      .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
      .map_err(crate::Error::from)?;
    Ok(raws.into_iter().map(RawOrder::into_order).collect::<Result<_>>()?)
  }

  // ── Challans ──────────────────────────────────────────────────────────────

  fn insert_challan(&mut self, challan: &Challan) -> bahi_core::Result<()> {
    let lines_json = serde_json::to_string(&challan.lines)?;
    self
      .conn
      .execute(
        "INSERT INTO challans (
           challan_id, challan_no, order_id, date, lines_json, created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
          encode_uuid(challan.challan_id),
          challan.challan_no,
          encode_uuid(challan.order_id),
          encode_date(challan.date),
          lines_json,
          encode_dt(challan.created_at),
          encode_dt(challan.updated_at),
        ],
      )
      .map_err(crate::Error::from)?;
    Ok(())
  }

  fn save_challan(&mut self, challan: &Challan) -> bahi_core::Result<()> {
    let lines_json = serde_json::to_string(&challan.lines)?;
    let changed = self
      .conn
      .execute(
        "UPDATE challans SET challan_no = ?2, date = ?3, lines_json = ?4, updated_at = ?5
         WHERE challan_id = ?1",
        params![
          encode_uuid(challan.challan_id),
          challan.challan_no,
          encode_date(challan.date),
          lines_json,
          encode_dt(challan.updated_at),
        ],
      )
      .map_err(crate::Error::from)?;
    if changed == 0 {
      return Err(bahi_core::Error::ChallanNotFound(challan.challan_id));
    }
    Ok(())
  }

  fn get_challan(&mut self, challan_id: Uuid) -> bahi_core::Result<Option<Challan>> {
    let raw = self
      .conn
      .query_row(
        &format!("SELECT {CHALLAN_COLUMNS} FROM challans WHERE challan_id = ?1"),
        params![encode_uuid(challan_id)],
        RawChallan::from_row,
      )
      .optional()
      .map_err(crate::Error::from)?;
    Ok(raw.map(RawChallan::into_challan).transpose()?)
  }

  fn delete_challan(&mut self, challan_id: Uuid) -> bahi_core::Result<()> {
    self
      .conn
      .execute("DELETE FROM challans WHERE challan_id = ?1", params![encode_uuid(challan_id)])
      .map_err(crate::Error::from)?;
    Ok(())
  }

  fn all_challans(&mut self) -> bahi_core::Result<Vec<Challan>> {
    let mut stmt = self
      .conn
      .prepare(&format!("SELECT {CHALLAN_COLUMNS} FROM challans ORDER BY seq"))
      .map_err(crate::Error::from)?;
    let raws = stmt
      .query_map([], RawChallan::from_row)
      .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
      .map_err(crate::Error::from)?;
    Ok(raws.into_iter().map(RawChallan::into_challan).collect::<Result<_>>()?)
  }
}
