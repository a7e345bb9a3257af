//! [`SqliteStore`] — the SQLite implementation of [`InventoryStore`].

use std::{path::Path, time::Duration};

use rusqlite::TransactionBehavior;
use uuid::Uuid;

use bahi_core::{
  challan::{Challan, NewChallan},
  dispatch,
  ledger::{LedgerFilter, LedgerRecord},
  order::{NewOrder, NewOrderLine, Order},
  piece::{PieceFilter, StockPiece},
  production::{self, NewProduction, ProductionEvent},
  reconcile::{self, RecomputeReport},
  reservation,
  store::InventoryStore,
  tx::LedgerTx,
  validator::{self, Availability},
};

use crate::{Error, Result, ledger::SqliteLedger, schema::SCHEMA};

/// How many times a conflicting transaction is re-run before giving up.
pub const DEFAULT_BUSY_RETRIES: u32 = 3;

/// SQLite's own wait on a locked database before reporting BUSY.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Bahi ledger backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
  busy_retries:    u32,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, busy_retries: DEFAULT_BUSY_RETRIES };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, busy_retries: DEFAULT_BUSY_RETRIES };
    store.init_schema().await?;
    Ok(store)
  }

  /// Override how often a conflicting transaction is retried.
  pub fn with_retries(mut self, busy_retries: u32) -> Self {
    self.busy_retries = busy_retries;
    self
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `op` inside one `BEGIN IMMEDIATE` transaction.
  ///
  /// The transaction commits only if `op` returns `Ok`; any error rolls back
  /// every write `op` made. Lock conflicts are retried up to `busy_retries`
  /// times with a short linear backoff.
  async fn transact<T, F>(&self, op: F) -> Result<T>
  where
    T: Send + 'static,
    F: Fn(&mut SqliteLedger<'_>) -> bahi_core::Result<T> + Clone + Send + 'static,
  {
    let mut attempt = 0;
    loop {
      let op = op.clone();
      let outcome = self
        .conn
        .call(move |conn| {
          let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
          let result = op(&mut SqliteLedger::new(&tx));
          if result.is_ok() {
            tx.commit()?;
          }
          Ok(result)
        })
        .await;

      let result = match outcome {
        Ok(inner) => inner.map_err(Error::Core),
        Err(e) => Err(Error::Database(e).normalize()),
      };

      match result {
        Err(e) if e.is_retryable() && attempt < self.busy_retries => {
          attempt += 1;
          tracing::warn!(attempt, error = %e, "transaction conflict; retrying");
          tokio::time::sleep(Duration::from_millis(20 * u64::from(attempt))).await;
        }
        other => return other,
      }
    }
  }

  /// Run a read-only `op` outside any explicit transaction.
  async fn read<T, F>(&self, op: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut SqliteLedger<'_>) -> bahi_core::Result<T> + Send + 'static,
  {
    let outcome = self
      .conn
      .call(move |conn| Ok(op(&mut SqliteLedger::new(conn))))
      .await
      .map_err(|e| Error::Database(e).normalize())?;
    outcome.map_err(Error::Core)
  }
}

// ─── InventoryStore impl ─────────────────────────────────────────────────────

impl InventoryStore for SqliteStore {
  type Error = Error;

  // ── Production intake ─────────────────────────────────────────────────────

  async fn record_production(&self, input: NewProduction) -> Result<ProductionEvent> {
    self.transact(move |tx| production::record(tx, input.clone())).await
  }

  async fn update_production(&self, id: Uuid, input: NewProduction) -> Result<ProductionEvent> {
    self.transact(move |tx| production::amend(tx, id, input.clone())).await
  }

  async fn delete_production(&self, id: Uuid) -> Result<()> {
    self.transact(move |tx| production::remove(tx, id)).await
  }

  async fn get_production(&self, id: Uuid) -> Result<Option<ProductionEvent>> {
    self.read(move |tx| tx.get_production(id)).await
  }

  // ── Orders ────────────────────────────────────────────────────────────────

  async fn place_order(&self, input: NewOrder, enforce_stock: bool) -> Result<Order> {
    self
      .transact(move |tx| reservation::place_order(tx, input.clone(), enforce_stock))
      .await
  }

  async fn cancel_order(&self, id: Uuid) -> Result<Order> {
    self.transact(move |tx| reservation::cancel_order(tx, id)).await
  }

  async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
    self.read(move |tx| tx.get_order(id)).await
  }

  async fn check(&self, lines: Vec<NewOrderLine>) -> Result<Availability> {
    self.read(move |tx| validator::check(tx, &lines)).await
  }

  // ── Challans ──────────────────────────────────────────────────────────────

  async fn validate_dispatch(&self, input: NewChallan) -> Result<Availability> {
    self.read(move |tx| dispatch::check_challan(tx, &input)).await
  }

  async fn create_challan(&self, input: NewChallan) -> Result<Challan> {
    self.transact(move |tx| dispatch::create_challan(tx, input.clone())).await
  }

  async fn update_challan(&self, id: Uuid, input: NewChallan) -> Result<Challan> {
    self
      .transact(move |tx| dispatch::update_challan(tx, id, input.clone()))
      .await
  }

  async fn delete_challan(&self, id: Uuid) -> Result<()> {
    self.transact(move |tx| dispatch::delete_challan(tx, id)).await
  }

  async fn get_challan(&self, id: Uuid) -> Result<Option<Challan>> {
    self.read(move |tx| tx.get_challan(id)).await
  }

  // ── Reconciliation ────────────────────────────────────────────────────────

  async fn recompute_all(&self) -> Result<RecomputeReport> {
    self.transact(|tx| reconcile::recompute_all(tx)).await
  }

  async fn resync_pieces(&self) -> Result<usize> {
    self.transact(|tx| reconcile::resync_pieces(tx)).await
  }

  // ── Reads & administration ────────────────────────────────────────────────

  async fn list_ledger(&self, filter: &LedgerFilter) -> Result<Vec<LedgerRecord>> {
    let filter = filter.clone();
    self.read(move |tx| tx.list_ledger(&filter)).await
  }

  async fn list_pieces(&self, filter: &PieceFilter) -> Result<Vec<StockPiece>> {
    let filter = filter.clone();
    self.read(move |tx| tx.list_pieces(&filter)).await
  }

  async fn get_piece(&self, id: Uuid) -> Result<Option<StockPiece>> {
    self.read(move |tx| tx.get_piece(id)).await
  }

  async fn delete_ledger_record(&self, id: Uuid) -> Result<()> {
    self
      .transact(move |tx| {
        if !tx.delete_ledger(id)? {
          return Err(bahi_core::Error::LedgerNotFound(id));
        }
        tracing::warn!(ledger_id = %id, "ledger record deleted; run a recompute to rebuild it");
        Ok(())
      })
      .await
  }
}
