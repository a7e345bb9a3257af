//! Async HTTP client wrapping the bahi JSON API.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use bahi_core::{
  challan::{Challan, NewChallan},
  ledger::{LedgerFilter, LedgerView},
  order::{NewOrder, NewOrderLine, Order},
  piece::{PieceFilter, StockPiece},
  production::{NewProduction, ProductionEvent},
  reconcile::RecomputeReport,
  validator::Availability,
};
use reqwest::{Client, Response};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use uuid::Uuid;

/// Connection settings for the bahi API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url: String,
}

/// Async HTTP client for the bahi JSON REST API.
///
/// Cheap to clone — the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  config: ApiConfig,
}

/// Body of every non-2xx response.
#[derive(Deserialize)]
struct ErrorBody {
  error:     String,
  #[serde(default)]
  shortages: Vec<bahi_core::validator::Shortage>,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/api{}", self.config.base_url.trim_end_matches('/'), path)
  }

  /// Decode a success body, or turn the server's `{"error": ..}` into an
  /// `anyhow` error that names the request.
  async fn decode<T: DeserializeOwned>(what: &str, resp: Response) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
      return resp.json().await.with_context(|| format!("deserialising {what}"));
    }
    match resp.json::<ErrorBody>().await {
      Ok(body) if !body.shortages.is_empty() => Err(anyhow!(
        "{what} → {status}: {}\n{}",
        body.error,
        crate::render::shortages(&body.shortages)
      )),
      Ok(body) => Err(anyhow!("{what} → {status}: {}", body.error)),
      Err(_) => Err(anyhow!("{what} → {status}")),
    }
  }

  async fn expect_empty(what: &str, resp: Response) -> Result<()> {
    let status = resp.status();
    if status.is_success() {
      return Ok(());
    }
    let body = resp.json::<ErrorBody>().await.map(|b| b.error).unwrap_or_default();
    Err(anyhow!("{what} → {status}: {body}"))
  }

  // ── Ledger & pieces ───────────────────────────────────────────────────────

  /// `GET /api/ledger`
  pub async fn list_ledger(&self, filter: &LedgerFilter) -> Result<Vec<LedgerView>> {
    let resp = self
      .client
      .get(self.url("/ledger"))
      .query(filter)
      .send()
      .await
      .context("GET /ledger failed")?;
    Self::decode("GET /ledger", resp).await
  }

  /// `GET /api/pieces`
  pub async fn list_pieces(&self, filter: &PieceFilter) -> Result<Vec<StockPiece>> {
    let resp = self
      .client
      .get(self.url("/pieces"))
      .query(filter)
      .send()
      .await
      .context("GET /pieces failed")?;
    Self::decode("GET /pieces", resp).await
  }

  /// `GET /api/pieces/:id`
  pub async fn get_piece(&self, id: Uuid) -> Result<StockPiece> {
    let resp = self
      .client
      .get(self.url(&format!("/pieces/{id}")))
      .send()
      .await
      .context("GET /pieces/:id failed")?;
    Self::decode("GET /pieces/:id", resp).await
  }

  // ── Productions ───────────────────────────────────────────────────────────

  /// `POST /api/productions`
  pub async fn record_production(&self, input: &NewProduction) -> Result<ProductionEvent> {
    let resp = self
      .client
      .post(self.url("/productions"))
      .json(input)
      .send()
      .await
      .context("POST /productions failed")?;
    Self::decode("POST /productions", resp).await
  }

  /// `DELETE /api/productions/:id`
  pub async fn delete_production(&self, id: Uuid) -> Result<()> {
    let resp = self
      .client
      .delete(self.url(&format!("/productions/{id}")))
      .send()
      .await
      .context("DELETE /productions/:id failed")?;
    Self::expect_empty("DELETE /productions/:id", resp).await
  }

  // ── Orders ────────────────────────────────────────────────────────────────

  /// `POST /api/orders[?enforce_stock=true]`
  pub async fn place_order(&self, input: &NewOrder, enforce_stock: bool) -> Result<Order> {
    let resp = self
      .client
      .post(self.url("/orders"))
      .query(&[("enforce_stock", enforce_stock)])
      .json(input)
      .send()
      .await
      .context("POST /orders failed")?;
    Self::decode("POST /orders", resp).await
  }

  /// `POST /api/orders/check`
  pub async fn check(&self, lines: &[NewOrderLine]) -> Result<Availability> {
    let resp = self
      .client
      .post(self.url("/orders/check"))
      .json(&json!({ "lines": lines }))
      .send()
      .await
      .context("POST /orders/check failed")?;
    Self::decode("POST /orders/check", resp).await
  }

  /// `GET /api/orders/:id`
  pub async fn get_order(&self, id: Uuid) -> Result<Order> {
    let resp = self
      .client
      .get(self.url(&format!("/orders/{id}")))
      .send()
      .await
      .context("GET /orders/:id failed")?;
    Self::decode("GET /orders/:id", resp).await
  }

  /// `POST /api/orders/:id/cancel`
  pub async fn cancel_order(&self, id: Uuid) -> Result<Order> {
    let resp = self
      .client
      .post(self.url(&format!("/orders/{id}/cancel")))
      .send()
      .await
      .context("POST /orders/:id/cancel failed")?;
    Self::decode("POST /orders/:id/cancel", resp).await
  }

  // ── Challans ──────────────────────────────────────────────────────────────

  /// `POST /api/challans/validate`
  pub async fn validate_dispatch(&self, input: &NewChallan) -> Result<Availability> {
    let resp = self
      .client
      .post(self.url("/challans/validate"))
      .json(input)
      .send()
      .await
      .context("POST /challans/validate failed")?;
    Self::decode("POST /challans/validate", resp).await
  }

  /// `POST /api/challans`
  pub async fn create_challan(&self, input: &NewChallan) -> Result<Challan> {
    let resp = self
      .client
      .post(self.url("/challans"))
      .json(input)
      .send()
      .await
      .context("POST /challans failed")?;
    Self::decode("POST /challans", resp).await
  }

  /// `DELETE /api/challans/:id`
  pub async fn delete_challan(&self, id: Uuid) -> Result<()> {
    let resp = self
      .client
      .delete(self.url(&format!("/challans/{id}")))
      .send()
      .await
      .context("DELETE /challans/:id failed")?;
    Self::expect_empty("DELETE /challans/:id", resp).await
  }

  // ── Reconciliation ────────────────────────────────────────────────────────

  /// `POST /api/reconcile`
  pub async fn recompute(&self) -> Result<RecomputeReport> {
    let resp = self
      .client
      .post(self.url("/reconcile"))
      .send()
      .await
      .context("POST /reconcile failed")?;
    Self::decode("POST /reconcile", resp).await
  }

  /// `POST /api/reconcile/pieces`; returns how many pieces changed status.
  pub async fn resync_pieces(&self) -> Result<usize> {
    #[derive(Deserialize)]
    struct Resync {
      pieces_resynced: usize,
    }
    let resp = self
      .client
      .post(self.url("/reconcile/pieces"))
      .send()
      .await
      .context("POST /reconcile/pieces failed")?;
    let body: Resync = Self::decode("POST /reconcile/pieces", resp).await?;
    Ok(body.pieces_resynced)
  }
}
