//! HTTP server wiring for Bahi.
//!
//! Mounts the [`bahi_api`] router under `/api` behind a request trace layer.
//! The binary in `main.rs` owns argument parsing, configuration loading and
//! the listener.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use axum::{Router, routing::get};
use bahi_core::store::InventoryStore;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` with
/// `BAHI_*` environment overrides.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:               String,
  pub port:               u16,
  pub store_path:         PathBuf,
  /// Re-runs of a transaction that lost a lock race.
  #[serde(default = "default_busy_retries")]
  pub busy_retries:       u32,
  /// Run one reconciliation pass before accepting requests.
  #[serde(default)]
  pub reconcile_on_start: bool,
}

fn default_busy_retries() -> u32 { bahi_store_sqlite::DEFAULT_BUSY_RETRIES }

impl ServerConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full application router for `store`.
pub fn app<S>(store: Arc<S>) -> Router
where
  S: InventoryStore + 'static,
{
  Router::new()
    .route("/health", get(|| async { "ok" }))
    .nest("/api", bahi_api::api_router(store))
    .layer(TraceLayer::new_for_http())
}
