//! bahi-server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens an
//! in-process SQLite store, and serves the JSON API over HTTP.
//!
//! # Batch reconciliation
//!
//! ```
//! cargo run -p bahi-server -- --reconcile
//! ```
//!
//! recomputes every ledger record from the event history, prints the report
//! as JSON and exits without serving.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use bahi_core::store::InventoryStore;
use bahi_server::{ServerConfig, expand_tilde};
use bahi_store_sqlite::SqliteStore;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Bahi stock ledger server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Run one reconciliation pass, print the report and exit.
  #[arg(long)]
  reconcile: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("BAHI"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  if let Some(parent) = store_path.parent() {
    tokio::fs::create_dir_all(parent)
      .await
      .with_context(|| format!("failed to create {parent:?}"))?;
  }

  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?
    .with_retries(server_cfg.busy_retries);

  if cli.reconcile || server_cfg.reconcile_on_start {
    let report = store.recompute_all().await.context("reconciliation failed")?;
    tracing::info!(
      examined = report.records_examined,
      created = report.records_created,
      corrected = report.corrections.len(),
      "reconciliation finished"
    );
    if cli.reconcile {
      println!("{}", serde_json::to_string_pretty(&report)?);
      return Ok(());
    }
  }

  let app = bahi_server::app(Arc::new(store));
  let address = server_cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  Ok(())
}

/// Resolves on Ctrl+C; in-flight transactions finish first.
async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::warn!(error = %e, "failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  tracing::info!("shutting down");
}
