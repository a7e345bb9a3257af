//! `bahi` — command-line client for the Bahi stock ledger server.
//!
//! # Usage
//!
//! ```
//! bahi ledger --fabric 67e55044-10b1-426f-9247-bb680e5fe0c8
//! bahi order place order.json --enforce-stock
//! bahi challan create challan.json
//! bahi --url http://ledger.local:7410 recompute
//! ```
//!
//! Write operations read their body from a JSON file (`-` for stdin) in the
//! same shape the HTTP API accepts.

mod client;
mod render;

use std::{
  io::Read as _,
  path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use bahi_core::{
  ledger::{LedgerFilter, StockKind},
  order::NewOrderLine,
  piece::{PieceFilter, PieceStatus},
};
use clap::{Parser, Subcommand, ValueEnum};
use client::{ApiClient, ApiConfig};
use rust_decimal::Decimal;
use serde::{Deserialize, de::DeserializeOwned};
use uuid::Uuid;

const DEFAULT_URL: &str = "http://localhost:7410";

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "bahi", about = "Command-line client for the Bahi stock ledger")]
struct Args {
  /// Path to a TOML config file (url).
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Base URL of the bahi server (default: http://localhost:7410).
  #[arg(long, env = "BAHI_URL")]
  url: Option<String>,

  /// Print raw JSON instead of tables.
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List ledger records with their availability.
  Ledger {
    #[arg(long)]
    fabric:   Option<Uuid>,
    #[arg(long)]
    design:   Option<Uuid>,
    #[arg(long)]
    factory:  Option<Uuid>,
    #[arg(long)]
    matching: Option<Uuid>,
    #[arg(long, value_enum)]
    kind:     Option<KindArg>,
    #[arg(long)]
    cut:      Option<Decimal>,
  },
  /// List stock pieces (takas), or show one with `--id`.
  Pieces {
    #[arg(long)]
    id:      Option<Uuid>,
    #[arg(long)]
    fabric:  Option<Uuid>,
    #[arg(long, value_enum)]
    status:  Option<StatusArg>,
    #[arg(long)]
    label:   Option<String>,
    #[arg(long)]
    challan: Option<Uuid>,
  },
  /// Record or remove a production slip.
  #[command(subcommand)]
  Production(ProductionCommand),
  /// Place, inspect, check or cancel orders.
  #[command(subcommand)]
  Order(OrderCommand),
  /// Commit, validate or revert challans.
  #[command(subcommand)]
  Challan(ChallanCommand),
  /// Recompute every ledger record from the event history.
  Recompute,
  /// Reset piece statuses from challan assignment.
  ResyncPieces,
}

#[derive(Subcommand, Debug)]
enum ProductionCommand {
  Record { file: PathBuf },
  Delete { id: Uuid },
}

#[derive(Subcommand, Debug)]
enum OrderCommand {
  Place {
    file:          PathBuf,
    /// Refuse the order when stock cannot cover it.
    #[arg(long)]
    enforce_stock: bool,
  },
  /// Check order lines (a JSON array, or an order with `lines`) against stock.
  Check { file: PathBuf },
  Show { id: Uuid },
  Cancel { id: Uuid },
}

#[derive(Subcommand, Debug)]
enum ChallanCommand {
  Create {
    file:    PathBuf,
    /// Validate only; nothing is written.
    #[arg(long)]
    dry_run: bool,
  },
  Delete { id: Uuid },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
  Taka,
  Saree,
}

impl From<KindArg> for StockKind {
  fn from(k: KindArg) -> Self {
    match k {
      KindArg::Taka => Self::Taka,
      KindArg::Saree => Self::Saree,
    }
  }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StatusArg {
  Available,
  Sold,
}

impl From<StatusArg> for PieceStatus {
  fn from(s: StatusArg) -> Self {
    match s {
      StatusArg::Available => Self::Available,
      StatusArg::Sold => Self::Sold,
    }
  }
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default)]
struct ConfigFile {
  #[serde(default)]
  url: String,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  // Load config file if provided.
  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  // CLI flags override config file, which overrides defaults.
  let api_config = ApiConfig {
    base_url: args
      .url
      .or_else(|| (!file_cfg.url.is_empty()).then(|| file_cfg.url.clone()))
      .unwrap_or_else(|| DEFAULT_URL.to_string()),
  };

  let client = ApiClient::new(api_config)?;
  run(&client, args.command, args.json).await
}

/// Print `value` as pretty JSON, or through `table` otherwise.
fn emit<T: serde::Serialize>(json: bool, value: &T, table: impl FnOnce(&T) -> String) -> Result<()> {
  if json {
    println!("{}", serde_json::to_string_pretty(value)?);
  } else {
    print!("{}", table(value));
  }
  Ok(())
}

async fn run(client: &ApiClient, command: Command, json: bool) -> Result<()> {
  match command {
    Command::Ledger { fabric, design, factory, matching, kind, cut } => {
      let filter = LedgerFilter {
        fabric_id:   fabric,
        design_id:   design,
        factory_id:  factory,
        matching_id: matching,
        kind:        kind.map(Into::into),
        cut,
      };
      let rows = client.list_ledger(&filter).await?;
      emit(json, &rows, |r| render::ledger(r))
    }

    Command::Pieces { id: Some(id), .. } => {
      let piece = client.get_piece(id).await?;
      emit(json, &piece, |p| render::pieces(std::slice::from_ref(p)))
    }
    Command::Pieces { id: None, fabric, status, label, challan } => {
      let filter = PieceFilter {
        fabric_id: fabric,
        status: status.map(Into::into),
        label,
        challan_id: challan,
        ..PieceFilter::default()
      };
      let rows = client.list_pieces(&filter).await?;
      emit(json, &rows, |r| render::pieces(r))
    }

    Command::Production(ProductionCommand::Record { file }) => {
      let event = client.record_production(&read_json(&file)?).await?;
      emit(json, &event, |e| format!("recorded production {}\n", e.production_id))
    }
    Command::Production(ProductionCommand::Delete { id }) => {
      client.delete_production(id).await?;
      println!("deleted production {id}");
      Ok(())
    }

    Command::Order(OrderCommand::Place { file, enforce_stock }) => {
      let order = client.place_order(&read_json(&file)?, enforce_stock).await?;
      emit(json, &order, render::order)
    }
    Command::Order(OrderCommand::Check { file }) => {
      let lines = read_lines(&file)?;
      let availability = client.check(&lines).await?;
      emit(json, &availability, render::availability)
    }
    Command::Order(OrderCommand::Show { id }) => {
      let order = client.get_order(id).await?;
      emit(json, &order, render::order)
    }
    Command::Order(OrderCommand::Cancel { id }) => {
      let order = client.cancel_order(id).await?;
      emit(json, &order, render::order)
    }

    Command::Challan(ChallanCommand::Create { file, dry_run: true }) => {
      let availability = client.validate_dispatch(&read_json(&file)?).await?;
      emit(json, &availability, render::availability)
    }
    Command::Challan(ChallanCommand::Create { file, dry_run: false }) => {
      let challan = client.create_challan(&read_json(&file)?).await?;
      emit(json, &challan, |c| {
        let length: Decimal = c.lines.iter().map(|l| l.dispatched_length()).sum();
        let pieces: i64 = c.lines.iter().map(|l| l.dispatched_pieces()).sum();
        format!("committed challan {} ({}): {length} m, {pieces} pcs\n", c.challan_no, c.challan_id)
      })
    }
    Command::Challan(ChallanCommand::Delete { id }) => {
      client.delete_challan(id).await?;
      println!("reverted challan {id}");
      Ok(())
    }

    Command::Recompute => {
      let report = client.recompute().await?;
      emit(json, &report, render::report)
    }
    Command::ResyncPieces => {
      let n = client.resync_pieces().await?;
      println!("resynced {n} piece(s)");
      Ok(())
    }
  }
}

// ─── Input files ──────────────────────────────────────────────────────────────

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
  let raw = if path == Path::new("-") {
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
    buf
  } else {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
  };
  serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

/// Either a bare array of lines or anything with a `lines` array.
fn read_lines(path: &Path) -> Result<Vec<NewOrderLine>> {
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Lines {
    Bare(Vec<NewOrderLine>),
    Wrapped { lines: Vec<NewOrderLine> },
  }
  Ok(match read_json::<Lines>(path)? {
    Lines::Bare(lines) | Lines::Wrapped { lines } => lines,
  })
}
