//! `stockroom` — inventory ledger server and maintenance commands.
//!
//! Reads `stockroom.toml` (or the path given with `--config`) layered under
//! `STOCKROOM_*` environment variables, opens the SQLite store and runs one
//! subcommand. Command output is JSON on stdout; logs go to stderr.
//!
//! # Usage
//!
//! ```text
//! stockroom import ./data
//! stockroom record --product "Coca Cola" --quantity 3 --type Entrada
//! stockroom report --categories Bebidas,Snacks
//! stockroom anomalies --archive --sensitivity 0.1
//! stockroom serve --port 8080
//! ```

mod settings;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use settings::Settings;
use stockroom_api::AppState;
use stockroom_core::{
  analytics::{MovementFilter, summarize},
  anomaly::{AnomalySummary, LedgerRow, ScanReport, archive_candidates},
  movement::MovementType,
  product::{ProductId, ProductRef},
  projector::project,
  store::InventoryStore,
  timestamp,
};
use stockroom_store_sqlite::{SqliteStore, interchange::Snapshot};
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "stockroom", author, version, about = "Stockroom inventory ledger")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "stockroom.toml", global = true)]
  config: PathBuf,

  /// SQLite database; overrides `store_path` from the configuration.
  #[arg(long, value_name = "FILE", global = true)]
  store: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the JSON API over HTTP.
  Serve {
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
  },

  /// Load a snapshot directory (inventario.json, historial.json,
  /// anomalias.json) into the store.
  Import { dir: PathBuf },

  /// Write the store out as a snapshot directory.
  Export { dir: PathBuf },

  /// Append one movement to the ledger.
  Record {
    /// Product id or display name.
    #[arg(short, long)]
    product:       ProductRef,
    #[arg(short, long)]
    quantity:      i64,
    /// `Entrada`/`Ingreso` or `Salida`.
    #[arg(short = 't', long = "type")]
    movement_type: MovementType,
    /// `YYYY-MM-DD HH:MM[:SS]`; defaults to now.
    #[arg(long)]
    at:            Option<String>,
  },

  /// KPIs, per-product summaries and ABC ranking.
  Report {
    #[command(flatten)]
    filter: FilterArgs,
  },

  /// Replay the ledger into per-product stock timelines.
  Projection {
    /// Ignore movements after this time.
    #[arg(long)]
    as_of: Option<String>,
  },

  /// Score ledger movements for anomalies.
  Anomalies {
    /// Add anomalous rows to the store's archive.
    #[arg(long)]
    archive:     bool,
    /// Expected anomalous fraction, clamped to 0.01..=0.4.
    #[arg(long)]
    sensitivity: Option<f64>,
    /// Score a ledger JSON file instead of the store.
    #[arg(long, value_name = "FILE")]
    file:        Option<PathBuf>,
  },

  /// Check the ledger against itself and the catalog.
  Reconcile {
    /// Reset drifted catalog stock to the replayed ledger value.
    #[arg(long)]
    repair: bool,
  },
}

#[derive(Args)]
struct FilterArgs {
  #[arg(long, value_delimiter = ',')]
  categories:     Vec<String>,
  #[arg(long, value_delimiter = ',')]
  products:       Vec<i64>,
  #[arg(long, value_delimiter = ',')]
  movement_types: Vec<MovementType>,
}

impl From<FilterArgs> for MovementFilter {
  fn from(args: FilterArgs) -> Self {
    Self {
      categories:     args.categories.into_iter().collect(),
      product_ids:    args.products.into_iter().map(ProductId).collect(),
      movement_types: args.movement_types.into_iter().collect(),
    }
  }
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let mut settings = Settings::load(&cli.config)?;
  if let Some(store) = cli.store {
    settings.store_path = store;
  }

  let store = SqliteStore::open(&settings.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", settings.store_path))?;

  match cli.command {
    Command::Serve { host, port } => {
      if let Some(host) = host {
        settings.host = host;
      }
      if let Some(port) = port {
        settings.port = port;
      }
      serve(store, &settings).await
    }

    Command::Import { dir } => {
      let snapshot = Snapshot::read_dir(&dir)
        .with_context(|| format!("failed to read snapshot from {}", dir.display()))?;
      let summary = store.import(snapshot).await.context("import failed")?;
      print_json(&summary)
    }

    Command::Export { dir } => {
      let snapshot = store.export().await.context("export failed")?;
      snapshot
        .write_dir(&dir)
        .with_context(|| format!("failed to write snapshot to {}", dir.display()))?;
      tracing::info!(
        products = snapshot.products.len(),
        movements = snapshot.movements.len(),
        anomalies = snapshot.anomalies.len(),
        dir = %dir.display(),
        "snapshot written"
      );
      Ok(())
    }

    Command::Record { product, quantity, movement_type, at } => {
      let at = at.as_deref().map(timestamp::parse).transpose()?;
      let movement = store
        .append_movement(product.clone(), quantity, movement_type, at)
        .await
        .with_context(|| format!("could not record movement for {product}"))?;
      print_json(&movement)
    }

    Command::Report { filter } => {
      let movements = store.list_movements().await?;
      let projection = project(&movements, None);
      print_json(&summarize(&projection, &filter.into()))
    }

    Command::Projection { as_of } => {
      let as_of = as_of.as_deref().map(timestamp::parse).transpose()?;
      let movements = store.list_movements().await?;
      print_json(&project(&movements, as_of))
    }

    Command::Anomalies { archive, sensitivity, file } => {
      let report = scan(&store, &settings, archive, sensitivity, file).await?;
      print_json(&report)
    }

    Command::Reconcile { repair } => {
      let report = store.reconcile(repair).await.context("reconciliation failed")?;
      if !report.writable {
        tracing::warn!("ledger divergences remain; appends stay blocked");
      }
      print_json(&report)
    }
  }
}

// ─── Commands ────────────────────────────────────────────────────────────────

async fn serve(store: SqliteStore, settings: &Settings) -> anyhow::Result<()> {
  let state = Arc::new(AppState::new(Arc::new(store), settings.anomaly));
  let app = stockroom_api::api_router(state);
  let address = settings.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

async fn scan(
  store: &SqliteStore,
  settings: &Settings,
  archive: bool,
  sensitivity: Option<f64>,
  file: Option<PathBuf>,
) -> anyhow::Result<ScanReport> {
  let detector = settings.anomaly.with_sensitivity(sensitivity).detector();

  let rows = match file {
    Some(path) => {
      let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
      let rows: Vec<LedgerRow> = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse ledger rows in {}", path.display()))?;
      tokio::task::spawn_blocking(move || detector.detect(&rows)).await??
    }
    None => {
      let movements = store.list_movements().await?;
      tokio::task::spawn_blocking(move || detector.detect_movements(&movements)).await??
    }
  };

  let archived = if archive {
    store
      .archive_anomalies(archive_candidates(&rows))
      .await
      .context("failed to archive anomalies")?
  } else {
    0
  };

  Ok(ScanReport { summary: AnomalySummary::of(&rows), archived, rows })
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
