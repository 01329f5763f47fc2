//! `macrofeed` binary.
//!
//! Reads `config.toml` (or the path given with `--config`) plus `MACROFEED_*`
//! environment overrides, opens the SQLite store and runs one command:
//!
//! ```text
//! macrofeed init                      load the catalog into the store
//! macrofeed update --update-type smart
//! macrofeed server                    REST API with the background scheduler
//! macrofeed scheduler                 scheduler only, until Ctrl-C
//! macrofeed status | fields | coverage
//! macrofeed returns 885001.WI         rolling 3-year annualised return
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use macrofeed_api::ApiState;
use macrofeed_client::HttpMarketDataClient;
use macrofeed_core::{
  catalog::Catalog,
  client::MarketDataClient,
  indicator::Indicator,
  returns::{ReturnMethod, rolling_return},
  store::{IndicatorStore, SeriesQuery},
};
use macrofeed_server::{Settings, report};
use macrofeed_store_sqlite::SqliteStore;
use macrofeed_updater::{Scheduler, UpdateKind, Updater};
use tokio::net::TcpListener;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

type FeedUpdater = Updater<SqliteStore, HttpMarketDataClient>;

#[derive(Parser)]
#[command(author, version, about = "Financial indicator ingestion and API")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Log filter, e.g. `debug` or `macrofeed_updater=debug`. Overrides
  /// `RUST_LOG`.
  #[arg(long)]
  log_level: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Load the indicator catalog into the store.
  Init,
  /// Run one update pass.
  Update {
    /// smart, incremental, full or retry.
    #[arg(long, default_value = "smart")]
    update_type: UpdateKind,
  },
  /// Serve the REST API and run the scheduler in the background.
  Server,
  /// Run the scheduler in the foreground until Ctrl-C.
  Scheduler,
  /// Gateway, store and update-log status.
  Status,
  /// Field usage across indicators.
  Fields,
  /// Stored date range per indicator.
  Coverage,
  /// Rolling 3-year annualised return of one stored series.
  Returns {
    code:  String,
    /// Field to read; defaults to `close`, else the indicator's first field.
    #[arg(long)]
    field: Option<String>,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();

  // Initialise tracing.
  let filter = match &cli.log_level {
    Some(level) => EnvFilter::try_new(level).context("invalid --log-level")?,
    None => EnvFilter::builder()
      .with_default_directive(LevelFilter::INFO.into())
      .from_env_lossy(),
  };
  tracing_subscriber::fmt().with_env_filter(filter).init();

  // Load configuration.
  let settings = Settings::load(&cli.config)
    .context("failed to read configuration")?
    .expand_paths();

  let updater = open_updater(&settings).await?;

  match cli.command {
    Command::Init => {
      let loaded = load_catalog(updater.store(), &settings).await?;
      println!("loaded {loaded} indicators");
      let summary = updater.store().summary().await?;
      print!("{}", report::summary(&summary));
    }
    Command::Update { update_type } => {
      let result = updater.run(update_type).await?;
      println!("{}", report::batch(update_type, &result));
    }
    Command::Server => serve(updater, &settings).await?,
    Command::Scheduler => {
      let scheduler = Scheduler::new(updater, &settings.scheduler);
      scheduler.start();
      tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
      scheduler.stop().await;
    }
    Command::Status => {
      let store = updater.store();
      let connected = updater.client().check_connection().await;
      let summary = store.summary().await?;
      let stats = store.update_stats(Utc::now() - Duration::hours(24)).await?;
      let recent = store.recent_attempts(10).await?;
      print!("{}", report::status(connected, &summary, &stats, &recent));
    }
    Command::Fields => {
      let usage = updater.store().field_usage().await?;
      print!("{}", report::field_usage(&usage));
    }
    Command::Coverage => {
      let rows = updater.store().coverage().await?;
      print!("{}", report::coverage(&rows));
    }
    Command::Returns { code, field } => {
      let store = updater.store();
      let indicator = store
        .get_indicator(&code)
        .await?
        .with_context(|| format!("unknown indicator {code}"))?;
      let field = match field {
        Some(field) => field,
        None => return_field(&indicator)
          .with_context(|| format!("{code} has no fields"))?
          .to_owned(),
      };

      let query = SeriesQuery { field: Some(field.clone()), ..SeriesQuery::code(&code) };
      let observations = store.observations(&query).await?;
      let month_end = rolling_return(&observations, ReturnMethod::MonthEnd);
      let daily = rolling_return(&observations, ReturnMethod::Daily);
      print!("{}", report::returns(&code, &field, month_end.as_ref(), daily.as_ref()));
    }
  }

  Ok(())
}

fn return_field(indicator: &Indicator) -> Option<&str> {
  indicator
    .field_names()
    .find(|f| *f == "close")
    .or_else(|| indicator.field_names().next())
}

async fn open_updater(settings: &Settings) -> anyhow::Result<Arc<FeedUpdater>> {
  if let Some(parent) = settings.store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }

  let store = SqliteStore::open(&settings.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", settings.store_path))?;
  let client = HttpMarketDataClient::new(settings.market_data.client_config())
    .context("failed to build market data client")?;

  Ok(Arc::new(Updater::new(
    Arc::new(store),
    Arc::new(client),
    settings.updater.clone(),
  )))
}

/// Register every catalog entry. Returns the number of indicators loaded.
async fn load_catalog(store: &SqliteStore, settings: &Settings) -> anyhow::Result<usize> {
  let catalog = Catalog::load(&settings.catalog_path)
    .with_context(|| format!("failed to read catalog {:?}", settings.catalog_path))?;

  for entry in catalog.entries() {
    store
      .register_indicator(entry)
      .await
      .with_context(|| format!("failed to register {}", entry.code))?;
  }
  info!(indicators = catalog.len(), path = ?settings.catalog_path, "catalog loaded");
  Ok(catalog.len())
}

async fn serve(updater: Arc<FeedUpdater>, settings: &Settings) -> anyhow::Result<()> {
  // Refresh the catalog on startup when a catalog file is present.
  if settings.catalog_path.exists() {
    load_catalog(updater.store(), settings).await?;
  } else {
    warn!(path = ?settings.catalog_path, "catalog not found; serving existing indicators");
  }

  let scheduler = Arc::new(Scheduler::new(Arc::clone(&updater), &settings.scheduler));
  scheduler.start();

  let state = ApiState::new(updater).with_scheduler(Arc::clone(&scheduler));
  let app = macrofeed_server::app(state);
  let address = settings.server.address();

  info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      info!("shutting down");
    })
    .await
    .context("server error")?;

  scheduler.stop().await;
  Ok(())
}
