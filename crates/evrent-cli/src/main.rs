//! `evrent`: command-line access to the EV rental backend.
//!
//! # Usage
//!
//! ```
//! evrent login alice@example.com --password secret
//! evrent depots
//! evrent availability <model-id> --province "Hà Nội"
//! evrent --config ~/.config/evrent/evrent.toml model-stats
//! ```
//!
//! The session survives between invocations in a small SQLite file.

mod commands;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use evrent_client::{Client, ClientConfig};
use evrent_core::session::SessionStore;
use evrent_store_sqlite::SqliteTokenStorage;
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "evrent", author, version, about = "EV rental backend client")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "evrent.toml")]
  config: PathBuf,

  /// Backend origin; overrides the configuration file.
  #[arg(long, env = "EVRENT_URL")]
  url: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Sign in and remember the session.
  Login {
    email:    String,
    #[arg(long, env = "EVRENT_PASSWORD")]
    password: String,
  },
  /// Sign out and forget the session.
  Logout,
  /// Show the signed-in identity.
  Whoami,
  /// List depots.
  Depots {
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = 20)]
    size: u32,
  },
  /// List every vehicle model.
  Models,
  /// Fleet counts per model.
  ModelStats,
  /// Depots with available cars of a model.
  Availability {
    model_id: Uuid,
    /// Case-insensitive province substring.
    #[arg(long)]
    province: Option<String>,
  },
  /// Number of orders per user.
  OrderTotals { user_ids: Vec<Uuid> },
  /// Current membership per user.
  Memberships { user_ids: Vec<Uuid> },
  /// A depot's demand forecast with model names.
  Forecast { depot_id: Uuid },
  /// The most recent paper-trail record of an order.
  Latest { kind: RecordKind, order_id: Uuid },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum RecordKind {
  Handover,
  Return,
  Settlement,
}

// ─── Config file ─────────────────────────────────────────────────────────────

/// Everything the binary reads from `evrent.toml` and `EVRENT_*`.
#[derive(Deserialize, Debug)]
struct Settings {
  #[serde(flatten)]
  client:     ClientConfig,
  /// Where the session is kept between runs.
  #[serde(default = "default_session_db")]
  session_db: PathBuf,
}

fn default_session_db() -> PathBuf { PathBuf::from("evrent-session.db") }

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config.clone()).required(false))
    .add_source(config::Environment::with_prefix("EVRENT"))
    .build()
    .context("failed to read configuration")?;

  let mut settings: Settings = settings
    .try_deserialize()
    .context("failed to deserialise configuration")?;
  if let Some(url) = &cli.url {
    settings.client.base_url = url.clone();
  }
  Ok(settings)
}

// ─── Entry point ─────────────────────────────────────────────────────────────

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
  let settings = load_settings(&cli)?;

  let storage = SqliteTokenStorage::open(&settings.session_db)
    .with_context(|| format!("failed to open session store at {:?}", settings.session_db))?;
  let session = Arc::new(SessionStore::new(Arc::new(storage)));
  let client = Client::new(settings.client, session).context("failed to build client")?;

  if let Err(e) = client.restore_session() {
    tracing::warn!(error = %e, "stored session discarded");
  }

  match cli.command {
    Command::Login { email, password } => commands::login(&client, email, password).await,
    Command::Logout => commands::logout(&client).await,
    Command::Whoami => commands::whoami(&client),
    Command::Depots { page, size } => commands::depots(&client, page, size).await,
    Command::Models => commands::models(&client).await,
    Command::ModelStats => commands::model_stats(&client).await,
    Command::Availability { model_id, province } => {
      commands::availability(&client, model_id, province.as_deref()).await
    }
    Command::OrderTotals { user_ids } => commands::order_totals(&client, &user_ids).await,
    Command::Memberships { user_ids } => commands::memberships(&client, &user_ids).await,
    Command::Forecast { depot_id } => commands::forecast(&client, depot_id).await,
    Command::Latest { kind, order_id } => commands::latest(&client, kind, order_id).await,
  }
}
