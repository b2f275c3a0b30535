mod api;
mod app;
mod cache;
mod commands;
mod config;
mod event;
mod fetch;
mod logging;
mod net;
mod sync;
mod ui;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::api::ApiClient;
use crate::cache::{IdGenerator, SqliteStorage, StoreHandle};
use crate::config::Config;
use crate::net::Connectivity;
use crate::sync::{Notifier, SyncContext};

#[derive(Parser, Debug)]
#[command(name = "edudesk")]
#[command(about = "An offline-first terminal client for roles and permissions")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./edudesk.yaml, then $XDG_CONFIG_HOME/edudesk/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Start in "work offline" mode
  #[arg(long)]
  offline: bool,

  /// Path to the local cache database
  #[arg(long)]
  db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.log)?;

  let ids = Arc::new(IdGenerator::new());

  let store = if config.cache.enabled {
    let path = match args.db.or_else(|| config.cache.path.clone()) {
      Some(path) => path,
      None => SqliteStorage::default_path()?,
    };
    info!(path = %path.display(), "using local cache");
    StoreHandle::sqlite(path, Arc::clone(&ids))
  } else {
    info!("local cache disabled");
    StoreHandle::unavailable(Arc::clone(&ids))
  };

  let client = ApiClient::new(&config.api, Config::api_token(), ids)?;

  let connectivity = Connectivity::new(true);
  if args.offline {
    connectivity.set_forced_offline(true);
  }

  let (notifier, events) = Notifier::channel();
  let ctx = SyncContext::new(client, store, connectivity, notifier, &config.revalidate);

  let mut app = app::App::new(
    ctx,
    config.display_title(),
    Duration::from_secs(config.connectivity.probe_interval_secs),
  );
  app.run(events).await?;

  Ok(())
}
