//! File logging. The terminal belongs to the UI, so nothing goes to stderr.

use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

const DEFAULT_FILTER: &str = "edudesk=info";
const LOG_FILE: &str = "edudesk.log";

fn log_dir(config: &LogConfig) -> Option<PathBuf> {
  config.dir.clone().or_else(|| {
    dirs::state_dir()
      .or_else(dirs::data_dir)
      .map(|d| d.join("edudesk"))
  })
}

fn filter(config: &LogConfig) -> EnvFilter {
  EnvFilter::try_from_default_env().unwrap_or_else(|_| {
    EnvFilter::new(config.filter.as_deref().unwrap_or(DEFAULT_FILTER))
  })
}

/// Install the global subscriber. Keep the guard alive until exit so buffered
/// lines are flushed.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
  let Some(dir) = log_dir(config) else {
    return Ok(None);
  };
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::never(&dir, LOG_FILE);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::registry()
    .with(filter(config))
    .with(
      tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false),
    )
    .try_init()
    .map_err(|e| eyre!("Failed to install logger: {}", e))?;

  tracing::info!(
    version = env!("CARGO_PKG_VERSION"),
    dir = %dir.display(),
    "logging initialized"
  );
  Ok(Some(guard))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_configured_dir_wins() {
    let config = LogConfig {
      dir: Some(PathBuf::from("/tmp/edudesk-logs")),
      filter: None,
    };
    assert_eq!(log_dir(&config), Some(PathBuf::from("/tmp/edudesk-logs")));
  }
}
