use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::fetch::RevalidatePolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  /// Custom title for header (defaults to the API host if not set)
  pub title: Option<String>,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub connectivity: ConnectivityConfig,
  #[serde(default)]
  pub revalidate: RevalidateConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
  /// e.g. https://admin.example.edu/api/
  pub base_url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  /// Path probed for reachability, relative to `base_url`
  #[serde(default)]
  pub probe_path: String,
}

fn default_timeout_secs() -> u64 {
  15
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Disabling the cache makes every local read come back empty
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Database file (default: $XDG_DATA_HOME/edudesk/cache.db)
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
    }
  }
}

fn default_true() -> bool {
  true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectivityConfig {
  /// Seconds between reachability probes; 0 disables probing
  #[serde(default = "default_probe_interval_secs")]
  pub probe_interval_secs: u64,
}

impl Default for ConnectivityConfig {
  fn default() -> Self {
    Self {
      probe_interval_secs: default_probe_interval_secs(),
    }
  }
}

fn default_probe_interval_secs() -> u64 {
  10
}

/// Per-family revalidation. A section replaces the whole policy.
#[derive(Debug, Clone, Deserialize)]
pub struct RevalidateConfig {
  #[serde(default = "RevalidatePolicy::session")]
  pub session: RevalidatePolicy,
  #[serde(default = "RevalidatePolicy::manual")]
  pub role_permissions: RevalidatePolicy,
  #[serde(default = "RevalidatePolicy::manual")]
  pub permissions: RevalidatePolicy,
}

impl Default for RevalidateConfig {
  fn default() -> Self {
    Self {
      session: RevalidatePolicy::session(),
      role_permissions: RevalidatePolicy::manual(),
      permissions: RevalidatePolicy::manual(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
  /// Log directory (default: $XDG_STATE_HOME/edudesk or the data dir)
  pub dir: Option<PathBuf>,
  /// Filter directives, overridden by RUST_LOG
  pub filter: Option<String>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./edudesk.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/edudesk/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/edudesk/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("edudesk.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("edudesk").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    if config.api.base_url.trim().is_empty() {
      return Err(eyre!("api.base_url must not be empty"));
    }
    Ok(config)
  }

  /// Bearer token from the environment, if one is set.
  ///
  /// Without it the client starts signed out and asks for credentials.
  pub fn api_token() -> Option<String> {
    std::env::var("EDUDESK_API_TOKEN")
      .ok()
      .filter(|t| !t.trim().is_empty())
  }

  /// Header title: the configured one, else the API host.
  pub fn display_title(&self) -> String {
    if let Some(title) = &self.title {
      return title.clone();
    }
    url::Url::parse(&self.api.base_url)
      .ok()
      .and_then(|u| u.host_str().map(str::to_string))
      .unwrap_or_else(|| "edudesk".to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::parse("api:\n  base_url: https://admin.example.edu/api\n").unwrap();

    assert_eq!(config.api.timeout_secs, 15);
    assert!(config.cache.enabled);
    assert_eq!(config.connectivity.probe_interval_secs, 10);
    assert_eq!(config.revalidate.session, RevalidatePolicy::session());
    assert_eq!(config.revalidate.role_permissions, RevalidatePolicy::manual());
    assert_eq!(config.display_title(), "admin.example.edu");
  }

  #[test]
  fn test_revalidate_section_overrides_family() {
    let yaml = r#"
api:
  base_url: https://admin.example.edu/api
title: Registry
cache:
  enabled: false
revalidate:
  role_permissions:
    on_reconnect: true
    error_retry_count: 2
"#;
    let config = Config::parse(yaml).unwrap();

    assert!(!config.cache.enabled);
    assert!(config.revalidate.role_permissions.on_reconnect);
    assert!(!config.revalidate.role_permissions.on_focus);
    assert_eq!(config.revalidate.role_permissions.error_retry_count, 2);
    assert_eq!(config.revalidate.permissions, RevalidatePolicy::manual());
    assert_eq!(config.display_title(), "Registry");
  }

  #[test]
  fn test_unknown_policy_field_rejected() {
    let yaml = "api:\n  base_url: http://x\nrevalidate:\n  session:\n    on_blur: true\n";
    assert!(Config::parse(yaml).is_err());
  }

  #[test]
  fn test_empty_base_url_rejected() {
    assert!(Config::parse("api:\n  base_url: ''\n").is_err());
  }

  #[test]
  fn test_missing_explicit_path() {
    let err = Config::load(Some(Path::new("/nonexistent/edudesk.yaml"))).unwrap_err();
    assert!(err.to_string().contains("not found"));
  }
}
