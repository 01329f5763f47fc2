//! Layered configuration: `config.toml` (optional) then `MACROFEED_*`
//! environment variables.
//!
//! Nested keys use a double underscore, e.g. `MACROFEED_SERVER__PORT=9000`
//! or `MACROFEED_UPDATER__FULL_DELAY_MS=250`.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use macrofeed_client::ClientConfig;
use macrofeed_updater::{ScheduleConfig, UpdaterConfig};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub store_path:   PathBuf,
  /// CSV export of the indicator spreadsheet.
  pub catalog_path: PathBuf,
  pub server:       ServerSettings,
  pub market_data:  MarketDataSettings,
  pub updater:      UpdaterConfig,
  pub scheduler:    ScheduleConfig,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      store_path:   PathBuf::from("data/macrofeed.db"),
      catalog_path: PathBuf::from("data/indicators.csv"),
      server:       ServerSettings::default(),
      market_data:  MarketDataSettings::default(),
      updater:      UpdaterConfig::default(),
      scheduler:    ScheduleConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
  pub host: String,
  pub port: u16,
}

impl Default for ServerSettings {
  fn default() -> Self { Self { host: "0.0.0.0".to_string(), port: 8000 } }
}

impl ServerSettings {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketDataSettings {
  /// Base URL of the vendor gateway.
  pub base_url:     String,
  pub timeout_secs: u64,
}

impl Default for MarketDataSettings {
  fn default() -> Self {
    Self { base_url: "http://localhost:8889".to_string(), timeout_secs: 30 }
  }
}

impl MarketDataSettings {
  pub fn client_config(&self) -> ClientConfig {
    ClientConfig {
      base_url: self.base_url.clone(),
      timeout:  Duration::from_secs(self.timeout_secs),
    }
  }
}

impl Settings {
  /// Read `path` if it exists, then apply `MACROFEED_*` overrides.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("MACROFEED")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()?
      .try_deserialize()
  }

  /// Expand a leading `~` in the configured paths.
  pub fn expand_paths(mut self) -> Self {
    self.store_path = expand_tilde(&self.store_path);
    self.catalog_path = expand_tilde(&self.catalog_path);
    self
  }
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

#[cfg(test)]
mod tests {
  use std::io::Write as _;

  use chrono::NaiveTime;

  use super::*;

  #[test]
  fn missing_file_yields_defaults() {
    let settings = Settings::load(Path::new("/nonexistent/macrofeed.toml")).unwrap();
    assert_eq!(settings.server.port, 8000);
    assert_eq!(settings.updater.historical_start_year, 2000);
    assert_eq!(settings.updater.full_delay, Duration::from_millis(1000));
    assert_eq!(settings.scheduler.check_interval, Duration::from_secs(60));
  }

  #[test]
  fn file_values_override_defaults() {
    let path = std::env::temp_dir().join(format!("macrofeed-settings-{}.toml", std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(
      file,
      r#"
store_path = "/tmp/feed.db"

[server]
port = 9100

[updater]
historical_start_year = 2010
incremental_delay_ms = 0

[scheduler]
daily_update_time = "19:30"
"#
    )
    .unwrap();

    let settings = Settings::load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(settings.store_path, PathBuf::from("/tmp/feed.db"));
    assert_eq!(settings.server.port, 9100);
    assert_eq!(settings.server.host, "0.0.0.0");
    assert_eq!(settings.updater.historical_start_year, 2010);
    assert_eq!(settings.updater.incremental_delay, Duration::ZERO);
    assert_eq!(settings.updater.incremental_lookback_days, 30);
    assert_eq!(
      settings.scheduler.daily_update_time,
      NaiveTime::from_hms_opt(19, 30, 0).unwrap()
    );
  }

  #[test]
  fn tilde_expands_to_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(expand_tilde(Path::new("~/feed.db")), PathBuf::from(home).join("feed.db"));
    assert_eq!(expand_tilde(Path::new("/abs/feed.db")), PathBuf::from("/abs/feed.db"));
  }
}
