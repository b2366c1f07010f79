//! Layered runtime settings: defaults, then the optional TOML file, then
//! `STOCKROOM_*` environment variables (`__` separates nested keys, as in
//! `STOCKROOM_ANOMALY__SENSITIVITY`).

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;
use stockroom_core::anomaly::AnomalySettings;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub store_path: PathBuf,
  pub host:       String,
  pub port:       u16,
  pub anomaly:    AnomalySettings,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      store_path: PathBuf::from("stockroom.db"),
      host:       "127.0.0.1".to_string(),
      port:       8080,
      anomaly:    AnomalySettings::default(),
    }
  }
}

impl Settings {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    config::Config::builder()
      .add_source(config::File::from(path.to_path_buf()).required(false))
      .add_source(
        config::Environment::with_prefix("STOCKROOM")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .context("failed to read configuration")?
      .try_deserialize()
      .context("failed to deserialise settings")
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}
