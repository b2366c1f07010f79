//! JSON interchange files.
//!
//! A snapshot directory holds three array-of-objects files: the catalog
//! (`inventario.json`), the ledger (`historial.json`, canonical or legacy
//! layout) and the anomaly archive (`anomalias.json`).

use std::{
  fs,
  path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use stockroom_core::{
  anomaly::{AnomalyRecord, merge_archive},
  movement::{LedgerRecord, Movement},
  product::Product,
};

use crate::{Error, Result};

pub const CATALOG_FILE: &str = "inventario.json";
pub const LEDGER_FILE: &str = "historial.json";
pub const ARCHIVE_FILE: &str = "anomalias.json";

/// Everything a store holds, in interchange form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
  pub products:  Vec<Product>,
  pub movements: Vec<Movement>,
  pub anomalies: Vec<AnomalyRecord>,
}

impl Snapshot {
  /// Read a snapshot directory. The catalog is required; a missing ledger
  /// reads as empty and the archive recovers from any read failure.
  pub fn read_dir(dir: impl AsRef<Path>) -> Result<Self> {
    let dir = dir.as_ref();
    let ledger_path = dir.join(LEDGER_FILE);
    let movements = if ledger_path.exists() {
      read_ledger(&ledger_path)?
    } else {
      Vec::new()
    };
    Ok(Self {
      products: read_catalog(dir.join(CATALOG_FILE))?,
      movements,
      anomalies: read_archive(dir.join(ARCHIVE_FILE)),
    })
  }

  /// Write all three files into `dir`, creating it if needed.
  pub fn write_dir(&self, dir: impl AsRef<Path>) -> Result<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).map_err(|source| io_error(dir, source))?;
    write_json(dir.join(CATALOG_FILE), &self.products)?;
    write_json(dir.join(LEDGER_FILE), &self.movements)?;
    write_json(dir.join(ARCHIVE_FILE), &self.anomalies)?;
    Ok(())
  }
}

fn io_error(path: &Path, source: std::io::Error) -> Error {
  Error::Io { path: path.to_path_buf(), source }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
  let text = fs::read_to_string(path).map_err(|source| io_error(path, source))?;
  Ok(serde_json::from_str(&text)?)
}

/// Pretty-print `value` to `path`.
pub fn write_json<T: Serialize + ?Sized>(path: impl AsRef<Path>, value: &T) -> Result<()> {
  let path = path.as_ref();
  let text = serde_json::to_string_pretty(value)?;
  fs::write(path, text).map_err(|source| io_error(path, source))
}

/// Read and validate a catalog file.
pub fn read_catalog(path: impl AsRef<Path>) -> Result<Vec<Product>> {
  let products: Vec<Product> = read_json(path.as_ref())?;
  for p in &products {
    p.validate()?;
  }
  Ok(products)
}

/// Read a ledger file in either layout, migrating legacy rows.
pub fn read_ledger(path: impl AsRef<Path>) -> Result<Vec<Movement>> {
  let records: Vec<LedgerRecord> = read_json(path.as_ref())?;
  records
    .into_iter()
    .map(|r| r.into_movement().map_err(Error::from))
    .collect()
}

/// Read an anomaly archive file. A missing, unreadable or malformed archive
/// is treated as empty.
pub fn read_archive(path: impl AsRef<Path>) -> Vec<AnomalyRecord> {
  let path = path.as_ref();
  if !path.exists() {
    return Vec::new();
  }
  match read_json::<Vec<AnomalyRecord>>(path) {
    Ok(records) => records,
    Err(e) => {
      tracing::warn!(
        path = %path.display(),
        error = %e,
        "anomaly archive unreadable; treating it as empty"
      );
      Vec::new()
    }
  }
}

/// Merge `records` into the archive file at `path` and return how many were
/// new. Write failures are returned to the caller.
pub fn append_archive(
  path: impl AsRef<Path>,
  records: impl IntoIterator<Item = AnomalyRecord>,
) -> Result<usize> {
  let path: PathBuf = path.as_ref().to_path_buf();
  let mut archive = read_archive(&path);
  let added = merge_archive(&mut archive, records);
  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
  }
  write_json(&path, &archive)?;
  Ok(added)
}
