//! [`SqliteStore`] — the SQLite implementation of [`InventoryStore`].

use std::{path::Path, sync::Arc};

use chrono::NaiveDateTime;
use rusqlite::OptionalExtension as _;
use serde::Serialize;
use tokio::sync::Mutex;

use stockroom_core::{
  anomaly::AnomalyRecord,
  movement::{Movement, MovementType, stamp},
  product::{Product, ProductId, ProductRef},
  projector::{Divergence, project},
  store::{BackendError as _, InventoryStore, ReconcileReport},
  timestamp,
};

use crate::{
  Error, Result,
  encode::{
    ANOMALY_COLUMNS, MOVEMENT_COLUMNS, PRODUCT_COLUMNS, RawAnomaly, RawMovement,
    RawProduct, decode_ts, encode_dedup_key, encode_price, encode_ts,
  },
  interchange::Snapshot,
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Stockroom inventory store backed by a single SQLite file.
///
/// Cloning is cheap: the connection and write gate are reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
  /// Divergences from the last integrity check. Appends are refused while
  /// this is non-empty; holding the lock serialises writers.
  gate: Arc<Mutex<Vec<Divergence>>>,
}

impl SqliteStore {
  /// Open (or create) a store at `path`, initialise the schema and run an
  /// integrity check.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, mainly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    let store = Self { conn, gate: Arc::new(Mutex::new(Vec::new())) };
    store.check_integrity().await?;
    Ok(store)
  }

  /// Replay the ledger against itself and the catalog, record the result in
  /// the write gate and return it.
  pub async fn check_integrity(&self) -> Result<Vec<Divergence>> {
    let mut gate = self.gate.lock().await;
    let divergences = self.scan_divergences().await?;
    report_divergences(&divergences);
    *gate = divergences.clone();
    Ok(divergences)
  }

  /// Divergences currently blocking appends.
  pub async fn blocking_divergences(&self) -> Vec<Divergence> {
    self.gate.lock().await.clone()
  }

  async fn scan_divergences(&self) -> Result<Vec<Divergence>> {
    let (products, movements) = self
      .conn
      .call(|conn| Ok((load_products(conn), load_movements(conn))))
      .await?;
    let (products, movements) = (products?, movements?);

    let projection = project(&movements, None);
    let mut divergences = projection.divergences.clone();
    divergences.extend(projection.reconcile_catalog(&products));
    Ok(divergences)
  }

  // ── Interchange ───────────────────────────────────────────────────────

  /// Load a snapshot into the store in one transaction.
  ///
  /// Products must not already exist. Movements are appended verbatim (not
  /// re-applied) so imported history stays exactly as recorded; the
  /// integrity check that follows decides whether appends are allowed.
  pub async fn import(&self, snapshot: Snapshot) -> Result<ImportSummary> {
    for product in &snapshot.products {
      product.validate()?;
    }
    for movement in &snapshot.movements {
      movement.validate()?;
    }

    let mut gate = self.gate.lock().await;
    let summary = self
      .conn
      .call(move |conn| Ok(import_tx(conn, snapshot)))
      .await??;

    let divergences = self.scan_divergences().await?;
    report_divergences(&divergences);
    *gate = divergences.clone();

    tracing::info!(
      products = summary.products,
      movements = summary.movements,
      anomalies = summary.anomalies,
      divergences = divergences.len(),
      "snapshot imported"
    );
    Ok(ImportSummary { divergences, ..summary })
  }

  /// Read the whole store back out.
  pub async fn export(&self) -> Result<Snapshot> {
    let (products, movements, anomalies) = self
      .conn
      .call(|conn| {
        Ok((load_products(conn), load_movements(conn), load_anomalies(conn)))
      })
      .await?;
    Ok(Snapshot {
      products:  products?,
      movements: movements?,
      anomalies: anomalies?,
    })
  }
}

/// Counts from [`SqliteStore::import`], plus the integrity check run after.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportSummary {
  pub products:    usize,
  pub movements:   usize,
  pub anomalies:   usize,
  pub divergences: Vec<Divergence>,
}

fn report_divergences(divergences: &[Divergence]) {
  if divergences.is_empty() {
    return;
  }
  for d in divergences {
    tracing::error!(divergence = %d, "ledger integrity check failed");
  }
  tracing::warn!(
    count = divergences.len(),
    "appends are blocked until reconciliation is clean"
  );
}

// ─── Synchronous helpers (run on the connection thread) ─────────────────────

fn load_products(conn: &rusqlite::Connection) -> Result<Vec<Product>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY product_id"
  ))?;
  let raws = stmt
    .query_map([], RawProduct::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawProduct::into_product).collect()
}

fn load_movements(conn: &rusqlite::Connection) -> Result<Vec<Movement>> {
  let mut stmt =
    conn.prepare(&format!("SELECT {MOVEMENT_COLUMNS} FROM movements ORDER BY seq"))?;
  let raws = stmt
    .query_map([], RawMovement::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawMovement::into_movement).collect()
}

fn load_anomalies(conn: &rusqlite::Connection) -> Result<Vec<AnomalyRecord>> {
  let mut stmt =
    conn.prepare(&format!("SELECT {ANOMALY_COLUMNS} FROM anomalies ORDER BY seq"))?;
  let raws = stmt
    .query_map([], RawAnomaly::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawAnomaly::into_record).collect()
}

fn get_product(conn: &rusqlite::Connection, id: ProductId) -> Result<Option<Product>> {
  conn
    .query_row(
      &format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = ?1"),
      rusqlite::params![id.0],
      RawProduct::from_row,
    )
    .optional()?
    .map(RawProduct::into_product)
    .transpose()
}

fn resolve_product(conn: &rusqlite::Connection, product: &ProductRef) -> Result<Product> {
  match product {
    ProductRef::Id(id) => {
      get_product(conn, *id)?.ok_or(Error::Core(stockroom_core::Error::ProductNotFound(*id)))
    }
    ProductRef::Name(name) => load_products(conn)?
      .into_iter()
      .find(|p| p.name_matches(name))
      .ok_or_else(|| {
        Error::Core(stockroom_core::Error::ProductNameNotFound(name.clone()))
      }),
  }
}

fn insert_product(conn: &rusqlite::Connection, p: &Product) -> Result<()> {
  let exists = conn
    .query_row(
      "SELECT 1 FROM products WHERE product_id = ?1",
      rusqlite::params![p.product_id.0],
      |_| Ok(()),
    )
    .optional()?
    .is_some();
  if exists {
    return Err(stockroom_core::Error::DuplicateProduct(p.product_id).into());
  }
  conn.execute(
    &format!("INSERT INTO products ({PRODUCT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
    rusqlite::params![
      p.product_id.0,
      p.name,
      p.category,
      encode_price(p.price),
      p.minimum_stock,
      p.stock,
    ],
  )?;
  Ok(())
}

fn insert_movement(conn: &rusqlite::Connection, m: &Movement) -> Result<()> {
  conn.execute(
    &format!(
      "INSERT INTO movements ({MOVEMENT_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
    ),
    rusqlite::params![
      m.id,
      encode_ts(m.timestamp),
      m.product_id.0,
      m.product_name,
      m.minimum_stock,
      m.category,
      encode_price(m.price_per_unit),
      m.movement_type.as_str(),
      m.quantity,
      m.stock_before,
      m.stock_after,
    ],
  )?;
  Ok(())
}

/// Insert `records`, skipping any whose dedup key is already archived.
fn insert_anomalies(conn: &rusqlite::Connection, records: &[AnomalyRecord]) -> Result<usize> {
  let mut stmt = conn.prepare(&format!(
    "INSERT OR IGNORE INTO anomalies (dedup_key, {ANOMALY_COLUMNS})
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
  ))?;
  let mut inserted = 0;
  for r in records {
    inserted += stmt.execute(rusqlite::params![
      encode_dedup_key(r),
      r.id,
      encode_ts(r.timestamp),
      r.product_id.map(|p| p.0),
      r.product_name,
      r.movement_type,
      r.quantity,
      r.stock_after,
      r.anomaly_score,
      r.reason,
      r.interpretation,
      r.suggested_action,
    ])?;
  }
  Ok(inserted)
}

/// The read-modify-write of one append, as a single transaction.
fn append_tx(
  conn: &mut rusqlite::Connection,
  product: &ProductRef,
  quantity: i64,
  movement_type: MovementType,
  at: Option<NaiveDateTime>,
  now: NaiveDateTime,
) -> Result<Movement> {
  let tx = conn.transaction()?;

  let mut product = resolve_product(&tx, product)?;
  let latest: Option<String> = tx.query_row(
    "SELECT MAX(timestamp) FROM movements WHERE product_id = ?1",
    rusqlite::params![product.product_id.0],
    |r| r.get(0),
  )?;
  let latest = latest.map(|s| decode_ts("timestamp", &s)).transpose()?;
  let at = stamp(product.product_id, at, now, latest)?;

  let next_id: i64 =
    tx.query_row("SELECT COALESCE(MAX(id), 0) + 1 FROM movements", [], |r| r.get(0))?;
  let movement = product.apply(next_id, movement_type, quantity, at)?;

  insert_movement(&tx, &movement)?;
  tx.execute(
    "UPDATE products SET stock = ?1 WHERE product_id = ?2",
    rusqlite::params![product.stock, product.product_id.0],
  )?;
  tx.commit()?;
  Ok(movement)
}

fn import_tx(conn: &mut rusqlite::Connection, snapshot: Snapshot) -> Result<ImportSummary> {
  let tx = conn.transaction()?;
  for p in &snapshot.products {
    insert_product(&tx, p)?;
  }
  for m in &snapshot.movements {
    insert_movement(&tx, m)?;
  }
  let anomalies = insert_anomalies(&tx, &snapshot.anomalies)?;
  tx.commit()?;
  Ok(ImportSummary {
    products: snapshot.products.len(),
    movements: snapshot.movements.len(),
    anomalies,
    divergences: Vec::new(),
  })
}

/// Reset catalog stock to the replayed value for every catalog mismatch.
fn repair_tx(
  conn: &mut rusqlite::Connection,
  divergences: &[Divergence],
) -> Result<Vec<ProductId>> {
  let tx = conn.transaction()?;
  let mut repaired = Vec::new();
  for d in divergences {
    if let Divergence::CatalogMismatch { product_id, replayed_stock, .. } = d {
      tx.execute(
        "UPDATE products SET stock = ?1 WHERE product_id = ?2",
        rusqlite::params![replayed_stock, product_id.0],
      )?;
      repaired.push(*product_id);
    }
  }
  tx.commit()?;
  Ok(repaired)
}

// ─── InventoryStore impl ─────────────────────────────────────────────────────

impl InventoryStore for SqliteStore {
  type Error = Error;

  // ── Catalog ───────────────────────────────────────────────────────────────

  async fn add_product(&self, product: Product) -> Result<Product> {
    product.validate()?;
    let row = product.clone();
    self
      .conn
      .call(move |conn| Ok(insert_product(conn, &row)))
      .await??;
    tracing::debug!(product_id = %product.product_id, "product added");
    Ok(product)
  }

  async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
    self.conn.call(move |conn| Ok(get_product(conn, id))).await?
  }

  async fn find_product_by_name(&self, name: String) -> Result<Option<Product>> {
    let products = self.conn.call(|conn| Ok(load_products(conn))).await??;
    Ok(products.into_iter().find(|p| p.name_matches(&name)))
  }

  async fn list_products(&self) -> Result<Vec<Product>> {
    self.conn.call(|conn| Ok(load_products(conn))).await?
  }

  // ── Ledger ────────────────────────────────────────────────────────────────

  async fn append_movement(
    &self,
    product: ProductRef,
    quantity: i64,
    movement_type: MovementType,
    at: Option<NaiveDateTime>,
  ) -> Result<Movement> {
    let gate = self.gate.lock().await;
    if !gate.is_empty() {
      return Err(stockroom_core::Error::LedgerCorruption(gate.clone()).into());
    }

    let now = timestamp::now();
    let requested = product.clone();
    let outcome = self
      .conn
      .call(move |conn| Ok(append_tx(conn, &requested, quantity, movement_type, at, now)))
      .await?;
    drop(gate);

    match &outcome {
      Ok(m) => tracing::debug!(
        id = m.id,
        product_id = %m.product_id,
        movement_type = %m.movement_type,
        quantity = m.quantity,
        stock_after = m.stock_after,
        "movement appended"
      ),
      Err(e) if e.domain().is_some_and(stockroom_core::Error::is_rejection) => {
        tracing::info!(product = %product, error = %e, "movement rejected");
      }
      Err(e) => tracing::error!(product = %product, error = %e, "append failed"),
    }
    outcome
  }

  async fn record_detection(
    &self,
    product: ProductRef,
    quantity: i64,
    movement_type: String,
  ) -> Result<Movement> {
    let movement_type: MovementType = movement_type.parse()?;
    self.append_movement(product, quantity, movement_type, None).await
  }

  async fn list_movements(&self) -> Result<Vec<Movement>> {
    self.conn.call(|conn| Ok(load_movements(conn))).await?
  }

  async fn reconcile(&self, repair: bool) -> Result<ReconcileReport> {
    let mut gate = self.gate.lock().await;
    let divergences = self.scan_divergences().await?;

    let repaired = if repair && !divergences.is_empty() {
      let found = divergences.clone();
      let repaired = self.conn.call(move |conn| Ok(repair_tx(conn, &found))).await??;
      for id in &repaired {
        tracing::warn!(product_id = %id, "catalog stock reset to replayed ledger value");
      }
      repaired
    } else {
      Vec::new()
    };

    let remaining = if repaired.is_empty() {
      divergences.clone()
    } else {
      self.scan_divergences().await?
    };
    report_divergences(&remaining);
    *gate = remaining;

    Ok(ReconcileReport { divergences, repaired, writable: gate.is_empty() })
  }

  // ── Anomaly archive ───────────────────────────────────────────────────────

  async fn archive_anomalies(&self, records: Vec<AnomalyRecord>) -> Result<usize> {
    let offered = records.len();
    let inserted = self
      .conn
      .call(move |conn| Ok(insert_anomalies(conn, &records)))
      .await??;
    tracing::info!(offered, inserted, "anomalies archived");
    Ok(inserted)
  }

  async fn list_anomalies(&self) -> Result<Vec<AnomalyRecord>> {
    match self.conn.call(|conn| Ok(load_anomalies(conn))).await? {
      Ok(records) => Ok(records),
      Err(e) => {
        tracing::warn!(error = %e, "anomaly archive unreadable; treating it as empty");
        Ok(Vec::new())
      }
    }
  }
}
