//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use stockroom_core::{
  anomaly::{AnomalyDetector, AnomalyRecord, IsolationForest, archive_candidates},
  movement::{Movement, MovementType},
  product::{Product, ProductId, ProductRef},
  projector::Divergence,
  store::{BackendError, InventoryStore},
};

use crate::{
  Error, SqliteStore,
  interchange::{self, Snapshot},
};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn product(id: i64, name: &str, stock: i64, minimum_stock: i64) -> Product {
  Product {
    product_id: ProductId(id),
    name: name.to_owned(),
    category: "Bebidas".to_owned(),
    price: Decimal::new(250, 2),
    minimum_stock,
    stock,
  }
}

fn at(hour: u32) -> NaiveDateTime {
  NaiveDate::from_ymd_opt(2025, 6, 2)
    .unwrap()
    .and_hms_opt(hour, 0, 0)
    .unwrap()
}

async fn seeded() -> SqliteStore {
  let s = store().await;
  s.add_product(product(1, "Agua", 5, 10)).await.unwrap();
  s.add_product(product(2, "Coca Cola", 20, 4)).await.unwrap();
  s
}

fn domain(err: &Error) -> &stockroom_core::Error {
  err.domain().expect("domain error")
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_and_get_product() {
  let s = seeded().await;

  let fetched = s.get_product(ProductId(1)).await.unwrap().unwrap();
  assert_eq!(fetched, product(1, "Agua", 5, 10));
  assert!(s.get_product(ProductId(99)).await.unwrap().is_none());
  assert_eq!(s.list_products().await.unwrap().len(), 2);
}

#[tokio::test]
async fn duplicate_product_is_rejected() {
  let s = seeded().await;
  let err = s.add_product(product(1, "Otra", 0, 0)).await.unwrap_err();
  assert!(matches!(domain(&err), stockroom_core::Error::DuplicateProduct(_)));
}

#[tokio::test]
async fn find_product_by_name_is_case_insensitive() {
  let s = seeded().await;
  let found = s.find_product_by_name("COCA cola".into()).await.unwrap();
  assert_eq!(found.map(|p| p.product_id), Some(ProductId(2)));
}

// ─── Appends ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_product_leaves_everything_unchanged() {
  let s = seeded().await;
  let err = s
    .append_movement(ProductRef::Id(ProductId(999)), 1, MovementType::Entry, None)
    .await
    .unwrap_err();
  assert!(matches!(
    domain(&err),
    stockroom_core::Error::ProductNotFound(ProductId(999))
  ));
  assert!(s.list_movements().await.unwrap().is_empty());
}

#[tokio::test]
async fn insufficient_stock_leaves_everything_unchanged() {
  let s = seeded().await;
  let err = s
    .append_movement(ProductRef::Id(ProductId(1)), 10, MovementType::Exit, None)
    .await
    .unwrap_err();
  assert!(matches!(
    domain(&err),
    stockroom_core::Error::InsufficientStock { available: 5, requested: 10, .. }
  ));
  assert_eq!(s.get_product(ProductId(1)).await.unwrap().unwrap().stock, 5);
  assert!(s.list_movements().await.unwrap().is_empty());
}

#[tokio::test]
async fn entry_updates_stock_and_ledger_together() {
  let s = seeded().await;
  let m = s
    .append_movement(ProductRef::Id(ProductId(1)), 3, MovementType::Entry, Some(at(9)))
    .await
    .unwrap();

  assert_eq!(m.id, 1);
  assert_eq!((m.stock_before, m.stock_after), (5, 8));
  assert_eq!(m.timestamp, at(9));
  assert_eq!(s.get_product(ProductId(1)).await.unwrap().unwrap().stock, 8);
  assert_eq!(s.list_movements().await.unwrap(), vec![m]);
}

#[tokio::test]
async fn ids_are_consecutive() {
  let s = seeded().await;
  let ops = [
    (9, MovementType::Entry),
    (10, MovementType::Exit),
    (11, MovementType::Exit),
  ];
  for (hour, kind) in ops {
    s.append_movement(ProductRef::Id(ProductId(2)), 2, kind, Some(at(hour)))
      .await
      .unwrap();
  }
  let ids: Vec<_> = s.list_movements().await.unwrap().iter().map(|m| m.id).collect();
  assert_eq!(ids, vec![1, 2, 3]);
  assert_eq!(s.get_product(ProductId(2)).await.unwrap().unwrap().stock, 18);
}

#[tokio::test]
async fn backdated_append_is_rejected() {
  let s = seeded().await;
  s.append_movement(ProductRef::Id(ProductId(1)), 1, MovementType::Entry, Some(at(10)))
    .await
    .unwrap();
  let err = s
    .append_movement(ProductRef::Id(ProductId(1)), 1, MovementType::Entry, Some(at(9)))
    .await
    .unwrap_err();
  assert!(matches!(domain(&err), stockroom_core::Error::BackdatedMovement { .. }));
  assert_eq!(s.list_movements().await.unwrap().len(), 1);
}

#[tokio::test]
async fn default_stamp_follows_a_future_dated_movement() {
  let s = seeded().await;
  let future = NaiveDate::from_ymd_opt(2999, 1, 1)
    .unwrap()
    .and_hms_opt(0, 0, 0)
    .unwrap();
  s.append_movement(ProductRef::Id(ProductId(1)), 1, MovementType::Entry, Some(future))
    .await
    .unwrap();

  let m = s
    .append_movement(ProductRef::Id(ProductId(1)), 2, MovementType::Entry, None)
    .await
    .unwrap();
  assert_eq!(m.timestamp, future);
  assert_eq!(m.stock_after, 8);
  assert!(s.reconcile(false).await.unwrap().is_clean());
}

#[tokio::test]
async fn detection_resolves_names_and_validates_type() {
  let s = seeded().await;
  let m = s
    .record_detection(ProductRef::Name("agua".into()), 2, "Entrada".into())
    .await
    .unwrap();
  assert_eq!(m.product_id, ProductId(1));
  assert_eq!(m.movement_type, MovementType::Entry);

  let err = s
    .record_detection(ProductRef::Name("agua".into()), 2, "transfer".into())
    .await
    .unwrap_err();
  assert!(matches!(domain(&err), stockroom_core::Error::InvalidMovementType(_)));

  let err = s
    .record_detection(ProductRef::Name("pepsi".into()), 1, "Salida".into())
    .await
    .unwrap_err();
  assert!(matches!(domain(&err), stockroom_core::Error::ProductNameNotFound(_)));
}

#[tokio::test]
async fn concurrent_appends_never_oversell() {
  let s = seeded().await;
  let handles: Vec<_> = (0..8)
    .map(|_| {
      let s = s.clone();
      tokio::spawn(async move {
        s.append_movement(ProductRef::Id(ProductId(1)), 1, MovementType::Exit, None)
          .await
      })
    })
    .collect();

  let mut accepted = 0;
  for h in handles {
    if h.await.unwrap().is_ok() {
      accepted += 1;
    }
  }
  assert_eq!(accepted, 5);
  assert_eq!(s.get_product(ProductId(1)).await.unwrap().unwrap().stock, 0);
  assert!(s.reconcile(false).await.unwrap().is_clean());
}

// ─── Integrity ───────────────────────────────────────────────────────────────

fn tampered_snapshot() -> Snapshot {
  let mut m = Movement {
    id:             1,
    timestamp:      at(9),
    product_id:     ProductId(1),
    product_name:   "Agua".into(),
    minimum_stock:  10,
    category:       "Bebidas".into(),
    price_per_unit: Decimal::new(250, 2),
    movement_type:  MovementType::Entry,
    quantity:       3,
    stock_before:   5,
    stock_after:    8,
  };
  let first = m.clone();
  m.id = 2;
  m.timestamp = at(10);
  m.stock_before = 8;
  m.stock_after = 12;
  Snapshot {
    products:  vec![product(1, "Agua", 12, 10)],
    movements: vec![first, m],
    anomalies: Vec::new(),
  }
}

#[tokio::test]
async fn corruption_blocks_appends() {
  let s = store().await;
  let summary = s.import(tampered_snapshot()).await.unwrap();
  assert!(
    summary
      .divergences
      .iter()
      .any(|d| matches!(d, Divergence::ReplayMismatch { movement_id: 2, .. }))
  );

  let err = s
    .append_movement(ProductRef::Id(ProductId(1)), 1, MovementType::Entry, None)
    .await
    .unwrap_err();
  assert!(matches!(domain(&err), stockroom_core::Error::LedgerCorruption(_)));
}

#[tokio::test]
async fn import_rejects_non_positive_quantities() {
  // 5 - (-4) = 9 balances, so only the quantity itself is wrong.
  let mut snapshot = tampered_snapshot();
  snapshot.products = vec![product(1, "Agua", 9, 10)];
  let negative_exit = &mut snapshot.movements[0];
  negative_exit.movement_type = MovementType::Exit;
  negative_exit.quantity = -4;
  negative_exit.stock_after = 9;
  snapshot.movements.truncate(1);

  let s = store().await;
  let err = s.import(snapshot).await.unwrap_err();
  assert!(matches!(domain(&err), stockroom_core::Error::InvalidQuantity(-4)));
  assert!(s.list_products().await.unwrap().is_empty());
  assert!(s.list_movements().await.unwrap().is_empty());
}

#[tokio::test]
async fn repair_fixes_catalog_but_not_history() {
  let s = store().await;
  s.import(tampered_snapshot()).await.unwrap();

  let report = s.reconcile(true).await.unwrap();
  assert_eq!(report.repaired, vec![ProductId(1)]);
  assert!(!report.writable);
  // Replay follows the quantities, not the tampered `stock_after`.
  assert_eq!(s.get_product(ProductId(1)).await.unwrap().unwrap().stock, 11);
  assert!(
    s.blocking_divergences()
      .await
      .iter()
      .all(Divergence::is_ledger_internal)
  );
}

#[tokio::test]
async fn catalog_only_drift_is_repairable() {
  let s = store().await;
  let mut snapshot = tampered_snapshot();
  snapshot.movements.truncate(1);
  s.import(snapshot).await.unwrap();

  let before = s.reconcile(false).await.unwrap();
  assert!(matches!(
    before.divergences.as_slice(),
    [Divergence::CatalogMismatch { catalog_stock: 12, replayed_stock: 8, .. }]
  ));
  assert!(!before.writable);

  let after = s.reconcile(true).await.unwrap();
  assert!(after.writable);
  s.append_movement(ProductRef::Id(ProductId(1)), 1, MovementType::Exit, None)
    .await
    .unwrap();
}

// ─── Anomaly archive ─────────────────────────────────────────────────────────

async fn scanned_records(s: &SqliteStore) -> Vec<AnomalyRecord> {
  for _ in 0..9 {
    s.append_movement(ProductRef::Id(ProductId(2)), 1, MovementType::Exit, Some(at(12)))
      .await
      .unwrap();
  }
  s.append_movement(ProductRef::Id(ProductId(2)), 500, MovementType::Entry, Some(at(12)))
    .await
    .unwrap();
  let movements = s.list_movements().await.unwrap();
  let rows = AnomalyDetector::new(IsolationForest::default())
    .detect_movements(&movements)
    .unwrap();
  archive_candidates(&rows)
}

#[tokio::test]
async fn archive_is_deduplicated() {
  let s = seeded().await;
  let records = scanned_records(&s).await;
  assert!(!records.is_empty());

  let first = s.archive_anomalies(records.clone()).await.unwrap();
  assert_eq!(first, records.len());
  assert_eq!(s.archive_anomalies(records).await.unwrap(), 0);
  assert_eq!(s.list_anomalies().await.unwrap().len(), first);
}

// ─── Interchange ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn export_then_import_reproduces_the_store() {
  let s = seeded().await;
  s.append_movement(ProductRef::Id(ProductId(1)), 4, MovementType::Entry, Some(at(9)))
    .await
    .unwrap();
  let dir = tempfile::tempdir().unwrap();
  s.export().await.unwrap().write_dir(dir.path()).unwrap();

  let copy = store().await;
  let summary = copy.import(Snapshot::read_dir(dir.path()).unwrap()).await.unwrap();
  assert_eq!((summary.products, summary.movements), (2, 1));
  assert!(summary.divergences.is_empty());
  assert_eq!(copy.list_movements().await.unwrap(), s.list_movements().await.unwrap());
}

#[tokio::test]
async fn legacy_ledger_file_is_migrated() {
  let dir = tempfile::tempdir().unwrap();
  let catalog = vec![product(1, "Agua", 8, 10)];
  interchange::write_json(dir.path().join(interchange::CATALOG_FILE), &catalog).unwrap();
  std::fs::write(
    dir.path().join(interchange::LEDGER_FILE),
    r#"[{"id": 1, "date": "2025-06-02", "time": "09:00", "product_id": 1,
         "product_name": "Agua", "minimum_stock": 10, "category": "Bebidas",
         "price_per_unit": 2.5, "movement_type": "Ingreso", "quantity": 3,
         "stock_after": 8}]"#,
  )
  .unwrap();

  let s = store().await;
  let summary = s.import(Snapshot::read_dir(dir.path()).unwrap()).await.unwrap();
  assert!(summary.divergences.is_empty());
  let m = &s.list_movements().await.unwrap()[0];
  assert_eq!((m.stock_before, m.stock_after), (5, 8));
  assert_eq!(m.timestamp, at(9));
}

#[test]
fn corrupt_archive_file_reads_as_empty_and_is_rewritten() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join(interchange::ARCHIVE_FILE);
  std::fs::write(&path, "{ not json").unwrap();
  assert!(interchange::read_archive(&path).is_empty());

  let record = AnomalyRecord {
    id:               Some(4),
    timestamp:        at(9),
    product_id:       Some(ProductId(1)),
    product_name:     Some("Agua".into()),
    movement_type:    "Salida".into(),
    quantity:         40,
    stock_after:      Some(2),
    anomaly_score:    -0.12,
    reason:           "Unusual pattern detected by the model.".into(),
    interpretation:   String::new(),
    suggested_action: String::new(),
  };
  assert_eq!(interchange::append_archive(&path, [record.clone()]).unwrap(), 1);
  assert_eq!(interchange::append_archive(&path, [record]).unwrap(), 0);
  assert_eq!(interchange::read_archive(&path).len(), 1);
}
