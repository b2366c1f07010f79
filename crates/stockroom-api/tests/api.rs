//! Router-level tests against an in-memory SQLite store.

use std::sync::Arc;

use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use stockroom_api::{AppState, api_router};
use stockroom_core::anomaly::AnomalySettings;
use stockroom_store_sqlite::SqliteStore;
use tower::ServiceExt;

async fn app() -> Router {
  let store = SqliteStore::open_in_memory().await.unwrap();
  api_router(Arc::new(AppState::new(Arc::new(store), AnomalySettings::default())))
}

async fn send(
  app: &Router,
  method: &str,
  uri: &str,
  body: Option<Value>,
) -> (StatusCode, Value) {
  let builder = Request::builder().method(method).uri(uri);
  let req = match body {
    Some(body) => builder
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(body.to_string()))
      .unwrap(),
    None => builder.body(Body::empty()).unwrap(),
  };
  let resp = app.clone().oneshot(req).await.unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let value = if bytes.is_empty() {
    Value::Null
  } else {
    serde_json::from_slice(&bytes).unwrap()
  };
  (status, value)
}

fn product(id: i64, name: &str, category: &str, min: i64, stock: i64) -> Value {
  json!({
    "product_id": id,
    "name": name,
    "category": category,
    "price": 2.5,
    "minimum_stock": min,
    "stock": stock,
  })
}

async fn seeded() -> Router {
  let app = app().await;
  for p in [
    product(1, "Coca Cola", "Bebidas", 10, 5),
    product(2, "Papas", "Snacks", 2, 20),
  ] {
    let (status, _) = send(&app, "POST", "/products", Some(p)).await;
    assert_eq!(status, StatusCode::CREATED);
  }
  app
}

// ── Catalog ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn products_can_be_created_and_fetched() {
  let app = seeded().await;

  let (status, body) = send(&app, "GET", "/products", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body.as_array().unwrap().len(), 2);

  let (status, body) = send(&app, "GET", "/products/2", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["name"], "Papas");

  let (status, body) = send(&app, "GET", "/products/999", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn duplicate_product_is_a_conflict() {
  let app = seeded().await;
  let (status, body) =
    send(&app, "POST", "/products", Some(product(1, "Otra", "Bebidas", 1, 1))).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["code"], "duplicate_product");
}

// ── Ledger ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn entry_by_name_updates_stock() {
  let app = seeded().await;
  let (status, body) = send(
    &app,
    "POST",
    "/movements",
    Some(json!({ "product_name": "coca cola", "quantity": 3, "movement_type": "Entrada" })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["id"], 1);
  assert_eq!(body["stock_before"], 5);
  assert_eq!(body["stock_after"], 8);
  assert_eq!(body["movement_type"], "Ingreso");

  let (_, body) = send(&app, "GET", "/products/1", None).await;
  assert_eq!(body["stock"], 8);

  let (_, body) = send(&app, "GET", "/reports", None).await;
  assert_eq!(body["products"][0]["current_stock"], 8);
  assert_eq!(body["products"][0]["stock_state"], "low");
}

#[tokio::test]
async fn rejections_carry_status_and_code() {
  let app = seeded().await;
  let cases = [
    (
      json!({ "product_id": 999, "quantity": 1, "movement_type": "Entrada" }),
      StatusCode::NOT_FOUND,
      "product_not_found",
    ),
    (
      json!({ "product_id": 1, "quantity": 10, "movement_type": "Salida" }),
      StatusCode::CONFLICT,
      "insufficient_stock",
    ),
    (
      json!({ "product_id": 1, "quantity": 0, "movement_type": "Entrada" }),
      StatusCode::BAD_REQUEST,
      "invalid_quantity",
    ),
    (
      json!({ "product_id": 1, "quantity": 1, "movement_type": "Transfer" }),
      StatusCode::BAD_REQUEST,
      "invalid_movement_type",
    ),
    (
      json!({ "quantity": 1, "movement_type": "Entrada" }),
      StatusCode::BAD_REQUEST,
      "bad_request",
    ),
  ];

  for (body, status, code) in cases {
    let (got, resp) = send(&app, "POST", "/movements", Some(body.clone())).await;
    assert_eq!(got, status, "{body}");
    assert_eq!(resp["code"], code, "{body}");
  }

  let (_, movements) = send(&app, "GET", "/movements", None).await;
  assert!(movements.as_array().unwrap().is_empty());
  let (_, body) = send(&app, "GET", "/products/1", None).await;
  assert_eq!(body["stock"], 5);
}

#[tokio::test]
async fn movements_can_be_filtered() {
  let app = seeded().await;
  for (id, kind) in [(1, "Entrada"), (2, "Salida"), (2, "Entrada")] {
    let (status, _) = send(
      &app,
      "POST",
      "/movements",
      Some(json!({ "product_id": id, "quantity": 1, "movement_type": kind })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
  }

  let (_, body) = send(&app, "GET", "/movements?categories=Snacks", None).await;
  assert_eq!(body.as_array().unwrap().len(), 2);

  let (_, body) =
    send(&app, "GET", "/movements?products=2&movement_types=salida", None).await;
  assert_eq!(body.as_array().unwrap().len(), 1);

  let (status, _) = send(&app, "GET", "/movements?products=abc", None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn detections_record_the_first_known_label() {
  let app = seeded().await;
  let (status, body) = send(
    &app,
    "POST",
    "/movements/detected",
    Some(json!({
      "detections": [{ "label": "person", "count": 1 }, { "label": "Papas", "count": 2 }],
      "movement_type": "Salida",
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["product_id"], 2);
  assert_eq!(body["quantity"], 2);
  assert_eq!(body["stock_after"], 18);

  let (status, _) = send(
    &app,
    "POST",
    "/movements/detected",
    Some(json!({ "detections": [{ "label": "person", "count": 1 }], "movement_type": "Salida" })),
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Read models ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn projection_honours_as_of() {
  let app = seeded().await;
  for (ts, qty) in [("2025-06-02 09:00:00", 3), ("2025-06-03 09:00:00", 4)] {
    send(
      &app,
      "POST",
      "/movements",
      Some(json!({
        "product_id": 1,
        "quantity": qty,
        "movement_type": "Entrada",
        "timestamp": ts,
      })),
    )
    .await;
  }

  let (status, body) = send(&app, "GET", "/projection", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["timelines"]["1"]["entries"].as_array().unwrap().len(), 2);

  let (_, body) = send(&app, "GET", "/projection?as_of=2025-06-02%2012:00:00", None).await;
  let entries = body["timelines"]["1"]["entries"].as_array().unwrap();
  assert_eq!(entries.len(), 1);
  assert_eq!(entries[0]["replayed_stock"], 8);

  let (status, body) = send(&app, "GET", "/projection?as_of=yesterday", None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["code"], "invalid_timestamp");
}

#[tokio::test]
async fn backdated_append_is_a_conflict() {
  let app = seeded().await;
  let append = |ts: &'static str| {
    json!({ "product_id": 1, "quantity": 1, "movement_type": "Entrada", "timestamp": ts })
  };
  let (status, _) = send(&app, "POST", "/movements", Some(append("2025-06-03 09:00:00"))).await;
  assert_eq!(status, StatusCode::CREATED);
  let (status, body) =
    send(&app, "POST", "/movements", Some(append("2025-06-02 09:00:00"))).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["code"], "backdated_movement");
}

// ── Anomalies ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn small_ledger_scan_reports_nothing() {
  let app = seeded().await;
  send(
    &app,
    "POST",
    "/movements",
    Some(json!({ "product_id": 2, "quantity": 1, "movement_type": "Salida" })),
  )
  .await;

  let (status, body) = send(&app, "POST", "/anomalies/scan", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["summary"]["total"], 1);
  assert_eq!(body["summary"]["anomalies"], 0);
  assert_eq!(body["archived"], 0);
  assert_eq!(body["rows"][0]["anomaly"], false);
}

#[tokio::test]
async fn scan_archives_large_exit_once() {
  let app = app().await;
  send(&app, "POST", "/products", Some(product(1, "Agua", "Bebidas", 5, 20_000))).await;
  for minute in 0..10 {
    let quantity = if minute == 9 { 10_000 } else { 10 };
    let (status, _) = send(
      &app,
      "POST",
      "/movements",
      Some(json!({
        "product_id": 1,
        "quantity": quantity,
        "movement_type": "Salida",
        "timestamp": format!("2025-06-02 10:{minute:02}:00"),
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
  }

  let (status, body) =
    send(&app, "POST", "/anomalies/scan", Some(json!({ "sensitivity": 0.1 }))).await;
  assert_eq!(status, StatusCode::OK);
  let large = body["rows"]
    .as_array()
    .unwrap()
    .iter()
    .find(|r| r["quantity"] == 10_000.0)
    .unwrap();
  assert_eq!(large["anomaly"], true);
  assert!(large["motivo"].as_str().unwrap().contains("q=10000"));
  let archived = body["archived"].as_u64().unwrap();
  assert!(archived >= 1);

  let (_, again) = send(&app, "POST", "/anomalies/scan", Some(json!({ "sensitivity": 0.1 }))).await;
  assert_eq!(again["archived"], 0);

  let (_, archive) = send(&app, "GET", "/anomalies", None).await;
  assert_eq!(archive.as_array().unwrap().len() as u64, archived);
}

// ── Reconciliation ───────────────────────────────────────────────────────────

#[tokio::test]
async fn clean_store_reconciles_clean() {
  let app = seeded().await;
  let (status, body) = send(&app, "GET", "/reconcile", None).await;
  assert_eq!(status, StatusCode::OK);
  assert!(body["divergences"].as_array().unwrap().is_empty());
  assert_eq!(body["writable"], true);

  let (status, body) = send(&app, "POST", "/reconcile?repair=true", None).await;
  assert_eq!(status, StatusCode::OK);
  assert!(body["repaired"].as_array().unwrap().is_empty());
}
