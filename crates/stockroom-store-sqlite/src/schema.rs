//! SQL schema for the Stockroom SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS products (
    product_id    INTEGER PRIMARY KEY,
    name          TEXT    NOT NULL,
    category      TEXT    NOT NULL,
    price         TEXT    NOT NULL,   -- decimal string
    minimum_stock INTEGER NOT NULL,
    stock         INTEGER NOT NULL    -- written only alongside a movement
);

-- The ledger is strictly append-only.
-- No UPDATE or DELETE is ever issued against this table. `seq` keeps append
-- order; `id` is not constrained so imported corruption stays detectable.
CREATE TABLE IF NOT EXISTS movements (
    seq            INTEGER PRIMARY KEY AUTOINCREMENT,
    id             INTEGER NOT NULL,
    timestamp      TEXT    NOT NULL,  -- YYYY-MM-DD HH:MM:SS, local time
    product_id     INTEGER NOT NULL,
    product_name   TEXT    NOT NULL,
    minimum_stock  INTEGER NOT NULL,
    category       TEXT    NOT NULL,
    price_per_unit TEXT    NOT NULL,
    movement_type  TEXT    NOT NULL,  -- 'Ingreso' | 'Salida'
    quantity       INTEGER NOT NULL,
    stock_before   INTEGER NOT NULL,
    stock_after    INTEGER NOT NULL
);

-- Append-only archive of detected anomalies.
CREATE TABLE IF NOT EXISTS anomalies (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    dedup_key       TEXT    NOT NULL UNIQUE,
    movement_id     INTEGER,
    timestamp       TEXT    NOT NULL,
    product_id      INTEGER,
    product_name    TEXT,
    movement_type   TEXT    NOT NULL,
    quantity        INTEGER NOT NULL,
    stock_after     INTEGER,
    anomaly_score   REAL    NOT NULL,
    motivo          TEXT    NOT NULL,
    interpretacion  TEXT    NOT NULL,
    accion_sugerida TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS movements_product_idx ON movements(product_id);
CREATE INDEX IF NOT EXISTS movements_id_idx      ON movements(id);

PRAGMA user_version = 1;
";
