//! SQL schema for the Bahi SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
///
/// `seq` columns carry creation order, which FIFO piece selection and
/// tie-breaking between equally stocked records depend on. Decimal quantities
/// are stored as normalised TEXT so no precision is lost to REAL.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS ledger_records (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    ledger_id       TEXT NOT NULL UNIQUE,
    fabric_id       TEXT NOT NULL,
    design_id       TEXT,
    factory_id      TEXT,
    matching_id     TEXT,
    kind            TEXT NOT NULL,             -- 'taka' | 'saree'
    cut             TEXT,                      -- metres per saree
    supplied_length TEXT NOT NULL DEFAULT '0',
    reserved_length TEXT NOT NULL DEFAULT '0',
    supplied_pieces INTEGER NOT NULL DEFAULT 0,
    reserved_pieces INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

-- One record per stock variant. NULL parts of the key compare equal here.
CREATE UNIQUE INDEX IF NOT EXISTS ledger_key_idx ON ledger_records (
    fabric_id,
    IFNULL(design_id, ''),
    IFNULL(factory_id, ''),
    IFNULL(matching_id, ''),
    kind,
    IFNULL(cut, '')
);

CREATE TABLE IF NOT EXISTS productions (
    seq           INTEGER PRIMARY KEY AUTOINCREMENT,
    production_id TEXT NOT NULL UNIQUE,
    date          TEXT NOT NULL,               -- YYYY-MM-DD
    factory_id    TEXT NOT NULL,
    fabric_id     TEXT NOT NULL,
    design_id     TEXT,
    kind          TEXT NOT NULL,
    payload_json  TEXT NOT NULL,
    recorded_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pieces (
    seq           INTEGER PRIMARY KEY AUTOINCREMENT,
    piece_id      TEXT NOT NULL UNIQUE,
    label         TEXT NOT NULL,
    length        TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'available',  -- 'available' | 'sold'
    fabric_id     TEXT NOT NULL,
    design_id     TEXT,
    factory_id    TEXT NOT NULL,
    production_id TEXT NOT NULL REFERENCES productions(production_id),
    challan_id    TEXT,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS orders (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id   TEXT NOT NULL UNIQUE,
    order_no   TEXT NOT NULL,
    party_id   TEXT,
    date       TEXT NOT NULL,
    status     TEXT NOT NULL,                  -- 'pending' | 'partial' | 'completed' | 'cancelled'
    lines_json TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS challans (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    challan_id TEXT NOT NULL UNIQUE,
    challan_no TEXT NOT NULL,
    order_id   TEXT NOT NULL REFERENCES orders(order_id),
    date       TEXT NOT NULL,
    lines_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS pieces_stock_idx      ON pieces(fabric_id, design_id, factory_id, status);
CREATE INDEX IF NOT EXISTS pieces_production_idx ON pieces(production_id);
CREATE INDEX IF NOT EXISTS pieces_challan_idx    ON pieces(challan_id);
CREATE INDEX IF NOT EXISTS ledger_fabric_idx     ON ledger_records(fabric_id, kind);
CREATE INDEX IF NOT EXISTS challans_order_idx    ON challans(order_id);

PRAGMA user_version = 1;
";
