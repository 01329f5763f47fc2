//! SQL schema for the macrofeed SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS indicators (
    code        TEXT PRIMARY KEY,
    category    TEXT NOT NULL,
    name        TEXT NOT NULL,
    data_source TEXT NOT NULL,     -- 'dense' | 'sparse'
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS indicator_fields (
    code               TEXT NOT NULL REFERENCES indicators(code),
    field_name         TEXT NOT NULL,
    field_display_name TEXT NOT NULL,
    created_at         TEXT NOT NULL,
    PRIMARY KEY (code, field_name)
);

-- Upserted on (code, field_name, date); values are never NULL.
CREATE TABLE IF NOT EXISTS time_series_data (
    code       TEXT NOT NULL,
    field_name TEXT NOT NULL,
    date       TEXT NOT NULL,      -- YYYY-MM-DD
    value      REAL NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (code, field_name, date),
    FOREIGN KEY (code, field_name) REFERENCES indicator_fields(code, field_name)
);

-- Strictly append-only. No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS update_logs (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    code          TEXT NOT NULL REFERENCES indicators(code),
    field_name    TEXT,            -- NULL for an indicator-level record
    update_type   TEXT NOT NULL,   -- 'full' | 'incremental' | 'retry'
    start_date    TEXT NOT NULL,
    end_date      TEXT NOT NULL,
    records_count INTEGER NOT NULL,
    status        TEXT NOT NULL,   -- 'success' | 'failed'
    error_message TEXT,
    update_time   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS time_series_code_date_idx ON time_series_data(code, date);
CREATE INDEX IF NOT EXISTS indicators_category_idx   ON indicators(category);
CREATE INDEX IF NOT EXISTS update_logs_code_idx      ON update_logs(code, id);
CREATE INDEX IF NOT EXISTS update_logs_time_idx      ON update_logs(update_time);

PRAGMA user_version = 1;
";
