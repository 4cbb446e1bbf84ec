//! v001 -- Initial schema creation.
//!
//! Creates `users` and `specimens`. A specimen row keeps the full record as
//! a JSON document; the other columns are projections used for filtering,
//! sorting and aggregation and are rewritten on every save.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    name          TEXT NOT NULL,
    email         TEXT NOT NULL UNIQUE,        -- stored lower-cased
    password_hash TEXT NOT NULL,               -- PHC string (argon2id)
    role          TEXT NOT NULL,               -- ADMIN | CATALOGER | CURATOR | VIEWER
    institution   TEXT NOT NULL,
    is_active     INTEGER NOT NULL DEFAULT 1,  -- boolean 0/1
    last_login    TEXT,
    created_at    TEXT NOT NULL,               -- RFC-3339, fixed precision
    updated_at    TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Specimens
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS specimens (
    id              TEXT PRIMARY KEY NOT NULL, -- UUID v4
    occurrence_id   TEXT NOT NULL UNIQUE,
    catalog_number  TEXT,
    family          TEXT NOT NULL,
    genus           TEXT NOT NULL,
    scientific_name TEXT NOT NULL,
    country         TEXT,
    state_province  TEXT,
    year            TEXT,
    is_deleted      INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    document        TEXT NOT NULL              -- JSON SpecimenRecord
);

CREATE INDEX IF NOT EXISTS idx_specimens_active_created
    ON specimens(is_deleted, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_specimens_family ON specimens(family);
CREATE INDEX IF NOT EXISTS idx_specimens_genus ON specimens(genus);
CREATE INDEX IF NOT EXISTS idx_specimens_catalog_number ON specimens(catalog_number);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
