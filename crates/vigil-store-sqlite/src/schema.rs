//! SQL schema for the Vigil SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS patients (
    patient_id  TEXT PRIMARY KEY,
    first_name  TEXT NOT NULL,
    last_name   TEXT NOT NULL,
    gender      TEXT,            -- 'Male' | 'Female' | NULL
    age         INTEGER
);

-- The window columns are the only mutable state of a test.
CREATE TABLE IF NOT EXISTS tests (
    code             TEXT PRIMARY KEY,
    name             TEXT NOT NULL,
    units            TEXT,
    good_before_secs INTEGER NOT NULL,
    good_after_secs  INTEGER NOT NULL
);

-- Observations are append-only. The single UPDATE ever issued against this
-- table sets `retracted` to 1; no row is ever deleted.
CREATE TABLE IF NOT EXISTS observations (
    seq              INTEGER PRIMARY KEY,  -- insertion sequence, tie-breaker
    patient_id       TEXT NOT NULL REFERENCES patients(patient_id),
    test_code        TEXT NOT NULL REFERENCES tests(code),
    value_json       TEXT NOT NULL,
    valid_time       TEXT NOT NULL,        -- RFC 3339 UTC
    transaction_time TEXT NOT NULL,        -- RFC 3339 UTC
    retracted        INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS observations_patient_idx ON observations(patient_id, test_code);
CREATE INDEX IF NOT EXISTS observations_valid_idx   ON observations(valid_time);

PRAGMA user_version = 1;
";
