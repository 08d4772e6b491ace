//! SQL schema for the client-state database.
//!
//! Executed once per connection. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Named client-side state entries, one JSON document each.
CREATE TABLE IF NOT EXISTS client_state (
    name        TEXT PRIMARY KEY,
    value       TEXT NOT NULL,     -- JSON document
    updated_at  TEXT NOT NULL      -- ISO 8601 UTC
);

PRAGMA user_version = 1;
";
