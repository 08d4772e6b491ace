//! [`SqliteTokenStorage`]: the SQLite implementation of [`TokenStorage`].

use std::{
  path::Path,
  sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;

use evrent_core::{
  storage::{STORAGE_ENTRY, TokenStorage},
  token::TokenPair,
};

use crate::{Result, schema::SCHEMA};

// ─── Store ───────────────────────────────────────────────────────────────────

/// Durable token storage backed by a single SQLite file.
///
/// Writes are tiny single-row upserts, so the connection is used
/// synchronously behind a mutex.
pub struct SqliteTokenStorage {
  conn:  Mutex<rusqlite::Connection>,
  entry: String,
}

impl SqliteTokenStorage {
  /// Open (or create) the database at `path` and run schema initialisation.
  pub fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = rusqlite::Connection::open(path)?;
    Self::init(conn)
  }

  /// Open an in-memory database, useful for testing.
  pub fn open_in_memory() -> Result<Self> {
    let conn = rusqlite::Connection::open_in_memory()?;
    Self::init(conn)
  }

  fn init(conn: rusqlite::Connection) -> Result<Self> {
    conn.execute_batch(SCHEMA)?;
    Ok(Self {
      conn:  Mutex::new(conn),
      entry: STORAGE_ENTRY.to_owned(),
    })
  }

  /// Store the pair under a different entry name than [`STORAGE_ENTRY`],
  /// e.g. to keep several profiles in one file.
  pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
    self.entry = entry.into();
    self
  }

  /// When the entry was last written, if it exists.
  pub fn updated_at(&self) -> Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = self
      .conn()
      .query_row(
        "SELECT updated_at FROM client_state WHERE name = ?1",
        rusqlite::params![self.entry],
        |r| r.get(0),
      )
      .optional()?;
    Ok(
      raw
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc)),
    )
  }

  pub(crate) fn conn(&self) -> MutexGuard<'_, rusqlite::Connection> {
    self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn load_pair(&self) -> Result<Option<TokenPair>> {
    let raw: Option<String> = self
      .conn()
      .query_row(
        "SELECT value FROM client_state WHERE name = ?1",
        rusqlite::params![self.entry],
        |r| r.get(0),
      )
      .optional()?;

    match raw {
      Some(json) => match serde_json::from_str::<TokenPair>(&json) {
        Ok(pair) => Ok(Some(pair)),
        Err(e) => {
          // A corrupt entry is as good as no entry; the user signs in again.
          tracing::warn!(entry = %self.entry, error = %e, "discarding unreadable session entry");
          Ok(None)
        }
      },
      None => Ok(None),
    }
  }

  fn store_pair(&self, pair: &TokenPair) -> Result<()> {
    let json = serde_json::to_string(pair)?;
    self.conn().execute(
      "INSERT INTO client_state (name, value, updated_at) VALUES (?1, ?2, ?3)
       ON CONFLICT(name) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
      rusqlite::params![self.entry, json, Utc::now().to_rfc3339()],
    )?;
    Ok(())
  }

  fn remove_pair(&self) -> Result<()> {
    self.conn().execute(
      "DELETE FROM client_state WHERE name = ?1",
      rusqlite::params![self.entry],
    )?;
    Ok(())
  }
}

impl TokenStorage for SqliteTokenStorage {
  fn load(&self) -> evrent_core::Result<Option<TokenPair>> { Ok(self.load_pair()?) }

  fn store(&self, pair: &TokenPair) -> evrent_core::Result<()> { Ok(self.store_pair(pair)?) }

  fn remove(&self) -> evrent_core::Result<()> { Ok(self.remove_pair()?) }
}
