//! The [`TokenStorage`] persistence seam.
//!
//! Only the raw token pair is ever persisted. The decoded identity is
//! recomputed from the access token on every load.

use std::sync::Mutex;

use crate::{Result, token::TokenPair};

/// Name of the storage entry holding the persisted token pair.
pub const STORAGE_ENTRY: &str = "auth-storage";

/// Durable client-side storage for the token pair.
///
/// Implementations are synchronous: a tiny key/value write is all a session
/// update costs, and the session store must have persisted before `save` or
/// `clear` return.
pub trait TokenStorage: Send + Sync {
  /// Return the persisted pair, if one exists.
  fn load(&self) -> Result<Option<TokenPair>>;

  /// Persist `pair`, replacing whatever was stored.
  fn store(&self, pair: &TokenPair) -> Result<()>;

  /// Remove the persisted pair. Removing an absent entry is not an error.
  fn remove(&self) -> Result<()>;
}

/// Process-local storage. Survives nothing; used in tests and for
/// throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStorage {
  slot: Mutex<Option<TokenPair>>,
}

impl MemoryStorage {
  pub fn new() -> Self { Self::default() }

  /// Storage pre-seeded with a persisted pair, as after a previous run.
  pub fn with_pair(pair: TokenPair) -> Self {
    Self {
      slot: Mutex::new(Some(pair)),
    }
  }

  fn slot(&self) -> std::sync::MutexGuard<'_, Option<TokenPair>> {
    self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

impl TokenStorage for MemoryStorage {
  fn load(&self) -> Result<Option<TokenPair>> { Ok(self.slot().clone()) }

  fn store(&self, pair: &TokenPair) -> Result<()> {
    *self.slot() = Some(pair.clone());
    Ok(())
  }

  fn remove(&self) -> Result<()> {
    *self.slot() = None;
    Ok(())
  }
}
