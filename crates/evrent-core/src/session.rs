//! The Session Store, the single source of truth for authentication state.
//!
//! A [`SessionStore`] is an explicit object shared by `Arc`, not a global.
//! Every write replaces the whole [`Session`] snapshot atomically, so readers
//! never observe a half-updated session. The only writers are [`save`],
//! [`clear`] and [`rehydrate`] (the request pipeline's refresh paths go
//! through the first two).
//!
//! [`save`]: SessionStore::save
//! [`clear`]: SessionStore::clear
//! [`rehydrate`]: SessionStore::rehydrate

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::{
  Error, Result,
  claims::{Identity, decode_claims, decode_identity},
  storage::{MemoryStorage, TokenStorage},
  token::TokenPair,
};

/// Snapshot of the authentication state.
///
/// `is_authenticated` is true iff both tokens are non-empty and the access
/// token decoded into an [`Identity`] with a non-empty subject.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
  pub is_authenticated: bool,
  pub access_token:     String,
  pub refresh_token:    String,
  pub identity:         Option<Identity>,
}

impl Session {
  /// The empty, unauthenticated session.
  pub fn empty() -> Self { Self::default() }

  /// Access token to attach as a bearer credential, if any.
  pub fn bearer(&self) -> Option<&str> {
    (!self.access_token.is_empty()).then_some(self.access_token.as_str())
  }

  /// Refresh token, if any.
  pub fn refresh(&self) -> Option<&str> {
    (!self.refresh_token.is_empty()).then_some(self.refresh_token.as_str())
  }

  fn authenticated(pair: TokenPair, identity: Identity) -> Self {
    Self {
      is_authenticated: true,
      access_token:     pair.access_token,
      refresh_token:    pair.refresh_token,
      identity:         Some(identity),
    }
  }
}

/// Process-wide holder of the current [`Session`], persisted through a
/// [`TokenStorage`].
pub struct SessionStore {
  current: ArcSwap<Session>,
  storage: Arc<dyn TokenStorage>,
}

impl SessionStore {
  /// An empty store backed by `storage`. Call [`rehydrate`](Self::rehydrate)
  /// once at startup to pick up a persisted pair.
  pub fn new(storage: Arc<dyn TokenStorage>) -> Self {
    Self {
      current: ArcSwap::from_pointee(Session::empty()),
      storage,
    }
  }

  /// An empty store backed by [`MemoryStorage`].
  pub fn in_memory() -> Self { Self::new(Arc::new(MemoryStorage::new())) }

  /// The current snapshot. Cheap; never blocks writers.
  pub fn snapshot(&self) -> Arc<Session> { self.current.load_full() }

  pub fn is_authenticated(&self) -> bool { self.current.load().is_authenticated }

  /// Decode `access_token`, then persist the pair and publish the new
  /// authenticated session.
  ///
  /// On [`Error::MissingIdentityClaim`] the session is left untouched and
  /// nothing is persisted; the caller must treat the login as failed. The
  /// rejected pair itself is only written at `trace` level.
  pub fn save(
    &self,
    access_token: impl Into<String>,
    refresh_token: impl Into<String>,
  ) -> Result<Arc<Session>> {
    let pair = TokenPair::new(access_token, refresh_token);
    let identity = match Self::validate(&pair) {
      Ok(identity) => identity,
      Err(Error::MissingIdentityClaim) => {
        let present: Vec<String> = decode_claims(&pair.access_token)
          .map(|claims| claims.keys().cloned().collect())
          .unwrap_or_default();
        tracing::warn!(
          access_token_len = pair.access_token.len(),
          refresh_token_len = pair.refresh_token.len(),
          claims = ?present,
          "token pair rejected: no subject identifier claim"
        );
        tracing::trace!(
          access_token = %pair.access_token,
          refresh_token = %pair.refresh_token,
          "rejected token pair"
        );
        return Err(Error::MissingIdentityClaim);
      }
      Err(e) => return Err(e),
    };

    self.storage.store(&pair)?;
    let session = Arc::new(Session::authenticated(pair, identity));
    self.current.store(Arc::clone(&session));
    tracing::debug!(
      subject = %session.identity.as_ref().map(|i| i.subject_id.as_str()).unwrap_or_default(),
      "session saved"
    );
    Ok(session)
  }

  /// Reset to the empty session and drop the persisted pair.
  ///
  /// The in-memory reset always happens; a storage failure is still reported.
  pub fn clear(&self) -> Result<()> {
    self.current.store(Arc::new(Session::empty()));
    self.storage.remove()
  }

  /// Load the persisted pair, if any, and re-derive the session from it.
  ///
  /// Returns `Ok(false)` when nothing was persisted. A pair that no longer
  /// decodes clears everything and returns the decode error.
  pub fn rehydrate(&self) -> Result<bool> {
    match self.storage.load()? {
      Some(pair) => self.rehydrate_from(pair).map(|_| true),
      None => Ok(false),
    }
  }

  /// Re-derive the session from a persisted pair.
  pub fn rehydrate_from(&self, persisted: TokenPair) -> Result<Arc<Session>> {
    match Self::validate(&persisted) {
      Ok(identity) => {
        let session = Arc::new(Session::authenticated(persisted, identity));
        self.current.store(Arc::clone(&session));
        Ok(session)
      }
      Err(e) => {
        tracing::warn!(error = %e, "persisted session no longer decodes; clearing");
        if let Err(clear_err) = self.clear() {
          tracing::warn!(error = %clear_err, "failed to remove persisted session");
        }
        Err(e)
      }
    }
  }

  fn validate(pair: &TokenPair) -> Result<Identity> {
    if pair.access_token.is_empty() || pair.refresh_token.is_empty() {
      return Err(Error::MalformedToken("empty token".into()));
    }
    decode_identity(&pair.access_token)
  }
}

impl std::fmt::Debug for SessionStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SessionStore")
      .field("is_authenticated", &self.is_authenticated())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::claims::unsigned_token;

  fn token(sub: &str) -> String { unsigned_token(&json!({ "sub": sub, "role": "Customer" })) }

  #[test]
  fn save_authenticates_and_persists() {
    let storage = Arc::new(MemoryStorage::new());
    let store = SessionStore::new(storage.clone());

    let session = store.save(token("u-1"), "r-1").unwrap();
    assert!(session.is_authenticated);
    assert_eq!(session.identity.as_ref().unwrap().subject_id, "u-1");
    assert_eq!(storage.load().unwrap(), Some(TokenPair::new(token("u-1"), "r-1")));
  }

  #[test]
  fn missing_subject_leaves_session_untouched() {
    let storage = Arc::new(MemoryStorage::new());
    let store = SessionStore::new(storage.clone());
    let no_sub = unsigned_token(&json!({ "role": "Admin" }));

    let err = store.save(no_sub, "r").unwrap_err();
    assert!(matches!(err, Error::MissingIdentityClaim));
    assert!(!store.is_authenticated());
    assert_eq!(*store.snapshot(), Session::empty());
    assert_eq!(storage.load().unwrap(), None);
  }

  #[derive(Clone, Default)]
  struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

  impl std::io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
      self.0.lock().unwrap().extend_from_slice(buf);
      Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> { Ok(()) }
  }

  #[test]
  fn rejected_pair_is_traced_only_at_trace_level() {
    let no_sub = unsigned_token(&json!({ "role": "Admin" }));
    let capture = |level| {
      let out = Captured::default();
      let writer = out.clone();
      let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
      tracing::subscriber::with_default(subscriber, || {
        let _ = SessionStore::in_memory().save(no_sub.clone(), "r-secret");
      });
      let bytes = out.0.lock().unwrap().clone();
      String::from_utf8(bytes).unwrap()
    };

    let debug = capture(tracing::Level::DEBUG);
    assert!(debug.contains("no subject identifier claim"));
    assert!(!debug.contains("r-secret"));

    let trace = capture(tracing::Level::TRACE);
    assert!(trace.contains("r-secret"));
    assert!(trace.contains(&no_sub));
  }

  #[test]
  fn clear_resets_and_unpersists() {
    let storage = Arc::new(MemoryStorage::new());
    let store = SessionStore::new(storage.clone());
    store.save(token("u-1"), "r-1").unwrap();

    store.clear().unwrap();
    assert_eq!(*store.snapshot(), Session::empty());
    assert_eq!(storage.load().unwrap(), None);
  }

  #[test]
  fn rehydrate_recomputes_identity() {
    let storage = Arc::new(MemoryStorage::with_pair(TokenPair::new(token("u-9"), "r-9")));
    let store = SessionStore::new(storage);

    assert!(store.rehydrate().unwrap());
    let session = store.snapshot();
    assert!(session.is_authenticated);
    assert_eq!(session.identity.as_ref().unwrap().subject_id, "u-9");
  }

  #[test]
  fn rehydrate_with_nothing_persisted() {
    let store = SessionStore::in_memory();
    assert!(!store.rehydrate().unwrap());
    assert!(!store.is_authenticated());
  }

  #[test]
  fn rehydrate_failure_clears_everything() {
    let storage = Arc::new(MemoryStorage::with_pair(TokenPair::new("garbage", "r")));
    let store = SessionStore::new(storage.clone());

    assert!(store.rehydrate().is_err());
    assert_eq!(*store.snapshot(), Session::empty());
    assert_eq!(storage.load().unwrap(), None);
  }

  #[test]
  fn snapshots_are_immutable_after_overwrite() {
    let store = SessionStore::in_memory();
    store.save(token("u-1"), "r-1").unwrap();
    let before = store.snapshot();
    store.save(token("u-2"), "r-2").unwrap();

    assert_eq!(before.identity.as_ref().unwrap().subject_id, "u-1");
    assert_eq!(store.snapshot().identity.as_ref().unwrap().subject_id, "u-2");
  }
}
