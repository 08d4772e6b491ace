//! Single-flight coordination of access-token refreshes.
//!
//! At most one refresh call may be outstanding. The first request to hit an
//! authorization failure becomes the [`Leader`] and performs the refresh;
//! every request that fails while it is outstanding becomes a [`Waiter`]
//! subscribed to the same broadcast and receives the leader's outcome exactly
//! once. A request whose failure arrives after a refresh already replaced the
//! token it used gets [`Entry::Current`] and replays straight away.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::broadcast;

use crate::{Error, Result};

/// What a refresh resolves to: the new access token, or the refresh error.
pub type RefreshOutcome = Result<String>;

/// The pending-refresh singleton of one pipeline.
#[derive(Debug, Default)]
pub struct RefreshGate {
  pending: Mutex<Option<broadcast::Sender<RefreshOutcome>>>,
}

/// Role handed to a request that needs a fresh token.
pub enum Entry<'a> {
  /// The session already holds a newer token than the one that was refused.
  Current(String),
  /// A refresh is outstanding; wait for its outcome.
  Wait(Waiter),
  /// No refresh is outstanding; the caller must perform it.
  Lead(Leader<'a>),
}

impl RefreshGate {
  pub fn new() -> Self { Self::default() }

  /// Join the outstanding refresh, or become the one that performs it.
  ///
  /// `current_token` is read under the gate's lock: a refresh publishes its
  /// token to the session before it releases the gate, so a caller that
  /// finds no refresh outstanding but a changed token knows a refresh
  /// completed after its request was sent.
  pub fn enter(&self, used_token: &str, current_token: impl FnOnce() -> String) -> Entry<'_> {
    let mut pending = self.lock();
    if let Some(tx) = pending.as_ref() {
      return Entry::Wait(Waiter { rx: tx.subscribe() });
    }

    let current = current_token();
    if !current.is_empty() && current != used_token {
      return Entry::Current(current);
    }

    let (tx, _) = broadcast::channel(1);
    *pending = Some(tx.clone());
    Entry::Lead(Leader { gate: self, tx })
  }

  /// Whether a refresh is currently outstanding.
  pub fn is_pending(&self) -> bool { self.lock().is_some() }

  fn lock(&self) -> MutexGuard<'_, Option<broadcast::Sender<RefreshOutcome>>> {
    self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

/// A request suspended on someone else's refresh.
pub struct Waiter {
  rx: broadcast::Receiver<RefreshOutcome>,
}

impl Waiter {
  /// Suspend until the outstanding refresh settles.
  pub async fn wait(mut self) -> RefreshOutcome {
    match self.rx.recv().await {
      Ok(outcome) => outcome,
      // The leader went away without settling (its task was dropped).
      Err(_) => Err(Error::Cancelled("token refresh abandoned".into())),
    }
  }
}

/// The request performing the refresh. Dropping it without calling
/// [`settle`](Leader::settle) releases the gate and fails every waiter with
/// [`Error::Cancelled`].
pub struct Leader<'a> {
  gate: &'a RefreshGate,
  tx:   broadcast::Sender<RefreshOutcome>,
}

impl Leader<'_> {
  /// Release the gate and deliver `outcome` to every waiter. Returns how many
  /// waiters received it.
  pub fn settle(self, outcome: RefreshOutcome) -> usize {
    self.release();
    self.tx.send(outcome).unwrap_or(0)
  }

  /// Clear the gate if it still holds this leader's channel. A later
  /// refresh may already own it.
  fn release(&self) {
    let mut pending = self.gate.lock();
    if pending.as_ref().is_some_and(|tx| tx.same_channel(&self.tx)) {
      pending.take();
    }
  }
}

impl Drop for Leader<'_> {
  fn drop(&mut self) {
    // Dropping `tx` afterwards closes the channel for unsettled waiters.
    self.release();
  }
}
