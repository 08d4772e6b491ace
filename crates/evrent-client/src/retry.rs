//! Exponential-backoff retry for cached reads and mutations.

use std::{future::Future, time::Duration};

use crate::Result;

/// How many times a failed operation is tried again, and how long to wait
/// between tries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Attempts after the first one.
  pub max_retries: u32,
  /// Delay before the first retry; doubled for each later one.
  pub base_delay:  Duration,
  /// Cap on a single delay.
  pub max_delay:   Duration,
}

impl RetryPolicy {
  /// Reads: two retries, 1s then 2s.
  pub const fn queries() -> Self {
    Self {
      max_retries: 2,
      base_delay:  Duration::from_secs(1),
      max_delay:   Duration::from_secs(30),
    }
  }

  /// Mutations: a single retry after 1s.
  pub const fn mutations() -> Self {
    Self {
      max_retries: 1,
      base_delay:  Duration::from_secs(1),
      max_delay:   Duration::from_secs(30),
    }
  }

  /// Fail on the first error.
  pub const fn none() -> Self {
    Self {
      max_retries: 0,
      base_delay:  Duration::ZERO,
      max_delay:   Duration::ZERO,
    }
  }

  /// Delay before retry number `retry` (zero-based): `min(base * 2^retry, max)`.
  pub fn delay_for(&self, retry: u32) -> Duration {
    self
      .base_delay
      .saturating_mul(2u32.saturating_pow(retry))
      .min(self.max_delay)
  }
}

impl Default for RetryPolicy {
  fn default() -> Self { Self::queries() }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy runs out of retries. The last error is returned unchanged.
pub async fn run<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T>>,
{
  let mut retries = 0;
  loop {
    match op().await {
      Ok(value) => return Ok(value),
      Err(e) if retries < policy.max_retries && e.is_retryable() => {
        let delay = policy.delay_for(retries);
        retries += 1;
        tracing::debug!(%label, retry = retries, ?delay, error = %e, "retrying after failure");
        tokio::time::sleep(delay).await;
      }
      Err(e) => return Err(e),
    }
  }
}
