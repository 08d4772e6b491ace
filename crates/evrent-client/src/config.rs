//! Client configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::retry::RetryPolicy;

/// Runtime client configuration. Every field has a default so a partial
/// TOML file or a handful of environment variables is enough.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
  /// Backend origin, e.g. `https://api.example.com`. Paths such as
  /// `/api/Depot` are appended to it.
  pub base_url:         String,
  /// Per-request timeout.
  pub timeout_secs:     u64,
  /// Default freshness window for cached reads.
  pub stale_after_secs: u64,
  /// Default inactivity window after which an unobserved entry is dropped.
  pub evict_after_secs: u64,
  /// Page size used when a view needs the whole collection.
  pub full_page_size:   u32,
  /// First backoff delay of the cache retry policy; doubles per attempt.
  pub retry_base_ms:    u64,
  /// Upper bound on a single backoff delay.
  pub retry_max_secs:   u64,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      base_url:         "http://localhost:5000".to_string(),
      timeout_secs:     30,
      stale_after_secs: 5 * 60,
      evict_after_secs: 10 * 60,
      full_page_size:   9999,
      retry_base_ms:    1000,
      retry_max_secs:   30,
    }
  }
}

impl ClientConfig {
  pub fn new(base_url: impl Into<String>) -> Self {
    Self {
      base_url: base_url.into(),
      ..Self::default()
    }
  }

  pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }

  pub fn stale_after(&self) -> Duration { Duration::from_secs(self.stale_after_secs) }

  pub fn evict_after(&self) -> Duration { Duration::from_secs(self.evict_after_secs) }

  /// Retry policy for cached reads: two retries.
  pub fn query_retry(&self) -> RetryPolicy { self.retry_policy(2) }

  /// Retry policy for mutations: one retry.
  pub fn mutation_retry(&self) -> RetryPolicy { self.retry_policy(1) }

  fn retry_policy(&self, max_retries: u32) -> RetryPolicy {
    RetryPolicy {
      max_retries,
      base_delay: Duration::from_millis(self.retry_base_ms),
      max_delay: Duration::from_secs(self.retry_max_secs),
    }
  }
}
