//! Error types for `evrent-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// None of the probed subject claims were present in the access token.
  #[error("access token carries no subject identifier claim")]
  MissingIdentityClaim,

  #[error("malformed access token: {0}")]
  MalformedToken(String),

  #[error("unexpected payload shape: {0}")]
  UnexpectedPayload(String),

  #[error("storage error: {0}")]
  Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
