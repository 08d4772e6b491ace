//! Client error type and failure classification.
//!
//! [`Error`] is `Clone`: one failure is handed to every waiter on a pending
//! token refresh and to every reader attached to an in-flight cache fetch.
//! Transport and decode failures therefore carry their message text rather
//! than the source error.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
  /// No response was received (connect, timeout, TLS, body read).
  #[error("transport error: {0}")]
  Transport(String),

  /// The backend answered with a non-success status.
  #[error("HTTP {status}: {message}")]
  Status {
    status:  u16,
    message: String,
    code:    Option<String>,
  },

  /// The token refresh itself failed; the session has been cleared.
  #[error("token refresh failed: {message}")]
  RefreshFailed {
    status:  Option<u16>,
    message: String,
  },

  #[error("decode error: {0}")]
  Decode(String),

  /// The access token carries no subject identifier claim.
  #[error("access token carries no subject identifier claim")]
  MissingIdentityClaim,

  #[error("session error: {0}")]
  Session(String),

  #[error("invalid request: {0}")]
  InvalidRequest(String),

  /// The operation was abandoned before it settled.
  #[error("cancelled: {0}")]
  Cancelled(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
  /// HTTP status carried by this failure, if any.
  pub fn status(&self) -> Option<u16> {
    match self {
      Error::Status { status, .. } => Some(*status),
      Error::RefreshFailed { status, .. } => *status,
      _ => None,
    }
  }

  /// 403 and 404 are definitive answers, never worth asking again.
  pub fn is_definitive(&self) -> bool { matches!(self.status(), Some(403 | 404)) }

  /// Whether the cache layer's retry policy may try again.
  ///
  /// Transport failures and server/semantic statuses are retried. A 401 has
  /// already been through the pipeline's refresh-and-replay; retrying it
  /// would start a second refresh cycle.
  pub fn is_retryable(&self) -> bool {
    match self {
      Error::Transport(_) => true,
      Error::Status { status, .. } => !matches!(status, 401 | 403 | 404),
      _ => false,
    }
  }

  /// Build a [`Error::Status`] from a failed response body. Envelope-shaped
  /// bodies contribute their `message` and `code`; anything else is kept
  /// verbatim.
  pub(crate) fn from_body(status: u16, body: &str) -> Self {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct ErrorBody {
      #[serde(default)]
      message: Option<String>,
      #[serde(default)]
      code:    Option<String>,
    }

    let parsed = serde_json::from_str::<ErrorBody>(body).ok();
    let code = parsed.as_ref().and_then(|b| b.code.clone());
    let message = parsed
      .and_then(|b| b.message)
      .filter(|m| !m.is_empty())
      .unwrap_or_else(|| body.trim().to_owned());

    Error::Status {
      status,
      message,
      code,
    }
  }
}

impl From<reqwest::Error> for Error {
  fn from(e: reqwest::Error) -> Self {
    if e.is_decode() {
      Error::Decode(e.to_string())
    } else if e.is_builder() {
      Error::InvalidRequest(e.to_string())
    } else {
      Error::Transport(e.to_string())
    }
  }
}

impl From<serde_json::Error> for Error {
  fn from(e: serde_json::Error) -> Self { Error::Decode(e.to_string()) }
}

impl From<evrent_core::Error> for Error {
  fn from(e: evrent_core::Error) -> Self {
    match e {
      evrent_core::Error::MissingIdentityClaim => Error::MissingIdentityClaim,
      evrent_core::Error::UnexpectedPayload(msg) => Error::Decode(msg),
      other => Error::Session(other.to_string()),
    }
  }
}
