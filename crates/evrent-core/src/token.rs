//! Token pairs returned by the auth endpoints.
//!
//! `signin` and `refresh-token` answer either with a bare token pair or with
//! the pair wrapped in the standard envelope. The shape is decided by an
//! explicit check: a `data` object that parses as the expected shape wins,
//! otherwise the whole payload must parse as that shape. Nothing is coerced.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{Error, Result};

/// Access/refresh token pair, also the persisted form of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
  pub access_token:  String,
  pub refresh_token: String,
}

impl TokenPair {
  pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
    Self {
      access_token:  access_token.into(),
      refresh_token: refresh_token.into(),
    }
  }

  /// Parse a sign-in response, wrapped or bare.
  pub fn from_payload(payload: &Value) -> Result<Self> {
    unwrap_payload(payload)
  }
}

/// Result of a refresh call. The backend may omit the refresh token, in
/// which case the current one stays valid.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedTokens {
  pub access_token:  String,
  #[serde(default)]
  pub refresh_token: Option<String>,
}

impl RefreshedTokens {
  /// Parse a refresh response, wrapped or bare.
  pub fn from_payload(payload: &Value) -> Result<Self> {
    let tokens: Self = unwrap_payload(payload)?;
    if tokens.access_token.is_empty() {
      return Err(Error::UnexpectedPayload("empty access token".into()));
    }
    Ok(tokens)
  }

  /// Merge with the refresh token currently held.
  pub fn into_pair(self, current_refresh_token: &str) -> TokenPair {
    let refresh_token = self
      .refresh_token
      .filter(|t| !t.is_empty())
      .unwrap_or_else(|| current_refresh_token.to_owned());
    TokenPair {
      access_token: self.access_token,
      refresh_token,
    }
  }
}

fn unwrap_payload<T: DeserializeOwned>(payload: &Value) -> Result<T> {
  if let Some(inner) = payload.get("data").filter(|d| d.is_object())
    && let Ok(parsed) = T::deserialize(inner)
  {
    return Ok(parsed);
  }
  T::deserialize(payload).map_err(|e| Error::UnexpectedPayload(e.to_string()))
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn bare_pair_parses() {
    let pair = TokenPair::from_payload(&json!({
      "accessToken": "a",
      "refreshToken": "r"
    }))
    .unwrap();
    assert_eq!(pair, TokenPair::new("a", "r"));
  }

  #[test]
  fn wrapped_pair_parses() {
    let pair = TokenPair::from_payload(&json!({
      "data": { "accessToken": "a", "refreshToken": "r" },
      "message": "ok",
      "statusCode": 200,
      "code": "SUCCESS"
    }))
    .unwrap();
    assert_eq!(pair, TokenPair::new("a", "r"));
  }

  #[test]
  fn neither_shape_is_rejected() {
    let err = TokenPair::from_payload(&json!({ "data": { "token": "a" } }));
    assert!(matches!(err, Err(Error::UnexpectedPayload(_))));
  }

  #[test]
  fn refresh_without_new_refresh_token_keeps_current() {
    let tokens = RefreshedTokens::from_payload(&json!({
      "data": { "accessToken": "new" }
    }))
    .unwrap();
    assert_eq!(tokens.into_pair("old-refresh"), TokenPair::new("new", "old-refresh"));
  }

  #[test]
  fn refresh_with_rotated_refresh_token_uses_it() {
    let tokens = RefreshedTokens::from_payload(&json!({
      "accessToken": "new",
      "refreshToken": "rotated"
    }))
    .unwrap();
    assert_eq!(tokens.into_pair("old"), TokenPair::new("new", "rotated"));
  }
}
