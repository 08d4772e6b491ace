//! Identity decoding from access-token claims.
//!
//! The signature is not verified here; the backend does that on every call.
//! The client only reads the claims to know who is signed in. The backend
//! emits both short JWT claim names and the long WS-Federation URIs, so every
//! field is found by probing an ordered list of claim names.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Claim names probed for the subject identifier, in priority order.
pub const SUBJECT_CLAIMS: &[&str] = &[
  "sub",
  "nameid",
  "userId",
  "UserId",
  "id",
  "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/nameidentifier",
];

/// Claim names probed for the role.
pub const ROLE_CLAIMS: &[&str] = &[
  "role",
  "roles",
  "Role",
  "http://schemas.microsoft.com/ws/2008/06/identity/claims/role",
];

/// Claim names probed for a human-readable name.
pub const NAME_CLAIMS: &[&str] = &[
  "name",
  "unique_name",
  "fullName",
  "FullName",
  "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/name",
  "email",
  "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/emailaddress",
];

/// Normalized identity of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
  pub subject_id:   String,
  /// Empty when the token carries no role claim.
  pub role:         String,
  pub display_name: String,
}

/// Decode the payload segment of a JWT into its claim map.
pub fn decode_claims(access_token: &str) -> Result<Map<String, Value>> {
  let mut segments = access_token.split('.');
  let payload = match (segments.next(), segments.next(), segments.next()) {
    (Some(_), Some(payload), Some(_)) => payload,
    _ => return Err(Error::MalformedToken("expected three segments".into())),
  };

  // Some issuers keep the base64 padding; the URL-safe engine rejects it.
  let bytes = URL_SAFE_NO_PAD
    .decode(payload.trim_end_matches('='))
    .map_err(|e| Error::MalformedToken(format!("payload is not base64url: {e}")))?;

  match serde_json::from_slice::<Value>(&bytes)? {
    Value::Object(map) => Ok(map),
    _ => Err(Error::MalformedToken("payload is not a JSON object".into())),
  }
}

/// Decode and normalize the identity carried by `access_token`.
///
/// Fails with [`Error::MissingIdentityClaim`] when no subject claim holds a
/// non-empty value.
pub fn decode_identity(access_token: &str) -> Result<Identity> {
  let claims = decode_claims(access_token)?;

  let subject_id = probe(&claims, SUBJECT_CLAIMS).ok_or(Error::MissingIdentityClaim)?;
  let role = probe(&claims, ROLE_CLAIMS).unwrap_or_default();
  let display_name = probe(&claims, NAME_CLAIMS).unwrap_or_else(|| subject_id.clone());

  Ok(Identity {
    subject_id,
    role,
    display_name,
  })
}

/// First non-empty string found under any of `names`. Arrays contribute
/// their first string element; numbers are rendered as text.
fn probe(claims: &Map<String, Value>, names: &[&str]) -> Option<String> {
  names.iter().find_map(|name| match claims.get(*name)? {
    Value::String(s) if !s.is_empty() => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    Value::Array(items) => items
      .iter()
      .find_map(|v| v.as_str().filter(|s| !s.is_empty()))
      .map(str::to_owned),
    _ => None,
  })
}

/// Build an unsigned JWT carrying `claims`. Test helper shared with the
/// downstream crates' fake backends.
pub fn unsigned_token(claims: &Value) -> String {
  let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
  let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
  format!("{header}.{payload}.sig")
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn short_claim_names() {
    let token = unsigned_token(&json!({
      "sub": "u-1",
      "role": "Admin",
      "name": "Ada"
    }));
    let id = decode_identity(&token).unwrap();
    assert_eq!(id.subject_id, "u-1");
    assert_eq!(id.role, "Admin");
    assert_eq!(id.display_name, "Ada");
  }

  #[test]
  fn long_claim_names_and_role_array() {
    let token = unsigned_token(&json!({
      "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/nameidentifier": "u-2",
      "http://schemas.microsoft.com/ws/2008/06/identity/claims/role": ["Staff", "Driver"],
      "email": "a@b.com"
    }));
    let id = decode_identity(&token).unwrap();
    assert_eq!(id.subject_id, "u-2");
    assert_eq!(id.role, "Staff");
    assert_eq!(id.display_name, "a@b.com");
  }

  #[test]
  fn probe_order_prefers_earlier_claims() {
    let token = unsigned_token(&json!({ "id": "later", "sub": "first" }));
    assert_eq!(decode_identity(&token).unwrap().subject_id, "first");
  }

  #[test]
  fn empty_subject_is_missing() {
    let token = unsigned_token(&json!({ "sub": "", "role": "Admin" }));
    assert!(matches!(decode_identity(&token), Err(Error::MissingIdentityClaim)));
  }

  #[test]
  fn display_name_falls_back_to_subject() {
    let token = unsigned_token(&json!({ "userId": 42 }));
    let id = decode_identity(&token).unwrap();
    assert_eq!(id.subject_id, "42");
    assert_eq!(id.display_name, "42");
    assert!(id.role.is_empty());
  }

  #[test]
  fn garbage_is_malformed() {
    assert!(matches!(decode_identity("not-a-jwt"), Err(Error::MalformedToken(_))));
    assert!(matches!(decode_identity("a.!!!.c"), Err(Error::MalformedToken(_))));
  }
}
