//! Sign-in, sign-out and session restore.
//!
//! These endpoints bypass the pipeline's refresh-and-replay: a refused
//! sign-in is a wrong password, not an expired token.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use evrent_core::{session::Session, token::TokenPair};

use crate::{
  Result,
  pipeline::{ApiRequest, Pipeline},
};

pub const SIGN_IN_PATH: &str = "/api/Auth/signin";
pub const SIGN_OUT_PATH: &str = "/api/Auth/logout";

/// Email/password credentials.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
  pub email:    String,
  pub password: String,
}

impl Credentials {
  pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
    Self {
      email:    email.into(),
      password: password.into(),
    }
  }
}

impl std::fmt::Debug for Credentials {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Credentials")
      .field("email", &self.email)
      .field("password", &"<redacted>")
      .finish()
  }
}

/// Exchange credentials for a token pair and publish the session.
///
/// A pair whose access token has no subject identifier is rejected with
/// [`crate::Error::MissingIdentityClaim`] and leaves the session unchanged.
pub(crate) async fn sign_in(pipeline: &Pipeline, credentials: &Credentials) -> Result<Arc<Session>> {
  let req = ApiRequest::post(SIGN_IN_PATH, serde_json::to_value(credentials)?);
  let payload: Value = pipeline.request_public(&req).await?.json().await?;
  let pair = TokenPair::from_payload(&payload)?;
  let session = pipeline.session().save(pair.access_token, pair.refresh_token)?;
  tracing::info!(email = %credentials.email, "signed in");
  Ok(session)
}

/// Tell the backend to revoke the refresh token, then clear the session.
/// The backend call is best effort; the local session is cleared regardless.
pub(crate) async fn sign_out(pipeline: &Pipeline) {
  let session = pipeline.session().snapshot();
  if let Some(refresh_token) = session.refresh() {
    let req = ApiRequest::post(SIGN_OUT_PATH, json!({ "refreshToken": refresh_token }));
    if let Err(e) = pipeline.request_public(&req).await {
      tracing::warn!(error = %e, "sign-out request failed; clearing local session anyway");
    }
  }

  if let Err(e) = pipeline.session().clear() {
    tracing::warn!(error = %e, "failed to remove persisted session");
  }
  tracing::info!("signed out");
}

pub(crate) fn restore(pipeline: &Pipeline) -> Result<bool> {
  let restored = pipeline.session().rehydrate()?;
  if restored {
    tracing::debug!("session restored from storage");
  }
  Ok(restored)
}
