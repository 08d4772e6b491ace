//! The authenticated request pipeline.
//!
//! Every backend call goes through [`Pipeline::request`]: the current access
//! token is attached as a bearer credential, and an authorization failure is
//! recovered by one coordinated token refresh followed by a single replay of
//! the original request.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use evrent_core::{session::SessionStore, token::RefreshedTokens};

use crate::{
  ClientConfig, Error, Result,
  refresh::{Entry, RefreshGate},
};

/// Token refresh endpoint. Called directly, never through the pipeline.
pub const REFRESH_PATH: &str = "/api/Auth/refresh-token";

// ─── Requests ────────────────────────────────────────────────────────────────

/// A fully described request that can be sent again verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
  pub method: Method,
  /// Path relative to the configured origin, e.g. `/api/Depot`.
  pub path:   String,
  pub query:  Vec<(String, String)>,
  pub body:   Option<Value>,
}

impl ApiRequest {
  pub fn new(method: Method, path: impl Into<String>) -> Self {
    Self {
      method,
      path: path.into(),
      query: Vec::new(),
      body: None,
    }
  }

  pub fn get(path: impl Into<String>) -> Self { Self::new(Method::GET, path) }

  pub fn delete(path: impl Into<String>) -> Self { Self::new(Method::DELETE, path) }

  pub fn post(path: impl Into<String>, body: Value) -> Self {
    Self::new(Method::POST, path).with_body(body)
  }

  pub fn put(path: impl Into<String>, body: Value) -> Self {
    Self::new(Method::PUT, path).with_body(body)
  }

  pub fn with_body(mut self, body: Value) -> Self {
    self.body = Some(body);
    self
  }

  pub fn with_query(mut self, pairs: impl IntoIterator<Item = (String, String)>) -> Self {
    self.query.extend(pairs);
    self
  }
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

/// HTTP transport bound to one origin and one session.
pub struct Pipeline {
  http:     reqwest::Client,
  base_url: String,
  session:  Arc<SessionStore>,
  gate:     RefreshGate,
}

impl Pipeline {
  pub fn new(config: &ClientConfig, session: Arc<SessionStore>) -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(config.timeout())
      .build()
      .map_err(|e| Error::InvalidRequest(format!("building HTTP client: {e}")))?;
    Ok(Self {
      http,
      base_url: config.base_url.trim_end_matches('/').to_owned(),
      session,
      gate: RefreshGate::new(),
    })
  }

  pub fn session(&self) -> &Arc<SessionStore> { &self.session }

  pub fn base_url(&self) -> &str { &self.base_url }

  /// Send `req` with the session's bearer token and return the successful
  /// response.
  ///
  /// On a 401 the token is refreshed (or an outstanding refresh is joined)
  /// and the request is replayed exactly once with the resulting token. A
  /// failure of the replay, including a second 401, is returned as is.
  pub async fn request(&self, req: &ApiRequest) -> Result<reqwest::Response> {
    let session = self.session.snapshot();
    let used = session.access_token.clone();
    let response = self.dispatch(req, session.bearer()).await?;
    if response.status() != StatusCode::UNAUTHORIZED {
      return Self::ensure_success(response).await;
    }

    let refused = Self::failure(response).await;
    tracing::debug!(method = %req.method, path = %req.path, "request refused; recovering session");
    let token = self.recover(&used, refused).await?;

    let response = self.dispatch(req, Some(&token)).await?;
    Self::ensure_success(response).await
  }

  /// [`request`](Self::request), decoding the body as JSON.
  pub async fn request_json<T: DeserializeOwned>(&self, req: &ApiRequest) -> Result<T> {
    let response = self.request(req).await?;
    Ok(response.json::<T>().await?)
  }

  /// [`request`](Self::request), discarding the body.
  pub async fn request_empty(&self, req: &ApiRequest) -> Result<()> {
    self.request(req).await.map(drop)
  }

  /// Send `req` without credentials and without session recovery. Used by
  /// the sign-in and sign-out endpoints.
  pub async fn request_public(&self, req: &ApiRequest) -> Result<reqwest::Response> {
    let response = self.dispatch(req, None).await?;
    Self::ensure_success(response).await
  }

  // ─── Recovery ──────────────────────────────────────────────────────────────

  /// Obtain a token to replay with after `used` was refused.
  async fn recover(&self, used: &str, refused: Error) -> Result<String> {
    if self.session.snapshot().refresh().is_none() {
      tracing::info!("no refresh token available; clearing session");
      self.clear_session();
      return Err(refused);
    }

    match self
      .gate
      .enter(used, || self.session.snapshot().access_token.clone())
    {
      Entry::Current(token) => Ok(token),
      Entry::Wait(waiter) => waiter.wait().await,
      Entry::Lead(leader) => {
        let outcome = self.refresh().await;
        leader.settle(outcome.clone());
        outcome
      }
    }
  }

  /// Exchange the stored refresh token for a new pair and publish it to the
  /// session. Any failure clears the session.
  async fn refresh(&self) -> Result<String> {
    let current = self.session.snapshot();
    let Some(refresh_token) = current.refresh() else {
      self.clear_session();
      return Err(Error::RefreshFailed {
        status:  None,
        message: "no refresh token available".into(),
      });
    };

    tracing::info!("refreshing access token");
    let req = ApiRequest::post(REFRESH_PATH, json!({ "refreshToken": refresh_token }));
    let result: Result<String> = async {
      let response = self.dispatch(&req, None).await?;
      let payload: Value = Self::ensure_success(response).await?.json().await?;
      let pair = RefreshedTokens::from_payload(&payload)?.into_pair(refresh_token);
      let session = self.session.save(pair.access_token, pair.refresh_token)?;
      Ok(session.access_token.clone())
    }
    .await;

    match result {
      Ok(token) => {
        tracing::info!("access token refreshed");
        Ok(token)
      }
      Err(e) => {
        tracing::warn!(error = %e, "token refresh failed; clearing session");
        self.clear_session();
        Err(Error::RefreshFailed {
          status:  e.status(),
          message: e.to_string(),
        })
      }
    }
  }

  fn clear_session(&self) {
    if let Err(e) = self.session.clear() {
      tracing::warn!(error = %e, "failed to remove persisted session");
    }
  }

  // ─── Transport ─────────────────────────────────────────────────────────────

  async fn dispatch(&self, req: &ApiRequest, bearer: Option<&str>) -> Result<reqwest::Response> {
    let url = format!("{}{}", self.base_url, req.path);
    let mut builder = self.http.request(req.method.clone(), url);
    if !req.query.is_empty() {
      builder = builder.query(&req.query);
    }
    if let Some(body) = &req.body {
      builder = builder.json(body);
    }
    if let Some(token) = bearer {
      builder = builder.bearer_auth(token);
    }

    tracing::debug!(
      method = %req.method,
      path = %req.path,
      authenticated = bearer.is_some(),
      "sending request"
    );
    Ok(builder.send().await?)
  }

  async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
      Ok(response)
    } else {
      Err(Self::failure(response).await)
    }
  }

  async fn failure(response: reqwest::Response) -> Error {
    let status = response.status().as_u16();
    match response.text().await {
      Ok(body) => Error::from_body(status, &body),
      Err(e) => Error::Status {
        status,
        message: format!("unreadable error body: {e}"),
        code: None,
      },
    }
  }
}

impl std::fmt::Debug for Pipeline {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Pipeline")
      .field("base_url", &self.base_url)
      .field("refresh_pending", &self.gate.is_pending())
      .finish_non_exhaustive()
  }
}
