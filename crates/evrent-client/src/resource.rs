//! REST resources of the rental backend and their uncached endpoint calls.
//!
//! Each collection resource follows the same shape: `GET {path}` returns a
//! paginated list envelope, `GET {path}/{id}` an item envelope, and
//! `POST`/`PUT`/`DELETE` mutate. Nested per-user and per-order collections
//! are separate functions below.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use evrent_core::{
  account::{Membership, MembershipTier, SystemConfig},
  booking::{HandoverInspection, OrderBooking, ReturnInspection, Settlement, Transaction},
  envelope::{Envelope, ListEnvelope, Page},
  fleet::{Amenity, Car, DemandForecast, Depot, Manufacturer, Model},
};

use crate::{
  Result,
  cache::QueryKey,
  pipeline::{ApiRequest, Pipeline},
};

// ─── Resources ───────────────────────────────────────────────────────────────

/// A collection resource: its cache family and its endpoint path.
pub trait ApiResource: DeserializeOwned + Clone + Send + Sync + 'static {
  /// Cache family; mutations invalidate every key of it.
  const FAMILY: &'static str;
  const PATH: &'static str;
}

macro_rules! api_resource {
  ($($ty:ty => $family:literal, $path:literal;)*) => {
    $(
      impl ApiResource for $ty {
        const FAMILY: &'static str = $family;
        const PATH: &'static str = $path;
      }
    )*
  };
}

api_resource! {
  Car            => "car",            "/api/CarEV";
  Model          => "model",          "/api/Model";
  Depot          => "depot",          "/api/Depot";
  Manufacturer   => "manufacturer",   "/api/CarManufacture";
  Amenity        => "amenity",        "/api/Amenity";
  MembershipTier => "membershipTier", "/api/Membership";
  SystemConfig   => "systemConfig",   "/api/SystemConfig";
  OrderBooking   => "orderBooking",   "/api/OrderBooking";
}

/// Cache families of the nested collections.
pub mod family {
  pub const HANDOVER: &str = "handover";
  pub const RETURN: &str = "return";
  pub const SETTLEMENT: &str = "settlement";
  pub const TRANSACTION: &str = "transaction";
  pub const MEMBERSHIP: &str = "membership";
  pub const FORECAST: &str = "forecast";
}

// ─── List queries ────────────────────────────────────────────────────────────

/// Pagination and filters of a list request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
  pub page_number: Option<u32>,
  pub page_size:   Option<u32>,
  /// Server-side filters, sent verbatim as query parameters.
  pub filters:     BTreeMap<String, String>,
}

impl ListQuery {
  pub fn new() -> Self { Self::default() }

  pub fn page(page_number: u32, page_size: u32) -> Self {
    Self {
      page_number: Some(page_number),
      page_size: Some(page_size),
      ..Self::default()
    }
  }

  /// The whole collection in one page of `page_size`.
  pub fn all(page_size: u32) -> Self { Self::page(1, page_size) }

  pub fn filter(mut self, name: impl Into<String>, value: impl ToString) -> Self {
    self.filters.insert(name.into(), value.to_string());
    self
  }

  pub fn to_pairs(&self) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(self.filters.len() + 2);
    if let Some(n) = self.page_number {
      pairs.push(("pageNumber".to_owned(), n.to_string()));
    }
    if let Some(n) = self.page_size {
      pairs.push(("pageSize".to_owned(), n.to_string()));
    }
    pairs.extend(self.filters.iter().map(|(k, v)| (k.clone(), v.clone())));
    pairs
  }

  /// Cache key of this query within `family`.
  pub fn key(&self, family: &str) -> QueryKey {
    self
      .to_pairs()
      .into_iter()
      .fold(QueryKey::new(family).scope("list"), |key, (k, v)| key.param(k, v))
  }
}

/// Nested collections come back either paginated or as a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum Items<T> {
  Page(Page<T>),
  Plain(Vec<T>),
}

impl<T> Items<T> {
  fn into_vec(self) -> Vec<T> {
    match self {
      Items::Page(page) => page.items,
      Items::Plain(items) => items,
    }
  }
}

// ─── Collection endpoints ────────────────────────────────────────────────────

/// `GET {PATH}` with pagination and filters.
pub async fn list<T: ApiResource>(pipeline: &Pipeline, query: &ListQuery) -> Result<Page<T>> {
  let req = ApiRequest::get(T::PATH).with_query(query.to_pairs());
  let envelope: ListEnvelope<T> = pipeline.request_json(&req).await?;
  Ok(envelope.data)
}

/// `GET {PATH}/{id}`.
pub async fn get<T: ApiResource>(pipeline: &Pipeline, id: Uuid) -> Result<T> {
  let req = ApiRequest::get(format!("{}/{id}", T::PATH));
  let envelope: Envelope<T> = pipeline.request_json(&req).await?;
  Ok(envelope.data)
}

/// `POST {PATH}`.
pub async fn create<T: ApiResource, B: Serialize + ?Sized>(pipeline: &Pipeline, body: &B) -> Result<T> {
  let req = ApiRequest::post(T::PATH, serde_json::to_value(body)?);
  let envelope: Envelope<T> = pipeline.request_json(&req).await?;
  Ok(envelope.data)
}

/// `PUT {PATH}/{id}`.
pub async fn update<T: ApiResource, B: Serialize + ?Sized>(
  pipeline: &Pipeline,
  id: Uuid,
  body: &B,
) -> Result<T> {
  let req = ApiRequest::put(format!("{}/{id}", T::PATH), serde_json::to_value(body)?);
  let envelope: Envelope<T> = pipeline.request_json(&req).await?;
  Ok(envelope.data)
}

/// `DELETE {PATH}/{id}`.
pub async fn delete<T: ApiResource>(pipeline: &Pipeline, id: Uuid) -> Result<()> {
  pipeline
    .request_empty(&ApiRequest::delete(format!("{}/{id}", T::PATH)))
    .await
}

// ─── Nested endpoints ────────────────────────────────────────────────────────

/// `GET /api/OrderBooking/user/{id}`: one page of a user's orders.
pub async fn orders_for_user(
  pipeline: &Pipeline,
  user_id: Uuid,
  query: &ListQuery,
) -> Result<Page<OrderBooking>> {
  let req = ApiRequest::get(format!("/api/OrderBooking/user/{user_id}")).with_query(query.to_pairs());
  let envelope: ListEnvelope<OrderBooking> = pipeline.request_json(&req).await?;
  Ok(envelope.data)
}

/// `GET /api/Membership/user/{id}`.
pub async fn membership_for_user(pipeline: &Pipeline, user_id: Uuid) -> Result<Membership> {
  let req = ApiRequest::get(format!("/api/Membership/user/{user_id}"));
  let envelope: Envelope<Membership> = pipeline.request_json(&req).await?;
  Ok(envelope.data)
}

/// `GET /api/Transaction/user/{id}`.
pub async fn transactions_for_user(pipeline: &Pipeline, user_id: Uuid) -> Result<Vec<Transaction>> {
  nested(pipeline, format!("/api/Transaction/user/{user_id}")).await
}

/// `GET /api/Handover/order/{id}`.
pub async fn handovers_for_order(pipeline: &Pipeline, order_id: Uuid) -> Result<Vec<HandoverInspection>> {
  nested(pipeline, format!("/api/Handover/order/{order_id}")).await
}

/// `GET /api/Return/order/{id}`.
pub async fn returns_for_order(pipeline: &Pipeline, order_id: Uuid) -> Result<Vec<ReturnInspection>> {
  nested(pipeline, format!("/api/Return/order/{order_id}")).await
}

/// `GET /api/Return/settlement/order/{id}`.
pub async fn settlements_for_order(pipeline: &Pipeline, order_id: Uuid) -> Result<Vec<Settlement>> {
  nested(pipeline, format!("/api/Return/settlement/order/{order_id}")).await
}

/// `GET /api/Depot/{id}/forecast`.
pub async fn forecast_for_depot(pipeline: &Pipeline, depot_id: Uuid) -> Result<DemandForecast> {
  let req = ApiRequest::get(format!("/api/Depot/{depot_id}/forecast"));
  let envelope: Envelope<DemandForecast> = pipeline.request_json(&req).await?;
  Ok(envelope.data)
}

async fn nested<T: DeserializeOwned>(pipeline: &Pipeline, path: String) -> Result<Vec<T>> {
  let envelope: Envelope<Items<T>> = pipeline.request_json(&ApiRequest::get(path)).await?;
  Ok(envelope.data.into_vec())
}
