//! [`Client`], the entry point tying session, pipeline and cache together.

use std::{future::Future, marker::PhantomData, sync::Arc};

use serde::Serialize;
use uuid::Uuid;

use evrent_core::{
  account::Membership,
  booking::{HandoverInspection, OrderBooking, ReturnInspection, Settlement, Transaction},
  envelope::Page,
  fleet::DemandForecast,
  session::{Session, SessionStore},
};

use crate::{
  ClientConfig, Result,
  auth::{self, Credentials},
  cache::{QueryCache, QueryKey, QueryOptions},
  hooks::Aggregations,
  pipeline::Pipeline,
  resource::{self, ApiResource, ListQuery, family},
};

/// Handle to the backend. Cheap to clone; clones share the session, the
/// pipeline (and with it the pending-refresh singleton) and the cache.
#[derive(Clone, Debug)]
pub struct Client {
  inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
  config:   ClientConfig,
  pipeline: Pipeline,
  cache:    QueryCache,
}

impl Client {
  pub fn new(config: ClientConfig, session: Arc<SessionStore>) -> Result<Self> {
    let pipeline = Pipeline::new(&config, session)?;
    tracing::debug!(base_url = %pipeline.base_url(), "client ready");
    Ok(Self {
      inner: Arc::new(Inner {
        config,
        pipeline,
        cache: QueryCache::new(),
      }),
    })
  }

  pub fn config(&self) -> &ClientConfig { &self.inner.config }

  pub fn session(&self) -> &Arc<SessionStore> { self.inner.pipeline.session() }

  pub fn pipeline(&self) -> &Pipeline { &self.inner.pipeline }

  pub fn cache(&self) -> &QueryCache { &self.inner.cache }

  /// Default options for cached reads, from the configuration.
  pub fn query_options(&self) -> QueryOptions {
    let config = self.config();
    QueryOptions {
      stale_after: config.stale_after(),
      evict_after: config.evict_after(),
      retry: config.query_retry(),
      ..QueryOptions::default()
    }
  }

  /// Query for a whole collection in one page.
  pub fn full_list(&self) -> ListQuery { ListQuery::all(self.config().full_page_size) }

  pub fn resource<T: ApiResource>(&self) -> ResourceClient<T> {
    ResourceClient {
      client:  self.clone(),
      _marker: PhantomData,
    }
  }

  pub fn aggregations(&self) -> Aggregations { Aggregations::new(self.clone()) }

  // ─── Session ───────────────────────────────────────────────────────────────

  /// Sign in and establish the session.
  pub async fn login(&self, credentials: &Credentials) -> Result<Arc<Session>> {
    let session = auth::sign_in(self.pipeline(), credentials).await?;
    // Cached reads belong to whoever was signed in before.
    self.cache().clear();
    Ok(session)
  }

  /// Sign out. Always ends with an empty session and an empty cache.
  pub async fn logout(&self) {
    auth::sign_out(self.pipeline()).await;
    self.cache().clear();
  }

  /// Re-establish the session from storage. Returns whether one was found.
  pub fn restore_session(&self) -> Result<bool> { auth::restore(self.pipeline()) }

  // ─── Nested collections ────────────────────────────────────────────────────

  /// One page of a user's orders.
  pub async fn orders_for_user(&self, user_id: Uuid, query: &ListQuery) -> Result<Page<OrderBooking>> {
    let key = query.key(OrderBooking::FAMILY).scope("user").scope(user_id);
    let query = query.clone();
    self
      .cached(key, move |c| {
        let query = query.clone();
        async move { resource::orders_for_user(c.pipeline(), user_id, &query).await }
      })
      .await
  }

  pub async fn membership_for_user(&self, user_id: Uuid) -> Result<Membership> {
    let key = QueryKey::new(family::MEMBERSHIP).scope("user").scope(user_id);
    self
      .cached(key, move |c| async move { resource::membership_for_user(c.pipeline(), user_id).await })
      .await
  }

  pub async fn transactions_for_user(&self, user_id: Uuid) -> Result<Vec<Transaction>> {
    let key = QueryKey::new(family::TRANSACTION).scope("user").scope(user_id);
    self
      .cached(key, move |c| async move { resource::transactions_for_user(c.pipeline(), user_id).await })
      .await
  }

  pub async fn handovers_for_order(&self, order_id: Uuid) -> Result<Vec<HandoverInspection>> {
    let key = QueryKey::new(family::HANDOVER).scope("order").scope(order_id);
    self
      .cached(key, move |c| async move { resource::handovers_for_order(c.pipeline(), order_id).await })
      .await
  }

  pub async fn returns_for_order(&self, order_id: Uuid) -> Result<Vec<ReturnInspection>> {
    let key = QueryKey::new(family::RETURN).scope("order").scope(order_id);
    self
      .cached(key, move |c| async move { resource::returns_for_order(c.pipeline(), order_id).await })
      .await
  }

  pub async fn settlements_for_order(&self, order_id: Uuid) -> Result<Vec<Settlement>> {
    let key = QueryKey::new(family::SETTLEMENT).scope("order").scope(order_id);
    self
      .cached(key, move |c| async move { resource::settlements_for_order(c.pipeline(), order_id).await })
      .await
  }

  pub async fn forecast(&self, depot_id: Uuid) -> Result<DemandForecast> {
    let key = QueryKey::new(family::FORECAST).scope("depot").scope(depot_id);
    self
      .cached(key, move |c| async move { resource::forecast_for_depot(c.pipeline(), depot_id).await })
      .await
  }

  /// Cached read with the default options. `fetch` gets its own handle to
  /// the client since the fetch outlives the caller's borrow.
  pub(crate) async fn cached<T, F, Fut>(&self, key: QueryKey, fetch: F) -> Result<T>
  where
    T: Clone + Send + Sync + 'static,
    F: Fn(Client) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    let client = self.clone();
    let options = self.query_options();
    self
      .cache()
      .read(key, &options, move || fetch(client.clone()))
      .await
  }
}

// ─── Resource clients ────────────────────────────────────────────────────────

/// Cached reads and cache-invalidating mutations for one resource.
pub struct ResourceClient<T> {
  client:  Client,
  _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ResourceClient<T> {
  fn clone(&self) -> Self {
    Self {
      client:  self.client.clone(),
      _marker: PhantomData,
    }
  }
}

impl<T: ApiResource> ResourceClient<T> {
  /// One page of the collection.
  pub async fn list(&self, query: &ListQuery) -> Result<Page<T>> {
    let key = query.key(T::FAMILY);
    let query = query.clone();
    self
      .client
      .cached(key, move |c| {
        let query = query.clone();
        async move { resource::list::<T>(c.pipeline(), &query).await }
      })
      .await
  }

  /// The whole collection.
  pub async fn all(&self) -> Result<Vec<T>> {
    Ok(self.list(&self.client.full_list()).await?.items)
  }

  pub async fn get(&self, id: Uuid) -> Result<T> {
    let key = QueryKey::new(T::FAMILY).scope("detail").scope(id);
    self
      .client
      .cached(key, move |c| async move { resource::get::<T>(c.pipeline(), id).await })
      .await
  }

  pub async fn create<B: Serialize + ?Sized>(&self, body: &B) -> Result<T> {
    let pipeline = self.client.pipeline();
    self
      .mutate(|| resource::create::<T, B>(pipeline, body))
      .await
  }

  pub async fn update<B: Serialize + ?Sized>(&self, id: Uuid, body: &B) -> Result<T> {
    let pipeline = self.client.pipeline();
    self
      .mutate(|| resource::update::<T, B>(pipeline, id, body))
      .await
  }

  pub async fn delete(&self, id: Uuid) -> Result<()> {
    let pipeline = self.client.pipeline();
    self.mutate(|| resource::delete::<T>(pipeline, id)).await
  }

  async fn mutate<R, F, Fut>(&self, op: F) -> Result<R>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R>>,
  {
    let policy = self.client.config().mutation_retry();
    self.client.cache().mutate(&[T::FAMILY], &policy, op).await
  }
}
