//! Cached resource reads and invalidating mutations over HTTP.

use evrent_core::fleet::{Depot, Model};
use serde_json::json;
use uuid::Uuid;

use super::fake_api::FakeApi;
use crate::resource::ListQuery;

fn seed_depots(api: &FakeApi) {
  api.state.depots.lock().unwrap().extend([
    json!({ "id": Uuid::new_v4(), "name": "Quận 1", "province": "Hồ Chí Minh" }),
    json!({ "id": Uuid::new_v4(), "name": "Ba Đình", "province": "Hà Nội" }),
  ]);
}

#[tokio::test]
async fn concurrent_reads_issue_one_request() {
  let api = FakeApi::spawn().await;
  seed_depots(&api);
  let client = api.signed_in_client();
  let depots = client.resource::<Depot>();
  let query = ListQuery::page(1, 20);

  let (a, b) = tokio::join!(depots.list(&query), depots.list(&query));
  assert_eq!(a.unwrap().items.len(), 2);
  assert_eq!(b.unwrap().items.len(), 2);
  assert_eq!(api.state.hits("/api/Depot"), 1);

  // Still fresh: served from the cache.
  depots.list(&query).await.unwrap();
  assert_eq!(api.state.hits("/api/Depot"), 1);

  // A different query is a different key.
  depots.list(&ListQuery::page(2, 20)).await.unwrap();
  assert_eq!(api.state.hits("/api/Depot"), 2);
}

#[tokio::test]
async fn mutation_forces_the_next_read_to_refetch() {
  let api = FakeApi::spawn().await;
  seed_depots(&api);
  let client = api.signed_in_client();
  let depots = client.resource::<Depot>();
  let query = ListQuery::page(1, 20);

  assert_eq!(depots.list(&query).await.unwrap().items.len(), 2);

  let created = depots
    .create(&json!({ "name": "Hải Châu", "province": "Đà Nẵng" }))
    .await
    .unwrap();
  assert_eq!(created.name, "Hải Châu");

  let after = depots.list(&query).await.unwrap();
  assert_eq!(api.state.hits("/api/Depot"), 3);
  assert!(after.items.iter().any(|d| d.id == created.id));
}

#[tokio::test]
async fn not_found_is_not_retried() {
  let api = FakeApi::spawn().await;
  let client = api.signed_in_client();
  let missing = Uuid::new_v4();

  let err = client.resource::<Model>().get(missing).await.unwrap_err();
  assert_eq!(err.status(), Some(404));
  assert_eq!(api.state.hits(&format!("/api/Model/{missing}")), 1);
}

#[tokio::test]
async fn server_errors_are_retried_twice() {
  let api = FakeApi::spawn().await;
  let client = api.signed_in_client();
  let broken = Uuid::new_v4();
  api.state.broken_models.lock().unwrap().insert(broken);

  let err = client.resource::<Model>().get(broken).await.unwrap_err();
  assert_eq!(err.status(), Some(500));
  assert_eq!(api.state.hits(&format!("/api/Model/{broken}")), 3);
  assert!(client.cache().is_empty());
}

#[tokio::test]
async fn logout_empties_the_cache() {
  let api = FakeApi::spawn().await;
  seed_depots(&api);
  let client = api.signed_in_client();

  client.resource::<Depot>().all().await.unwrap();
  assert!(!client.cache().is_empty());

  client.logout().await;
  assert!(client.cache().is_empty());
}
