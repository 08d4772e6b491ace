//! Aggregations over the fake backend, including partial failures.

use std::time::Duration;

use serde_json::{Value, json};
use uuid::Uuid;

use super::fake_api::FakeApi;
use crate::hooks::AggregationSlot;

fn model(id: Uuid, name: &str) -> Value { json!({ "id": id, "name": name }) }

fn car(model_id: Uuid, status: &str, depot: (Uuid, &str, &str)) -> Value {
  json!({
    "id": Uuid::new_v4(),
    "licensePlate": "51A-00001",
    "status": status,
    "modelId": model_id,
    "depot": { "id": depot.0, "name": depot.1, "province": depot.2 },
  })
}

#[tokio::test]
async fn order_totals_default_failed_users_to_zero() {
  let api = FakeApi::spawn().await;
  let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
  api.state.order_counts.lock().unwrap().extend([(a, 3), (b, 8), (c, 5)]);
  api.state.failing_users.lock().unwrap().insert(b);
  let client = api.signed_in_client();

  let totals = client.aggregations().user_order_totals(&[a, b, c]).await;
  assert_eq!(totals.len(), 3);
  assert_eq!(totals[&a], 3);
  assert_eq!(totals[&b], 0);
  assert_eq!(totals[&c], 5);
}

#[tokio::test]
async fn availability_ignores_what_the_server_failed_to_filter() {
  let api = FakeApi::spawn().await;
  let vf8 = Uuid::new_v4();
  let q1 = (Uuid::new_v4(), "Quận 1", "Hồ Chí Minh");
  let bd = (Uuid::new_v4(), "Ba Đình", "Hà Nội");
  api.state.cars.lock().unwrap().extend([
    car(vf8, "AVAILABLE", q1),
    car(vf8, "AVAILABLE", q1),
    car(vf8, "IN_USE", q1),
    car(vf8, "REPAIRING", bd),
    car(vf8, "AVAILABLE", bd),
    car(Uuid::new_v4(), "AVAILABLE", bd),
  ]);
  let client = api.signed_in_client();

  let depots = client.aggregations().depots_by_model(vf8, None).await.unwrap();
  let summary: Vec<_> = depots.iter().map(|d| (d.depot.name.as_str(), d.available)).collect();
  assert_eq!(summary, [("Ba Đình", 1), ("Quận 1", 2)]);

  let north = client
    .aggregations()
    .depots_by_model(vf8, Some("hà nội"))
    .await
    .unwrap();
  assert_eq!(north.len(), 1);
  assert_eq!(north[0].depot.id, bd.0);
}

#[tokio::test]
async fn statistics_survive_a_failed_vehicle_fetch() {
  let api = FakeApi::spawn().await;
  let (m1, m2) = (Uuid::new_v4(), Uuid::new_v4());
  api
    .state
    .models
    .lock()
    .unwrap()
    .extend([model(m1, "VF 8"), model(m2, "VF 9")]);
  let depot = (Uuid::new_v4(), "Quận 1", "Hồ Chí Minh");
  api
    .state
    .cars
    .lock()
    .unwrap()
    .extend([car(m1, "AVAILABLE", depot), car(m1, "IN_USE", depot)]);
  let client = api.signed_in_client();

  let stats = client.aggregations().model_statistics().await.unwrap();
  assert_eq!(stats.total_models, 2);
  assert_eq!(stats.total_cars, Some(2));
  assert_eq!(stats.models_with_cars, Some(1));
  assert_eq!(stats.average_cars_per_model, Some(1.0));

  let api = FakeApi::spawn().await;
  api
    .state
    .models
    .lock()
    .unwrap()
    .extend([model(m1, "VF 8"), model(m2, "VF 9")]);
  *api.state.cars_status.lock().unwrap() = Some(403);
  let client = api.signed_in_client();

  let stats = client.aggregations().model_statistics().await.unwrap();
  assert_eq!(stats.total_models, 2);
  assert!(!stats.has_car_figures());
}

#[tokio::test]
async fn forecast_keeps_recommendations_with_unresolved_models() {
  let api = FakeApi::spawn().await;
  let (known, broken) = (Uuid::new_v4(), Uuid::new_v4());
  let depot = Uuid::new_v4();
  api.state.models.lock().unwrap().push(model(known, "VF 8"));
  api.state.broken_models.lock().unwrap().insert(broken);
  api.state.forecasts.lock().unwrap().insert(
    depot,
    json!({
      "depotId": depot,
      "expectedRentals": 42.0,
      "recommendations": [
        { "modelId": known, "suggestedQuantity": 3 },
        { "modelId": broken, "suggestedQuantity": 1 },
      ],
    }),
  );
  let client = api.signed_in_client();

  let enriched = client.aggregations().enriched_forecast(depot).await.unwrap();
  let names: Vec<_> = enriched
    .recommendations
    .iter()
    .map(|r| r.model_name.as_deref())
    .collect();
  assert_eq!(names, [Some("VF 8"), None]);
  assert_eq!(enriched.recommendations[0].recommendation.suggested_quantity, 3);
}

#[tokio::test]
async fn latest_handover_skips_unparsable_timestamps() {
  let api = FakeApi::spawn().await;
  let order = Uuid::new_v4();
  let (t1, t2, t3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
  api.state.handovers.lock().unwrap().insert(order, vec![
    json!({ "id": t1, "orderId": order, "createdAt": "2025-03-01T08:00:00Z" }),
    json!({ "id": t2, "orderId": order, "createdAt": "2025-03-02T08:00:00" }),
    json!({ "id": t3, "orderId": order, "createdAt": "not a timestamp" }),
  ]);
  let client = api.signed_in_client();

  let latest = client.aggregations().latest_handover(order).await.unwrap();
  assert_eq!(latest.map(|h| h.id), Some(t2));

  let none = client.aggregations().latest_handover(Uuid::new_v4()).await.unwrap();
  assert!(none.is_none());
}

#[tokio::test]
async fn superseded_order_totals_are_not_published() {
  let api = FakeApi::spawn().await;
  let (slow, fast) = (Uuid::new_v4(), Uuid::new_v4());
  api.state.order_counts.lock().unwrap().extend([(slow, 4), (fast, 7)]);
  api.state.slow_users.lock().unwrap().insert(slow, 300);
  let client = api.signed_in_client();
  let aggregations = client.aggregations();
  let slot = AggregationSlot::new();

  // The older run starts first and finishes last.
  let slow_ids = [slow];
  let (older, newer) = tokio::join!(
    aggregations.user_order_totals_into(&slot, &slow_ids),
    async {
      tokio::time::sleep(Duration::from_millis(20)).await;
      aggregations.user_order_totals_into(&slot, &[fast]).await
    },
  );

  assert!(!older);
  assert!(newer);
  let published = slot.current().unwrap();
  assert_eq!(published.len(), 1);
  assert_eq!(published[&fast], 7);
  assert_eq!(api.state.hits(&format!("/api/OrderBooking/user/{slow}")), 1);
}
