//! Derived views the backend does not expose, composed from cached reads.
//!
//! Per-entity failures inside a fan-out are downgraded to a default for that
//! entity and logged; the aggregation as a whole still resolves. The pure
//! reducers are public so they can be reused over data fetched elsewhere.

use std::{
  cmp::Ordering,
  collections::HashMap,
  future::Future,
  sync::{Mutex, MutexGuard},
};

use futures::future::join_all;
use uuid::Uuid;

use evrent_core::{
  account::Membership,
  booking::{HandoverInspection, ReturnInspection, Settlement},
  fleet::{Car, CarStatus, DemandForecast, DepotRef, Model, Recommendation},
  recency::select_latest,
};

use crate::{Client, Result, resource::ListQuery};

// ─── Views ───────────────────────────────────────────────────────────────────

/// Fleet size per model.
///
/// The car-derived figures are `None` when the vehicle collection could not
/// be fetched; `total_models` is always known.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelStatistics {
  pub total_models:           usize,
  pub total_cars:             Option<usize>,
  pub models_with_cars:       Option<usize>,
  pub average_cars_per_model: Option<f64>,
  /// Cars per model id. Empty when cars are unavailable.
  pub cars_per_model:         HashMap<Uuid, usize>,
}

impl ModelStatistics {
  /// Figures from both collections.
  pub fn compute(models: &[Model], cars: &[Car]) -> Self {
    let cars_per_model = count_by_model(cars);
    let models_with_cars = models
      .iter()
      .filter(|m| cars_per_model.get(&m.id).is_some_and(|n| *n > 0))
      .count();
    let average = if models.is_empty() {
      0.0
    } else {
      cars.len() as f64 / models.len() as f64
    };

    Self {
      total_models: models.len(),
      total_cars: Some(cars.len()),
      models_with_cars: Some(models_with_cars),
      average_cars_per_model: Some(average),
      cars_per_model,
    }
  }

  /// What is known from the model list alone.
  pub fn models_only(models: &[Model]) -> Self {
    Self {
      total_models:           models.len(),
      total_cars:             None,
      models_with_cars:       None,
      average_cars_per_model: None,
      cars_per_model:         HashMap::new(),
    }
  }

  /// Whether the car-derived figures are present.
  pub fn has_car_figures(&self) -> bool { self.total_cars.is_some() }
}

/// A depot holding available cars of one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepotAvailability {
  pub depot:     DepotRef,
  pub available: usize,
}

/// A forecast whose recommendations carry model names.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedForecast {
  pub forecast:        DemandForecast,
  pub recommendations: Vec<EnrichedRecommendation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRecommendation {
  pub recommendation: Recommendation,
  /// `None` when the model could not be resolved.
  pub model_name:     Option<String>,
}

// ─── Reducers ────────────────────────────────────────────────────────────────

/// Cars per model id; cars without a model are not counted.
pub fn count_by_model(cars: &[Car]) -> HashMap<Uuid, usize> {
  let mut counts = HashMap::new();
  for model_id in cars.iter().filter_map(|c| c.model_id) {
    *counts.entry(model_id).or_insert(0) += 1;
  }
  counts
}

/// Depots holding at least one available car of `model_id`, optionally
/// restricted to provinces containing `province` (case-insensitive), with
/// the number of available cars each, sorted by depot name.
///
/// Status and model are checked again here whatever the server filtered.
pub fn available_depots(cars: &[Car], model_id: Uuid, province: Option<&str>) -> Vec<DepotAvailability> {
  let province = province
    .map(str::trim)
    .filter(|p| !p.is_empty())
    .map(str::to_lowercase);

  let mut by_depot: HashMap<Uuid, DepotAvailability> = HashMap::new();
  for car in cars {
    if car.status != CarStatus::Available || car.model_id != Some(model_id) {
      continue;
    }
    let Some(depot) = &car.depot else { continue };
    if let Some(wanted) = &province {
      let matches = depot
        .province
        .as_deref()
        .is_some_and(|p| p.to_lowercase().contains(wanted.as_str()));
      if !matches {
        continue;
      }
    }

    by_depot
      .entry(depot.id)
      .or_insert_with(|| DepotAvailability {
        depot:     depot.clone(),
        available: 0,
      })
      .available += 1;
  }

  let mut depots: Vec<_> = by_depot.into_values().collect();
  depots.sort_by(|a, b| compare_names(&a.depot.name, &b.depot.name).then(a.depot.id.cmp(&b.depot.id)));
  depots
}

/// Case-insensitive name order, falling back to the raw strings so the
/// result is total and stable.
pub fn compare_names(a: &str, b: &str) -> Ordering {
  a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
}

// ─── Generations ─────────────────────────────────────────────────────────────

/// Identifies one run of an aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// Holds the latest published result of an aggregation that can be
/// re-triggered before a previous run finished. Only the most recently
/// started run may publish.
#[derive(Debug)]
pub struct AggregationSlot<T> {
  state: Mutex<SlotState<T>>,
}

#[derive(Debug)]
struct SlotState<T> {
  issued:    u64,
  published: Option<T>,
}

impl<T> Default for AggregationSlot<T> {
  fn default() -> Self {
    Self {
      state: Mutex::new(SlotState {
        issued:    0,
        published: None,
      }),
    }
  }
}

impl<T: Clone> AggregationSlot<T> {
  pub fn new() -> Self { Self::default() }

  /// Start a run; every earlier ticket is superseded.
  pub fn begin(&self) -> Ticket {
    let mut state = self.lock();
    state.issued += 1;
    Ticket(state.issued)
  }

  /// Publish `value` if `ticket` is still the latest. Returns whether it was
  /// accepted.
  pub fn publish(&self, ticket: Ticket, value: T) -> bool {
    let mut state = self.lock();
    if ticket.0 != state.issued {
      tracing::debug!(ticket = ticket.0, latest = state.issued, "discarding superseded aggregation");
      return false;
    }
    state.published = Some(value);
    true
  }

  /// Supersede every outstanding run without starting a new one, e.g. when
  /// the consumer goes away.
  pub fn cancel(&self) { self.lock().issued += 1; }

  pub fn is_current(&self, ticket: Ticket) -> bool { self.lock().issued == ticket.0 }

  pub fn current(&self) -> Option<T> { self.lock().published.clone() }

  /// Begin a run, await `work`, and publish its output if still current.
  pub async fn run<Fut: Future<Output = T>>(&self, work: Fut) -> bool {
    let ticket = self.begin();
    let value = work.await;
    self.publish(ticket, value)
  }

  fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
    self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

// ─── Aggregations ────────────────────────────────────────────────────────────

/// The aggregation entry points, bound to one [`Client`].
#[derive(Clone, Debug)]
pub struct Aggregations {
  client: Client,
}

impl Aggregations {
  pub fn new(client: Client) -> Self { Self { client } }

  /// Model and fleet counts over the full collections.
  ///
  /// A failed model fetch is an error; a failed car fetch only blanks the
  /// car-derived figures.
  pub async fn model_statistics(&self) -> Result<ModelStatistics> {
    let model_res = self.client.resource::<Model>();
    let car_res = self.client.resource::<Car>();
    let (models, cars) = tokio::join!(model_res.all(), car_res.all());
    let models = models?;
    match cars {
      Ok(cars) => Ok(ModelStatistics::compute(&models, &cars)),
      Err(e) => {
        tracing::warn!(error = %e, "vehicle collection unavailable; model statistics without car figures");
        Ok(ModelStatistics::models_only(&models))
      }
    }
  }

  /// Depots with available cars of `model_id`, see [`available_depots`].
  pub async fn depots_by_model(&self, model_id: Uuid, province: Option<&str>) -> Result<Vec<DepotAvailability>> {
    let query = self
      .client
      .full_list()
      .filter("modelId", model_id)
      .filter("status", CarStatus::Available);
    let page = self.client.resource::<Car>().list(&query).await?;
    Ok(available_depots(&page.items, model_id, province))
  }

  /// Number of orders per user. A user whose fetch fails counts 0.
  pub async fn user_order_totals(&self, user_ids: &[Uuid]) -> HashMap<Uuid, u64> {
    // Only the total is needed; ask for the smallest page.
    let query = ListQuery::page(1, 1);
    let fetches = user_ids.iter().map(|&user_id| {
      let query = &query;
      async move {
        let total = match self.client.orders_for_user(user_id, query).await {
          Ok(page) => page.total_count,
          Err(e) => {
            tracing::warn!(%user_id, error = %e, "order total unavailable; counting 0");
            0
          }
        };
        (user_id, total)
      }
    });
    join_all(fetches).await.into_iter().collect()
  }

  /// [`Self::user_order_totals`], published into `slot` unless a later run
  /// started on the same slot first. Returns whether it was published.
  pub async fn user_order_totals_into(
    &self,
    slot: &AggregationSlot<HashMap<Uuid, u64>>,
    user_ids: &[Uuid],
  ) -> bool {
    slot.run(self.user_order_totals(user_ids)).await
  }

  /// Current membership per user; `None` for a user whose fetch fails.
  pub async fn user_memberships(&self, user_ids: &[Uuid]) -> HashMap<Uuid, Option<Membership>> {
    let fetches = user_ids.iter().map(|&user_id| async move {
      let membership = match self.client.membership_for_user(user_id).await {
        Ok(membership) => Some(membership),
        Err(e) if e.is_definitive() => {
          tracing::debug!(%user_id, error = %e, "no membership");
          None
        }
        Err(e) => {
          tracing::warn!(%user_id, error = %e, "membership unavailable");
          None
        }
      };
      (user_id, membership)
    });
    join_all(fetches).await.into_iter().collect()
  }

  /// [`Self::user_memberships`], published into `slot` unless superseded.
  pub async fn user_memberships_into(
    &self,
    slot: &AggregationSlot<HashMap<Uuid, Option<Membership>>>,
    user_ids: &[Uuid],
  ) -> bool {
    slot.run(self.user_memberships(user_ids)).await
  }

  /// A depot's demand forecast with the model name of every recommendation.
  pub async fn enriched_forecast(&self, depot_id: Uuid) -> Result<EnrichedForecast> {
    let forecast = self.client.forecast(depot_id).await?;
    let models = self.client.resource::<Model>();
    let names = join_all(forecast.recommendations.iter().map(|r| {
      let models = &models;
      async move {
        match models.get(r.model_id).await {
          Ok(model) => Some(model.name),
          Err(e) => {
            tracing::warn!(model_id = %r.model_id, error = %e, "model name unavailable");
            None
          }
        }
      }
    }))
    .await;

    let recommendations = forecast
      .recommendations
      .iter()
      .cloned()
      .zip(names)
      .map(|(recommendation, model_name)| EnrichedRecommendation {
        recommendation,
        model_name,
      })
      .collect();
    Ok(EnrichedForecast {
      forecast,
      recommendations,
    })
  }

  /// The most recent handover inspection of an order.
  pub async fn latest_handover(&self, order_id: Uuid) -> Result<Option<HandoverInspection>> {
    let records = self.client.handovers_for_order(order_id).await?;
    Ok(select_latest(&records).cloned())
  }

  /// The most recent return inspection of an order.
  pub async fn latest_return(&self, order_id: Uuid) -> Result<Option<ReturnInspection>> {
    let records = self.client.returns_for_order(order_id).await?;
    Ok(select_latest(&records).cloned())
  }

  /// The most recent settlement of an order.
  pub async fn latest_settlement(&self, order_id: Uuid) -> Result<Option<Settlement>> {
    let records = self.client.settlements_for_order(order_id).await?;
    Ok(select_latest(&records).cloned())
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn uuid(n: u128) -> Uuid { Uuid::from_u128(n) }

  fn car(n: u128, status: &str, model: u128, depot: Option<(u128, &str, &str)>) -> Car {
    let depot = depot.map(|(id, name, province)| json!({ "id": uuid(id), "name": name, "province": province }));
    serde_json::from_value(json!({
      "id": uuid(n),
      "licensePlate": format!("51A-{n:05}"),
      "status": status,
      "modelId": uuid(model),
      "depot": depot,
    }))
    .unwrap()
  }

  fn model(n: u128, name: &str) -> Model {
    serde_json::from_value(json!({ "id": uuid(n), "name": name })).unwrap()
  }

  #[test]
  fn statistics_from_both_collections() {
    let models = [model(1, "VF 8"), model(2, "VF 9"), model(3, "VF e34")];
    let cars = [
      car(10, "AVAILABLE", 1, None),
      car(11, "IN_USE", 1, None),
      car(12, "AVAILABLE", 2, None),
    ];
    let stats = ModelStatistics::compute(&models, &cars);
    assert_eq!(stats.total_models, 3);
    assert_eq!(stats.total_cars, Some(3));
    assert_eq!(stats.models_with_cars, Some(2));
    assert_eq!(stats.average_cars_per_model, Some(1.0));
    assert_eq!(stats.cars_per_model[&uuid(1)], 2);
  }

  #[test]
  fn statistics_without_cars() {
    let stats = ModelStatistics::models_only(&[model(1, "VF 8")]);
    assert_eq!(stats.total_models, 1);
    assert!(!stats.has_car_figures());
    assert_eq!(ModelStatistics::compute(&[], &[]).average_cars_per_model, Some(0.0));
  }

  #[test]
  fn only_available_cars_count() {
    let hcm = (100, "Quận 1", "Hồ Chí Minh");
    let hn = (200, "Ba Đình", "Hà Nội");
    let cars = [
      car(1, "AVAILABLE", 7, Some(hcm)),
      car(2, "IN_USE", 7, Some(hcm)),
      car(3, "REPAIRING", 7, Some(hn)),
      car(4, "AVAILABLE", 7, Some(hcm)),
      car(5, "AVAILABLE", 8, Some(hn)),
    ];

    let depots = available_depots(&cars, uuid(7), None);
    assert_eq!(depots.len(), 1);
    assert_eq!(depots[0].depot.id, uuid(100));
    assert_eq!(depots[0].available, 2);
  }

  #[test]
  fn cars_without_a_model_are_not_available_for_it() {
    let unmodelled: Car = serde_json::from_value(json!({
      "id": uuid(9),
      "status": "AVAILABLE",
      "depot": { "id": uuid(100), "name": "Quận 1", "province": "Hồ Chí Minh" },
    }))
    .unwrap();
    assert!(available_depots(&[unmodelled], uuid(7), None).is_empty());
  }

  #[test]
  fn province_filter_is_a_case_insensitive_substring() {
    let cars = [
      car(1, "AVAILABLE", 7, Some((100, "Quận 1", "Hồ Chí Minh"))),
      car(2, "AVAILABLE", 7, Some((200, "Ba Đình", "Hà Nội"))),
      car(3, "AVAILABLE", 7, None),
    ];
    let depots = available_depots(&cars, uuid(7), Some("hà"));
    assert_eq!(depots.len(), 1);
    assert_eq!(depots[0].depot.name, "Ba Đình");

    assert_eq!(available_depots(&cars, uuid(7), Some("  ")).len(), 2);
  }

  #[test]
  fn depots_sort_by_name() {
    let cars = [
      car(1, "AVAILABLE", 7, Some((1, "thu Duc", "HCM"))),
      car(2, "AVAILABLE", 7, Some((2, "Binh Thanh", "HCM"))),
      car(3, "AVAILABLE", 7, Some((3, "Go Vap", "HCM"))),
    ];
    let names: Vec<_> = available_depots(&cars, uuid(7), None)
      .into_iter()
      .map(|d| d.depot.name)
      .collect();
    assert_eq!(names, ["Binh Thanh", "Go Vap", "thu Duc"]);
  }

  #[test]
  fn only_the_latest_ticket_publishes() {
    let slot = AggregationSlot::new();
    let first = slot.begin();
    let second = slot.begin();

    assert!(!slot.publish(first, "stale"));
    assert!(slot.publish(second, "fresh"));
    assert_eq!(slot.current(), Some("fresh"));

    slot.cancel();
    assert!(!slot.is_current(second));
    assert!(!slot.publish(second, "late"));
    assert_eq!(slot.current(), Some("fresh"));
  }

  #[tokio::test(start_paused = true)]
  async fn superseded_run_does_not_overwrite() {
    use std::time::Duration;

    let slot = AggregationSlot::new();
    let slow = slot.run(async {
      tokio::time::sleep(Duration::from_secs(2)).await;
      "old inputs"
    });
    let fast = async {
      tokio::time::sleep(Duration::from_secs(1)).await;
      slot.run(async { "new inputs" }).await
    };

    let (slow_published, fast_published) = tokio::join!(slow, fast);
    assert!(!slow_published);
    assert!(fast_published);
    assert_eq!(slot.current(), Some("new inputs"));
  }
}
