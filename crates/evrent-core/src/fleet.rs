//! Fleet entities: vehicles, models, manufacturers, depots, amenities.
//!
//! The vehicle endpoint is inconsistent about how it references its depot
//! and model: sometimes nested objects, sometimes flat ids, sometimes both.
//! [`Car`] resolves every variant once, at deserialization, so consumers
//! never repeat the fallback logic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::recency::parse_timestamp;

// ─── Vehicle status ──────────────────────────────────────────────────────────

/// Operational status of a vehicle.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum CarStatus {
  Available,
  Reserved,
  InUse,
  Repairing,
  Maintenance,
  Charging,
  /// Any status this client does not know about.
  #[serde(other)]
  Unknown,
}

// ─── Depots ──────────────────────────────────────────────────────────────────

/// A rental station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Depot {
  pub id:       Uuid,
  pub name:     String,
  #[serde(default)]
  pub address:  Option<String>,
  #[serde(default)]
  pub province: Option<String>,
  #[serde(default)]
  pub capacity: Option<u32>,
}

/// The depot a vehicle is parked at, as referenced from the vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepotRef {
  pub id:       Uuid,
  pub name:     String,
  #[serde(default)]
  pub province: Option<String>,
}

// ─── Models & manufacturers ──────────────────────────────────────────────────

/// A vehicle model (e.g. a specific trim of a specific EV).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
  pub id:              Uuid,
  #[serde(alias = "modelName")]
  pub name:            String,
  #[serde(default)]
  pub manufacturer_id: Option<Uuid>,
  #[serde(default)]
  pub seats:           Option<u32>,
  #[serde(default)]
  pub range_km:        Option<u32>,
  #[serde(default)]
  pub price_per_day:   Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manufacturer {
  pub id:      Uuid,
  pub name:    String,
  #[serde(default)]
  pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Amenity {
  pub id:          Uuid,
  pub name:        String,
  #[serde(default)]
  pub description: Option<String>,
}

// ─── Vehicles ────────────────────────────────────────────────────────────────

/// A vehicle in canonical shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawCar", rename_all = "camelCase")]
pub struct Car {
  pub id:            Uuid,
  pub license_plate: String,
  pub status:        CarStatus,
  pub model_id:      Option<Uuid>,
  pub model_name:    Option<String>,
  pub depot:         Option<DepotRef>,
  /// `None` when the backend omitted the timestamp or sent one that does
  /// not parse.
  pub created_at:    Option<DateTime<Utc>>,
}

/// Every shape the vehicle endpoint has been seen to emit.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCar {
  id:            Uuid,
  #[serde(default)]
  license_plate: String,
  #[serde(default = "unknown_status")]
  status:        CarStatus,
  #[serde(default)]
  model_id:      Option<Uuid>,
  #[serde(default)]
  model:         Option<RawModelRef>,
  #[serde(default)]
  model_name:    Option<String>,
  #[serde(default)]
  depot_id:      Option<Uuid>,
  #[serde(default)]
  depot:         Option<RawDepotRef>,
  #[serde(default)]
  depot_name:    Option<String>,
  #[serde(default)]
  province:      Option<String>,
  #[serde(default)]
  created_at:    Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawModelRef {
  #[serde(default)]
  id:   Option<Uuid>,
  #[serde(default, alias = "modelName")]
  name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDepotRef {
  #[serde(default)]
  id:       Option<Uuid>,
  #[serde(default)]
  name:     Option<String>,
  #[serde(default)]
  province: Option<String>,
}

fn unknown_status() -> CarStatus { CarStatus::Unknown }

impl From<RawCar> for Car {
  fn from(raw: RawCar) -> Self {
    let (nested_model_id, nested_model_name) = match raw.model {
      Some(m) => (m.id, m.name),
      None => (None, None),
    };
    let (nested_depot_id, nested_depot_name, nested_province) = match raw.depot {
      Some(d) => (d.id, d.name, d.province),
      None => (None, None, None),
    };

    let depot = nested_depot_id.or(raw.depot_id).map(|id| DepotRef {
      id,
      name: nested_depot_name.or(raw.depot_name).unwrap_or_default(),
      province: nested_province.or(raw.province),
    });

    Car {
      id: raw.id,
      license_plate: raw.license_plate,
      status: raw.status,
      model_id: nested_model_id.or(raw.model_id),
      model_name: nested_model_name.or(raw.model_name),
      depot,
      created_at: raw.created_at.as_deref().and_then(parse_timestamp),
    }
  }
}

// ─── Demand forecast ─────────────────────────────────────────────────────────

/// Predicted demand for one depot, with restocking recommendations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemandForecast {
  pub depot_id:         Uuid,
  #[serde(default)]
  pub generated_at:     Option<String>,
  #[serde(default)]
  pub expected_rentals: Option<f64>,
  #[serde(default)]
  pub recommendations:  Vec<Recommendation>,
}

/// One "move N cars of model X here" line of a forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
  pub model_id:           Uuid,
  #[serde(default)]
  pub suggested_quantity: i32,
  #[serde(default)]
  pub reason:             Option<String>,
}
