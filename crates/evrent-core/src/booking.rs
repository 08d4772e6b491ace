//! Bookings and their paper trail: handover and return inspections,
//! settlements, payment transactions.
//!
//! Creation timestamps are kept as the raw strings the backend sent; the
//! backend has been seen to emit values that do not parse, and the
//! most-recent selection in [`crate::recency`] has to rank those too.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::recency::CreatedAt;

/// A rental order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBooking {
  pub id:           Uuid,
  #[serde(default)]
  pub user_id:      Option<Uuid>,
  #[serde(default)]
  pub car_id:       Option<Uuid>,
  #[serde(default)]
  pub depot_id:     Option<Uuid>,
  #[serde(default)]
  pub status:       String,
  #[serde(default)]
  pub total_amount: Option<f64>,
  #[serde(default)]
  pub start_time:   Option<String>,
  #[serde(default)]
  pub end_time:     Option<String>,
  #[serde(default)]
  pub created_at:   String,
}

/// Condition report written when the vehicle is handed to the customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoverInspection {
  pub id:              Uuid,
  pub order_id:        Uuid,
  #[serde(default)]
  pub staff_id:        Option<Uuid>,
  #[serde(default)]
  pub battery_percent: Option<f64>,
  #[serde(default)]
  pub odometer_km:     Option<f64>,
  #[serde(default)]
  pub notes:           Option<String>,
  #[serde(default)]
  pub image_urls:      Vec<String>,
  #[serde(default)]
  pub created_at:      String,
}

/// Condition report written when the vehicle comes back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnInspection {
  pub id:              Uuid,
  pub order_id:        Uuid,
  #[serde(default)]
  pub staff_id:        Option<Uuid>,
  #[serde(default)]
  pub battery_percent: Option<f64>,
  #[serde(default)]
  pub odometer_km:     Option<f64>,
  #[serde(default)]
  pub damage_notes:    Option<String>,
  #[serde(default)]
  pub created_at:      String,
}

/// Final bill for an order after return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
  pub id:               Uuid,
  pub order_id:         Uuid,
  #[serde(default)]
  pub base_amount:      f64,
  #[serde(default)]
  pub extra_fees:       f64,
  #[serde(default)]
  pub deposit_refunded: f64,
  #[serde(default)]
  pub total_amount:     f64,
  #[serde(default)]
  pub created_at:       String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
  pub id:         Uuid,
  #[serde(default)]
  pub user_id:    Option<Uuid>,
  #[serde(default)]
  pub order_id:   Option<Uuid>,
  pub amount:     f64,
  #[serde(default)]
  pub kind:       String,
  #[serde(default)]
  pub status:     String,
  #[serde(default)]
  pub created_at: String,
}

impl CreatedAt for HandoverInspection {
  fn created_at(&self) -> &str { &self.created_at }
}

impl CreatedAt for ReturnInspection {
  fn created_at(&self) -> &str { &self.created_at }
}

impl CreatedAt for Settlement {
  fn created_at(&self) -> &str { &self.created_at }
}

impl CreatedAt for OrderBooking {
  fn created_at(&self) -> &str { &self.created_at }
}

impl CreatedAt for Transaction {
  fn created_at(&self) -> &str { &self.created_at }
}
