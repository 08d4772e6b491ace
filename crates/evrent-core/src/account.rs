//! Membership tiers, per-user memberships and system configuration.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A membership tier offered by the platform (discount level, perks).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipTier {
  pub id:               Uuid,
  pub name:             String,
  #[serde(default)]
  pub discount_percent: f64,
  #[serde(default)]
  pub min_spending:     f64,
  #[serde(default)]
  pub description:      Option<String>,
}

/// A user's current membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
  #[serde(default)]
  pub id:          Option<Uuid>,
  pub user_id:     Uuid,
  #[serde(default)]
  pub tier_id:     Option<Uuid>,
  #[serde(default)]
  pub tier_name:   String,
  #[serde(default)]
  pub total_spent: f64,
  #[serde(default)]
  pub expires_at:  Option<String>,
}

/// One key/value row of the platform's runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemConfig {
  pub id:          Uuid,
  pub key:         String,
  pub value:       String,
  #[serde(default)]
  pub description: Option<String>,
}
