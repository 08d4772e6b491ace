//! Response envelopes shared by every backend endpoint.
//!
//! Item endpoints wrap their payload as `{ data, message, statusCode, code }`;
//! list endpoints put a [`Page`] inside `data`.

use serde::{Deserialize, Serialize};

/// The standard wrapper returned by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
  pub data:        T,
  /// Optional on list responses, always present on item responses.
  #[serde(default)]
  pub message:     String,
  #[serde(default)]
  pub status_code: u16,
  #[serde(default)]
  pub code:        String,
}

/// One page of a paginated collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
  pub items:             Vec<T>,
  pub page_number:       u32,
  pub total_pages:       u32,
  pub total_count:       u64,
  pub page_size:         u32,
  pub has_previous_page: bool,
  pub has_next_page:     bool,
}

impl<T> Page<T> {
  /// A page holding `items` as the whole collection.
  pub fn single(items: Vec<T>) -> Self {
    let count = items.len();
    Self {
      items,
      page_number:       1,
      total_pages:       1,
      total_count:       count as u64,
      page_size:         count as u32,
      has_previous_page: false,
      has_next_page:     false,
    }
  }
}

/// Envelope around a [`Page`].
pub type ListEnvelope<T> = Envelope<Page<T>>;

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn list_envelope_without_message_parses() {
    let raw = json!({
      "data": {
        "items": [1, 2, 3],
        "pageNumber": 1,
        "totalPages": 4,
        "totalCount": 12,
        "pageSize": 3,
        "hasPreviousPage": false,
        "hasNextPage": true
      },
      "statusCode": 200,
      "code": "SUCCESS"
    });
    let env: ListEnvelope<u32> = serde_json::from_value(raw).unwrap();
    assert_eq!(env.data.items, vec![1, 2, 3]);
    assert_eq!(env.data.total_count, 12);
    assert!(env.data.has_next_page);
    assert!(env.message.is_empty());
  }
}
