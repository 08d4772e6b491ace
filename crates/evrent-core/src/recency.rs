//! Most-recent selection among records that carry a creation timestamp.
//!
//! Several paper-trail endpoints return more than one record per order
//! (re-done inspections, corrected settlements). The one that counts is the
//! one created last. Timestamps that do not parse rank below every parsable
//! one, so a garbage timestamp can never win over a real one.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDateTime, Utc};

/// Records that carry a raw creation timestamp.
pub trait CreatedAt {
  fn created_at(&self) -> &str;
}

/// Parse the timestamp formats the backend emits: RFC 3339 with an offset,
/// or a naive ISO-8601 date-time taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
  let raw = raw.trim();
  if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
    return Some(dt.with_timezone(&Utc));
  }
  ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    .map(|naive| naive.and_utc())
}

/// Ordering on creation time with unparsable timestamps smallest.
pub fn compare_created<T: CreatedAt>(a: &T, b: &T) -> Ordering {
  // `None < Some(_)` is exactly "unparsable sorts lowest".
  parse_timestamp(a.created_at()).cmp(&parse_timestamp(b.created_at()))
}

/// The record with the latest creation timestamp, or `None` for an empty
/// slice. When several records tie, the first of them wins.
pub fn select_latest<T: CreatedAt>(records: &[T]) -> Option<&T> {
  records.iter().reduce(|best, candidate| {
    if compare_created(candidate, best) == Ordering::Greater {
      candidate
    } else {
      best
    }
  })
}

/// Sort newest first; unparsable timestamps end up last.
pub fn sort_newest_first<T: CreatedAt>(records: &mut [T]) {
  records.sort_by(|a, b| compare_created(b, a));
}
