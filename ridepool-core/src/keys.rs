//! Persisted identity conventions.
//!
//! These formats are part of the stored data: changing them breaks idempotent
//! trip generation and the one-review-per-trip guarantee for existing rows.

use chrono::{NaiveDate, NaiveTime};

/// Deterministic trip id: `{owner}_{origin}_{destination}_{YYYY-MM-DD}_{HHmm}`.
pub fn trip_key(
    owner_uid: &str,
    origin_id: &str,
    destination_id: &str,
    date: NaiveDate,
    time: NaiveTime,
) -> String {
    format!(
        "{}_{}_{}_{}_{}",
        owner_uid,
        origin_id,
        destination_id,
        date.format("%Y-%m-%d"),
        time.format("%H%M")
    )
}

pub fn review_key(trip_id: &str, reviewer_uid: &str) -> String {
    format!("{}_{}", trip_id, reviewer_uid)
}

pub fn route_key(origin_id: &str, destination_id: &str) -> String {
    format!("{}_{}", origin_id, destination_id)
}
