use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::trip::Trip;

pub const MAX_COMMENT_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub trip_id: String,
    pub driver_uid: String,
    pub reviewer_uid: String,
    pub rating: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// Running rating totals kept on the driver's profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingAggregate {
    pub rating_sum: i64,
    pub rating_count: i64,
}

impl RatingAggregate {
    pub fn fold(self, rating: i32) -> Self {
        Self {
            rating_sum: self.rating_sum + i64::from(rating),
            rating_count: self.rating_count + 1,
        }
    }

    pub fn average(&self) -> Option<f64> {
        if self.rating_count == 0 {
            None
        } else {
            Some(self.rating_sum as f64 / self.rating_count as f64)
        }
    }
}

/// What the store read inside the review transaction.
#[derive(Debug)]
pub struct ReviewSnapshot<'a> {
    pub trip: Option<&'a Trip>,
    pub has_booking: bool,
    pub already_reviewed: bool,
}

pub fn truncate_comment(comment: &str) -> String {
    comment.chars().take(MAX_COMMENT_CHARS).collect()
}
