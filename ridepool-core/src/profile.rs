use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::review::RatingAggregate;
use crate::trip::DriverSnapshot;

pub const PLACEHOLDER_DISPLAY_NAME: &str = "Driver";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,
    pub display_name: String,
    pub photo_url: Option<String>,
    pub rating: RatingAggregate,
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// Stand-in returned when a user has never written a profile.
    pub fn placeholder(uid: &str) -> Self {
        Self {
            uid: uid.to_string(),
            display_name: PLACEHOLDER_DISPLAY_NAME.to_string(),
            photo_url: None,
            rating: RatingAggregate::default(),
            updated_at: None,
        }
    }

    pub fn driver_snapshot(&self) -> DriverSnapshot {
        let display_name = if self.display_name.trim().is_empty() {
            PLACEHOLDER_DISPLAY_NAME.to_string()
        } else {
            self.display_name.clone()
        };
        DriverSnapshot {
            display_name,
            photo_url: self.photo_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_name_snapshot_uses_placeholder() {
        let mut profile = UserProfile::placeholder("u1");
        profile.display_name = "  ".to_string();
        assert_eq!(profile.driver_snapshot().display_name, PLACEHOLDER_DISPLAY_NAME);
    }
}
