use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Driver display info copied into a trip when it is created. Never refreshed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverSnapshot {
    pub display_name: String,
    pub photo_url: Option<String>,
}

/// One scheduled departure; the unit of seat inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: String,
    pub owner_uid: String,
    pub origin_id: String,
    pub destination_id: String,
    pub date: NaiveDate,
    pub datetime: DateTime<Utc>,
    pub price: f64,
    pub seats_total: i32,
    pub seats_available: i32,
    pub driver: DriverSnapshot,
    pub vehicle_photo_url: Option<String>,
    pub rule_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Trip {
    pub fn has_departed(&self, now: DateTime<Utc>) -> bool {
        self.datetime < now
    }

    pub fn is_owned_by(&self, uid: &str) -> bool {
        self.owner_uid == uid
    }

    pub fn inventory_is_consistent(&self) -> bool {
        self.seats_available >= 0 && self.seats_available <= self.seats_total
    }
}

/// Sample trips for tests in this and dependent crates.
#[cfg(any(test, feature = "test-utils"))]
pub mod fixtures {
    use super::*;
    use chrono::Duration;

    pub fn trip(id: &str, owner: &str, seats: i32, datetime: DateTime<Utc>) -> Trip {
        Trip {
            id: id.to_string(),
            owner_uid: owner.to_string(),
            origin_id: "cordoba".to_string(),
            destination_id: "rosario".to_string(),
            date: datetime.date_naive(),
            datetime,
            price: 5000.0,
            seats_total: seats,
            seats_available: seats,
            driver: DriverSnapshot {
                display_name: "Driver".to_string(),
                photo_url: None,
            },
            vehicle_photo_url: None,
            rule_id: None,
            created_at: datetime - Duration::days(7),
        }
    }
}
