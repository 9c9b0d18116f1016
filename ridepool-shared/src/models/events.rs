use std::collections::BTreeMap;

use uuid::Uuid;

use crate::pii::Masked;

pub const TOPIC_BOOKING_CREATED: &str = "booking.created";
pub const TOPIC_BOOKING_CANCELED: &str = "booking.canceled";
pub const TOPIC_TRIPS_GENERATED: &str = "trips.generated";
pub const TOPIC_REVIEW_SUBMITTED: &str = "review.submitted";
pub const TOPIC_PUSH_REQUESTS: &str = "push.requests";

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingCreatedEvent {
    pub trip_id: String,
    pub booking_id: String,
    pub passenger_uid: String,
    pub seats: i32,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CanceledBy {
    Passenger,
    Driver,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingCanceledEvent {
    pub trip_id: String,
    pub booking_id: String,
    pub passenger_uid: String,
    pub seats: i32,
    pub canceled_by: CanceledBy,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct TripsGeneratedEvent {
    pub rule_id: String,
    pub owner_uid: String,
    pub origin_id: String,
    pub destination_id: String,
    pub created: u32,
    pub skipped: u32,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct ReviewSubmittedEvent {
    pub trip_id: String,
    pub driver_uid: String,
    pub reviewer_uid: String,
    pub rating: i32,
    pub timestamp: i64,
}

/// Push fan-out request handed to the external sender.
/// Device tokens stay masked in Debug output.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct PushRequestEvent {
    pub request_id: Uuid,
    pub tokens: Vec<Masked<String>>,
    pub title: String,
    pub body: String,
    pub link: String,
    pub data: BTreeMap<String, String>,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canceled_by_wire_format() {
        let event = BookingCanceledEvent {
            trip_id: "t1".to_string(),
            booking_id: "b1".to_string(),
            passenger_uid: "p1".to_string(),
            seats: 2,
            canceled_by: CanceledBy::Driver,
            timestamp: 0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["canceled_by"], "DRIVER");
    }

    #[test]
    fn test_push_request_debug_hides_tokens() {
        let event = PushRequestEvent {
            request_id: Uuid::new_v4(),
            tokens: vec![Masked("secret-token".to_string())],
            title: "t".to_string(),
            body: "b".to_string(),
            link: "/".to_string(),
            data: BTreeMap::new(),
            timestamp: 0,
        };
        assert!(!format!("{:?}", event).contains("secret-token"));
        assert!(serde_json::to_string(&event).unwrap().contains("secret-token"));
    }
}
