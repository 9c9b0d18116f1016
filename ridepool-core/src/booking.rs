use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A passenger's claim on seats of a trip. Seat count is fixed at creation;
/// only `picked_up` changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub trip_id: String,
    pub uid: String,
    pub passenger_name: Option<String>,
    pub seats: i32,
    pub note: Option<String>,
    pub picked_up: bool,
    pub created_at: DateTime<Utc>,
}

/// Opaque payment proof attached by the passenger. Nothing here is verified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: String,
    pub trip_id: String,
    pub booking_id: String,
    pub uid: String,
    pub method: String,
    pub amount: Option<f64>,
    pub note: String,
    pub receipt_url: String,
    pub created_at: DateTime<Utc>,
}
