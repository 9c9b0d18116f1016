use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::keys::route_key;

/// A passenger's subscription to new trips on an origin → destination pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteAlert {
    pub uid: String,
    pub origin_id: String,
    pub destination_id: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl RouteAlert {
    pub fn key(&self) -> String {
        route_key(&self.origin_id, &self.destination_id)
    }
}
