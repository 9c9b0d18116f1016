pub mod manager;
pub mod reviews;
pub mod trips;

pub use manager::{BookingManager, Reservation};
pub use reviews::{ReviewAggregator, ReviewResult};
pub use trips::TripService;
