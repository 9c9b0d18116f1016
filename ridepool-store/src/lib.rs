pub mod alert_repo;
pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod events;
pub mod profile_repo;
pub mod push_gateway;
pub mod redis_repo;
pub mod review_repo;
pub mod rule_repo;
pub mod trip_repo;

use std::sync::Arc;

use ridepool_core::repository::Repositories;

pub use database::DbClient;
pub use events::EventProducer;
pub use push_gateway::KafkaPushGateway;
pub use redis_repo::RedisClient;

/// PostgreSQL-backed handles for every repository.
pub fn pg_repositories(db: &DbClient) -> Repositories {
    let pool = db.pool.clone();
    let retries = db.max_tx_retries;
    Repositories {
        trips: Arc::new(trip_repo::PgTripRepository::new(pool.clone(), retries)),
        bookings: Arc::new(booking_repo::PgBookingRepository::new(pool.clone(), retries)),
        rules: Arc::new(rule_repo::PgRuleRepository::new(pool.clone())),
        reviews: Arc::new(review_repo::PgReviewRepository::new(pool.clone(), retries)),
        profiles: Arc::new(profile_repo::PgProfileRepository::new(pool.clone())),
        alerts: Arc::new(alert_repo::PgAlertRepository::new(pool)),
    }
}
