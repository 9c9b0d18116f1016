use std::sync::Arc;

use ridepool_booking::{BookingManager, ReviewAggregator, TripService};
use ridepool_core::events::EventPublisher;
use ridepool_core::notify::NotificationDispatcher;
use ridepool_core::push::PushGateway;
use ridepool_core::repository::{AlertRepository, ProfileRepository, Repositories};
use ridepool_core::Clock;
use ridepool_schedule::{DailySweep, GeneratorSettings, RuleService, TripGenerator};
use ridepool_store::app_config::Config;
use ridepool_store::RedisClient;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone, Copy)]
pub struct Limits {
    pub requests_per_window: i64,
    pub window_seconds: i64,
    pub max_horizon_days: u32,
}

#[derive(Clone)]
pub struct AppState {
    pub bookings: Arc<BookingManager>,
    pub trips: Arc<TripService>,
    pub rules: Arc<RuleService>,
    pub reviews: Arc<ReviewAggregator>,
    pub sweep: Arc<DailySweep>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub alerts: Arc<dyn AlertRepository>,
    pub clock: Arc<dyn Clock>,
    pub redis: Option<Arc<RedisClient>>,
    pub auth: AuthConfig,
    pub limits: Limits,
}

impl AppState {
    /// Wires every service over one set of repositories.
    pub fn new(
        repos: Repositories,
        events: Arc<dyn EventPublisher>,
        gateway: Arc<dyn PushGateway>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let time_zone = config.schedule.time_zone().map_err(anyhow::Error::msg)?;
        let settings = GeneratorSettings {
            time_zone,
            default_horizon_days: config.schedule.default_horizon_days,
            max_batch: config.schedule.max_batch,
        };

        let notifier = Arc::new(NotificationDispatcher::new(
            repos.profiles.clone(),
            repos.alerts.clone(),
            gateway,
        ));
        let generator = Arc::new(TripGenerator::new(
            repos.trips.clone(),
            repos.profiles.clone(),
            clock.clone(),
            settings,
        ));

        Ok(Self {
            bookings: Arc::new(BookingManager::new(
                repos.bookings.clone(),
                repos.trips.clone(),
                notifier.clone(),
                events.clone(),
                clock.clone(),
            )),
            trips: Arc::new(TripService::new(
                repos.trips.clone(),
                repos.profiles.clone(),
                clock.clone(),
                time_zone,
            )),
            rules: Arc::new(RuleService::new(
                repos.rules.clone(),
                generator.clone(),
                notifier.clone(),
                events.clone(),
                clock.clone(),
            )),
            reviews: Arc::new(ReviewAggregator::new(repos.reviews.clone(), events.clone(), clock.clone())),
            sweep: Arc::new(DailySweep::new(repos.rules.clone(), generator, notifier, events, clock.clone())),
            profiles: repos.profiles,
            alerts: repos.alerts,
            clock,
            redis: None,
            auth: AuthConfig {
                secret: config.auth.jwt_secret.clone(),
                expiration: config.auth.jwt_expiration_seconds,
            },
            limits: Limits {
                requests_per_window: config.rate_limit.requests_per_window,
                window_seconds: config.rate_limit.window_seconds,
                max_horizon_days: config.schedule.max_horizon_days,
            },
        })
    }

    pub fn with_redis(mut self, redis: Arc<RedisClient>) -> Self {
        self.redis = Some(redis);
        self
    }
}
