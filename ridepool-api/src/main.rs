use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use ridepool_api::{app, worker, AppState};
use ridepool_core::events::{EventPublisher, NoopEventPublisher};
use ridepool_core::memory::MemoryStore;
use ridepool_core::push::{LogPushGateway, PushGateway};
use ridepool_core::repository::Repositories;
use ridepool_core::{Clock, SystemClock};
use ridepool_store::app_config::{Config, StorageBackend};
use ridepool_store::{pg_repositories, DbClient, EventProducer, KafkaPushGateway, RedisClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ridepool_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Ridepool API on port {}", config.server.port);

    let repos = match config.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            Repositories::from_store(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Postgres => {
            let db = DbClient::new(&config.database)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            pg_repositories(&db)
        }
    };

    // Kafka is optional; without it events are dropped and pushes only logged
    let (events, gateway): (Arc<dyn EventPublisher>, Arc<dyn PushGateway>) = match &config.kafka.brokers {
        Some(brokers) => {
            let producer = Arc::new(EventProducer::new(brokers).context("Failed to create Kafka producer")?);
            let gateway: Arc<dyn PushGateway> = Arc::new(KafkaPushGateway::new(producer.clone()));
            let events: Arc<dyn EventPublisher> = producer;
            (events, gateway)
        }
        None => {
            tracing::warn!("kafka.brokers not set; events disabled");
            let events: Arc<dyn EventPublisher> = Arc::new(NoopEventPublisher);
            let gateway: Arc<dyn PushGateway> = Arc::new(LogPushGateway);
            (events, gateway)
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut app_state = AppState::new(repos, events, gateway, clock, &config)?;

    if let Some(url) = &config.redis.url {
        let redis = RedisClient::new(url).await.context("Failed to connect to Redis")?;
        app_state = app_state.with_redis(Arc::new(redis));
    }

    let time_zone = config.schedule.time_zone().map_err(anyhow::Error::msg)?;
    let _scheduler =
        worker::start_daily_sweep(app_state.sweep.clone(), &config.schedule.daily_cron, time_zone).await?;

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
