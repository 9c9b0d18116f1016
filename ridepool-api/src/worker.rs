use std::sync::Arc;

use chrono_tz::Tz;
use ridepool_schedule::DailySweep;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing::{error, info};

/// Registers the daily rule sweep in the marketplace time zone and starts the
/// scheduler. The returned handle must be kept alive.
pub async fn start_daily_sweep(
    sweep: Arc<DailySweep>,
    schedule: &str,
    time_zone: Tz,
) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create scheduler: {}", e))?;

    let job = CronJob::new_async_tz(schedule, time_zone, move |_uuid, _lock| {
        let sweep = Arc::clone(&sweep);
        Box::pin(async move {
            match sweep.run().await {
                Ok(summary) => info!(
                    rules = summary.rules,
                    failed = summary.failed,
                    created = summary.created,
                    "Daily sweep done"
                ),
                Err(e) => error!("Daily sweep could not list rules: {}", e),
            }
        })
    })
    .map_err(|e| anyhow::anyhow!("Failed to create daily sweep schedule: {}", e))?;

    scheduler
        .add(job)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to add daily sweep schedule: {}", e))?;
    scheduler
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start scheduler: {}", e))?;

    info!(schedule, time_zone = %time_zone, "Daily sweep scheduled");
    Ok(scheduler)
}
