use std::future::Future;
use std::time::Duration;

use ridepool_core::{CoreError, CoreResult};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tracing::{info, warn};

use crate::app_config::DatabaseConfig;

const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
    pub max_tx_retries: u32,
}

impl DbClient {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.url)
            .await?;

        Ok(Self {
            pool,
            max_tx_retries: config.max_tx_retries.max(1),
        })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

/// Failure of one transaction attempt: either the database said no, or the
/// caller's check rejected the state it read.
#[derive(Debug)]
pub(crate) enum TxError {
    Db(sqlx::Error),
    Rejected(CoreError),
}

impl From<sqlx::Error> for TxError {
    fn from(e: sqlx::Error) -> Self {
        if is_unique_violation(&e) {
            TxError::Rejected(CoreError::AlreadyExists("Record already exists".to_string()))
        } else {
            TxError::Db(e)
        }
    }
}

impl From<CoreError> for TxError {
    fn from(e: CoreError) -> Self {
        TxError::Rejected(e)
    }
}

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    }
}

pub(crate) fn is_retryable(err: &sqlx::Error) -> bool {
    matches!(
        sqlstate(err).as_deref(),
        Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED)
    )
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    sqlstate(err).as_deref() == Some(UNIQUE_VIOLATION)
}

/// Runs `attempt` until it commits, is rejected, or fails with a non-retryable
/// error. Each attempt must open and commit its own transaction.
pub(crate) async fn run_with_retry<T, F, Fut>(max_attempts: u32, op: &'static str, mut attempt: F) -> CoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TxError>>,
{
    let mut n = 0;
    loop {
        n += 1;
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(TxError::Rejected(e)) => return Err(e),
            Err(TxError::Db(e)) if is_retryable(&e) && n < max_attempts => {
                warn!(op, attempt = n, error = %e, "Transaction conflict, retrying");
                tokio::time::sleep(Duration::from_millis(25 * u64::from(n))).await;
            }
            Err(TxError::Db(e)) => {
                tracing::error!(op, attempt = n, error = %e, "Transaction failed");
                return Err(CoreError::storage(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: CoreResult<()> = run_with_retry(3, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TxError::Rejected(CoreError::precondition("full"))) }
        })
        .await;

        assert_eq!(result.unwrap_err().code(), "failed-precondition");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_plain_db_error_surfaces_as_storage() {
        let result: CoreResult<()> =
            run_with_retry(3, "test", || async { Err(TxError::Db(sqlx::Error::RowNotFound)) }).await;
        assert!(matches!(result, Err(CoreError::Storage(_))));
    }
}
