use async_trait::async_trait;
use ridepool_core::repository::AlertRepository;
use ridepool_core::{CoreError, CoreResult, RouteAlert};
use sqlx::PgPool;

pub struct PgAlertRepository {
    pool: PgPool,
}

impl PgAlertRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlertRepository for PgAlertRepository {
    async fn follow(&self, alert: &RouteAlert) -> CoreResult<()> {
        // created_at keeps the first subscription time
        sqlx::query(
            r#"
            INSERT INTO route_alerts (uid, origin_id, destination_id, active, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (uid, origin_id, destination_id) DO UPDATE SET active = EXCLUDED.active
            "#,
        )
        .bind(&alert.uid)
        .bind(&alert.origin_id)
        .bind(&alert.destination_id)
        .bind(alert.active)
        .bind(alert.created_at)
        .execute(&self.pool)
        .await
        .map_err(CoreError::storage)?;
        Ok(())
    }

    async fn unfollow(&self, uid: &str, origin_id: &str, destination_id: &str) -> CoreResult<bool> {
        let result = sqlx::query(
            "DELETE FROM route_alerts WHERE uid = $1 AND origin_id = $2 AND destination_id = $3",
        )
        .bind(uid)
        .bind(origin_id)
        .bind(destination_id)
        .execute(&self.pool)
        .await
        .map_err(CoreError::storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn active_followers(&self, origin_id: &str, destination_id: &str) -> CoreResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT uid FROM route_alerts \
             WHERE origin_id = $1 AND destination_id = $2 AND active ORDER BY uid",
        )
        .bind(origin_id)
        .bind(destination_id)
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::storage)?;
        Ok(rows.into_iter().map(|(uid,)| uid).collect())
    }
}
