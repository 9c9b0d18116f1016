use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ridepool_core::repository::ProfileRepository;
use ridepool_core::{CoreError, CoreResult, RatingAggregate, UserProfile};
use sqlx::PgPool;

#[derive(sqlx::FromRow)]
struct ProfileRow {
    uid: String,
    display_name: String,
    photo_url: Option<String>,
    rating_sum: i64,
    rating_count: i64,
    updated_at: Option<DateTime<Utc>>,
}

pub struct PgProfileRepository {
    pool: PgPool,
}

impl PgProfileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileRepository for PgProfileRepository {
    async fn get_profile(&self, uid: &str) -> CoreResult<Option<UserProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT uid, display_name, photo_url, rating_sum, rating_count, updated_at FROM profiles WHERE uid = $1",
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await
        .map_err(CoreError::storage)?;

        Ok(row.map(|r| UserProfile {
            uid: r.uid,
            display_name: r.display_name,
            photo_url: r.photo_url,
            rating: RatingAggregate {
                rating_sum: r.rating_sum,
                rating_count: r.rating_count,
            },
            updated_at: r.updated_at,
        }))
    }

    async fn upsert_profile(
        &self,
        uid: &str,
        display_name: &str,
        photo_url: Option<&str>,
    ) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO profiles (uid, display_name, photo_url, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (uid) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                photo_url = EXCLUDED.photo_url,
                updated_at = NOW()
            "#,
        )
        .bind(uid)
        .bind(display_name)
        .bind(photo_url)
        .execute(&self.pool)
        .await
        .map_err(CoreError::storage)?;
        Ok(())
    }

    async fn register_device_token(
        &self,
        uid: &str,
        token: &str,
        user_agent: Option<&str>,
    ) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO device_tokens (uid, token, user_agent, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (uid, token) DO UPDATE SET
                user_agent = EXCLUDED.user_agent,
                updated_at = NOW()
            "#,
        )
        .bind(uid)
        .bind(token)
        .bind(user_agent)
        .execute(&self.pool)
        .await
        .map_err(CoreError::storage)?;
        Ok(())
    }

    async fn device_tokens(&self, uid: &str) -> CoreResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT token FROM device_tokens WHERE uid = $1 ORDER BY token")
            .bind(uid)
            .fetch_all(&self.pool)
            .await
            .map_err(CoreError::storage)?;
        Ok(rows.into_iter().map(|(t,)| t).collect())
    }
}
