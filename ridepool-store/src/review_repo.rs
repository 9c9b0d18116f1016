use async_trait::async_trait;
use ridepool_core::keys::review_key;
use ridepool_core::profile::PLACEHOLDER_DISPLAY_NAME;
use ridepool_core::repository::{ReviewBuilder, ReviewRepository};
use ridepool_core::review::ReviewSnapshot;
use ridepool_core::{CoreError, CoreResult, RatingAggregate, Review, Trip};
use sqlx::PgPool;

use crate::database::{is_unique_violation, run_with_retry, TxError};
use crate::trip_repo::{TripRow, TRIP_COLUMNS};

pub struct PgReviewRepository {
    pool: PgPool,
    max_tx_retries: u32,
}

impl PgReviewRepository {
    pub fn new(pool: PgPool, max_tx_retries: u32) -> Self {
        Self { pool, max_tx_retries }
    }

    async fn submit_once(
        &self,
        trip_id: &str,
        reviewer_uid: &str,
        build: ReviewBuilder<'_>,
    ) -> Result<(Review, RatingAggregate), TxError> {
        let key = review_key(trip_id, reviewer_uid);
        let mut tx = self.pool.begin().await?;

        let trip = sqlx::query_as::<_, TripRow>(&format!(
            "SELECT {} FROM trips WHERE id = $1 FOR UPDATE",
            TRIP_COLUMNS
        ))
        .bind(trip_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(Trip::from);

        let (has_booking,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM bookings WHERE trip_id = $1 AND uid = $2)")
                .bind(trip_id)
                .bind(reviewer_uid)
                .fetch_one(&mut *tx)
                .await?;

        let (already_reviewed,): (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM reviews WHERE id = $1)")
            .bind(&key)
            .fetch_one(&mut *tx)
            .await?;

        let review = build(&ReviewSnapshot {
            trip: trip.as_ref(),
            has_booking,
            already_reviewed,
        })?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO reviews (id, trip_id, driver_uid, reviewer_uid, rating, comment, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&key)
        .bind(&review.trip_id)
        .bind(&review.driver_uid)
        .bind(&review.reviewer_uid)
        .bind(review.rating)
        .bind(&review.comment)
        .bind(review.created_at)
        .execute(&mut *tx)
        .await;
        if let Err(e) = inserted {
            if is_unique_violation(&e) {
                return Err(CoreError::AlreadyExists("You already reviewed this trip".to_string()).into());
            }
            return Err(e.into());
        }

        let (rating_sum, rating_count): (i64, i64) = sqlx::query_as(
            r#"
            INSERT INTO profiles (uid, display_name, rating_sum, rating_count, updated_at)
            VALUES ($1, $2, $3, 1, NOW())
            ON CONFLICT (uid) DO UPDATE SET
                rating_sum = profiles.rating_sum + EXCLUDED.rating_sum,
                rating_count = profiles.rating_count + 1,
                updated_at = NOW()
            RETURNING rating_sum, rating_count
            "#,
        )
        .bind(&review.driver_uid)
        .bind(PLACEHOLDER_DISPLAY_NAME)
        .bind(i64::from(review.rating))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((review, RatingAggregate { rating_sum, rating_count }))
    }
}

#[async_trait]
impl ReviewRepository for PgReviewRepository {
    async fn submit_review(
        &self,
        trip_id: &str,
        reviewer_uid: &str,
        build: ReviewBuilder<'_>,
    ) -> CoreResult<(Review, RatingAggregate)> {
        run_with_retry(self.max_tx_retries, "submit_review", || {
            self.submit_once(trip_id, reviewer_uid, build)
        })
        .await
    }
}
