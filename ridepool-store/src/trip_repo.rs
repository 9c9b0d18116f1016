use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use ridepool_core::repository::{BatchOutcome, TripRepository};
use ridepool_core::{CoreError, CoreResult, DriverSnapshot, Trip};
use sqlx::PgPool;

use crate::database::{is_unique_violation, run_with_retry, TxError};

pub(crate) const TRIP_COLUMNS: &str = "id, owner_uid, origin_id, destination_id, trip_date, departs_at, \
     price, seats_total, seats_available, driver_name, driver_photo_url, vehicle_photo_url, rule_id, created_at";

#[derive(sqlx::FromRow)]
pub(crate) struct TripRow {
    id: String,
    owner_uid: String,
    origin_id: String,
    destination_id: String,
    trip_date: NaiveDate,
    departs_at: DateTime<Utc>,
    price: f64,
    seats_total: i32,
    seats_available: i32,
    driver_name: String,
    driver_photo_url: Option<String>,
    vehicle_photo_url: Option<String>,
    rule_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<TripRow> for Trip {
    fn from(row: TripRow) -> Self {
        Trip {
            id: row.id,
            owner_uid: row.owner_uid,
            origin_id: row.origin_id,
            destination_id: row.destination_id,
            date: row.trip_date,
            datetime: row.departs_at,
            price: row.price,
            seats_total: row.seats_total,
            seats_available: row.seats_available,
            driver: DriverSnapshot {
                display_name: row.driver_name,
                photo_url: row.driver_photo_url,
            },
            vehicle_photo_url: row.vehicle_photo_url,
            rule_id: row.rule_id,
            created_at: row.created_at,
        }
    }
}

const INSERT_TRIP: &str = r#"
    INSERT INTO trips (id, owner_uid, origin_id, destination_id, trip_date, departs_at, price,
                       seats_total, seats_available, driver_name, driver_photo_url,
                       vehicle_photo_url, rule_id, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
"#;

fn bind_trip<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    trip: &'q Trip,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(&trip.id)
        .bind(&trip.owner_uid)
        .bind(&trip.origin_id)
        .bind(&trip.destination_id)
        .bind(trip.date)
        .bind(trip.datetime)
        .bind(trip.price)
        .bind(trip.seats_total)
        .bind(trip.seats_available)
        .bind(&trip.driver.display_name)
        .bind(&trip.driver.photo_url)
        .bind(&trip.vehicle_photo_url)
        .bind(&trip.rule_id)
        .bind(trip.created_at)
}

pub struct PgTripRepository {
    pool: PgPool,
    max_tx_retries: u32,
}

impl PgTripRepository {
    pub fn new(pool: PgPool, max_tx_retries: u32) -> Self {
        Self { pool, max_tx_retries }
    }

    async fn insert_batch_once(&self, trips: &[Trip]) -> Result<BatchOutcome, TxError> {
        let mut tx = self.pool.begin().await?;
        let mut outcome = BatchOutcome::default();
        let sql = format!("{} ON CONFLICT (id) DO NOTHING", INSERT_TRIP);

        for trip in trips {
            let result = bind_trip(sqlx::query(&sql), trip).execute(&mut *tx).await?;
            if result.rows_affected() == 1 {
                outcome.created += 1;
            } else {
                outcome.skipped += 1;
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }
}

#[async_trait]
impl TripRepository for PgTripRepository {
    async fn get_trip(&self, id: &str) -> CoreResult<Option<Trip>> {
        let row = sqlx::query_as::<_, TripRow>(&format!("SELECT {} FROM trips WHERE id = $1", TRIP_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CoreError::storage)?;
        Ok(row.map(Trip::from))
    }

    async fn search_trips(
        &self,
        origin_id: &str,
        destination_id: &str,
        date: NaiveDate,
    ) -> CoreResult<Vec<Trip>> {
        let rows = sqlx::query_as::<_, TripRow>(&format!(
            "SELECT {} FROM trips WHERE origin_id = $1 AND destination_id = $2 AND trip_date = $3 \
             ORDER BY departs_at, id",
            TRIP_COLUMNS
        ))
        .bind(origin_id)
        .bind(destination_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::storage)?;
        Ok(rows.into_iter().map(Trip::from).collect())
    }

    async fn insert_trip(&self, trip: &Trip) -> CoreResult<()> {
        match bind_trip(sqlx::query(INSERT_TRIP), trip).execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(CoreError::AlreadyExists(format!("Trip {} already exists", trip.id)))
            }
            Err(e) => Err(CoreError::storage(e)),
        }
    }

    async fn insert_trips_if_absent(&self, trips: &[Trip]) -> CoreResult<BatchOutcome> {
        if trips.is_empty() {
            return Ok(BatchOutcome::default());
        }
        run_with_retry(self.max_tx_retries, "insert_trips_if_absent", || self.insert_batch_once(trips)).await
    }

    async fn delete_trip(&self, id: &str) -> CoreResult<bool> {
        let result = sqlx::query("DELETE FROM trips WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(CoreError::storage)?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_row_maps_driver_snapshot() {
        let departs = Utc.with_ymd_and_hms(2024, 1, 5, 10, 30, 0).unwrap();
        let row = TripRow {
            id: "u1_a_b_2024-01-05_0730".to_string(),
            owner_uid: "u1".to_string(),
            origin_id: "a".to_string(),
            destination_id: "b".to_string(),
            trip_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            departs_at: departs,
            price: 1200.0,
            seats_total: 4,
            seats_available: 2,
            driver_name: "Ana".to_string(),
            driver_photo_url: Some("https://img/ana.png".to_string()),
            vehicle_photo_url: None,
            rule_id: Some("r1".to_string()),
            created_at: departs,
        };

        let trip = Trip::from(row);
        assert_eq!(trip.driver.display_name, "Ana");
        assert_eq!((trip.seats_total, trip.seats_available), (4, 2));
        assert_eq!(trip.rule_id.as_deref(), Some("r1"));
    }
}
