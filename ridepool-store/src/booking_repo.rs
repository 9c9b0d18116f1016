use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ridepool_core::repository::{BookingRepository, CancelCheck, Cancellation, TripCheck};
use ridepool_core::{Booking, CoreError, CoreResult, Receipt, Trip};
use sqlx::PgPool;

use crate::database::{run_with_retry, TxError};
use crate::trip_repo::{TripRow, TRIP_COLUMNS};

const BOOKING_COLUMNS: &str = "id, trip_id, uid, passenger_name, seats, note, picked_up, created_at";

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: String,
    trip_id: String,
    uid: String,
    passenger_name: Option<String>,
    seats: i32,
    note: Option<String>,
    picked_up: bool,
    created_at: DateTime<Utc>,
}

impl From<BookingRow> for Booking {
    fn from(row: BookingRow) -> Self {
        Booking {
            id: row.id,
            trip_id: row.trip_id,
            uid: row.uid,
            passenger_name: row.passenger_name,
            seats: row.seats,
            note: row.note,
            picked_up: row.picked_up,
            created_at: row.created_at,
        }
    }
}

pub struct PgBookingRepository {
    pool: PgPool,
    max_tx_retries: u32,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool, max_tx_retries: u32) -> Self {
        Self { pool, max_tx_retries }
    }

    async fn reserve_once(&self, booking: &Booking, check: TripCheck<'_>) -> Result<Trip, TxError> {
        let mut tx = self.pool.begin().await?;

        let locked = sqlx::query_as::<_, TripRow>(&format!(
            "SELECT {} FROM trips WHERE id = $1 FOR UPDATE",
            TRIP_COLUMNS
        ))
        .bind(&booking.trip_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(Trip::from);

        check(locked.as_ref())?;
        if locked.is_none() {
            return Err(CoreError::not_found("Trip not found").into());
        }

        let updated = sqlx::query_as::<_, TripRow>(&format!(
            "UPDATE trips SET seats_available = seats_available - $1 \
             WHERE id = $2 AND seats_available >= $1 RETURNING {}",
            TRIP_COLUMNS
        ))
        .bind(booking.seats)
        .bind(&booking.trip_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CoreError::precondition("Not enough seats available"))?;

        sqlx::query(
            r#"
            INSERT INTO bookings (id, trip_id, uid, passenger_name, seats, note, picked_up, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&booking.id)
        .bind(&booking.trip_id)
        .bind(&booking.uid)
        .bind(&booking.passenger_name)
        .bind(booking.seats)
        .bind(&booking.note)
        .bind(booking.picked_up)
        .bind(booking.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated.into())
    }

    async fn cancel_once(
        &self,
        trip_id: &str,
        booking_id: &str,
        check: CancelCheck<'_>,
    ) -> Result<Cancellation, TxError> {
        let mut tx = self.pool.begin().await?;

        // trip first, then booking: same lock order as reserve
        let trip = sqlx::query_as::<_, TripRow>(&format!(
            "SELECT {} FROM trips WHERE id = $1 FOR UPDATE",
            TRIP_COLUMNS
        ))
        .bind(trip_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(Trip::from);

        let booking = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE trip_id = $1 AND id = $2 FOR UPDATE",
            BOOKING_COLUMNS
        ))
        .bind(trip_id)
        .bind(booking_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(Booking::from);

        check(trip.as_ref(), booking.as_ref())?;
        let booking = booking.ok_or_else(|| CoreError::not_found("Booking not found"))?;
        if trip.is_none() {
            return Err(CoreError::not_found("Trip not found").into());
        }

        sqlx::query("DELETE FROM bookings WHERE trip_id = $1 AND id = $2")
            .bind(trip_id)
            .bind(booking_id)
            .execute(&mut *tx)
            .await?;

        let trip = sqlx::query_as::<_, TripRow>(&format!(
            "UPDATE trips SET seats_available = seats_available + $1 WHERE id = $2 RETURNING {}",
            TRIP_COLUMNS
        ))
        .bind(booking.seats)
        .bind(trip_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Cancellation {
            trip: trip.into(),
            booking,
        })
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn reserve(&self, booking: &Booking, check: TripCheck<'_>) -> CoreResult<Trip> {
        run_with_retry(self.max_tx_retries, "reserve", || self.reserve_once(booking, check)).await
    }

    async fn cancel(
        &self,
        trip_id: &str,
        booking_id: &str,
        check: CancelCheck<'_>,
    ) -> CoreResult<Cancellation> {
        run_with_retry(self.max_tx_retries, "cancel", || self.cancel_once(trip_id, booking_id, check)).await
    }

    async fn get_booking(&self, trip_id: &str, booking_id: &str) -> CoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE trip_id = $1 AND id = $2",
            BOOKING_COLUMNS
        ))
        .bind(trip_id)
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(CoreError::storage)?;
        Ok(row.map(Booking::from))
    }

    async fn list_bookings(&self, trip_id: &str) -> CoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE trip_id = $1 ORDER BY created_at DESC",
            BOOKING_COLUMNS
        ))
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::storage)?;
        Ok(rows.into_iter().map(Booking::from).collect())
    }

    async fn set_picked_up(&self, trip_id: &str, booking_id: &str, picked_up: bool) -> CoreResult<bool> {
        let result = sqlx::query("UPDATE bookings SET picked_up = $1 WHERE trip_id = $2 AND id = $3")
            .bind(picked_up)
            .bind(trip_id)
            .bind(booking_id)
            .execute(&self.pool)
            .await
            .map_err(CoreError::storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_receipt(&self, receipt: &Receipt) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO receipts (id, trip_id, booking_id, uid, method, amount, note, receipt_url, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&receipt.id)
        .bind(&receipt.trip_id)
        .bind(&receipt.booking_id)
        .bind(&receipt.uid)
        .bind(&receipt.method)
        .bind(receipt.amount)
        .bind(&receipt.note)
        .bind(&receipt.receipt_url)
        .bind(receipt.created_at)
        .execute(&self.pool)
        .await
        .map_err(CoreError::storage)?;
        Ok(())
    }
}
