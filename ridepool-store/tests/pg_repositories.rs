use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use ridepool_core::keys::review_key;
use ridepool_core::repository::{BatchOutcome, BookingRepository, ReviewRepository, TripRepository};
use ridepool_core::review::ReviewSnapshot;
use ridepool_core::trip::fixtures;
use ridepool_core::{Booking, CoreResult, Review, Trip};
use ridepool_store::booking_repo::PgBookingRepository;
use ridepool_store::review_repo::PgReviewRepository;
use ridepool_store::trip_repo::PgTripRepository;
use sqlx::PgPool;

const RETRIES: u32 = 3;

fn departure() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0).unwrap()
}

fn booking(id: &str, trip_id: &str, uid: &str, seats: i32) -> Booking {
    Booking {
        id: id.to_string(),
        trip_id: trip_id.to_string(),
        uid: uid.to_string(),
        passenger_name: None,
        seats,
        note: None,
        picked_up: false,
        created_at: departure() - Duration::days(1),
    }
}

fn allow_any(_: Option<&Trip>) -> CoreResult<()> {
    Ok(())
}

fn allow_cancel(_: Option<&Trip>, _: Option<&Booking>) -> CoreResult<()> {
    Ok(())
}

/// Ignores `already_reviewed` so a second submission reaches the unique key.
fn build_review(snapshot: &ReviewSnapshot<'_>) -> CoreResult<Review> {
    assert!(snapshot.has_booking);
    Ok(Review {
        id: review_key("t1", "p1"),
        trip_id: "t1".to_string(),
        driver_uid: "d1".to_string(),
        reviewer_uid: "p1".to_string(),
        rating: 5,
        comment: String::new(),
        created_at: departure() + Duration::days(1),
    })
}

#[sqlx::test(migrations = "../migrations")]
async fn test_concurrent_reserve_and_cancel_never_oversell(pool: PgPool) {
    let trips = PgTripRepository::new(pool.clone(), RETRIES);
    let bookings = Arc::new(PgBookingRepository::new(pool, RETRIES));
    trips.insert_trip(&fixtures::trip("t1", "d1", 5, departure())).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..12 {
        let bookings = bookings.clone();
        handles.push(tokio::spawn(async move {
            bookings
                .reserve(&booking(&format!("b{}", i), "t1", &format!("p{}", i), 1), &allow_any)
                .await
        }));
    }
    let mut granted = Vec::new();
    for h in handles {
        match h.await.unwrap() {
            Ok(trip) => granted.push(trip.seats_available),
            Err(e) => assert_eq!(e.code(), "failed-precondition"),
        }
    }
    assert_eq!(granted.len(), 5);
    assert_eq!(trips.get_trip("t1").await.unwrap().unwrap().seats_available, 0);

    let listed = bookings.list_bookings("t1").await.unwrap();
    assert_eq!(listed.len(), 5);

    // cancellations racing with new reservations still keep the counts aligned
    let mut handles = Vec::new();
    for b in listed.iter().take(2) {
        let bookings = bookings.clone();
        let id = b.id.clone();
        handles.push(tokio::spawn(async move {
            bookings.cancel("t1", &id, &allow_cancel).await.map(|_| ())
        }));
    }
    for i in 20..24 {
        let bookings = bookings.clone();
        handles.push(tokio::spawn(async move {
            bookings
                .reserve(&booking(&format!("b{}", i), "t1", &format!("p{}", i), 1), &allow_any)
                .await
                .map(|_| ())
        }));
    }
    for h in handles {
        let _ = h.await.unwrap();
    }

    let trip = trips.get_trip("t1").await.unwrap().unwrap();
    let held: i32 = bookings.list_bookings("t1").await.unwrap().iter().map(|b| b.seats).sum();
    assert!(trip.seats_available >= 0);
    assert_eq!(trip.seats_available + held, trip.seats_total);
}

#[sqlx::test(migrations = "../migrations")]
async fn test_cancel_gives_seats_back_once(pool: PgPool) {
    let trips = PgTripRepository::new(pool.clone(), RETRIES);
    let bookings = PgBookingRepository::new(pool, RETRIES);
    trips.insert_trip(&fixtures::trip("t1", "d1", 3, departure())).await.unwrap();

    bookings.reserve(&booking("b1", "t1", "p1", 2), &allow_any).await.unwrap();
    let cancelled = bookings.cancel("t1", "b1", &allow_cancel).await.unwrap();
    assert_eq!(cancelled.trip.seats_available, 3);
    assert_eq!(cancelled.booking.seats, 2);

    let err = bookings.cancel("t1", "b1", &allow_cancel).await.unwrap_err();
    assert_eq!(err.code(), "not-found");
    assert_eq!(trips.get_trip("t1").await.unwrap().unwrap().seats_available, 3);
}

#[sqlx::test(migrations = "../migrations")]
async fn test_batch_insert_counts_created_and_skipped(pool: PgPool) {
    let trips = PgTripRepository::new(pool, RETRIES);
    let mut existing = fixtures::trip("t1", "d1", 4, departure());
    existing.seats_available = 1;
    trips.insert_trip(&existing).await.unwrap();

    let batch = vec![
        fixtures::trip("t1", "d1", 4, departure()),
        fixtures::trip("t2", "d1", 4, departure() + Duration::days(1)),
        fixtures::trip("t3", "d1", 4, departure() + Duration::days(2)),
    ];
    let first = trips.insert_trips_if_absent(&batch).await.unwrap();
    assert_eq!(first, BatchOutcome { created: 2, skipped: 1 });

    let again = trips.insert_trips_if_absent(&batch).await.unwrap();
    assert_eq!(again, BatchOutcome { created: 0, skipped: 3 });

    // existing row is never overwritten
    assert_eq!(trips.get_trip("t1").await.unwrap().unwrap().seats_available, 1);

    let err = trips.insert_trip(&existing).await.unwrap_err();
    assert_eq!(err.code(), "already-exists");
}

#[sqlx::test(migrations = "../migrations")]
async fn test_duplicate_review_is_already_exists(pool: PgPool) {
    let trips = PgTripRepository::new(pool.clone(), RETRIES);
    let bookings = PgBookingRepository::new(pool.clone(), RETRIES);
    let reviews = PgReviewRepository::new(pool, RETRIES);
    trips.insert_trip(&fixtures::trip("t1", "d1", 3, departure())).await.unwrap();
    bookings.reserve(&booking("b1", "t1", "p1", 1), &allow_any).await.unwrap();

    let (review, aggregate) = reviews.submit_review("t1", "p1", &build_review).await.unwrap();
    assert_eq!(review.rating, 5);
    assert_eq!((aggregate.rating_sum, aggregate.rating_count), (5, 1));

    let err = reviews.submit_review("t1", "p1", &build_review).await.unwrap_err();
    assert_eq!(err.code(), "already-exists");
}
