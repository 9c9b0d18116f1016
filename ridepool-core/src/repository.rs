use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::alert::RouteAlert;
use crate::booking::{Booking, Receipt};
use crate::profile::UserProfile;
use crate::review::{RatingAggregate, Review, ReviewSnapshot};
use crate::rule::Rule;
use crate::trip::Trip;
use crate::CoreResult;

/// Validation run against the trip as read inside the reservation transaction.
pub type TripCheck<'a> = &'a (dyn Fn(Option<&Trip>) -> CoreResult<()> + Send + Sync);

/// Validation run against trip and booking as read inside the cancellation transaction.
pub type CancelCheck<'a> = &'a (dyn Fn(Option<&Trip>, Option<&Booking>) -> CoreResult<()> + Send + Sync);

/// Builds the review from the state read inside the review transaction, or rejects it.
pub type ReviewBuilder<'a> = &'a (dyn Fn(&ReviewSnapshot<'_>) -> CoreResult<Review> + Send + Sync);

/// Counts from an insert-if-absent batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub created: u32,
    pub skipped: u32,
}

#[derive(Debug, Clone)]
pub struct Cancellation {
    pub trip: Trip,
    pub booking: Booking,
}

/// Trip inventory documents.
#[async_trait]
pub trait TripRepository: Send + Sync {
    async fn get_trip(&self, id: &str) -> CoreResult<Option<Trip>>;

    async fn search_trips(
        &self,
        origin_id: &str,
        destination_id: &str,
        date: NaiveDate,
    ) -> CoreResult<Vec<Trip>>;

    /// Fails with `already-exists` when the id is taken.
    async fn insert_trip(&self, trip: &Trip) -> CoreResult<()>;

    /// Inserts every trip whose id is free, in one atomic batch. Existing rows are
    /// left untouched and counted as skipped.
    async fn insert_trips_if_absent(&self, trips: &[Trip]) -> CoreResult<BatchOutcome>;

    /// Removes the trip row only; bookings under it are left in place.
    async fn delete_trip(&self, id: &str) -> CoreResult<bool>;
}

/// Seat-inventory transactions. Implementations must run each call as a single
/// atomic unit: fresh read, `check`, then the seat delta and booking write together,
/// retrying internally when the storage layer reports a conflict.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Decrements `seats_available` by `booking.seats` and inserts the booking.
    /// Returns the trip as it stands after the decrement.
    async fn reserve(&self, booking: &Booking, check: TripCheck<'_>) -> CoreResult<Trip>;

    /// Deletes the booking and gives its seats back to the trip.
    async fn cancel(
        &self,
        trip_id: &str,
        booking_id: &str,
        check: CancelCheck<'_>,
    ) -> CoreResult<Cancellation>;

    async fn get_booking(&self, trip_id: &str, booking_id: &str) -> CoreResult<Option<Booking>>;

    /// Newest first.
    async fn list_bookings(&self, trip_id: &str) -> CoreResult<Vec<Booking>>;

    async fn set_picked_up(&self, trip_id: &str, booking_id: &str, picked_up: bool) -> CoreResult<bool>;

    async fn insert_receipt(&self, receipt: &Receipt) -> CoreResult<()>;
}

#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn get_rule(&self, id: &str) -> CoreResult<Option<Rule>>;

    async fn upsert_rule(&self, rule: &Rule) -> CoreResult<()>;

    async fn delete_rule(&self, id: &str) -> CoreResult<bool>;

    async fn list_rules_for_owner(&self, owner_uid: &str) -> CoreResult<Vec<Rule>>;

    async fn list_active_rules(&self) -> CoreResult<Vec<Rule>>;
}

#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// Reads trip, reviewer bookings and the review key inside one transaction,
    /// lets `build` decide, then writes the review and folds its rating into the
    /// driver's aggregate.
    async fn submit_review(
        &self,
        trip_id: &str,
        reviewer_uid: &str,
        build: ReviewBuilder<'_>,
    ) -> CoreResult<(Review, RatingAggregate)>;
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn get_profile(&self, uid: &str) -> CoreResult<Option<UserProfile>>;

    async fn upsert_profile(
        &self,
        uid: &str,
        display_name: &str,
        photo_url: Option<&str>,
    ) -> CoreResult<()>;

    async fn register_device_token(
        &self,
        uid: &str,
        token: &str,
        user_agent: Option<&str>,
    ) -> CoreResult<()>;

    async fn device_tokens(&self, uid: &str) -> CoreResult<Vec<String>>;
}

#[async_trait]
pub trait AlertRepository: Send + Sync {
    async fn follow(&self, alert: &RouteAlert) -> CoreResult<()>;

    async fn unfollow(&self, uid: &str, origin_id: &str, destination_id: &str) -> CoreResult<bool>;

    /// Distinct uids with an active alert on the route.
    async fn active_followers(&self, origin_id: &str, destination_id: &str) -> CoreResult<Vec<String>>;
}

/// The storage handles every component is built from.
#[derive(Clone)]
pub struct Repositories {
    pub trips: Arc<dyn TripRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub rules: Arc<dyn RuleRepository>,
    pub reviews: Arc<dyn ReviewRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub alerts: Arc<dyn AlertRepository>,
}

impl Repositories {
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: TripRepository
            + BookingRepository
            + RuleRepository
            + ReviewRepository
            + ProfileRepository
            + AlertRepository
            + 'static,
    {
        Self {
            trips: store.clone(),
            bookings: store.clone(),
            rules: store.clone(),
            reviews: store.clone(),
            profiles: store.clone(),
            alerts: store,
        }
    }
}
