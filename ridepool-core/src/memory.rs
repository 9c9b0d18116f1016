//! In-memory storage backend.
//!
//! Every repository call takes the same lock for its whole duration, so each call
//! is serializable with respect to every other one. Used by the test suites and by
//! `storage.backend = "memory"`.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex;

use crate::alert::RouteAlert;
use crate::booking::{Booking, Receipt};
use crate::keys::{review_key, route_key};
use crate::profile::UserProfile;
use crate::repository::{
    AlertRepository, BatchOutcome, BookingRepository, CancelCheck, Cancellation,
    ProfileRepository, ReviewBuilder, ReviewRepository, RuleRepository, TripCheck,
    TripRepository,
};
use crate::review::{RatingAggregate, Review, ReviewSnapshot};
use crate::rule::Rule;
use crate::trip::Trip;
use crate::{CoreError, CoreResult};

#[derive(Default)]
struct State {
    trips: HashMap<String, Trip>,
    bookings: HashMap<String, Vec<Booking>>,
    receipts: Vec<Receipt>,
    rules: HashMap<String, Rule>,
    reviews: HashMap<String, Review>,
    profiles: HashMap<String, UserProfile>,
    // uid -> token -> user agent
    device_tokens: HashMap<String, BTreeMap<String, Option<String>>>,
    // (uid, route key)
    alerts: HashMap<(String, String), RouteAlert>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn trip_count(&self) -> usize {
        self.state.lock().await.trips.len()
    }

    pub async fn receipts_for(&self, booking_id: &str) -> Vec<Receipt> {
        self.state
            .lock()
            .await
            .receipts
            .iter()
            .filter(|r| r.booking_id == booking_id)
            .cloned()
            .collect()
    }

    pub async fn review_count(&self) -> usize {
        self.state.lock().await.reviews.len()
    }
}

#[async_trait]
impl TripRepository for MemoryStore {
    async fn get_trip(&self, id: &str) -> CoreResult<Option<Trip>> {
        Ok(self.state.lock().await.trips.get(id).cloned())
    }

    async fn search_trips(
        &self,
        origin_id: &str,
        destination_id: &str,
        date: NaiveDate,
    ) -> CoreResult<Vec<Trip>> {
        let state = self.state.lock().await;
        let mut trips: Vec<Trip> = state
            .trips
            .values()
            .filter(|t| t.origin_id == origin_id && t.destination_id == destination_id && t.date == date)
            .cloned()
            .collect();
        trips.sort_by(|a, b| a.datetime.cmp(&b.datetime).then_with(|| a.id.cmp(&b.id)));
        Ok(trips)
    }

    async fn insert_trip(&self, trip: &Trip) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        if state.trips.contains_key(&trip.id) {
            return Err(CoreError::AlreadyExists(format!("Trip {} already exists", trip.id)));
        }
        state.trips.insert(trip.id.clone(), trip.clone());
        Ok(())
    }

    async fn insert_trips_if_absent(&self, trips: &[Trip]) -> CoreResult<BatchOutcome> {
        let mut state = self.state.lock().await;
        let mut outcome = BatchOutcome::default();
        for trip in trips {
            if state.trips.contains_key(&trip.id) {
                outcome.skipped += 1;
            } else {
                state.trips.insert(trip.id.clone(), trip.clone());
                outcome.created += 1;
            }
        }
        Ok(outcome)
    }

    async fn delete_trip(&self, id: &str) -> CoreResult<bool> {
        Ok(self.state.lock().await.trips.remove(id).is_some())
    }
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn reserve(&self, booking: &Booking, check: TripCheck<'_>) -> CoreResult<Trip> {
        let mut state = self.state.lock().await;
        check(state.trips.get(&booking.trip_id))?;

        let trip = state
            .trips
            .get_mut(&booking.trip_id)
            .ok_or_else(|| CoreError::not_found("Trip not found"))?;
        if trip.seats_available < booking.seats {
            return Err(CoreError::precondition("Not enough seats available"));
        }
        trip.seats_available -= booking.seats;
        let updated = trip.clone();

        state
            .bookings
            .entry(booking.trip_id.clone())
            .or_default()
            .push(booking.clone());
        Ok(updated)
    }

    async fn cancel(
        &self,
        trip_id: &str,
        booking_id: &str,
        check: CancelCheck<'_>,
    ) -> CoreResult<Cancellation> {
        let mut state = self.state.lock().await;
        let booking = state
            .bookings
            .get(trip_id)
            .and_then(|list| list.iter().find(|b| b.id == booking_id))
            .cloned();
        check(state.trips.get(trip_id), booking.as_ref())?;

        let booking = booking.ok_or_else(|| CoreError::not_found("Booking not found"))?;
        let mut trip = state
            .trips
            .get(trip_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("Trip not found"))?;
        trip.seats_available += booking.seats;
        // same guarantee as the seats_available CHECK on the trips table
        if !trip.inventory_is_consistent() {
            return Err(CoreError::storage(format!(
                "Releasing {} seats would exceed the capacity of trip {}",
                booking.seats, trip_id
            )));
        }

        if let Some(list) = state.bookings.get_mut(trip_id) {
            list.retain(|b| b.id != booking_id);
        }
        state.trips.insert(trip_id.to_string(), trip.clone());

        Ok(Cancellation { trip, booking })
    }

    async fn get_booking(&self, trip_id: &str, booking_id: &str) -> CoreResult<Option<Booking>> {
        let state = self.state.lock().await;
        Ok(state
            .bookings
            .get(trip_id)
            .and_then(|list| list.iter().find(|b| b.id == booking_id))
            .cloned())
    }

    async fn list_bookings(&self, trip_id: &str) -> CoreResult<Vec<Booking>> {
        let state = self.state.lock().await;
        let mut list = state.bookings.get(trip_id).cloned().unwrap_or_default();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn set_picked_up(&self, trip_id: &str, booking_id: &str, picked_up: bool) -> CoreResult<bool> {
        let mut state = self.state.lock().await;
        match state
            .bookings
            .get_mut(trip_id)
            .and_then(|list| list.iter_mut().find(|b| b.id == booking_id))
        {
            Some(booking) => {
                booking.picked_up = picked_up;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_receipt(&self, receipt: &Receipt) -> CoreResult<()> {
        self.state.lock().await.receipts.push(receipt.clone());
        Ok(())
    }
}

#[async_trait]
impl RuleRepository for MemoryStore {
    async fn get_rule(&self, id: &str) -> CoreResult<Option<Rule>> {
        Ok(self.state.lock().await.rules.get(id).cloned())
    }

    async fn upsert_rule(&self, rule: &Rule) -> CoreResult<()> {
        self.state
            .lock()
            .await
            .rules
            .insert(rule.id.clone(), rule.clone());
        Ok(())
    }

    async fn delete_rule(&self, id: &str) -> CoreResult<bool> {
        Ok(self.state.lock().await.rules.remove(id).is_some())
    }

    async fn list_rules_for_owner(&self, owner_uid: &str) -> CoreResult<Vec<Rule>> {
        let state = self.state.lock().await;
        let mut rules: Vec<Rule> = state
            .rules
            .values()
            .filter(|r| r.owner_uid == owner_uid)
            .cloned()
            .collect();
        rules.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rules)
    }

    async fn list_active_rules(&self) -> CoreResult<Vec<Rule>> {
        let state = self.state.lock().await;
        let mut rules: Vec<Rule> = state.rules.values().filter(|r| r.active).cloned().collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rules)
    }
}

#[async_trait]
impl ReviewRepository for MemoryStore {
    async fn submit_review(
        &self,
        trip_id: &str,
        reviewer_uid: &str,
        build: ReviewBuilder<'_>,
    ) -> CoreResult<(Review, RatingAggregate)> {
        let mut state = self.state.lock().await;
        let key = review_key(trip_id, reviewer_uid);

        let review = {
            let has_booking = state
                .bookings
                .get(trip_id)
                .map(|list| list.iter().any(|b| b.uid == reviewer_uid))
                .unwrap_or(false);
            let snapshot = ReviewSnapshot {
                trip: state.trips.get(trip_id),
                has_booking,
                already_reviewed: state.reviews.contains_key(&key),
            };
            build(&snapshot)?
        };

        let profile = state
            .profiles
            .entry(review.driver_uid.clone())
            .or_insert_with(|| UserProfile::placeholder(&review.driver_uid));
        profile.rating = profile.rating.fold(review.rating);
        profile.updated_at = Some(Utc::now());
        let aggregate = profile.rating;

        state.reviews.insert(key, review.clone());
        Ok((review, aggregate))
    }
}

#[async_trait]
impl ProfileRepository for MemoryStore {
    async fn get_profile(&self, uid: &str) -> CoreResult<Option<UserProfile>> {
        Ok(self.state.lock().await.profiles.get(uid).cloned())
    }

    async fn upsert_profile(
        &self,
        uid: &str,
        display_name: &str,
        photo_url: Option<&str>,
    ) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        let profile = state
            .profiles
            .entry(uid.to_string())
            .or_insert_with(|| UserProfile::placeholder(uid));
        profile.display_name = display_name.to_string();
        profile.photo_url = photo_url.map(str::to_string);
        profile.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn register_device_token(
        &self,
        uid: &str,
        token: &str,
        user_agent: Option<&str>,
    ) -> CoreResult<()> {
        self.state
            .lock()
            .await
            .device_tokens
            .entry(uid.to_string())
            .or_default()
            .insert(token.to_string(), user_agent.map(str::to_string));
        Ok(())
    }

    async fn device_tokens(&self, uid: &str) -> CoreResult<Vec<String>> {
        let state = self.state.lock().await;
        Ok(state
            .device_tokens
            .get(uid)
            .map(|tokens| tokens.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl AlertRepository for MemoryStore {
    async fn follow(&self, alert: &RouteAlert) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        let key = (alert.uid.clone(), alert.key());
        match state.alerts.get_mut(&key) {
            // keep the first subscription time
            Some(existing) => existing.active = alert.active,
            None => {
                state.alerts.insert(key, alert.clone());
            }
        }
        Ok(())
    }

    async fn unfollow(&self, uid: &str, origin_id: &str, destination_id: &str) -> CoreResult<bool> {
        let key = (uid.to_string(), route_key(origin_id, destination_id));
        Ok(self.state.lock().await.alerts.remove(&key).is_some())
    }

    async fn active_followers(&self, origin_id: &str, destination_id: &str) -> CoreResult<Vec<String>> {
        let state = self.state.lock().await;
        let mut uids: Vec<String> = state
            .alerts
            .values()
            .filter(|a| a.active && a.origin_id == origin_id && a.destination_id == destination_id)
            .map(|a| a.uid.clone())
            .collect();
        uids.sort();
        uids.dedup();
        Ok(uids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trip::fixtures;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn booking(id: &str, trip_id: &str, uid: &str, seats: i32) -> Booking {
        Booking {
            id: id.to_string(),
            trip_id: trip_id.to_string(),
            uid: uid.to_string(),
            passenger_name: None,
            seats,
            note: None,
            picked_up: false,
            created_at: Utc::now(),
        }
    }

    fn departure() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0).unwrap()
    }

    fn allow_any(_: Option<&Trip>) -> CoreResult<()> {
        Ok(())
    }

    fn allow_cancel(_: Option<&Trip>, _: Option<&Booking>) -> CoreResult<()> {
        Ok(())
    }

    #[tokio::test]
    async fn test_reserve_and_cancel_move_inventory() {
        let store = MemoryStore::new();
        store.insert_trip(&fixtures::trip("t1", "d1", 3, departure())).await.unwrap();

        let trip = store.reserve(&booking("b1", "t1", "p1", 2), &allow_any).await.unwrap();
        assert_eq!(trip.seats_available, 1);

        let err = store
            .reserve(&booking("b2", "t1", "p2", 2), &allow_any)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "failed-precondition");

        let cancel = store.cancel("t1", "b1", &allow_cancel).await.unwrap();
        assert_eq!(cancel.trip.seats_available, 3);
        assert_eq!(cancel.booking.seats, 2);
        assert!(store.get_booking("t1", "b1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancel_never_overfills_trip() {
        let store = MemoryStore::new();
        store.insert_trip(&fixtures::trip("t1", "d1", 3, departure())).await.unwrap();
        store.reserve(&booking("b1", "t1", "p1", 2), &allow_any).await.unwrap();

        // trip row replaced with a full inventory while the booking still exists
        store.delete_trip("t1").await.unwrap();
        store.insert_trip(&fixtures::trip("t1", "d1", 3, departure())).await.unwrap();

        let err = store.cancel("t1", "b1", &allow_cancel).await.unwrap_err();
        assert_eq!(err.code(), "internal");
        assert!(store.get_booking("t1", "b1").await.unwrap().is_some());
        assert_eq!(store.get_trip("t1").await.unwrap().unwrap().seats_available, 3);
    }

    #[tokio::test]
    async fn test_check_rejection_leaves_state_untouched() {
        let store = MemoryStore::new();
        store.insert_trip(&fixtures::trip("t1", "d1", 3, departure())).await.unwrap();

        let reject = |_: Option<&Trip>| -> CoreResult<()> { Err(CoreError::precondition("closed")) };
        assert!(store.reserve(&booking("b1", "t1", "p1", 1), &reject).await.is_err());

        let trip = store.get_trip("t1").await.unwrap().unwrap();
        assert_eq!(trip.seats_available, 3);
        assert!(store.list_bookings("t1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_oversell() {
        let store = Arc::new(MemoryStore::new());
        store.insert_trip(&fixtures::trip("t1", "d1", 5, departure())).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .reserve(&booking(&format!("b{}", i), "t1", &format!("p{}", i), 1), &allow_any)
                    .await
                    .is_ok()
            }));
        }
        let mut granted = 0;
        for h in handles {
            if h.await.unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 5);
        let trip = store.get_trip("t1").await.unwrap().unwrap();
        assert_eq!(trip.seats_available, 0);
        assert_eq!(store.list_bookings("t1").await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_batch_insert_skips_existing() {
        let store = MemoryStore::new();
        let mut existing = fixtures::trip("t1", "d1", 4, departure());
        existing.seats_available = 1;
        store.insert_trip(&existing).await.unwrap();

        let batch = vec![
            fixtures::trip("t1", "d1", 4, departure()),
            fixtures::trip("t2", "d1", 4, departure() + Duration::days(1)),
        ];
        let outcome = store.insert_trips_if_absent(&batch).await.unwrap();
        assert_eq!(outcome, BatchOutcome { created: 1, skipped: 1 });
        // existing row untouched
        assert_eq!(store.get_trip("t1").await.unwrap().unwrap().seats_available, 1);
    }

    #[tokio::test]
    async fn test_review_folds_into_placeholder_profile() {
        let store = MemoryStore::new();
        store.insert_trip(&fixtures::trip("t1", "d1", 3, departure())).await.unwrap();
        store.reserve(&booking("b1", "t1", "p1", 1), &allow_any).await.unwrap();

        let build = |snap: &ReviewSnapshot<'_>| -> CoreResult<Review> {
            assert!(snap.has_booking);
            assert!(!snap.already_reviewed);
            Ok(Review {
                id: "t1_p1".to_string(),
                trip_id: "t1".to_string(),
                driver_uid: "d1".to_string(),
                reviewer_uid: "p1".to_string(),
                rating: 4,
                comment: String::new(),
                created_at: Utc::now(),
            })
        };
        let (_, agg) = store.submit_review("t1", "p1", &build).await.unwrap();
        assert_eq!(agg, RatingAggregate { rating_sum: 4, rating_count: 1 });

        let profile = store.get_profile("d1").await.unwrap().unwrap();
        assert_eq!(profile.display_name, "Driver");
        assert_eq!(profile.rating.rating_count, 1);
    }

    #[tokio::test]
    async fn test_alert_follow_is_idempotent() {
        let store = MemoryStore::new();
        let alert = RouteAlert {
            uid: "p1".to_string(),
            origin_id: "a".to_string(),
            destination_id: "b".to_string(),
            active: true,
            created_at: Utc::now(),
        };
        store.follow(&alert).await.unwrap();
        store.follow(&alert).await.unwrap();
        assert_eq!(store.active_followers("a", "b").await.unwrap(), vec!["p1".to_string()]);
        assert!(store.unfollow("p1", "a", "b").await.unwrap());
        assert!(store.active_followers("a", "b").await.unwrap().is_empty());
    }
}
