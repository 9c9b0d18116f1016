//! Seat reservation and cancellation.
//!
//! Every mutation of `seats_available` goes through `BookingRepository::reserve`
//! or `cancel`, which validate against the row as read inside the transaction.
//! Pushes and events run only after commit and never change the outcome.

use std::sync::Arc;

use ridepool_core::command::{AttachReceipt, BookingRef, ReserveSeats};
use ridepool_core::events::{publish_json, EventPublisher};
use ridepool_core::notify::{spawn_best_effort, NotificationDispatcher, FALLBACK_PASSENGER_NAME};
use ridepool_core::repository::{BookingRepository, TripRepository};
use ridepool_core::{Booking, Caller, Clock, CoreError, CoreResult, Receipt, Trip};
use ridepool_shared::events::{
    BookingCanceledEvent, BookingCreatedEvent, CanceledBy, TOPIC_BOOKING_CANCELED, TOPIC_BOOKING_CREATED,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reservation {
    pub booking_id: String,
    pub seats: i32,
    pub seats_available: i32,
}

pub struct BookingManager {
    bookings: Arc<dyn BookingRepository>,
    trips: Arc<dyn TripRepository>,
    notifier: Arc<NotificationDispatcher>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

fn trip_or_not_found(trip: Option<&Trip>) -> CoreResult<&Trip> {
    trip.ok_or_else(|| CoreError::not_found("Trip not found"))
}

impl BookingManager {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        trips: Arc<dyn TripRepository>,
        notifier: Arc<NotificationDispatcher>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            bookings,
            trips,
            notifier,
            events,
            clock,
        }
    }

    pub async fn reserve(&self, caller: &Caller, command: ReserveSeats) -> CoreResult<Reservation> {
        let now = self.clock.now();
        let seats = command.seats;
        let booking = Booking {
            id: Uuid::new_v4().to_string(),
            trip_id: command.trip_id,
            uid: caller.uid.clone(),
            passenger_name: caller.display_name.clone(),
            seats,
            note: None,
            picked_up: false,
            created_at: now,
        };

        let check = move |trip: Option<&Trip>| -> CoreResult<()> {
            let trip = trip_or_not_found(trip)?;
            if trip.has_departed(now) {
                return Err(CoreError::precondition("This trip has already departed"));
            }
            if trip.seats_available < seats {
                return Err(CoreError::precondition("Not enough seats available"));
            }
            Ok(())
        };
        let trip = self.bookings.reserve(&booking, &check).await?;

        info!(
            trip_id = %trip.id,
            uid = %caller.uid,
            seats,
            seats_available = trip.seats_available,
            "Booking created"
        );

        let notifier = Arc::clone(&self.notifier);
        let passenger_name = caller.name_or(FALLBACK_PASSENGER_NAME).to_string();
        let passenger_uid = caller.uid.clone();
        let notified_trip = trip.clone();
        spawn_best_effort("notify_booking_created", async move {
            notifier
                .booking_created(&notified_trip, &passenger_uid, &passenger_name, seats)
                .await
        });

        let events = Arc::clone(&self.events);
        let event = BookingCreatedEvent {
            trip_id: trip.id.clone(),
            booking_id: booking.id.clone(),
            passenger_uid: caller.uid.clone(),
            seats,
            timestamp: now.timestamp(),
        };
        spawn_best_effort("publish_booking_created", async move {
            publish_json(events.as_ref(), TOPIC_BOOKING_CREATED, &event.trip_id, &event).await
        });

        Ok(Reservation {
            booking_id: booking.id,
            seats,
            seats_available: trip.seats_available,
        })
    }

    /// Passenger cancels their own booking.
    pub async fn cancel(&self, caller: &Caller, booking: BookingRef) -> CoreResult<()> {
        let uid = caller.uid.clone();
        let check = move |trip: Option<&Trip>, found: Option<&Booking>| -> CoreResult<()> {
            trip_or_not_found(trip)?;
            let found = found.ok_or_else(|| CoreError::not_found("Booking not found"))?;
            if found.uid != uid {
                return Err(CoreError::denied("You can only cancel your own booking"));
            }
            Ok(())
        };
        let cancellation = self
            .bookings
            .cancel(&booking.trip_id, &booking.booking_id, &check)
            .await?;

        info!(
            trip_id = %booking.trip_id,
            booking_id = %booking.booking_id,
            seats = cancellation.booking.seats,
            "Booking canceled by passenger"
        );

        let notifier = Arc::clone(&self.notifier);
        let name = cancellation
            .booking
            .passenger_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| caller.name_or(FALLBACK_PASSENGER_NAME).to_string());
        let trip = cancellation.trip.clone();
        spawn_best_effort("notify_booking_canceled_by_user", async move {
            notifier.booking_canceled_by_passenger(&trip, &name).await
        });

        self.publish_canceled(&cancellation.booking, CanceledBy::Passenger);
        Ok(())
    }

    /// Trip owner drops a passenger's booking.
    pub async fn cancel_as_driver(&self, caller: &Caller, booking: BookingRef) -> CoreResult<()> {
        let uid = caller.uid.clone();
        let check = move |trip: Option<&Trip>, found: Option<&Booking>| -> CoreResult<()> {
            let trip = trip_or_not_found(trip)?;
            found.ok_or_else(|| CoreError::not_found("Booking not found"))?;
            if !trip.is_owned_by(&uid) {
                return Err(CoreError::denied("You do not own this trip"));
            }
            Ok(())
        };
        let cancellation = self
            .bookings
            .cancel(&booking.trip_id, &booking.booking_id, &check)
            .await?;

        info!(
            trip_id = %booking.trip_id,
            booking_id = %booking.booking_id,
            passenger = %cancellation.booking.uid,
            "Booking canceled by driver"
        );

        // the booking row is gone; notify from the copy the transaction removed
        let notifier = Arc::clone(&self.notifier);
        let trip = cancellation.trip.clone();
        let removed = cancellation.booking.clone();
        spawn_best_effort("notify_booking_canceled_by_driver", async move {
            notifier.booking_canceled_by_driver(&trip, &removed).await
        });

        self.publish_canceled(&cancellation.booking, CanceledBy::Driver);
        Ok(())
    }

    fn publish_canceled(&self, booking: &Booking, canceled_by: CanceledBy) {
        let events = Arc::clone(&self.events);
        let event = BookingCanceledEvent {
            trip_id: booking.trip_id.clone(),
            booking_id: booking.id.clone(),
            passenger_uid: booking.uid.clone(),
            seats: booking.seats,
            canceled_by,
            timestamp: self.clock.now().timestamp(),
        };
        spawn_best_effort("publish_booking_canceled", async move {
            publish_json(events.as_ref(), TOPIC_BOOKING_CANCELED, &event.trip_id, &event).await
        });
    }

    async fn owned_trip(&self, caller: &Caller, trip_id: &str, allow_admin: bool) -> CoreResult<Trip> {
        let trip = self
            .trips
            .get_trip(trip_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Trip not found"))?;
        if trip.is_owned_by(&caller.uid) || (allow_admin && caller.role.is_admin()) {
            Ok(trip)
        } else {
            Err(CoreError::denied("You do not own this trip"))
        }
    }

    pub async fn set_picked_up(&self, caller: &Caller, booking: BookingRef, picked_up: bool) -> CoreResult<()> {
        self.owned_trip(caller, &booking.trip_id, false).await?;
        if !self
            .bookings
            .set_picked_up(&booking.trip_id, &booking.booking_id, picked_up)
            .await?
        {
            return Err(CoreError::not_found("Booking not found"));
        }
        Ok(())
    }

    /// Returns the new receipt id.
    pub async fn attach_receipt(&self, caller: &Caller, command: AttachReceipt) -> CoreResult<String> {
        let booking = self
            .bookings
            .get_booking(&command.booking.trip_id, &command.booking.booking_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Booking not found"))?;
        if booking.uid != caller.uid {
            return Err(CoreError::denied("Only the passenger can attach a receipt"));
        }

        let receipt = Receipt {
            id: Uuid::new_v4().to_string(),
            trip_id: booking.trip_id,
            booking_id: booking.id,
            uid: caller.uid.clone(),
            method: command.method,
            amount: command.amount,
            note: command.note,
            receipt_url: command.receipt_url,
            created_at: self.clock.now(),
        };
        self.bookings.insert_receipt(&receipt).await?;
        info!(booking_id = %receipt.booking_id, receipt_id = %receipt.id, "Receipt attached");
        Ok(receipt.id)
    }

    /// Trip owner or admin; newest first.
    pub async fn list_bookings(&self, caller: &Caller, trip_id: &str) -> CoreResult<Vec<Booking>> {
        if trip_id.trim().is_empty() {
            return Err(CoreError::invalid("Missing trip_id"));
        }
        self.owned_trip(caller, trip_id, true).await?;
        self.bookings.list_bookings(trip_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use ridepool_core::command::ReceiptDraft;
    use ridepool_core::events::RecordingEventPublisher;
    use ridepool_core::memory::MemoryStore;
    use ridepool_core::push::RecordingPushGateway;
    use ridepool_core::repository::ProfileRepository;
    use ridepool_core::trip::fixtures::trip;
    use ridepool_core::{FixedClock, Role};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 5, 1, 12, 0, 0).unwrap()
    }

    struct Harness {
        store: Arc<MemoryStore>,
        gateway: Arc<RecordingPushGateway>,
        events: Arc<RecordingEventPublisher>,
        manager: Arc<BookingManager>,
    }

    async fn harness(seats: i32) -> Harness {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_trip(&trip("t1", "driver1", seats, now() + Duration::days(1)))
            .await
            .unwrap();
        let gateway = Arc::new(RecordingPushGateway::new());
        let events = Arc::new(RecordingEventPublisher::new());
        let notifier = Arc::new(NotificationDispatcher::new(store.clone(), store.clone(), gateway.clone()));
        let manager = Arc::new(BookingManager::new(
            store.clone(),
            store.clone(),
            notifier,
            events.clone(),
            Arc::new(FixedClock::new(now())),
        ));
        Harness {
            store,
            gateway,
            events,
            manager,
        }
    }

    fn passenger(uid: &str) -> Caller {
        Caller::new(uid, Role::Traveler).with_name(uid.to_uppercase())
    }

    async fn seats_available(store: &MemoryStore) -> i32 {
        store.get_trip("t1").await.unwrap().unwrap().seats_available
    }

    #[tokio::test]
    async fn test_seat_scenario() {
        let h = harness(3).await;
        let a = passenger("a");
        let b = passenger("b");

        let first = h.manager.reserve(&a, ReserveSeats::new("t1", Some(2.0)).unwrap()).await.unwrap();
        assert_eq!(first.seats_available, 1);

        let err = h
            .manager
            .reserve(&b, ReserveSeats::new("t1", Some(2.0)).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "failed-precondition");
        assert_eq!(seats_available(&h.store).await, 1);

        h.manager.reserve(&b, ReserveSeats::new("t1", Some(1.0)).unwrap()).await.unwrap();
        assert_eq!(seats_available(&h.store).await, 0);

        h.manager
            .cancel(&a, BookingRef::new("t1", &first.booking_id).unwrap())
            .await
            .unwrap();
        assert_eq!(seats_available(&h.store).await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_grant_at_most_capacity() {
        let h = harness(4).await;
        let mut handles = Vec::new();
        for i in 0..16 {
            let manager = Arc::clone(&h.manager);
            handles.push(tokio::spawn(async move {
                let caller = passenger(&format!("p{}", i));
                manager
                    .reserve(&caller, ReserveSeats::new("t1", Some(1.0)).unwrap())
                    .await
                    .map(|r| r.seats)
                    .unwrap_or(0)
            }));
        }
        let mut granted = 0;
        for handle in handles {
            granted += handle.await.unwrap();
        }
        assert_eq!(granted, 4);
        assert_eq!(seats_available(&h.store).await, 0);
    }

    #[tokio::test]
    async fn test_departed_and_missing_trips() {
        let h = harness(3).await;
        h.store
            .insert_trip(&trip("past", "driver1", 3, now() - Duration::hours(1)))
            .await
            .unwrap();

        let err = h
            .manager
            .reserve(&passenger("a"), ReserveSeats::new("past", None).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "failed-precondition");

        let err = h
            .manager
            .reserve(&passenger("a"), ReserveSeats::new("nope", None).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not-found");
    }

    #[tokio::test]
    async fn test_cancel_permissions() {
        let h = harness(3).await;
        let a = passenger("a");
        let res = h.manager.reserve(&a, ReserveSeats::new("t1", Some(2.0)).unwrap()).await.unwrap();
        let booking = BookingRef::new("t1", &res.booking_id).unwrap();

        let err = h.manager.cancel(&passenger("b"), booking.clone()).await.unwrap_err();
        assert_eq!(err.code(), "permission-denied");

        let err = h
            .manager
            .cancel_as_driver(&Caller::new("driver2", Role::Driver), booking.clone())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "permission-denied");
        assert_eq!(seats_available(&h.store).await, 1);

        let err = h
            .manager
            .cancel(&a, BookingRef::new("t1", "missing").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not-found");
    }

    #[tokio::test]
    async fn test_driver_cancel_notifies_removed_passenger() {
        let h = harness(3).await;
        h.store.register_device_token("a", "tok-a", None).await.unwrap();
        let res = h
            .manager
            .reserve(&passenger("a"), ReserveSeats::new("t1", Some(1.0)).unwrap())
            .await
            .unwrap();

        h.manager
            .cancel_as_driver(
                &Caller::new("driver1", Role::Driver),
                BookingRef::new("t1", &res.booking_id).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(seats_available(&h.store).await, 3);

        let mut kinds = Vec::new();
        for _ in 0..50 {
            kinds = h
                .gateway
                .sent()
                .await
                .iter()
                .map(|s| s.data["kind"].clone())
                .collect::<Vec<_>>();
            if kinds.contains(&"booking_canceled_by_driver".to_string()) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(kinds.contains(&"booking_ok".to_string()));
        assert!(kinds.contains(&"booking_canceled_by_driver".to_string()));

        for _ in 0..50 {
            if h.events.events().await.len() >= 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let topics = h.events.topics().await;
        assert!(topics.contains(&TOPIC_BOOKING_CREATED.to_string()));
        assert!(topics.contains(&TOPIC_BOOKING_CANCELED.to_string()));
    }

    #[tokio::test]
    async fn test_picked_up_and_listing_are_owner_only() {
        let h = harness(3).await;
        let res = h
            .manager
            .reserve(&passenger("a"), ReserveSeats::new("t1", None).unwrap())
            .await
            .unwrap();
        let booking = BookingRef::new("t1", &res.booking_id).unwrap();

        let err = h
            .manager
            .set_picked_up(&passenger("a"), booking.clone(), true)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "permission-denied");

        let driver = Caller::new("driver1", Role::Driver);
        h.manager.set_picked_up(&driver, booking.clone(), true).await.unwrap();
        let listed = h.manager.list_bookings(&driver, "t1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].picked_up);
        assert_eq!(listed[0].passenger_name.as_deref(), Some("A"));

        let admin = Caller::new("root", Role::Admin);
        assert_eq!(h.manager.list_bookings(&admin, "t1").await.unwrap().len(), 1);
        assert_eq!(
            h.manager.list_bookings(&passenger("a"), "t1").await.unwrap_err().code(),
            "permission-denied"
        );
    }

    #[tokio::test]
    async fn test_receipt_only_by_passenger() {
        let h = harness(3).await;
        let res = h
            .manager
            .reserve(&passenger("a"), ReserveSeats::new("t1", None).unwrap())
            .await
            .unwrap();
        let draft = ReceiptDraft {
            receipt_url: Some("https://files.example/receipt.png".to_string()),
            amount: Some(5000.0),
            note: Some("  paid  ".to_string()),
            method: None,
        };
        let command = AttachReceipt::new(BookingRef::new("t1", &res.booking_id).unwrap(), draft).unwrap();

        let err = h
            .manager
            .attach_receipt(&passenger("b"), command.clone())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "permission-denied");

        let receipt_id = h.manager.attach_receipt(&passenger("a"), command).await.unwrap();
        let stored = h.store.receipts_for(&res.booking_id).await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, receipt_id);
        assert_eq!(stored[0].note, "paid");
        assert_eq!(stored[0].method, "transfer");
    }
}
