use std::sync::Arc;

use chrono::NaiveDate;
use chrono_tz::Tz;
use ridepool_core::command::{PublishTrip, RouteRef};
use ridepool_core::repository::{ProfileRepository, TripRepository};
use ridepool_core::{Caller, Clock, CoreError, CoreResult, Trip, UserProfile};
use ridepool_schedule::generator::departure_instant;
use tracing::info;
use uuid::Uuid;

/// One-off trips and public trip reads.
pub struct TripService {
    trips: Arc<dyn TripRepository>,
    profiles: Arc<dyn ProfileRepository>,
    clock: Arc<dyn Clock>,
    time_zone: Tz,
}

impl TripService {
    pub fn new(
        trips: Arc<dyn TripRepository>,
        profiles: Arc<dyn ProfileRepository>,
        clock: Arc<dyn Clock>,
        time_zone: Tz,
    ) -> Self {
        Self {
            trips,
            profiles,
            clock,
            time_zone,
        }
    }

    pub async fn publish(&self, caller: &Caller, command: PublishTrip) -> CoreResult<Trip> {
        if !caller.role.can_publish() {
            return Err(CoreError::denied("Only drivers can publish trips"));
        }

        let departs_at = departure_instant(&self.time_zone, command.date, command.time)
            .ok_or_else(|| CoreError::invalid("Departure time does not exist in the marketplace time zone"))?;
        let now = self.clock.now();
        if departs_at <= now {
            return Err(CoreError::invalid("Departure must be in the future"));
        }

        let driver = self
            .profiles
            .get_profile(&caller.uid)
            .await?
            .unwrap_or_else(|| UserProfile::placeholder(&caller.uid))
            .driver_snapshot();

        let trip = Trip {
            id: Uuid::new_v4().to_string(),
            owner_uid: caller.uid.clone(),
            origin_id: command.origin_id,
            destination_id: command.destination_id,
            date: command.date,
            datetime: departs_at,
            price: command.price,
            seats_total: command.seats,
            seats_available: command.seats,
            driver,
            vehicle_photo_url: command.vehicle_photo_url,
            rule_id: None,
            created_at: now,
        };
        self.trips.insert_trip(&trip).await?;
        info!(trip_id = %trip.id, owner = %trip.owner_uid, "Trip published");
        Ok(trip)
    }

    pub async fn get(&self, trip_id: &str) -> CoreResult<Trip> {
        if trip_id.trim().is_empty() {
            return Err(CoreError::invalid("Missing trip_id"));
        }
        self.trips
            .get_trip(trip_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Trip not found"))
    }

    /// Trips for the route on that day, earliest departure first.
    pub async fn search(&self, route: &RouteRef, date: NaiveDate) -> CoreResult<Vec<Trip>> {
        self.trips
            .search_trips(&route.origin_id, &route.destination_id, date)
            .await
    }

    /// Owner or admin. Bookings under the trip are left as they are.
    pub async fn delete(&self, caller: &Caller, trip_id: &str) -> CoreResult<()> {
        let trip = self.get(trip_id).await?;
        if !trip.is_owned_by(&caller.uid) && !caller.role.is_admin() {
            return Err(CoreError::denied("You do not own this trip"));
        }
        self.trips.delete_trip(trip_id).await?;
        info!(trip_id, by = %caller.uid, "Trip deleted");
        Ok(())
    }
}
