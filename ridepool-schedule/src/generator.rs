//! Rule expansion: turns a weekly schedule into dated trip rows.
//!
//! Expansion is idempotent. Trip ids are derived from the rule's owner, route,
//! day and time, and persisted with insert-if-absent, so running it again over
//! the same window only reports the existing rows as skipped.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use ridepool_core::command::{DEFAULT_HORIZON_DAYS, MAX_TRIP_SEATS};
use ridepool_core::keys::trip_key;
use ridepool_core::repository::{BatchOutcome, ProfileRepository, TripRepository};
use ridepool_core::{Clock, CoreError, CoreResult, DriverSnapshot, Rule, Trip, UserProfile};
use tracing::{debug, warn};

pub const DEFAULT_MAX_BATCH: usize = 500;

#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    /// Zone in which rule dates and times are read.
    pub time_zone: Tz,
    pub default_horizon_days: u32,
    pub max_batch: usize,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            time_zone: chrono_tz::America::Argentina::Buenos_Aires,
            default_horizon_days: DEFAULT_HORIZON_DAYS,
            max_batch: DEFAULT_MAX_BATCH,
        }
    }
}

/// Inclusive range of calendar days a rule may produce trips for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionWindow {
    pub start: NaiveDate,
    pub until: NaiveDate,
}

impl ExpansionWindow {
    pub fn is_empty(&self) -> bool {
        self.until < self.start
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let until = self.until;
        self.start.iter_days().take_while(move |d| *d <= until)
    }
}

/// `until = min(end_date or start + horizon, today + horizon)`.
pub fn expansion_window(rule: &Rule, today: NaiveDate, horizon_days: u32) -> ExpansionWindow {
    let horizon = Duration::days(i64::from(horizon_days));
    let hard_end = rule.end_date.unwrap_or(rule.start_date + horizon);
    let horizon_cap = today + horizon;
    ExpansionWindow {
        start: rule.start_date,
        until: hard_end.min(horizon_cap),
    }
}

/// Local wall-clock time in `tz` to a UTC instant. Ambiguous times take the
/// earlier instant; times skipped by a DST jump have none.
pub fn departure_instant(tz: &Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

/// Days in the window the rule runs on, capped at `max_batch`. The cap keeps
/// the days nearest `until` so the upcoming horizon is always covered.
pub fn candidate_days(rule: &Rule, window: &ExpansionWindow, max_batch: usize) -> (Vec<NaiveDate>, usize) {
    if window.is_empty() {
        return (Vec::new(), 0);
    }
    let mut days: Vec<NaiveDate> = window.days().filter(|d| rule.runs_on(*d)).collect();
    let dropped = days.len().saturating_sub(max_batch);
    days.drain(..dropped);
    (days, dropped)
}

pub fn build_trip(
    rule: &Rule,
    day: NaiveDate,
    departs_at: DateTime<Utc>,
    driver: &DriverSnapshot,
    created_at: DateTime<Utc>,
) -> Trip {
    Trip {
        id: trip_key(&rule.owner_uid, &rule.origin_id, &rule.destination_id, day, rule.time),
        owner_uid: rule.owner_uid.clone(),
        origin_id: rule.origin_id.clone(),
        destination_id: rule.destination_id.clone(),
        date: day,
        datetime: departs_at,
        price: rule.price,
        seats_total: rule.seats,
        seats_available: rule.seats,
        driver: driver.clone(),
        vehicle_photo_url: rule.vehicle_photo_url.clone(),
        rule_id: Some(rule.id.clone()),
        created_at,
    }
}

/// Stored rules are validated on write, but rows can predate a constraint.
fn check_stored_rule(rule: &Rule) -> CoreResult<()> {
    if !(1..=MAX_TRIP_SEATS).contains(&rule.seats) {
        return Err(CoreError::invalid(format!("Rule {} has invalid seats {}", rule.id, rule.seats)));
    }
    if !rule.price.is_finite() || rule.price < 0.0 {
        return Err(CoreError::invalid(format!("Rule {} has invalid price", rule.id)));
    }
    if rule.weekdays.iter().any(|d| *d > 6) {
        return Err(CoreError::invalid(format!("Rule {} has invalid weekdays", rule.id)));
    }
    if rule.origin_id.is_empty() || rule.destination_id.is_empty() {
        return Err(CoreError::invalid(format!("Rule {} has no route", rule.id)));
    }
    Ok(())
}

pub struct TripGenerator {
    trips: Arc<dyn TripRepository>,
    profiles: Arc<dyn ProfileRepository>,
    clock: Arc<dyn Clock>,
    settings: GeneratorSettings,
}

impl TripGenerator {
    pub fn new(
        trips: Arc<dyn TripRepository>,
        profiles: Arc<dyn ProfileRepository>,
        clock: Arc<dyn Clock>,
        settings: GeneratorSettings,
    ) -> Self {
        Self {
            trips,
            profiles,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    /// Today's date in the marketplace zone.
    pub fn today(&self) -> NaiveDate {
        self.clock
            .now()
            .with_timezone(&self.settings.time_zone)
            .date_naive()
    }

    pub async fn expand(&self, rule: &Rule, horizon_days: u32) -> CoreResult<BatchOutcome> {
        if !rule.active {
            return Ok(BatchOutcome::default());
        }
        check_stored_rule(rule)?;

        let window = expansion_window(rule, self.today(), horizon_days);
        let (days, dropped) = candidate_days(rule, &window, self.settings.max_batch);
        if dropped > 0 {
            warn!(
                rule_id = %rule.id,
                dropped,
                max_batch = self.settings.max_batch,
                "Expansion exceeds batch limit, extra days dropped"
            );
        }
        if days.is_empty() {
            debug!(rule_id = %rule.id, "Nothing to expand");
            return Ok(BatchOutcome::default());
        }

        let driver = self
            .profiles
            .get_profile(&rule.owner_uid)
            .await?
            .unwrap_or_else(|| UserProfile::placeholder(&rule.owner_uid))
            .driver_snapshot();

        let created_at = self.clock.now();
        let mut trips = Vec::with_capacity(days.len());
        for day in days {
            match departure_instant(&self.settings.time_zone, day, rule.time) {
                Some(departs_at) => trips.push(build_trip(rule, day, departs_at, &driver, created_at)),
                None => warn!(rule_id = %rule.id, %day, "Departure time does not exist locally, day skipped"),
            }
        }

        if trips.is_empty() {
            return Ok(BatchOutcome::default());
        }
        let outcome = self.trips.insert_trips_if_absent(&trips).await?;
        debug!(
            rule_id = %rule.id,
            created = outcome.created,
            skipped = outcome.skipped,
            "Rule expanded"
        );
        Ok(outcome)
    }
}
