use std::sync::Arc;

use ridepool_core::command::{GenerateForRule, RuleInput};
use ridepool_core::events::{publish_json, EventPublisher};
use ridepool_core::notify::{spawn_best_effort, NotificationDispatcher};
use ridepool_core::repository::{BatchOutcome, RuleRepository};
use ridepool_core::{Caller, Clock, CoreError, CoreResult, Rule};
use ridepool_shared::events::{TripsGeneratedEvent, TOPIC_TRIPS_GENERATED};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::generator::TripGenerator;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleOutcome {
    pub rule_id: String,
    pub created: u32,
    pub skipped: u32,
}

/// Follower push and `trips.generated` event for an expansion that produced rows.
/// Both run detached.
pub fn announce_new_trips(
    notifier: &Arc<NotificationDispatcher>,
    events: &Arc<dyn EventPublisher>,
    rule: &Rule,
    outcome: BatchOutcome,
    timestamp: i64,
) {
    if outcome.created == 0 {
        return;
    }

    let notifier = Arc::clone(notifier);
    let origin = rule.origin_id.clone();
    let destination = rule.destination_id.clone();
    let summary = format!("{} new trip(s)", outcome.created);
    spawn_best_effort("notify_route_followers", async move {
        let fan_out = notifier
            .notify_route_followers(&origin, &destination, &summary)
            .await?;
        info!(
            origin = %origin,
            destination = %destination,
            users = fan_out.users_notified,
            delivered = fan_out.total_success,
            "Route followers notified"
        );
        Ok(())
    });

    let events = Arc::clone(events);
    let event = TripsGeneratedEvent {
        rule_id: rule.id.clone(),
        owner_uid: rule.owner_uid.clone(),
        origin_id: rule.origin_id.clone(),
        destination_id: rule.destination_id.clone(),
        created: outcome.created,
        skipped: outcome.skipped,
        timestamp,
    };
    spawn_best_effort("publish_trips_generated", async move {
        publish_json(events.as_ref(), TOPIC_TRIPS_GENERATED, &event.rule_id, &event).await
    });
}

pub struct RuleService {
    rules: Arc<dyn RuleRepository>,
    generator: Arc<TripGenerator>,
    notifier: Arc<NotificationDispatcher>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl RuleService {
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        generator: Arc<TripGenerator>,
        notifier: Arc<NotificationDispatcher>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            rules,
            generator,
            notifier,
            events,
            clock,
        }
    }

    /// Upserts the rule and expands it over the default horizon.
    pub async fn create_or_update(&self, caller: &Caller, input: RuleInput) -> CoreResult<RuleOutcome> {
        let now = self.clock.now();
        let rule_id = input
            .rule_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let created_at = match self.rules.get_rule(&rule_id).await? {
            Some(existing) if existing.owner_uid != caller.uid => {
                return Err(CoreError::denied("You can only edit your own rules"));
            }
            Some(existing) => existing.created_at,
            None => now,
        };

        let rule = Rule {
            id: rule_id,
            owner_uid: caller.uid.clone(),
            origin_id: input.origin_id,
            destination_id: input.destination_id,
            weekdays: input.weekdays,
            time: input.time,
            price: input.price,
            seats: input.seats,
            vehicle_photo_url: input.vehicle_photo_url,
            start_date: input.start_date,
            end_date: input.end_date,
            active: input.active,
            created_at,
            updated_at: now,
        };
        self.rules.upsert_rule(&rule).await?;

        let horizon = self.generator.settings().default_horizon_days;
        let outcome = self.generator.expand(&rule, horizon).await?;
        info!(
            rule_id = %rule.id,
            owner = %rule.owner_uid,
            created = outcome.created,
            skipped = outcome.skipped,
            "Rule saved"
        );
        announce_new_trips(&self.notifier, &self.events, &rule, outcome, now.timestamp());

        Ok(RuleOutcome {
            rule_id: rule.id,
            created: outcome.created,
            skipped: outcome.skipped,
        })
    }

    pub async fn generate_for_rule_id(&self, caller: &Caller, command: GenerateForRule) -> CoreResult<BatchOutcome> {
        let rule = self
            .rules
            .get_rule(&command.rule_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Rule not found"))?;
        if rule.owner_uid != caller.uid {
            return Err(CoreError::denied("You cannot generate trips for this rule"));
        }

        let outcome = self.generator.expand(&rule, command.horizon_days).await?;
        info!(
            rule_id = %rule.id,
            horizon_days = command.horizon_days,
            created = outcome.created,
            skipped = outcome.skipped,
            "Manual expansion"
        );
        Ok(outcome)
    }

    pub async fn list(&self, caller: &Caller) -> CoreResult<Vec<Rule>> {
        self.rules.list_rules_for_owner(&caller.uid).await
    }

    /// Generated trips stay in place.
    pub async fn delete(&self, caller: &Caller, rule_id: &str) -> CoreResult<()> {
        if rule_id.trim().is_empty() {
            return Err(CoreError::invalid("Missing rule_id"));
        }
        let rule = self
            .rules
            .get_rule(rule_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Rule not found"))?;
        if rule.owner_uid != caller.uid {
            return Err(CoreError::denied("You can only delete your own rules"));
        }
        self.rules.delete_rule(rule_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::tests::date;
    use crate::generator::GeneratorSettings;
    use chrono::{NaiveTime, TimeZone, Utc};
    use ridepool_core::alert::RouteAlert;
    use ridepool_core::events::RecordingEventPublisher;
    use ridepool_core::memory::MemoryStore;
    use ridepool_core::push::RecordingPushGateway;
    use ridepool_core::repository::{AlertRepository, ProfileRepository, TripRepository};
    use ridepool_core::{FixedClock, Role};
    use std::time::Duration;

    struct Harness {
        store: Arc<MemoryStore>,
        gateway: Arc<RecordingPushGateway>,
        events: Arc<RecordingEventPublisher>,
        service: RuleService,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(RecordingPushGateway::new());
        let events = Arc::new(RecordingEventPublisher::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2023, 12, 31, 12, 0, 0).unwrap()));
        let generator = Arc::new(TripGenerator::new(
            store.clone(),
            store.clone(),
            clock.clone(),
            GeneratorSettings::default(),
        ));
        let notifier = Arc::new(NotificationDispatcher::new(store.clone(), store.clone(), gateway.clone()));
        let service = RuleService::new(store.clone(), generator, notifier, events.clone(), clock);
        Harness {
            store,
            gateway,
            events,
            service,
        }
    }

    fn input(rule_id: Option<&str>) -> RuleInput {
        RuleInput {
            rule_id: rule_id.map(str::to_string),
            origin_id: "cordoba".to_string(),
            destination_id: "rosario".to_string(),
            weekdays: vec![1, 3, 5],
            time: NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
            price: 8000.0,
            seats: 3,
            vehicle_photo_url: None,
            start_date: date(2024, 1, 1),
            end_date: Some(date(2024, 1, 10)),
            active: true,
        }
    }

    #[tokio::test]
    async fn test_create_expands_and_notifies_followers() {
        let h = harness();
        h.store
            .follow(&RouteAlert {
                uid: "p1".to_string(),
                origin_id: "cordoba".to_string(),
                destination_id: "rosario".to_string(),
                active: true,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        h.store.register_device_token("p1", "tok-1", None).await.unwrap();

        let driver = Caller::new("driver1", Role::Driver);
        let outcome = h.service.create_or_update(&driver, input(Some("r1"))).await.unwrap();
        assert_eq!(outcome, RuleOutcome { rule_id: "r1".to_string(), created: 5, skipped: 0 });

        // detached side effects
        for _ in 0..50 {
            if !h.gateway.sent().await.is_empty() && !h.events.events().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let sent = h.gateway.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].notification.title, "New trips available");
        assert_eq!(h.events.topics().await, vec![TOPIC_TRIPS_GENERATED.to_string()]);
    }

    #[tokio::test]
    async fn test_update_keeps_created_at_and_rejects_other_owner() {
        let h = harness();
        let driver = Caller::new("driver1", Role::Driver);
        h.service.create_or_update(&driver, input(Some("r1"))).await.unwrap();
        let first = h.store.get_rule("r1").await.unwrap().unwrap();

        let again = h.service.create_or_update(&driver, input(Some("r1"))).await.unwrap();
        assert_eq!(again.created, 0);
        assert_eq!(again.skipped, 5);
        assert_eq!(h.store.get_rule("r1").await.unwrap().unwrap().created_at, first.created_at);

        let intruder = Caller::new("driver2", Role::Driver);
        let err = h.service.create_or_update(&intruder, input(Some("r1"))).await.unwrap_err();
        assert_eq!(err.code(), "permission-denied");
        assert_eq!(h.store.get_rule("r1").await.unwrap().unwrap().owner_uid, "driver1");
    }

    #[tokio::test]
    async fn test_generate_for_rule_id_checks_owner() {
        let h = harness();
        let driver = Caller::new("driver1", Role::Driver);
        let mut rule_input = input(Some("r1"));
        rule_input.end_date = None;
        h.service.create_or_update(&driver, rule_input).await.unwrap();

        let command = GenerateForRule::new("r1", Some(60.0), 365).unwrap();
        let err = h
            .service
            .generate_for_rule_id(&Caller::new("other", Role::Driver), command.clone())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "permission-denied");

        let outcome = h.service.generate_for_rule_id(&driver, command).await.unwrap();
        assert!(outcome.created > 0);
        assert!(outcome.skipped > 0);

        let missing = GenerateForRule::new("nope", None, 365).unwrap();
        assert_eq!(
            h.service.generate_for_rule_id(&driver, missing).await.unwrap_err().code(),
            "not-found"
        );
    }

    #[tokio::test]
    async fn test_delete_leaves_trips() {
        let h = harness();
        let driver = Caller::new("driver1", Role::Driver);
        h.service.create_or_update(&driver, input(Some("r1"))).await.unwrap();

        assert_eq!(
            h.service.delete(&Caller::new("x", Role::Driver), "r1").await.unwrap_err().code(),
            "permission-denied"
        );
        h.service.delete(&driver, "r1").await.unwrap();
        assert!(h.service.list(&driver).await.unwrap().is_empty());
        assert_eq!(h.store.trip_count().await, 5);
        assert!(h
            .store
            .get_trip("driver1_cordoba_rosario_2024-01-01_0730")
            .await
            .unwrap()
            .is_some());
    }
}
