use std::sync::Arc;

use ridepool_core::events::EventPublisher;
use ridepool_core::notify::NotificationDispatcher;
use ridepool_core::repository::RuleRepository;
use ridepool_core::{Clock, CoreResult};
use serde::Serialize;
use tracing::{info, warn};

use crate::generator::TripGenerator;
use crate::rules::announce_new_trips;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub rules: u32,
    pub failed: u32,
    pub created: u32,
    pub skipped: u32,
}

/// Daily extension of every active rule over the default horizon. One rule
/// failing never stops the others.
pub struct DailySweep {
    rules: Arc<dyn RuleRepository>,
    generator: Arc<TripGenerator>,
    notifier: Arc<NotificationDispatcher>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl DailySweep {
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

    pub async fn run(&self) -> CoreResult<SweepSummary> {
        let rules = self.rules.list_active_rules().await?;
        let horizon = self.generator.settings().default_horizon_days;
        let mut summary = SweepSummary::default();

        for rule in &rules {
            summary.rules += 1;
            match self.generator.expand(rule, horizon).await {
                Ok(outcome) => {
                    summary.created += outcome.created;
                    summary.skipped += outcome.skipped;
                    announce_new_trips(
                        &self.notifier,
                        &self.events,
                        rule,
                        outcome,
                        self.clock.now().timestamp(),
                    );
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(rule_id = %rule.id, error = %e, "Rule expansion failed during sweep");
                }
            }
        }

        info!(
            rules = summary.rules,
            failed = summary.failed,
            created = summary.created,
            skipped = summary.skipped,
            "extend_all_rules_daily finished"
        );
        Ok(summary)
    }
}
