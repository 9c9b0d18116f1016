use std::sync::Arc;

use ridepool_core::command::SubmitReview;
use ridepool_core::events::{publish_json, EventPublisher};
use ridepool_core::keys::review_key;
use ridepool_core::notify::spawn_best_effort;
use ridepool_core::repository::ReviewRepository;
use ridepool_core::review::ReviewSnapshot;
use ridepool_core::{Caller, Clock, CoreError, CoreResult, RatingAggregate, Review};
use ridepool_shared::events::{ReviewSubmittedEvent, TOPIC_REVIEW_SUBMITTED};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewResult {
    pub rating_average: Option<f64>,
    pub rating_count: i64,
}

impl From<RatingAggregate> for ReviewResult {
    fn from(agg: RatingAggregate) -> Self {
        Self {
            rating_average: agg.average(),
            rating_count: agg.rating_count,
        }
    }
}

/// One review per passenger per completed trip, folded into the driver's
/// running totals in the same transaction.
pub struct ReviewAggregator {
    reviews: Arc<dyn ReviewRepository>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl ReviewAggregator {
    pub fn new(reviews: Arc<dyn ReviewRepository>, events: Arc<dyn EventPublisher>, clock: Arc<dyn Clock>) -> Self {
        Self { reviews, events, clock }
    }

    pub async fn submit(&self, caller: &Caller, command: SubmitReview) -> CoreResult<ReviewResult> {
        let now = self.clock.now();
        let reviewer = caller.uid.clone();
        let SubmitReview {
            trip_id,
            rating,
            comment,
        } = command;

        let build = |snapshot: &ReviewSnapshot<'_>| -> CoreResult<Review> {
            let trip = snapshot
                .trip
                .ok_or_else(|| CoreError::not_found("Trip not found"))?;
            if trip.datetime > now {
                return Err(CoreError::precondition("You can only review a trip after it took place"));
            }
            if !snapshot.has_booking {
                return Err(CoreError::denied("You have no booking on this trip"));
            }
            if snapshot.already_reviewed {
                return Err(CoreError::AlreadyExists("You already reviewed this trip".to_string()));
            }
            Ok(Review {
                id: review_key(&trip.id, &reviewer),
                trip_id: trip.id.clone(),
                driver_uid: trip.owner_uid.clone(),
                reviewer_uid: reviewer.clone(),
                rating,
                comment: comment.clone(),
                created_at: now,
            })
        };
        let (review, aggregate) = self.reviews.submit_review(&trip_id, &caller.uid, &build).await?;

        info!(
            trip_id = %review.trip_id,
            driver = %review.driver_uid,
            rating = review.rating,
            rating_count = aggregate.rating_count,
            "Review submitted"
        );

        let events = Arc::clone(&self.events);
        let event = ReviewSubmittedEvent {
            trip_id: review.trip_id.clone(),
            driver_uid: review.driver_uid.clone(),
            reviewer_uid: review.reviewer_uid.clone(),
            rating: review.rating,
            timestamp: now.timestamp(),
        };
        spawn_best_effort("publish_review_submitted", async move {
            publish_json(events.as_ref(), TOPIC_REVIEW_SUBMITTED, &event.driver_uid, &event).await
        });

        Ok(aggregate.into())
    }
}
