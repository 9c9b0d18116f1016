//! Best-effort notification fan-out.
//!
//! Nothing in here is allowed to fail a booking, cancellation or expansion: callers
//! run these after their transaction commits, through `spawn_best_effort`.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;

use crate::booking::Booking;
use crate::push::{PushGateway, PushNotification, PushReport};
use crate::repository::{AlertRepository, ProfileRepository};
use crate::trip::Trip;
use crate::CoreResult;

pub const FALLBACK_PASSENGER_NAME: &str = "Passenger";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutSummary {
    pub users_notified: u32,
    pub total_success: u32,
}

pub struct NotificationDispatcher {
    profiles: Arc<dyn ProfileRepository>,
    alerts: Arc<dyn AlertRepository>,
    gateway: Arc<dyn PushGateway>,
}

fn push_data(kind: &str, extra: &[(&str, &str)]) -> BTreeMap<String, String> {
    let mut data = BTreeMap::new();
    data.insert("kind".to_string(), kind.to_string());
    for (k, v) in extra {
        data.insert((*k).to_string(), (*v).to_string());
    }
    data
}

impl NotificationDispatcher {
    pub fn new(
        profiles: Arc<dyn ProfileRepository>,
        alerts: Arc<dyn AlertRepository>,
        gateway: Arc<dyn PushGateway>,
    ) -> Self {
        Self {
            profiles,
            alerts,
            gateway,
        }
    }

    pub async fn send_to_user(
        &self,
        uid: &str,
        notification: &PushNotification,
        data: &BTreeMap<String, String>,
    ) -> CoreResult<PushReport> {
        let tokens = self.profiles.device_tokens(uid).await?;
        if tokens.is_empty() {
            return Ok(PushReport::default());
        }
        let report = self.gateway.send_to_tokens(&tokens, notification, data).await;
        if report.failure_count > 0 {
            tracing::debug!(uid, failures = report.failure_count, "Some push deliveries failed");
        }
        Ok(report)
    }

    /// Pushes "new trips" to everyone following the route.
    pub async fn notify_route_followers(
        &self,
        origin_id: &str,
        destination_id: &str,
        summary: &str,
    ) -> CoreResult<FanOutSummary> {
        let uids: BTreeSet<String> = self
            .alerts
            .active_followers(origin_id, destination_id)
            .await?
            .into_iter()
            .collect();

        let notification = PushNotification::new(
            "New trips available",
            format!("{} → {}. {}", origin_id, destination_id, summary).trim().to_string(),
            "/",
        );
        let data = push_data(
            "route_new_trips",
            &[("origin_id", origin_id), ("destination_id", destination_id)],
        );

        let mut result = FanOutSummary::default();
        for uid in &uids {
            let report = self.send_to_user(uid, &notification, &data).await?;
            result.total_success += report.success_count;
        }
        result.users_notified = uids.len() as u32;
        Ok(result)
    }

    pub async fn booking_created(&self, trip: &Trip, passenger_uid: &str, passenger_name: &str, seats: i32) -> CoreResult<()> {
        let data = push_data("booking_created", &[("trip_id", &trip.id)]);
        self.send_to_user(
            &trip.owner_uid,
            &PushNotification::new(
                "New booking",
                format!("{} booked {} seat(s).", passenger_name, seats),
                "/dashboard",
            ),
            &data,
        )
        .await?;

        let data = push_data("booking_ok", &[("trip_id", &trip.id)]);
        self.send_to_user(
            passenger_uid,
            &PushNotification::new(
                "Booking confirmed",
                format!("Your booking for {} seat(s) was registered.", seats),
                "/dashboard",
            ),
            &data,
        )
        .await?;
        Ok(())
    }

    pub async fn booking_canceled_by_passenger(&self, trip: &Trip, passenger_name: &str) -> CoreResult<()> {
        let data = push_data("booking_canceled_by_user", &[("trip_id", &trip.id)]);
        self.send_to_user(
            &trip.owner_uid,
            &PushNotification::new(
                "Booking canceled",
                format!("{} canceled their booking.", passenger_name),
                "/dashboard",
            ),
            &data,
        )
        .await?;
        Ok(())
    }

    pub async fn booking_canceled_by_driver(&self, trip: &Trip, booking: &Booking) -> CoreResult<()> {
        let data = push_data("booking_canceled_by_driver", &[("trip_id", &trip.id)]);
        self.send_to_user(
            &booking.uid,
            &PushNotification::new(
                "Your booking was canceled",
                "The driver canceled your booking. Check other available trips.",
                "/",
            ),
            &data,
        )
        .await?;
        Ok(())
    }
}

/// Runs a non-critical side effect detached from the caller. Failures are logged
/// and dropped; there is no retry.
pub fn spawn_best_effort<F>(label: &'static str, fut: F) -> tokio::task::JoinHandle<()>
where
    F: Future<Output = CoreResult<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = fut.await {
            tracing::warn!(side_effect = label, error = %e, "Non-critical side effect failed");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::RouteAlert;
    use crate::memory::MemoryStore;
    use crate::push::RecordingPushGateway;
    use chrono::Utc;

    fn alert(uid: &str, active: bool) -> RouteAlert {
        RouteAlert {
            uid: uid.to_string(),
            origin_id: "cordoba".to_string(),
            destination_id: "rosario".to_string(),
            active,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_route_followers_only_active_with_tokens() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(RecordingPushGateway::new());
        store.follow(&alert("p1", true)).await.unwrap();
        store.follow(&alert("p2", true)).await.unwrap();
        store.follow(&alert("p3", false)).await.unwrap();
        store.register_device_token("p1", "tok-1", None).await.unwrap();
        store.register_device_token("p3", "tok-3", None).await.unwrap();

        let dispatcher = NotificationDispatcher::new(store.clone(), store.clone(), gateway.clone());
        let summary = dispatcher
            .notify_route_followers("cordoba", "rosario", "2 new trip(s)")
            .await
            .unwrap();

        assert_eq!(summary.users_notified, 2);
        assert_eq!(summary.total_success, 1);
        let sent = gateway.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].tokens, vec!["tok-1".to_string()]);
        assert_eq!(sent[0].data["kind"], "route_new_trips");
    }

    #[tokio::test]
    async fn test_failed_delivery_is_counted_not_raised() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(RecordingPushGateway::failing());
        store.register_device_token("u1", "tok", None).await.unwrap();
        let dispatcher = NotificationDispatcher::new(store.clone(), store.clone(), gateway);

        let report = dispatcher
            .send_to_user("u1", &PushNotification::new("", "hi", "/"), &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(report, PushReport { success_count: 0, failure_count: 1 });
    }

    #[tokio::test]
    async fn test_spawn_best_effort_swallows_errors() {
        let handle = spawn_best_effort("test", async {
            Err(crate::CoreError::Internal("boom".to_string()))
        });
        assert!(handle.await.is_ok());
    }
}
