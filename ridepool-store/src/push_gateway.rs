use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use ridepool_core::push::{PushGateway, PushNotification, PushReport};
use ridepool_shared::events::{PushRequestEvent, TOPIC_PUSH_REQUESTS};
use ridepool_shared::Masked;
use uuid::Uuid;

use crate::events::EventProducer;

/// Hands push requests to an external sender through Kafka. Per-token delivery
/// happens downstream; a produced request counts every token as a success.
pub struct KafkaPushGateway {
    producer: Arc<EventProducer>,
}

impl KafkaPushGateway {
    pub fn new(producer: Arc<EventProducer>) -> Self {
        Self { producer }
    }
}

pub(crate) fn push_request(
    tokens: &[String],
    notification: &PushNotification,
    data: &BTreeMap<String, String>,
) -> PushRequestEvent {
    PushRequestEvent {
        request_id: Uuid::new_v4(),
        tokens: tokens.iter().cloned().map(Masked::from).collect(),
        title: notification.title.clone(),
        body: notification.body.clone(),
        link: notification.link.clone(),
        data: data.clone(),
        timestamp: Utc::now().timestamp(),
    }
}

#[async_trait]
impl PushGateway for KafkaPushGateway {
    async fn send_to_tokens(
        &self,
        tokens: &[String],
        notification: &PushNotification,
        data: &BTreeMap<String, String>,
    ) -> PushReport {
        let count = tokens.len() as u32;
        if count == 0 {
            return PushReport::default();
        }

        let request = push_request(tokens, notification, data);
        let payload = match serde_json::to_string(&request) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "Could not encode push request");
                return PushReport { success_count: 0, failure_count: count };
            }
        };

        match self
            .producer
            .send(TOPIC_PUSH_REQUESTS, &request.request_id.to_string(), &payload)
            .await
        {
            Ok(()) => PushReport { success_count: count, failure_count: 0 },
            Err(e) => {
                tracing::warn!(error = %e, tokens = count, "Push request not produced");
                PushReport { success_count: 0, failure_count: count }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_request_carries_tokens_on_the_wire() {
        let mut data = BTreeMap::new();
        data.insert("kind".to_string(), "booking_ok".to_string());
        let request = push_request(
            &["tok-1".to_string()],
            &PushNotification::new("Booking confirmed", "ok", "/dashboard"),
            &data,
        );

        assert!(!format!("{:?}", request).contains("tok-1"));
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["tokens"][0], "tok-1");
        assert_eq!(json["data"]["kind"], "booking_ok");
    }
}
