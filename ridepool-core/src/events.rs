//! Domain event publishing seam. Events are informational: publishing is always
//! best-effort and happens after the owning transaction has committed.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::{CoreError, CoreResult};

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: String) -> CoreResult<()>;
}

/// Serializes `event` as JSON and hands it to the publisher.
pub async fn publish_json<T: Serialize + Sync>(
    publisher: &dyn EventPublisher,
    topic: &str,
    key: &str,
    event: &T,
) -> CoreResult<()> {
    let payload = serde_json::to_string(event).map_err(|e| CoreError::Internal(e.to_string()))?;
    publisher.publish(topic, key, payload).await
}

/// Used when no broker is configured.
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(&self, topic: &str, key: &str, _payload: String) -> CoreResult<()> {
        tracing::debug!(topic, key, "Event dropped, no broker configured");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedEvent {
    pub topic: String,
    pub key: String,
    pub payload: String,
}

#[derive(Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<PublishedEvent>>,
}

impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<PublishedEvent> {
        self.events.lock().await.clone()
    }

    pub async fn topics(&self) -> Vec<String> {
        self.events.lock().await.iter().map(|e| e.topic.clone()).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: String) -> CoreResult<()> {
        self.events.lock().await.push(PublishedEvent {
            topic: topic.to_string(),
            key: key.to_string(),
            payload,
        });
        Ok(())
    }
}
