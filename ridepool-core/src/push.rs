use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

pub const DEFAULT_PUSH_TITLE: &str = "Ridepool";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushNotification {
    pub title: String,
    pub body: String,
    pub link: String,
}

impl PushNotification {
    pub fn new(title: impl Into<String>, body: impl Into<String>, link: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            title: if title.is_empty() { DEFAULT_PUSH_TITLE.to_string() } else { title },
            body: body.into(),
            link: link.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushReport {
    pub success_count: u32,
    pub failure_count: u32,
}

/// Fan-out to device tokens. Delivery problems are reported in the counts,
/// never raised.
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send_to_tokens(
        &self,
        tokens: &[String],
        notification: &PushNotification,
        data: &BTreeMap<String, String>,
    ) -> PushReport;
}

/// Gateway for deployments without a push sender: logs and reports success.
pub struct LogPushGateway;

#[async_trait]
impl PushGateway for LogPushGateway {
    async fn send_to_tokens(
        &self,
        tokens: &[String],
        notification: &PushNotification,
        data: &BTreeMap<String, String>,
    ) -> PushReport {
        tracing::info!(
            tokens = tokens.len(),
            title = %notification.title,
            kind = data.get("kind").map(String::as_str).unwrap_or(""),
            "Push notification (log only)"
        );
        PushReport {
            success_count: tokens.len() as u32,
            failure_count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPush {
    pub tokens: Vec<String>,
    pub notification: PushNotification,
    pub data: BTreeMap<String, String>,
}

/// Test gateway that records every fan-out. With `failing()` every token fails.
#[derive(Default)]
pub struct RecordingPushGateway {
    sent: Mutex<Vec<SentPush>>,
    fail: bool,
}

impl RecordingPushGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub async fn sent(&self) -> Vec<SentPush> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl PushGateway for RecordingPushGateway {
    async fn send_to_tokens(
        &self,
        tokens: &[String],
        notification: &PushNotification,
        data: &BTreeMap<String, String>,
    ) -> PushReport {
        self.sent.lock().await.push(SentPush {
            tokens: tokens.to_vec(),
            notification: notification.clone(),
            data: data.clone(),
        });
        let n = tokens.len() as u32;
        if self.fail {
            PushReport { success_count: 0, failure_count: n }
        } else {
            PushReport { success_count: n, failure_count: 0 }
        }
    }
}
