// ABOUTME: Notification event and delivery-log type definitions
// ABOUTME: The dispatcher contract consumed by the engine and the scheduler

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Webhook event types emitted over the lifecycle of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "consent.granted")]
    Granted,
    #[serde(rename = "consent.updated")]
    Updated,
    #[serde(rename = "consent.withdrawn")]
    Withdrawn,
    #[serde(rename = "consent.expired")]
    Expired,
    #[serde(rename = "consent.renewal_initiated")]
    RenewalInitiated,
    #[serde(rename = "consent.renewed")]
    Renewed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Granted => "consent.granted",
            EventType::Updated => "consent.updated",
            EventType::Withdrawn => "consent.withdrawn",
            EventType::Expired => "consent.expired",
            EventType::RenewalInitiated => "consent.renewal_initiated",
            EventType::Renewed => "consent.renewed",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event bound for the fiduciary's webhook. The payload is composed by
/// the engine and passed through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub artifact_id: String,
    pub fiduciary_id: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn new(
        event_type: EventType,
        artifact_id: impl Into<String>,
        fiduciary_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_type,
            artifact_id: artifact_id.into(),
            fiduciary_id: fiduciary_id.into(),
            payload,
            occurred_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    ExpiryReminder,
    RenewalPrompt,
}

/// A message addressed to the principal rather than the fiduciary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrincipalMessage {
    pub user_id: String,
    pub fiduciary_id: String,
    pub kind: MessageKind,
    pub channels: Vec<Channel>,
    pub metadata: serde_json::Value,
    pub language: String,
}

/// Result of a single delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub success: bool,
    pub message: String,
}

impl DeliveryOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// One row per delivery attempt, written by the dispatcher side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookLog {
    pub id: String,
    pub fiduciary_id: String,
    pub event_type: String,
    pub url: String,
    pub method: String,
    pub status_code: Option<i64>,
    pub response_time_ms: Option<i64>,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}
