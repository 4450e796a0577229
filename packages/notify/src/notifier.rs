// ABOUTME: Dispatcher contract and the webhook-backed implementation
// ABOUTME: Posts event JSON to the fiduciary's webhook URL and logs every attempt

use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, warn};

use sammati_fiduciaries::FiduciaryStorage;

use super::logs::{WebhookLogEntry, WebhookLogStorage};
use super::types::{DeliveryOutcome, NotificationEvent, PrincipalMessage};

/// The contract the engine and scheduler consume. Implementations must be
/// safe to share across tasks; delivery outcome reporting is best-effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &NotificationEvent) -> DeliveryOutcome;

    async fn send_principal_message(&self, message: &PrincipalMessage) -> DeliveryOutcome;
}

/// Delivers events to the fiduciary's registered webhook URL over HTTPS.
/// Principal messages ride the same endpoint; the actual email/SMS fan-out
/// happens on the fiduciary side and is outside this service.
pub struct HttpNotifier {
    client: reqwest::Client,
    fiduciaries: FiduciaryStorage,
    logs: WebhookLogStorage,
}

impl HttpNotifier {
    pub fn new(fiduciaries: FiduciaryStorage, logs: WebhookLogStorage) -> Self {
        Self {
            client: reqwest::Client::new(),
            fiduciaries,
            logs,
        }
    }

    async fn post_json(
        &self,
        fiduciary_id: &str,
        event_type: &str,
        body: &serde_json::Value,
    ) -> DeliveryOutcome {
        let url = match self.fiduciaries.webhook_url(fiduciary_id).await {
            Ok(Some(url)) => url,
            Ok(None) => {
                let outcome = DeliveryOutcome::failed("no webhook URL registered");
                self.log_attempt(fiduciary_id, event_type, "", None, None, &outcome)
                    .await;
                return outcome;
            }
            Err(e) => {
                warn!("Webhook URL lookup failed for {}: {}", fiduciary_id, e);
                return DeliveryOutcome::failed("webhook URL lookup failed");
            }
        };

        let started = Instant::now();
        let result = self.client.post(&url).json(body).send().await;
        let elapsed_ms = started.elapsed().as_millis() as i64;

        let (status_code, outcome) = match result {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    (
                        Some(status.as_u16() as i64),
                        DeliveryOutcome::ok(format!("delivered with status {}", status)),
                    )
                } else {
                    (
                        Some(status.as_u16() as i64),
                        DeliveryOutcome::failed(format!("endpoint returned {}", status)),
                    )
                }
            }
            Err(e) => (None, DeliveryOutcome::failed(format!("request failed: {}", e))),
        };

        self.log_attempt(
            fiduciary_id,
            event_type,
            &url,
            status_code,
            Some(elapsed_ms),
            &outcome,
        )
        .await;

        outcome
    }

    async fn log_attempt(
        &self,
        fiduciary_id: &str,
        event_type: &str,
        url: &str,
        status_code: Option<i64>,
        response_time_ms: Option<i64>,
        outcome: &DeliveryOutcome,
    ) {
        let entry = WebhookLogEntry {
            fiduciary_id: fiduciary_id.to_string(),
            event_type: event_type.to_string(),
            url: url.to_string(),
            status_code,
            response_time_ms,
            success: outcome.success,
            error_message: if outcome.success {
                None
            } else {
                Some(outcome.message.clone())
            },
        };

        // A lost log row must not turn a delivered webhook into a failure.
        if let Err(e) = self.logs.record(entry).await {
            warn!("Failed to record webhook log: {}", e);
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, event: &NotificationEvent) -> DeliveryOutcome {
        debug!(
            "Dispatching {} for artifact {}",
            event.event_type, event.artifact_id
        );

        let body = match serde_json::to_value(event) {
            Ok(body) => body,
            Err(e) => return DeliveryOutcome::failed(format!("serialization failed: {}", e)),
        };

        self.post_json(&event.fiduciary_id, event.event_type.as_str(), &body)
            .await
    }

    async fn send_principal_message(&self, message: &PrincipalMessage) -> DeliveryOutcome {
        debug!(
            "Dispatching principal message for user {} ({:?})",
            message.user_id, message.kind
        );

        let body = match serde_json::to_value(message) {
            Ok(body) => body,
            Err(e) => return DeliveryOutcome::failed(format!("serialization failed: {}", e)),
        };

        self.post_json(&message.fiduciary_id, "principal.message", &body)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventType;
    use sammati_fiduciaries::FiduciaryCreateInput;
    use sammati_storage::connect_in_memory;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn notifier_with_webhook(url: Option<String>) -> (HttpNotifier, sqlx::SqlitePool, String) {
        let pool = connect_in_memory().await.unwrap();
        let fiduciaries = FiduciaryStorage::new(pool.clone());
        let fiduciary = fiduciaries
            .create(FiduciaryCreateInput {
                name: "Webhook Co".to_string(),
                webhook_url: url,
                contact_email: None,
            })
            .await
            .unwrap();

        let notifier = HttpNotifier::new(
            FiduciaryStorage::new(pool.clone()),
            WebhookLogStorage::new(pool.clone()),
        );
        (notifier, pool, fiduciary.id)
    }

    #[tokio::test]
    async fn test_successful_delivery_is_logged() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let (notifier, pool, fiduciary_id) =
            notifier_with_webhook(Some(format!("{}/hooks", server.uri()))).await;

        let event = NotificationEvent::new(
            EventType::Granted,
            "art-1",
            fiduciary_id.clone(),
            serde_json::json!({"purposes": []}),
        );

        let outcome = notifier.notify(&event).await;
        assert!(outcome.success);

        let logs = WebhookLogStorage::new(pool);
        let rows = logs.list_for_fiduciary(&fiduciary_id, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].success);
        assert_eq!(rows[0].status_code, Some(200));
        assert_eq!(rows[0].event_type, "consent.granted");
    }

    #[tokio::test]
    async fn test_missing_webhook_url_is_logged_as_failure() {
        let (notifier, pool, fiduciary_id) = notifier_with_webhook(None).await;

        let event = NotificationEvent::new(
            EventType::Withdrawn,
            "art-2",
            fiduciary_id.clone(),
            serde_json::json!({}),
        );

        let outcome = notifier.notify(&event).await;
        assert!(!outcome.success);

        let logs = WebhookLogStorage::new(pool);
        let rows = logs.list_for_fiduciary(&fiduciary_id, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].success);
        assert!(rows[0].error_message.is_some());
    }

    #[tokio::test]
    async fn test_server_error_recorded_with_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (notifier, pool, fiduciary_id) = notifier_with_webhook(Some(server.uri())).await;

        let event = NotificationEvent::new(
            EventType::Expired,
            "art-3",
            fiduciary_id.clone(),
            serde_json::json!({}),
        );

        let outcome = notifier.notify(&event).await;
        assert!(!outcome.success);

        let logs = WebhookLogStorage::new(pool);
        let rows = logs.list_for_fiduciary(&fiduciary_id, 10).await.unwrap();
        assert_eq!(rows[0].status_code, Some(500));
    }
}
