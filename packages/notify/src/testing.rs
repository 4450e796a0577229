// ABOUTME: Test doubles for the dispatcher contract
// ABOUTME: Records every event and message instead of delivering anything

use async_trait::async_trait;
use std::sync::Mutex;

use super::notifier::Notifier;
use super::types::{DeliveryOutcome, NotificationEvent, PrincipalMessage};

/// In-memory notifier that records everything it is asked to deliver.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotificationEvent>>,
    messages: Mutex<Vec<PrincipalMessage>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<PrincipalMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &NotificationEvent) -> DeliveryOutcome {
        self.events.lock().unwrap().push(event.clone());
        DeliveryOutcome::ok("recorded")
    }

    async fn send_principal_message(&self, message: &PrincipalMessage) -> DeliveryOutcome {
        self.messages.lock().unwrap().push(message.clone());
        DeliveryOutcome::ok("recorded")
    }
}
