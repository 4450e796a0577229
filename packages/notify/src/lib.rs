// ABOUTME: Notification dispatcher for Sammati
// ABOUTME: Outbound queue, webhook notifier and per-attempt delivery logging

pub mod logs;
pub mod notifier;
pub mod queue;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use logs::WebhookLogStorage;
pub use notifier::{HttpNotifier, Notifier};
pub use queue::{OutboundQueue, OutboundWorker};
pub use types::{
    Channel, DeliveryOutcome, EventType, MessageKind, NotificationEvent, PrincipalMessage,
    WebhookLog,
};
