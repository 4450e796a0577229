// ABOUTME: Outbound notification queue decoupling state changes from delivery
// ABOUTME: Submit never blocks; a drain worker delivers after the transaction commits

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::notifier::Notifier;
use super::types::{NotificationEvent, PrincipalMessage};

enum OutboundJob {
    Event(NotificationEvent),
    Message(PrincipalMessage),
}

/// Handle used by the engine and scheduler to enqueue notifications.
/// Cloneable and cheap; callers never await delivery.
#[derive(Clone)]
pub struct OutboundQueue {
    tx: mpsc::UnboundedSender<OutboundJob>,
}

impl OutboundQueue {
    /// Create a queue and its paired worker. The worker must be spawned
    /// for anything to be delivered.
    pub fn new(notifier: Arc<dyn Notifier>) -> (Self, OutboundWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, OutboundWorker { rx, notifier })
    }

    /// Enqueue a webhook event. Dropped (with a warning) if the worker is
    /// gone; state transitions never fail on notification problems.
    pub fn submit(&self, event: NotificationEvent) {
        if self.tx.send(OutboundJob::Event(event)).is_err() {
            warn!("Outbound queue is closed; dropping event");
        }
    }

    /// Enqueue a message to the principal (reminder, renewal prompt).
    pub fn submit_message(&self, message: PrincipalMessage) {
        if self.tx.send(OutboundJob::Message(message)).is_err() {
            warn!("Outbound queue is closed; dropping principal message");
        }
    }
}

/// Drains the queue and records each delivery attempt via the notifier.
pub struct OutboundWorker {
    rx: mpsc::UnboundedReceiver<OutboundJob>,
    notifier: Arc<dyn Notifier>,
}

impl OutboundWorker {
    /// Run until every queue handle is dropped.
    pub async fn run(mut self) {
        info!("Outbound notification worker started");

        while let Some(job) = self.rx.recv().await {
            match job {
                OutboundJob::Event(event) => {
                    let outcome = self.notifier.notify(&event).await;
                    if outcome.success {
                        debug!(
                            "Delivered {} for artifact {}",
                            event.event_type, event.artifact_id
                        );
                    } else {
                        warn!(
                            "Delivery of {} for artifact {} failed: {}",
                            event.event_type, event.artifact_id, outcome.message
                        );
                    }
                }
                OutboundJob::Message(message) => {
                    let outcome = self.notifier.send_principal_message(&message).await;
                    if !outcome.success {
                        warn!(
                            "Principal message for user {} failed: {}",
                            message.user_id, outcome.message
                        );
                    }
                }
            }
        }

        info!("Outbound notification worker stopped");
    }

    /// Convenience for callers that just want the worker running.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
