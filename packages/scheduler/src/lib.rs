// ABOUTME: Time-driven expiry and reminder jobs over the consent engine
// ABOUTME: Idempotent cycles safe to rerun and to run on multiple instances

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time;
use tracing::{error, info, warn};

use sammati_consents::ConsentEngine;
use sammati_core::DEFAULT_REMINDER_WINDOW_DAYS;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub reminder_interval_secs: u64,
    pub expiry_interval_secs: u64,
    pub reminder_window_days: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reminder_interval_secs: 3600,
            expiry_interval_secs: 300,
            reminder_window_days: DEFAULT_REMINDER_WINDOW_DAYS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobOutcome {
    pub scanned: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub last_reminder_run: Option<DateTime<Utc>>,
    pub last_reminder_outcome: Option<JobOutcome>,
    pub last_expiry_run: Option<DateTime<Utc>>,
    pub last_expiry_outcome: Option<JobOutcome>,
}

/// Drives the reminder and expiry jobs. Both cycles are also callable
/// directly for the admin trigger endpoints and in tests.
#[derive(Clone)]
pub struct Scheduler {
    engine: Arc<ConsentEngine>,
    config: SchedulerConfig,
    status: Arc<RwLock<SchedulerStatus>>,
    running: Arc<RwLock<bool>>,
}

impl Scheduler {
    pub fn new(engine: Arc<ConsentEngine>, config: SchedulerConfig) -> Self {
        Self {
            engine,
            config,
            status: Arc::new(RwLock::new(SchedulerStatus::default())),
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn status(&self) -> SchedulerStatus {
        let mut status = self.status.read().await.clone();
        status.running = *self.running.read().await;
        status
    }

    /// One reminder pass. The selection window is disjoint under reruns:
    /// an artifact is only picked while its reminder_sent_at is unset.
    pub async fn run_reminder_cycle(&self) -> JobOutcome {
        let now = Utc::now();
        let mut outcome = JobOutcome::default();

        let candidates = match self
            .engine
            .reminder_candidates(now, self.config.reminder_window_days)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                error!("Reminder scan failed: {}", e);
                return outcome;
            }
        };

        outcome.scanned = candidates.len();

        for artifact in &candidates {
            match self.engine.send_expiry_reminder(artifact).await {
                Ok(true) => outcome.succeeded += 1,
                Ok(false) => outcome.failed += 1,
                Err(e) => {
                    warn!("Reminder for artifact {} failed: {}", artifact.id, e);
                    outcome.failed += 1;
                }
            }
        }

        if outcome.scanned > 0 {
            info!(
                "Reminder cycle: {} scanned, {} sent, {} failed",
                outcome.scanned, outcome.succeeded, outcome.failed
            );
        }

        let mut status = self.status.write().await;
        status.last_reminder_run = Some(now);
        status.last_reminder_outcome = Some(outcome.clone());

        outcome
    }

    /// One expiry pass. Selection is conditioned on status, so rows flipped
    /// by an earlier run (or another instance) are simply not picked again.
    pub async fn run_expiry_cycle(&self) -> JobOutcome {
        let now = Utc::now();
        let mut outcome = JobOutcome::default();

        let candidates = match self.engine.expiry_candidates(now).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!("Expiry scan failed: {}", e);
                return outcome;
            }
        };

        outcome.scanned = candidates.len();

        for artifact_id in &candidates {
            match self.engine.expire_artifact(artifact_id).await {
                // false: another run won the conditional flip; nothing to do
                Ok(flipped) => {
                    if flipped {
                        outcome.succeeded += 1;
                    }
                }
                Err(e) => {
                    warn!("Expiry of artifact {} failed: {}", artifact_id, e);
                    outcome.failed += 1;
                }
            }
        }

        if outcome.scanned > 0 {
            info!(
                "Expiry cycle: {} scanned, {} expired, {} failed",
                outcome.scanned, outcome.succeeded, outcome.failed
            );
        }

        let mut status = self.status.write().await;
        status.last_expiry_run = Some(now);
        status.last_expiry_outcome = Some(outcome.clone());

        outcome
    }

    /// Start both interval loops. Calling start twice is a no-op.
    pub async fn start(&self) {
        {
            let mut running = self.running.write().await;
            if *running {
                return;
            }
            *running = true;
        }

        info!(
            "Scheduler started (reminders every {}s, expiry every {}s)",
            self.config.reminder_interval_secs, self.config.expiry_interval_secs
        );

        let reminder = self.clone();
        tokio::spawn(async move {
            loop {
                time::sleep(Duration::from_secs(reminder.config.reminder_interval_secs)).await;
                if !*reminder.running.read().await {
                    break;
                }
                reminder.run_reminder_cycle().await;
            }
        });

        let expiry = self.clone();
        tokio::spawn(async move {
            loop {
                time::sleep(Duration::from_secs(expiry.config.expiry_interval_secs)).await;
                if !*expiry.running.read().await {
                    break;
                }
                expiry.run_expiry_cycle().await;
            }
        });
    }

    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        info!("Scheduler stopping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use sammati_consents::{InitiateInput, SubmitInput};
    use sammati_fiduciaries::{FiduciaryCreateInput, FiduciaryStorage};
    use sammati_notify::testing::RecordingNotifier;
    use sammati_notify::{MessageKind, OutboundQueue};
    use sammati_purposes::{PurposeCreateInput, PurposeStorage};
    use sammati_storage::connect_in_memory;
    use sqlx::SqlitePool;

    struct Fixture {
        pool: SqlitePool,
        engine: Arc<ConsentEngine>,
        queue: OutboundQueue,
        notifier: Arc<RecordingNotifier>,
        worker: tokio::task::JoinHandle<()>,
        fiduciary_id: String,
    }

    async fn fixture() -> Fixture {
        let pool = connect_in_memory().await.unwrap();
        let fiduciary = FiduciaryStorage::new(pool.clone())
            .create(FiduciaryCreateInput {
                name: "Scheduled Co".to_string(),
                webhook_url: None,
                contact_email: None,
            })
            .await
            .unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let (queue, worker) = OutboundQueue::new(notifier.clone());
        let engine = Arc::new(ConsentEngine::new(
            pool.clone(),
            queue.clone(),
            "https://consent.example",
        ));

        Fixture {
            pool,
            engine,
            queue,
            notifier,
            worker: worker.spawn(),
            fiduciary_id: fiduciary.id,
        }
    }

    /// Grant an artifact and pin its expiry relative to now.
    async fn granted_artifact(f: &Fixture, email: Option<&str>, expires_in_days: i64) -> String {
        let purpose = PurposeStorage::new(f.pool.clone())
            .create_purpose(PurposeCreateInput {
                fiduciary_id: f.fiduciary_id.clone(),
                category_id: None,
                title: "Scheduled purpose".to_string(),
                description: "desc".to_string(),
                legal_basis: None,
                data_fields: None,
                processing_activities: None,
                language_code: None,
                is_mandatory: false,
                requires_renewal: false,
                renewal_period_days: None,
                retention_period_days: 365,
                display_order: None,
            })
            .await
            .unwrap()
            .purpose
            .id;

        let request = f
            .engine
            .initiate(InitiateInput {
                fiduciary_id: f.fiduciary_id.clone(),
                external_user_id: sammati_core::new_id("ext"),
                purpose_ids: vec![purpose.clone()],
                ttl_minutes: None,
                language: None,
                redirect_url: None,
                metadata: None,
            })
            .await
            .unwrap();

        let submitted = f
            .engine
            .submit(SubmitInput {
                request_id: request.request_id,
                selected_purpose_ids: vec![purpose],
                agree: true,
                email: email.map(str::to_string),
                phone: None,
                metadata: None,
            })
            .await
            .unwrap();

        sqlx::query("UPDATE consent_artifacts SET expires_at = ? WHERE id = ?")
            .bind(Utc::now() + ChronoDuration::days(expires_in_days))
            .bind(&submitted.artifact_id)
            .execute(&f.pool)
            .await
            .unwrap();

        submitted.artifact_id
    }

    #[tokio::test]
    async fn test_reminder_cycle_sends_once_per_window() {
        let f = fixture().await;
        granted_artifact(&f, Some("soon@example.com"), 3).await;
        // Outside the window: no reminder expected
        granted_artifact(&f, Some("later@example.com"), 60).await;

        let scheduler = Scheduler::new(f.engine.clone(), SchedulerConfig::default());

        let first = scheduler.run_reminder_cycle().await;
        assert_eq!(first.scanned, 1);
        assert_eq!(first.succeeded, 1);

        // Rerun in the same window: the sent artifact is filtered out
        let second = scheduler.run_reminder_cycle().await;
        assert_eq!(second.scanned, 0);

        drop(f.engine);
        drop(f.queue);
        drop(scheduler);
        f.worker.await.unwrap();

        let messages = f.notifier.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, MessageKind::ExpiryReminder);
    }

    #[tokio::test]
    async fn test_reminder_without_contact_counts_as_failure() {
        let f = fixture().await;
        let artifact_id = granted_artifact(&f, None, 2).await;

        // Each fixture user is fresh, so no contact info is on file
        let scheduler = Scheduler::new(f.engine.clone(), SchedulerConfig::default());
        let outcome = scheduler.run_reminder_cycle().await;

        assert_eq!(outcome.scanned, 1);
        assert_eq!(outcome.succeeded, 0);
        assert_eq!(outcome.failed, 1);

        // Not marked sent: the next scheduled run may try again
        let sent: Option<String> =
            sqlx::query_scalar("SELECT reminder_sent_at FROM consent_artifacts WHERE id = ?")
                .bind(&artifact_id)
                .fetch_one(&f.pool)
                .await
                .unwrap();
        assert!(sent.is_none());
    }

    #[tokio::test]
    async fn test_expiry_cycle_is_rerun_safe() {
        let f = fixture().await;
        granted_artifact(&f, Some("a@example.com"), -2).await;
        granted_artifact(&f, Some("b@example.com"), -1).await;
        granted_artifact(&f, Some("c@example.com"), 30).await;

        let scheduler = Scheduler::new(f.engine.clone(), SchedulerConfig::default());

        let first = scheduler.run_expiry_cycle().await;
        assert_eq!(first.scanned, 2);
        assert_eq!(first.succeeded, 2);

        let second = scheduler.run_expiry_cycle().await;
        assert_eq!(second.scanned, 0);
        assert_eq!(second.succeeded, 0);

        let expired: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM consent_artifacts WHERE status = 'EXPIRED'",
        )
        .fetch_one(&f.pool)
        .await
        .unwrap();
        assert_eq!(expired, 2);

        // Exactly one EXPIRE history row per artifact
        let expire_rows: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM consent_history WHERE action = 'EXPIRE'")
                .fetch_one(&f.pool)
                .await
                .unwrap();
        assert_eq!(expire_rows, 2);

        let status = scheduler.status().await;
        assert!(status.last_expiry_run.is_some());
        assert_eq!(status.last_expiry_outcome.unwrap().succeeded, 0);
    }
}
