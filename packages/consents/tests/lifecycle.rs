// ABOUTME: End-to-end lifecycle tests for the consent engine
// ABOUTME: Covers grant, versioning stability, withdrawal, renewal, expiry and bulk validation

use std::sync::Arc;

use chrono::{Duration, Utc};
use pretty_assertions::{assert_eq, assert_ne};
use sqlx::SqlitePool;

use sammati_consents::{
    consent_text_hash, ArtifactStatus, ArtifactStorage, BulkValidationItem, ConsentEngine,
    EngineError, HistoryAction, HistoryStorage, InitiateInput, InitiatedBy, RequestStatus,
    RequestStorage, SubmitInput,
};
use sammati_fiduciaries::{FiduciaryCreateInput, FiduciaryStorage};
use sammati_notify::testing::RecordingNotifier;
use sammati_notify::{EventType, OutboundQueue};
use sammati_principals::PrincipalStorage;
use sammati_purposes::{CategoryStorage, PurposeCreateInput, PurposeStorage, PurposeUpdateInput};
use sammati_storage::connect_in_memory;

struct Harness {
    pool: SqlitePool,
    engine: ConsentEngine,
    queue: OutboundQueue,
    notifier: Arc<RecordingNotifier>,
    worker: tokio::task::JoinHandle<()>,
    fiduciary_id: String,
}

impl Harness {
    async fn new() -> Self {
        let pool = connect_in_memory().await.unwrap();

        let fiduciary = FiduciaryStorage::new(pool.clone())
            .create(FiduciaryCreateInput {
                name: "Lifecycle Fiduciary".to_string(),
                webhook_url: None,
                contact_email: None,
            })
            .await
            .unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let (queue, worker) = OutboundQueue::new(notifier.clone());
        let engine = ConsentEngine::new(pool.clone(), queue.clone(), "https://consent.example");

        Self {
            pool,
            engine,
            queue,
            notifier,
            worker: worker.spawn(),
            fiduciary_id: fiduciary.id,
        }
    }

    async fn create_purpose(&self, title: &str, mandatory: bool) -> String {
        PurposeStorage::new(self.pool.clone())
            .create_purpose(PurposeCreateInput {
                fiduciary_id: self.fiduciary_id.clone(),
                category_id: None,
                title: title.to_string(),
                description: format!("{} description", title),
                legal_basis: Some("consent".to_string()),
                data_fields: Some(vec!["email".to_string()]),
                processing_activities: None,
                language_code: None,
                is_mandatory: mandatory,
                requires_renewal: false,
                renewal_period_days: None,
                retention_period_days: 365,
                display_order: None,
            })
            .await
            .unwrap()
            .purpose
            .id
    }

    async fn initiate(&self, purpose_ids: Vec<String>) -> String {
        self.engine
            .initiate(InitiateInput {
                fiduciary_id: self.fiduciary_id.clone(),
                external_user_id: "ext-user-1".to_string(),
                purpose_ids,
                ttl_minutes: None,
                language: None,
                redirect_url: None,
                metadata: None,
            })
            .await
            .unwrap()
            .request_id
    }

    async fn submit(&self, request_id: &str, selected: Vec<String>) -> sammati_consents::SubmittedArtifact {
        self.engine
            .submit(SubmitInput {
                request_id: request_id.to_string(),
                selected_purpose_ids: selected,
                agree: true,
                email: Some("user@example.com".to_string()),
                phone: None,
                metadata: None,
            })
            .await
            .unwrap()
    }

    /// Stop the outbound worker and collect everything it delivered.
    async fn drain_events(self) -> (Vec<EventType>, Arc<RecordingNotifier>) {
        drop(self.engine);
        drop(self.queue);
        self.worker.await.unwrap();
        let kinds = self.notifier.events().iter().map(|e| e.event_type).collect();
        (kinds, self.notifier)
    }
}

#[tokio::test]
async fn test_grant_binds_version_current_at_submission() {
    let h = Harness::new().await;
    let purpose_id = h.create_purpose("Delivery updates", false).await;

    let request_id = h.initiate(vec![purpose_id.clone()]).await;

    // Viewing marks the request VIEWED exactly once
    let notice = h.engine.notice(&request_id, None).await.unwrap();
    assert_eq!(notice.categories.len(), 1);
    assert_eq!(notice.categories[0].purposes[0].version_number, 1);

    let submitted = h.submit(&request_id, vec![purpose_id.clone()]).await;
    assert_eq!(submitted.status, ArtifactStatus::Active);
    let bound_version = submitted.purposes[0].purpose_version_id.clone();

    // A later tracked edit publishes v2 ...
    let purposes = PurposeStorage::new(h.pool.clone());
    purposes
        .update_purpose(
            &purpose_id,
            PurposeUpdateInput {
                title: Some("Delivery and returns updates".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(
        purposes.current_version(&purpose_id).await.unwrap().version_number,
        2
    );

    // ... but the artifact still reports the v1 binding
    let artifacts = ArtifactStorage::new(h.pool.clone());
    let bindings = artifacts.purposes_for(&submitted.artifact_id).await.unwrap();
    assert_eq!(bindings[0].purpose_version_id, bound_version);

    let validation = h
        .engine
        .validate(&submitted.artifact_id, &h.fiduciary_id, Some(purpose_id.as_str()))
        .await
        .unwrap();
    assert!(validation.is_valid);
}

#[tokio::test]
async fn test_double_submission_yields_conflict_and_single_artifact() {
    let h = Harness::new().await;
    let purpose_id = h.create_purpose("Analytics", false).await;
    let request_id = h.initiate(vec![purpose_id.clone()]).await;

    h.submit(&request_id, vec![purpose_id.clone()]).await;

    let second = h
        .engine
        .submit(SubmitInput {
            request_id: request_id.clone(),
            selected_purpose_ids: vec![purpose_id],
            agree: true,
            email: None,
            phone: None,
            metadata: None,
        })
        .await;
    assert!(matches!(second, Err(EngineError::Conflict(_))));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM consent_artifacts")
        .fetch_one(&h.pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_missing_mandatory_purpose_is_rejected() {
    let h = Harness::new().await;
    let optional = h.create_purpose("Marketing", false).await;
    let mandatory = h.create_purpose("Service delivery", true).await;
    let request_id = h.initiate(vec![optional.clone(), mandatory]).await;

    let result = h
        .engine
        .submit(SubmitInput {
            request_id,
            selected_purpose_ids: vec![optional],
            agree: true,
            email: None,
            phone: None,
            metadata: None,
        })
        .await;

    assert!(matches!(result, Err(EngineError::Validation(_))));
}

#[tokio::test]
async fn test_purpose_deactivated_mid_flow_is_named_in_error() {
    let h = Harness::new().await;
    let keep = h.create_purpose("Keep", false).await;
    let dropped = h.create_purpose("Dropped", false).await;
    let request_id = h.initiate(vec![keep.clone(), dropped.clone()]).await;

    PurposeStorage::new(h.pool.clone())
        .set_active(&dropped, false)
        .await
        .unwrap();

    let result = h
        .engine
        .submit(SubmitInput {
            request_id,
            selected_purpose_ids: vec![keep, dropped.clone()],
            agree: true,
            email: None,
            phone: None,
            metadata: None,
        })
        .await;

    match result {
        Err(EngineError::Validation(message)) => assert!(message.contains(&dropped)),
        other => panic!("expected validation error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_lapsed_request_expires_on_submit_without_artifact() {
    let h = Harness::new().await;
    let purpose_id = h.create_purpose("Late", false).await;
    let request_id = h.initiate(vec![purpose_id.clone()]).await;

    // Rewind the TTL: submission arrives a minute too late
    sqlx::query("UPDATE consent_requests SET expires_at = ? WHERE id = ?")
        .bind(Utc::now() - Duration::minutes(1))
        .bind(&request_id)
        .execute(&h.pool)
        .await
        .unwrap();

    let result = h
        .engine
        .submit(SubmitInput {
            request_id: request_id.clone(),
            selected_purpose_ids: vec![purpose_id],
            agree: true,
            email: None,
            phone: None,
            metadata: None,
        })
        .await;
    assert!(matches!(result, Err(EngineError::ExpiredState(_))));

    let request = RequestStorage::new(h.pool.clone())
        .get(&request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.status, RequestStatus::Expired);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM consent_artifacts")
        .fetch_one(&h.pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_stored_hash_is_recomputable() {
    let h = Harness::new().await;
    let a = h.create_purpose("First", false).await;
    let b = h.create_purpose("Second", false).await;
    let request_id = h.initiate(vec![a.clone(), b.clone()]).await;
    let submitted = h.submit(&request_id, vec![a, b]).await;

    let artifacts = ArtifactStorage::new(h.pool.clone());
    let artifact = artifacts.get(&submitted.artifact_id).await.unwrap().unwrap();
    let bindings = artifacts.purposes_for(&artifact.id).await.unwrap();
    let version_ids: Vec<String> = bindings.iter().map(|b| b.purpose_version_id.clone()).collect();

    let recomputed = consent_text_hash(
        &artifact.fiduciary_id,
        &artifact.principal_id,
        &version_ids,
        artifact.granted_at,
    );
    assert_eq!(recomputed, artifact.consent_text_hash);
    assert_eq!(recomputed, submitted.hash);
}

#[tokio::test]
async fn test_withdraw_once_then_conflict() {
    let h = Harness::new().await;
    let purpose_id = h.create_purpose("Withdrawable", false).await;
    let request_id = h.initiate(vec![purpose_id.clone()]).await;
    let submitted = h.submit(&request_id, vec![purpose_id]).await;

    let outcome = h
        .engine
        .withdraw(&submitted.artifact_id, &h.fiduciary_id, Some("user asked".to_string()))
        .await
        .unwrap();
    assert_eq!(outcome.status, ArtifactStatus::Withdrawn);

    let again = h
        .engine
        .withdraw(&submitted.artifact_id, &h.fiduciary_id, None)
        .await;
    assert!(matches!(again, Err(EngineError::Conflict(_))));

    let history = HistoryStorage::new(h.pool.clone());
    assert_eq!(
        history
            .count_for_artifact(&submitted.artifact_id, HistoryAction::Withdraw)
            .await
            .unwrap(),
        1
    );

    let trail = history.list_for_artifact(&submitted.artifact_id).await.unwrap();
    let withdraw_row = trail
        .iter()
        .find(|e| e.action == HistoryAction::Withdraw)
        .unwrap();
    assert_eq!(withdraw_row.previous_status, Some(ArtifactStatus::Active));
    assert_eq!(withdraw_row.new_status, ArtifactStatus::Withdrawn);
}

#[tokio::test]
async fn test_cross_tenant_access_is_forbidden() {
    let h = Harness::new().await;
    let purpose_id = h.create_purpose("Private", false).await;
    let request_id = h.initiate(vec![purpose_id.clone()]).await;
    let submitted = h.submit(&request_id, vec![purpose_id]).await;

    let other = FiduciaryStorage::new(h.pool.clone())
        .create(FiduciaryCreateInput {
            name: "Other Co".to_string(),
            webhook_url: None,
            contact_email: None,
        })
        .await
        .unwrap();

    let result = h.engine.validate(&submitted.artifact_id, &other.id, None).await;
    assert!(matches!(result, Err(EngineError::Forbidden(_))));
}

#[tokio::test]
async fn test_bulk_validation_survives_a_bad_item() {
    let h = Harness::new().await;
    let a = h.create_purpose("Bulk A", false).await;
    let b = h.create_purpose("Bulk B", false).await;

    let request_a = h.initiate(vec![a.clone()]).await;
    let artifact_a = h.submit(&request_a, vec![a]).await;
    let request_b = h.initiate(vec![b.clone()]).await;
    let artifact_b = h.submit(&request_b, vec![b]).await;

    let outcomes = h
        .engine
        .validate_bulk(
            &h.fiduciary_id,
            vec![
                BulkValidationItem {
                    artifact_id: artifact_a.artifact_id.clone(),
                    purpose_id: None,
                },
                BulkValidationItem {
                    artifact_id: "art-does-not-exist".to_string(),
                    purpose_id: None,
                },
                BulkValidationItem {
                    artifact_id: artifact_b.artifact_id.clone(),
                    purpose_id: None,
                },
            ],
        )
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].result.as_ref().unwrap().is_valid);
    assert!(outcomes[1].error.is_some());
    assert!(outcomes[2].result.as_ref().unwrap().is_valid);
}

#[tokio::test]
async fn test_renewal_extends_when_versions_are_current() {
    let h = Harness::new().await;
    let purpose_id = h.create_purpose("Extendable", false).await;
    let request_id = h.initiate(vec![purpose_id.clone()]).await;
    let submitted = h.submit(&request_id, vec![purpose_id]).await;

    let renewal = h
        .engine
        .initiate_renewal(&submitted.artifact_id, &h.fiduciary_id, 90, InitiatedBy::Fiduciary)
        .await
        .unwrap();

    let outcome = h.engine.confirm_renewal(&renewal.id, true).await.unwrap();
    assert_eq!(outcome.artifact_id, submitted.artifact_id);
    assert!(outcome.superseded_artifact_id.is_none());
    assert_eq!(outcome.expires_at, submitted.valid_till + Duration::days(90));

    // Confirming the same marker twice is a conflict
    let again = h.engine.confirm_renewal(&renewal.id, true).await;
    assert!(matches!(again, Err(EngineError::Conflict(_))));
}

#[tokio::test]
async fn test_renewal_supersedes_when_versions_went_stale() {
    let h = Harness::new().await;
    let purpose_id = h.create_purpose("Versioned", false).await;
    let request_id = h.initiate(vec![purpose_id.clone()]).await;
    let submitted = h.submit(&request_id, vec![purpose_id.clone()]).await;

    let purposes = PurposeStorage::new(h.pool.clone());
    purposes
        .update_purpose(
            &purpose_id,
            PurposeUpdateInput {
                description: Some("broader processing".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let renewal = h
        .engine
        .initiate_renewal(&submitted.artifact_id, &h.fiduciary_id, 180, InitiatedBy::Principal)
        .await
        .unwrap();
    let outcome = h.engine.confirm_renewal(&renewal.id, true).await.unwrap();

    assert_ne!(outcome.artifact_id, submitted.artifact_id);
    assert_eq!(
        outcome.superseded_artifact_id.as_deref(),
        Some(submitted.artifact_id.as_str())
    );

    let artifacts = ArtifactStorage::new(h.pool.clone());
    let old = artifacts.get(&submitted.artifact_id).await.unwrap().unwrap();
    assert_eq!(old.status, ArtifactStatus::Expired);

    let new = artifacts.get(&outcome.artifact_id).await.unwrap().unwrap();
    assert_eq!(new.status, ArtifactStatus::Active);

    // The replacement is bound to version 2
    let bindings = artifacts.purposes_for(&outcome.artifact_id).await.unwrap();
    let v2 = purposes.current_version(&purpose_id).await.unwrap();
    assert_eq!(bindings[0].purpose_version_id, v2.id);
    assert_eq!(v2.version_number, 2);

    // Both the supersede and the new grant are on the ledger
    let history = HistoryStorage::new(h.pool.clone());
    let old_trail = history.list_for_artifact(&submitted.artifact_id).await.unwrap();
    assert!(old_trail
        .iter()
        .any(|e| e.action == HistoryAction::Update
            && e.notes.as_deref().unwrap_or("").contains(&outcome.artifact_id)));
    assert_eq!(
        history
            .count_for_artifact(&outcome.artifact_id, HistoryAction::Grant)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_expiry_flip_is_idempotent() {
    let h = Harness::new().await;
    let purpose_id = h.create_purpose("Short lived", false).await;
    let request_id = h.initiate(vec![purpose_id.clone()]).await;
    let submitted = h.submit(&request_id, vec![purpose_id]).await;

    sqlx::query("UPDATE consent_artifacts SET expires_at = ? WHERE id = ?")
        .bind(Utc::now() - Duration::days(1))
        .bind(&submitted.artifact_id)
        .execute(&h.pool)
        .await
        .unwrap();

    let candidates = h.engine.expiry_candidates(Utc::now()).await.unwrap();
    assert_eq!(candidates, vec![submitted.artifact_id.clone()]);

    assert!(h.engine.expire_artifact(&submitted.artifact_id).await.unwrap());
    // Second run: no flip, no duplicate history
    assert!(!h.engine.expire_artifact(&submitted.artifact_id).await.unwrap());

    let history = HistoryStorage::new(h.pool.clone());
    assert_eq!(
        history
            .count_for_artifact(&submitted.artifact_id, HistoryAction::Expire)
            .await
            .unwrap(),
        1
    );

    assert!(h.engine.expiry_candidates(Utc::now()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_validation_is_audited_and_reports_unbound_purpose() {
    let h = Harness::new().await;
    let bound = h.create_purpose("Bound", false).await;
    let unbound = h.create_purpose("Unbound", false).await;
    let request_id = h.initiate(vec![bound.clone()]).await;
    let submitted = h.submit(&request_id, vec![bound]).await;

    let result = h
        .engine
        .validate(&submitted.artifact_id, &h.fiduciary_id, Some(unbound.as_str()))
        .await
        .unwrap();
    assert!(!result.is_valid);
    assert!(result.reason.as_deref().unwrap_or("").contains(&unbound));

    let history = HistoryStorage::new(h.pool.clone());
    assert_eq!(
        history
            .count_for_artifact(&submitted.artifact_id, HistoryAction::Validate)
            .await
            .unwrap(),
        1
    );

    let artifact = ArtifactStorage::new(h.pool.clone())
        .get(&submitted.artifact_id)
        .await
        .unwrap()
        .unwrap();
    assert!(artifact.last_validated_at.is_some());
}

#[tokio::test]
async fn test_lifecycle_emits_webhook_events_in_order() {
    let h = Harness::new().await;
    let purpose_id = h.create_purpose("Evented", false).await;
    let request_id = h.initiate(vec![purpose_id.clone()]).await;
    let submitted = h.submit(&request_id, vec![purpose_id]).await;

    h.engine
        .withdraw(&submitted.artifact_id, &h.fiduciary_id, None)
        .await
        .unwrap();

    let (events, _notifier) = h.drain_events().await;
    assert_eq!(events, vec![EventType::Granted, EventType::Withdrawn]);
}

#[tokio::test]
async fn test_notice_groups_purposes_by_category() {
    let h = Harness::new().await;
    let categories = CategoryStorage::new(h.pool.clone());
    let marketing = categories.create(&h.fiduciary_id, "Marketing").await.unwrap();

    let purposes = PurposeStorage::new(h.pool.clone());
    let categorized = purposes
        .create_purpose(PurposeCreateInput {
            fiduciary_id: h.fiduciary_id.clone(),
            category_id: Some(marketing.id.clone()),
            title: "Newsletter".to_string(),
            description: "Weekly product newsletter".to_string(),
            legal_basis: None,
            data_fields: None,
            processing_activities: None,
            language_code: None,
            is_mandatory: false,
            requires_renewal: false,
            renewal_period_days: None,
            retention_period_days: 180,
            display_order: None,
        })
        .await
        .unwrap();
    let uncategorized = h.create_purpose("Support", false).await;

    let request_id = h
        .initiate(vec![categorized.purpose.id.clone(), uncategorized])
        .await;
    let notice = h.engine.notice(&request_id, Some("hi".to_string())).await.unwrap();

    assert_eq!(notice.language, "hi");
    assert_eq!(notice.categories.len(), 2);
    assert!(notice.categories.iter().any(|c| c.name == "Marketing"));
    assert!(notice.categories.iter().any(|c| c.name == "General"));

    let request = RequestStorage::new(h.pool.clone())
        .get(&request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.status, RequestStatus::Viewed);
}

#[tokio::test]
async fn test_renewal_prompt_reaches_principal_with_contact() {
    let h = Harness::new().await;
    let purpose_id = h.create_purpose("Prompted", false).await;
    let request_id = h.initiate(vec![purpose_id.clone()]).await;
    let submitted = h.submit(&request_id, vec![purpose_id]).await;

    h.engine
        .initiate_renewal(&submitted.artifact_id, &h.fiduciary_id, 30, InitiatedBy::Fiduciary)
        .await
        .unwrap();

    let pool = h.pool.clone();
    let (events, notifier) = h.drain_events().await;
    assert!(events.contains(&EventType::RenewalInitiated));
    assert_eq!(notifier.messages().len(), 1);

    // The principal's registry record, not the ledger, carries contact info
    let principal = PrincipalStorage::new(pool)
        .get(&notifier.messages()[0].user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(principal.email.as_deref(), Some("user@example.com"));
}
