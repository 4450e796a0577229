// ABOUTME: The consent artifact engine: state machine over requests, artifacts and history
// ABOUTME: Every invariant-bearing write runs in one transaction; events fire after commit

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use sammati_core::{
    new_id, BULK_VALIDATE_MAX_ITEMS, DEFAULT_REQUEST_TTL_MINUTES, MAX_REQUEST_TTL_MINUTES,
    MIN_REQUEST_TTL_MINUTES,
};
use sammati_fiduciaries::FiduciaryStorage;
use sammati_notify::{
    Channel, EventType, MessageKind, NotificationEvent, OutboundQueue, PrincipalMessage,
};
use sammati_principals::{PrincipalStorage, PrincipalUpsertInput};
use sammati_purposes::{CategoryStorage, PurposeStorage, PurposeWithVersion};

use super::artifacts::{ArtifactStorage, NewArtifact};
use super::error::EngineError;
use super::hash::consent_text_hash;
use super::history::{HistoryStorage, NewHistoryEntry};
use super::notice::{assemble_notice, NoticeView};
use super::renewals::RenewalStorage;
use super::requests::{NewConsentRequest, RequestStorage};
use super::types::*;

pub type EngineResult<T> = Result<T, EngineError>;

/// Central engine coordinating the consent lifecycle. All dependencies are
/// injected at construction; the engine holds no global state.
pub struct ConsentEngine {
    pool: SqlitePool,
    fiduciaries: FiduciaryStorage,
    purposes: PurposeStorage,
    categories: CategoryStorage,
    principals: PrincipalStorage,
    requests: RequestStorage,
    artifacts: ArtifactStorage,
    history: HistoryStorage,
    renewals: RenewalStorage,
    outbound: OutboundQueue,
    notice_base_url: String,
}

impl ConsentEngine {
    pub fn new(pool: SqlitePool, outbound: OutboundQueue, notice_base_url: impl Into<String>) -> Self {
        Self {
            fiduciaries: FiduciaryStorage::new(pool.clone()),
            purposes: PurposeStorage::new(pool.clone()),
            categories: CategoryStorage::new(pool.clone()),
            principals: PrincipalStorage::new(pool.clone()),
            requests: RequestStorage::new(pool.clone()),
            artifacts: ArtifactStorage::new(pool.clone()),
            history: HistoryStorage::new(pool.clone()),
            renewals: RenewalStorage::new(pool.clone()),
            pool,
            outbound,
            notice_base_url: notice_base_url.into(),
        }
    }

    // ---- consent request flow ----

    /// Open a consent request and hand back the notice URL.
    pub async fn initiate(&self, input: InitiateInput) -> EngineResult<InitiatedRequest> {
        let fiduciary = self
            .fiduciaries
            .get_active(&input.fiduciary_id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("fiduciary {}", input.fiduciary_id))
            })?;

        if input.purpose_ids.is_empty() {
            return Err(EngineError::Validation(
                "at least one purpose is required".to_string(),
            ));
        }

        for purpose_id in &input.purpose_ids {
            let purpose = self
                .purposes
                .get_purpose(purpose_id)
                .await?
                .ok_or_else(|| EngineError::NotFound(format!("purpose {}", purpose_id)))?;

            if purpose.fiduciary_id != fiduciary.id {
                return Err(EngineError::Forbidden(format!(
                    "purpose {} belongs to another fiduciary",
                    purpose_id
                )));
            }
            if !purpose.is_active {
                return Err(EngineError::Validation(format!(
                    "purpose {} is inactive",
                    purpose_id
                )));
            }
        }

        let ttl = input
            .ttl_minutes
            .unwrap_or(DEFAULT_REQUEST_TTL_MINUTES)
            .clamp(MIN_REQUEST_TTL_MINUTES, MAX_REQUEST_TTL_MINUTES);

        let request = self
            .requests
            .create(NewConsentRequest {
                fiduciary_id: fiduciary.id,
                external_user_id: input.external_user_id,
                purpose_ids: input.purpose_ids,
                language: input.language.unwrap_or_else(|| "en".to_string()),
                redirect_url: input.redirect_url,
                metadata: input.metadata,
                expires_at: Utc::now() + Duration::minutes(ttl),
            })
            .await?;

        info!("Initiated consent request {} (ttl {}m)", request.id, ttl);

        Ok(InitiatedRequest {
            notice_url: format!("{}/consents/{}", self.notice_base_url, request.id),
            request_id: request.id,
            status: RequestStatus::Initiated,
            expires_at: request.expires_at,
        })
    }

    /// Assemble the notice for a request and mark it viewed on first read.
    pub async fn notice(
        &self,
        request_id: &str,
        language: Option<String>,
    ) -> EngineResult<NoticeView> {
        let request = self.load_open_request(request_id).await?;

        self.requests.mark_viewed(&request.id).await?;

        let purposes = self.purposes.current_versions(&request.purpose_ids).await?;
        let category_names = self.category_names(&purposes).await?;

        let request = self
            .requests
            .get(request_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("request {}", request_id)))?;

        let mut view = assemble_notice(&request, &purposes, &category_names);
        if let Some(language) = language {
            view.language = language;
        }
        Ok(view)
    }

    /// Submit a consent decision, producing an ACTIVE artifact bound to the
    /// purpose versions current at this instant.
    pub async fn submit(&self, input: SubmitInput) -> EngineResult<SubmittedArtifact> {
        let request = self.load_open_request(&input.request_id).await?;

        if !input.agree {
            return Err(EngineError::Validation(
                "explicit agreement (agree=true) is required".to_string(),
            ));
        }
        if input.selected_purpose_ids.is_empty() {
            return Err(EngineError::Validation(
                "at least one purpose must be selected".to_string(),
            ));
        }
        for selected in &input.selected_purpose_ids {
            if !request.purpose_ids.contains(selected) {
                return Err(EngineError::Validation(format!(
                    "purpose {} was not part of this request",
                    selected
                )));
            }
        }

        // Resolve every requested purpose so mandatory omissions are caught
        // even when the principal never selected them.
        let requested = self.purposes.current_versions(&request.purpose_ids).await?;

        for item in &requested {
            let selected = input.selected_purpose_ids.contains(&item.purpose.id);
            if item.purpose.is_mandatory && !selected {
                return Err(EngineError::Validation(format!(
                    "mandatory purpose {} must be included",
                    item.purpose.id
                )));
            }
            if selected && !item.purpose.is_active {
                return Err(EngineError::Validation(format!(
                    "purpose {} is no longer active",
                    item.purpose.id
                )));
            }
        }

        let selected: Vec<PurposeWithVersion> = requested
            .into_iter()
            .filter(|item| input.selected_purpose_ids.contains(&item.purpose.id))
            .collect();

        // The registry is a collaborator: the principal record exists even
        // if the grant below rolls back, which is harmless and idempotent.
        let principal = self
            .principals
            .register_or_update(PrincipalUpsertInput {
                external_id: request.external_user_id.clone(),
                email: input.email,
                phone: input.phone,
                language: Some(request.language.clone()),
            })
            .await?;
        self.principals
            .link_fiduciary(&request.fiduciary_id, &principal.id)
            .await?;

        let granted_at = Utc::now();
        let expires_at = compute_expiry(granted_at, &selected);
        let version_ids: Vec<String> = selected.iter().map(|p| p.version.id.clone()).collect();
        let hash = consent_text_hash(&request.fiduciary_id, &principal.id, &version_ids, granted_at);
        let artifact_id = new_id("art");

        let mut tx = self.pool.begin().await.map_err(sammati_storage::StorageError::Sqlx)?;

        // Serialize double submission: exactly one caller flips the request.
        let won = RequestStorage::mark_submitted_in(&mut tx, &request.id, granted_at).await?;
        if !won {
            tx.rollback().await.map_err(sammati_storage::StorageError::Sqlx)?;
            return Err(EngineError::Conflict(format!(
                "request {} was already submitted",
                request.id
            )));
        }

        ArtifactStorage::insert_in(
            &mut tx,
            &NewArtifact {
                id: artifact_id.clone(),
                fiduciary_id: request.fiduciary_id.clone(),
                principal_id: principal.id.clone(),
                external_user_id: request.external_user_id.clone(),
                request_id: Some(request.id.clone()),
                requested_at: request.requested_at,
                granted_at,
                expires_at,
                consent_text_hash: hash.clone(),
                metadata: input.metadata,
            },
        )
        .await?;

        for item in &selected {
            ArtifactStorage::bind_purpose_in(&mut tx, &artifact_id, &item.purpose.id, &item.version.id)
                .await?;
        }

        HistoryStorage::append_in(
            &mut tx,
            NewHistoryEntry {
                artifact_id: artifact_id.clone(),
                action: HistoryAction::Grant,
                previous_status: Some(ArtifactStatus::Pending),
                new_status: ArtifactStatus::Active,
                performed_by: principal.id.clone(),
                performed_by_type: PerformedByType::Principal,
                notes: None,
            },
        )
        .await?;

        tx.commit().await.map_err(sammati_storage::StorageError::Sqlx)?;

        info!(
            "Granted artifact {} for request {} ({} purposes)",
            artifact_id,
            request.id,
            selected.len()
        );

        let granted: Vec<GrantedPurpose> = selected
            .iter()
            .map(|item| GrantedPurpose {
                purpose_id: item.purpose.id.clone(),
                purpose_version_id: item.version.id.clone(),
                version_number: item.version.version_number,
                title: item.version.title.clone(),
            })
            .collect();

        self.outbound.submit(NotificationEvent::new(
            EventType::Granted,
            artifact_id.clone(),
            request.fiduciary_id.clone(),
            serde_json::json!({
                "artifact_id": artifact_id,
                "status": ArtifactStatus::Active,
                "purposes": granted,
                "granted_at": granted_at,
                "expires_at": expires_at,
            }),
        ));

        Ok(SubmittedArtifact {
            artifact_id,
            status: ArtifactStatus::Active,
            valid_till: expires_at,
            purposes: granted,
            hash,
        })
    }

    // ---- validation ----

    /// Check an artifact (optionally a single purpose of it). The check
    /// itself is audited with a VALIDATE history row.
    pub async fn validate(
        &self,
        artifact_id: &str,
        fiduciary_id: &str,
        purpose_id: Option<&str>,
    ) -> EngineResult<ValidationResult> {
        let artifact = self.artifact_for(artifact_id, fiduciary_id).await?;
        let now = Utc::now();

        let reason = if artifact.status != ArtifactStatus::Active {
            Some(format!("artifact status is {:?}", artifact.status))
        } else if artifact.expires_at <= now {
            Some("artifact has passed its expiry".to_string())
        } else if let Some(purpose_id) = purpose_id {
            let bindings = self.artifacts.purposes_for(artifact_id).await?;
            if bindings.iter().any(|b| b.purpose_id == purpose_id) {
                None
            } else {
                Some(format!("purpose {} is not covered by this artifact", purpose_id))
            }
        } else {
            None
        };

        let is_valid = reason.is_none();

        // A lost update on last_validated_at under concurrent withdraw is
        // acceptable; the authoritative transition is conditional elsewhere.
        self.artifacts.touch_validated(artifact_id, now).await?;
        self.history
            .append(NewHistoryEntry {
                artifact_id: artifact_id.to_string(),
                action: HistoryAction::Validate,
                previous_status: Some(artifact.status),
                new_status: artifact.status,
                performed_by: fiduciary_id.to_string(),
                performed_by_type: PerformedByType::Fiduciary,
                notes: Some(if is_valid {
                    "validation: valid".to_string()
                } else {
                    format!("validation: invalid ({})", reason.as_deref().unwrap_or(""))
                }),
            })
            .await?;

        Ok(ValidationResult {
            artifact_id: artifact_id.to_string(),
            is_valid,
            status: artifact.status,
            granted_at: artifact.granted_at,
            expires_at: artifact.expires_at,
            purpose_id: purpose_id.map(str::to_string),
            reason,
        })
    }

    /// Fan out per-item validation. One bad item never fails the batch.
    pub async fn validate_bulk(
        &self,
        fiduciary_id: &str,
        items: Vec<BulkValidationItem>,
    ) -> EngineResult<Vec<BulkValidationOutcome>> {
        if items.len() > BULK_VALIDATE_MAX_ITEMS {
            return Err(EngineError::Validation(format!(
                "bulk validation accepts at most {} items",
                BULK_VALIDATE_MAX_ITEMS
            )));
        }

        let mut outcomes = Vec::with_capacity(items.len());
        for item in items {
            let outcome = match self
                .validate(&item.artifact_id, fiduciary_id, item.purpose_id.as_deref())
                .await
            {
                Ok(result) => BulkValidationOutcome {
                    artifact_id: item.artifact_id,
                    result: Some(result),
                    error: None,
                },
                Err(e) => {
                    debug!("Bulk validation item {} failed: {}", item.artifact_id, e);
                    BulkValidationOutcome {
                        artifact_id: item.artifact_id,
                        result: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    // ---- withdrawal ----

    /// ACTIVE→WITHDRAWN. Repeating the call is a conflict, not a no-op.
    pub async fn withdraw(
        &self,
        artifact_id: &str,
        fiduciary_id: &str,
        reason: Option<String>,
    ) -> EngineResult<WithdrawOutcome> {
        let artifact = self.artifact_for(artifact_id, fiduciary_id).await?;
        let withdrawn_at = Utc::now();

        let mut tx = self.pool.begin().await.map_err(sammati_storage::StorageError::Sqlx)?;

        let flipped = ArtifactStorage::withdraw_in(&mut tx, artifact_id, withdrawn_at).await?;
        if !flipped {
            tx.rollback().await.map_err(sammati_storage::StorageError::Sqlx)?;
            return Err(EngineError::Conflict(format!(
                "artifact {} is {:?} and cannot be withdrawn",
                artifact_id, artifact.status
            )));
        }

        HistoryStorage::append_in(
            &mut tx,
            NewHistoryEntry {
                artifact_id: artifact_id.to_string(),
                action: HistoryAction::Withdraw,
                previous_status: Some(ArtifactStatus::Active),
                new_status: ArtifactStatus::Withdrawn,
                performed_by: fiduciary_id.to_string(),
                performed_by_type: PerformedByType::Fiduciary,
                notes: reason.clone(),
            },
        )
        .await?;

        tx.commit().await.map_err(sammati_storage::StorageError::Sqlx)?;

        info!("Withdrew artifact {}", artifact_id);

        self.outbound.submit(NotificationEvent::new(
            EventType::Withdrawn,
            artifact_id,
            fiduciary_id,
            serde_json::json!({
                "artifact_id": artifact_id,
                "status": ArtifactStatus::Withdrawn,
                "withdrawn_at": withdrawn_at,
                "reason": reason,
            }),
        ));

        Ok(WithdrawOutcome {
            artifact_id: artifact_id.to_string(),
            status: ArtifactStatus::Withdrawn,
            withdrawn_at,
        })
    }

    // ---- renewal ----

    /// Create a renewal-pending marker and prompt the principal. The grant
    /// itself only changes on explicit confirmation.
    pub async fn initiate_renewal(
        &self,
        artifact_id: &str,
        fiduciary_id: &str,
        requested_extension_days: i64,
        initiated_by: InitiatedBy,
    ) -> EngineResult<RenewalRequest> {
        let artifact = self.artifact_for(artifact_id, fiduciary_id).await?;

        if artifact.status == ArtifactStatus::Withdrawn {
            return Err(EngineError::Conflict(
                "withdrawn artifacts cannot be renewed".to_string(),
            ));
        }
        if requested_extension_days <= 0 {
            return Err(EngineError::Validation(
                "requested extension must be positive".to_string(),
            ));
        }

        let renewal = self
            .renewals
            .create(artifact_id, fiduciary_id, initiated_by, requested_extension_days)
            .await?;

        info!(
            "Renewal {} initiated for artifact {} by {:?}",
            renewal.id, artifact_id, initiated_by
        );

        self.outbound.submit(NotificationEvent::new(
            EventType::RenewalInitiated,
            artifact_id,
            fiduciary_id,
            serde_json::json!({
                "artifact_id": artifact_id,
                "renewal_id": renewal.id,
                "status": artifact.status,
                "requested_extension_days": requested_extension_days,
                "initiated_by": initiated_by,
            }),
        ));

        match self.principals.get(&artifact.principal_id).await? {
            Some(principal) if principal.has_contact() => {
                self.outbound.submit_message(PrincipalMessage {
                    user_id: principal.id,
                    fiduciary_id: fiduciary_id.to_string(),
                    kind: MessageKind::RenewalPrompt,
                    channels: contact_channels(principal.email.is_some(), principal.phone.is_some()),
                    metadata: serde_json::json!({
                        "artifact_id": artifact_id,
                        "renewal_id": renewal.id,
                    }),
                    language: principal.language,
                });
            }
            _ => warn!(
                "No contact channel for principal of artifact {}; renewal prompt skipped",
                artifact_id
            ),
        }

        Ok(renewal)
    }

    /// Confirm a pending renewal. Extends in place while the bound versions
    /// are still current; otherwise issues a superseding artifact bound to
    /// the versions current now.
    pub async fn confirm_renewal(&self, renewal_id: &str, agree: bool) -> EngineResult<RenewalOutcome> {
        if !agree {
            return Err(EngineError::Validation(
                "explicit agreement (agree=true) is required".to_string(),
            ));
        }

        let renewal = self
            .renewals
            .get(renewal_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("renewal {}", renewal_id)))?;

        if renewal.status != RenewalStatus::Pending {
            return Err(EngineError::Conflict(format!(
                "renewal {} is already {:?}",
                renewal_id, renewal.status
            )));
        }

        let artifact = self
            .artifacts
            .get(&renewal.artifact_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("artifact {}", renewal.artifact_id)))?;

        if artifact.status == ArtifactStatus::Withdrawn {
            return Err(EngineError::Conflict(
                "withdrawn artifacts cannot be renewed".to_string(),
            ));
        }

        // Resolve bindings and current versions before opening the
        // transaction; reads must not contend with the write connection.
        let bindings = self.artifacts.purposes_for(&artifact.id).await?;
        let purpose_ids: Vec<String> = bindings.iter().map(|b| b.purpose_id.clone()).collect();
        let current = self.purposes.current_versions(&purpose_ids).await?;

        let stale = bindings.iter().any(|binding| {
            current
                .iter()
                .find(|item| item.purpose.id == binding.purpose_id)
                .map(|item| item.version.id != binding.purpose_version_id)
                .unwrap_or(true)
        });

        let extension = Duration::days(renewal.requested_extension_days);
        let now = Utc::now();

        let mut tx = self.pool.begin().await.map_err(sammati_storage::StorageError::Sqlx)?;

        let confirmed = RenewalStorage::confirm_in(&mut tx, renewal_id, now).await?;
        if !confirmed {
            tx.rollback().await.map_err(sammati_storage::StorageError::Sqlx)?;
            return Err(EngineError::Conflict(format!(
                "renewal {} was already confirmed",
                renewal_id
            )));
        }

        let outcome = if !stale && artifact.status == ArtifactStatus::Active {
            // Same grant, later expiry.
            let new_expires = artifact.expires_at + extension;
            ArtifactStorage::extend_expiry_in(&mut tx, &artifact.id, new_expires).await?;
            HistoryStorage::append_in(
                &mut tx,
                NewHistoryEntry {
                    artifact_id: artifact.id.clone(),
                    action: HistoryAction::Update,
                    previous_status: Some(ArtifactStatus::Active),
                    new_status: ArtifactStatus::Active,
                    performed_by: artifact.principal_id.clone(),
                    performed_by_type: PerformedByType::Principal,
                    notes: Some(format!(
                        "renewal extension of {} days",
                        renewal.requested_extension_days
                    )),
                },
            )
            .await?;

            RenewalOutcome {
                artifact_id: artifact.id.clone(),
                superseded_artifact_id: None,
                expires_at: new_expires,
            }
        } else {
            // Terms moved on (or the artifact already expired): issue a
            // replacement bound to the versions current now.
            let replacement_id = new_id("art");
            let expires_at = now + extension;
            let version_ids: Vec<String> = current.iter().map(|p| p.version.id.clone()).collect();
            let hash =
                consent_text_hash(&artifact.fiduciary_id, &artifact.principal_id, &version_ids, now);

            ArtifactStorage::insert_in(
                &mut tx,
                &NewArtifact {
                    id: replacement_id.clone(),
                    fiduciary_id: artifact.fiduciary_id.clone(),
                    principal_id: artifact.principal_id.clone(),
                    external_user_id: artifact.external_user_id.clone(),
                    request_id: None,
                    requested_at: now,
                    granted_at: now,
                    expires_at,
                    consent_text_hash: hash,
                    metadata: artifact.metadata.clone(),
                },
            )
            .await?;

            for item in &current {
                ArtifactStorage::bind_purpose_in(&mut tx, &replacement_id, &item.purpose.id, &item.version.id)
                    .await?;
            }

            // The old artifact is kept, not deleted; it leaves ACTIVE the
            // only way it legally can.
            ArtifactStorage::expire_in(&mut tx, &artifact.id, now).await?;
            HistoryStorage::append_in(
                &mut tx,
                NewHistoryEntry {
                    artifact_id: artifact.id.clone(),
                    action: HistoryAction::Update,
                    previous_status: Some(artifact.status),
                    new_status: ArtifactStatus::Expired,
                    performed_by: artifact.principal_id.clone(),
                    performed_by_type: PerformedByType::Principal,
                    notes: Some(format!("superseded by artifact {}", replacement_id)),
                },
            )
            .await?;

            HistoryStorage::append_in(
                &mut tx,
                NewHistoryEntry {
                    artifact_id: replacement_id.clone(),
                    action: HistoryAction::Grant,
                    previous_status: Some(ArtifactStatus::Pending),
                    new_status: ArtifactStatus::Active,
                    performed_by: artifact.principal_id.clone(),
                    performed_by_type: PerformedByType::Principal,
                    notes: Some(format!("renewal of artifact {}", artifact.id)),
                },
            )
            .await?;

            RenewalOutcome {
                artifact_id: replacement_id,
                superseded_artifact_id: Some(artifact.id.clone()),
                expires_at,
            }
        };

        tx.commit().await.map_err(sammati_storage::StorageError::Sqlx)?;

        info!(
            "Renewal {} confirmed; artifact {} valid until {}",
            renewal_id, outcome.artifact_id, outcome.expires_at
        );

        self.outbound.submit(NotificationEvent::new(
            EventType::Renewed,
            outcome.artifact_id.clone(),
            renewal.fiduciary_id.clone(),
            serde_json::json!({
                "artifact_id": outcome.artifact_id,
                "superseded_artifact_id": outcome.superseded_artifact_id,
                "status": ArtifactStatus::Active,
                "expires_at": outcome.expires_at,
            }),
        ));

        Ok(outcome)
    }

    // ---- expiry (driven by the scheduler and the admin trigger) ----

    /// ACTIVE artifacts whose expiry has passed.
    pub async fn expiry_candidates(&self, now: DateTime<Utc>) -> EngineResult<Vec<String>> {
        Ok(self.artifacts.due_for_expiry(now).await?)
    }

    /// Flip one artifact to EXPIRED with its paired history row. Returns
    /// false when another run already flipped it (rerun-safe).
    pub async fn expire_artifact(&self, artifact_id: &str) -> EngineResult<bool> {
        let now = Utc::now();

        let mut tx = self.pool.begin().await.map_err(sammati_storage::StorageError::Sqlx)?;

        let flipped = ArtifactStorage::expire_in(&mut tx, artifact_id, now).await?;
        if !flipped {
            tx.rollback().await.map_err(sammati_storage::StorageError::Sqlx)?;
            return Ok(false);
        }

        HistoryStorage::append_in(
            &mut tx,
            NewHistoryEntry {
                artifact_id: artifact_id.to_string(),
                action: HistoryAction::Expire,
                previous_status: Some(ArtifactStatus::Active),
                new_status: ArtifactStatus::Expired,
                performed_by: "scheduler".to_string(),
                performed_by_type: PerformedByType::System,
                notes: None,
            },
        )
        .await?;

        tx.commit().await.map_err(sammati_storage::StorageError::Sqlx)?;

        // Fired after commit; a failed delivery never reverts the flip.
        if let Some(artifact) = self.artifacts.get(artifact_id).await? {
            self.outbound.submit(NotificationEvent::new(
                EventType::Expired,
                artifact_id,
                artifact.fiduciary_id.clone(),
                serde_json::json!({
                    "artifact_id": artifact_id,
                    "status": ArtifactStatus::Expired,
                    "expired_at": now,
                }),
            ));
        }

        Ok(true)
    }

    /// ACTIVE artifacts entering the reminder window, not yet reminded.
    pub async fn reminder_candidates(
        &self,
        now: DateTime<Utc>,
        window_days: i64,
    ) -> EngineResult<Vec<ConsentArtifact>> {
        Ok(self.artifacts.due_for_reminder(now, window_days).await?)
    }

    /// Queue an expiry reminder to the artifact's principal. Returns false
    /// (without retrying) when no contact channel is on file.
    pub async fn send_expiry_reminder(&self, artifact: &ConsentArtifact) -> EngineResult<bool> {
        let principal = self
            .principals
            .get(&artifact.principal_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("principal {}", artifact.principal_id)))?;

        if !principal.has_contact() {
            warn!(
                "No contact channel for principal {}; reminder for artifact {} skipped",
                principal.id, artifact.id
            );
            return Ok(false);
        }

        self.outbound.submit_message(PrincipalMessage {
            user_id: principal.id,
            fiduciary_id: artifact.fiduciary_id.clone(),
            kind: MessageKind::ExpiryReminder,
            channels: contact_channels(principal.email.is_some(), principal.phone.is_some()),
            metadata: serde_json::json!({
                "artifact_id": artifact.id,
                "expires_at": artifact.expires_at,
            }),
            language: principal.language,
        });

        self.artifacts.mark_reminder_sent(&artifact.id, Utc::now()).await?;
        Ok(true)
    }

    // ---- internals ----

    /// Load a request that can still accept a submission, flipping it to
    /// EXPIRED on first touch after its TTL.
    async fn load_open_request(&self, request_id: &str) -> EngineResult<ConsentRequest> {
        let request = self
            .requests
            .get(request_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("request {}", request_id)))?;

        match request.status {
            RequestStatus::Submitted => {
                return Err(EngineError::Conflict(format!(
                    "request {} was already submitted",
                    request_id
                )))
            }
            RequestStatus::Cancelled => {
                return Err(EngineError::Conflict(format!(
                    "request {} was cancelled",
                    request_id
                )))
            }
            RequestStatus::Expired => {
                return Err(EngineError::ExpiredState(format!(
                    "request {} has expired",
                    request_id
                )))
            }
            RequestStatus::Initiated | RequestStatus::Viewed => {}
        }

        if Utc::now() > request.expires_at {
            self.requests.expire(&request.id).await?;
            return Err(EngineError::ExpiredState(format!(
                "request {} has expired",
                request_id
            )));
        }

        Ok(request)
    }

    /// Load an artifact and enforce tenancy.
    async fn artifact_for(
        &self,
        artifact_id: &str,
        fiduciary_id: &str,
    ) -> EngineResult<ConsentArtifact> {
        let artifact = self
            .artifacts
            .get(artifact_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("artifact {}", artifact_id)))?;

        if artifact.fiduciary_id != fiduciary_id {
            return Err(EngineError::Forbidden(format!(
                "artifact {} belongs to another fiduciary",
                artifact_id
            )));
        }

        Ok(artifact)
    }

    async fn category_names(
        &self,
        purposes: &[PurposeWithVersion],
    ) -> EngineResult<HashMap<String, String>> {
        let mut names = HashMap::new();
        for item in purposes {
            if let Some(category_id) = &item.purpose.category_id {
                if !names.contains_key(category_id) {
                    if let Some(category) = self.categories.get(category_id).await? {
                        names.insert(category_id.clone(), category.name);
                    }
                }
            }
        }
        Ok(names)
    }
}

/// The governing expiry across selected purposes: when any selected purpose
/// requires renewal the shortest renewal period wins (a renewal deadline
/// must not be outlived); otherwise the longest retention period applies.
fn compute_expiry(granted_at: DateTime<Utc>, selected: &[PurposeWithVersion]) -> DateTime<Utc> {
    let renewal_days = selected
        .iter()
        .filter(|item| item.purpose.requires_renewal)
        .filter_map(|item| item.purpose.renewal_period_days)
        .min();

    let days = match renewal_days {
        Some(days) => days,
        None => selected
            .iter()
            .map(|item| item.purpose.retention_period_days)
            .max()
            .unwrap_or(365),
    };

    granted_at + Duration::days(days)
}

fn contact_channels(has_email: bool, has_phone: bool) -> Vec<Channel> {
    let mut channels = Vec::new();
    if has_email {
        channels.push(Channel::Email);
    }
    if has_phone {
        channels.push(Channel::Sms);
    }
    channels
}
