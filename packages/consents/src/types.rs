// ABOUTME: Consent request, artifact, history and renewal type definitions
// ABOUTME: Statuses are stored as TEXT and only ever move forward

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestStatus {
    Initiated,
    Viewed,
    Submitted,
    Expired,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ArtifactStatus {
    Pending,
    Active,
    Withdrawn,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum HistoryAction {
    Grant,
    Update,
    Withdraw,
    Expire,
    Validate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum PerformedByType {
    Fiduciary,
    Principal,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum RenewalStatus {
    Pending,
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum InitiatedBy {
    Fiduciary,
    Principal,
}

/// Ephemeral pre-grant record for an in-progress consent flow. Single-use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentRequest {
    pub id: String,
    pub fiduciary_id: String,
    pub external_user_id: String,
    pub purpose_ids: Vec<String>,
    pub status: RequestStatus,
    pub language: String,
    pub redirect_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub requested_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub viewed_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Durable, auditable record of a granted consent. Binds the principal,
/// the fiduciary and the purpose versions current at grant time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentArtifact {
    pub id: String,
    pub fiduciary_id: String,
    pub principal_id: String,
    pub external_user_id: String,
    pub request_id: Option<String>,
    pub status: ArtifactStatus,
    pub requested_at: DateTime<Utc>,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub withdrawn_at: Option<DateTime<Utc>>,
    pub last_validated_at: Option<DateTime<Utc>>,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub consent_text_hash: String,
    pub metadata: Option<serde_json::Value>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Permanent purpose-version binding of an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPurpose {
    pub purpose_id: String,
    pub purpose_version_id: String,
}

/// One row in the append-only audit ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentHistoryEntry {
    pub id: String,
    pub artifact_id: String,
    pub action: HistoryAction,
    pub previous_status: Option<ArtifactStatus>,
    pub new_status: ArtifactStatus,
    pub performed_by: String,
    pub performed_by_type: PerformedByType,
    pub performed_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Renewal-pending marker. Confirmation is always a separate explicit step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalRequest {
    pub id: String,
    pub artifact_id: String,
    pub fiduciary_id: String,
    pub initiated_by: InitiatedBy,
    pub requested_extension_days: i64,
    pub status: RenewalStatus,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

// ---- engine inputs ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateInput {
    pub fiduciary_id: String,
    pub external_user_id: String,
    pub purpose_ids: Vec<String>,
    pub ttl_minutes: Option<i64>,
    pub language: Option<String>,
    pub redirect_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitInput {
    pub request_id: String,
    pub selected_purpose_ids: Vec<String>,
    pub agree: bool,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

// ---- engine outputs ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiatedRequest {
    pub request_id: String,
    pub notice_url: String,
    pub status: RequestStatus,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantedPurpose {
    pub purpose_id: String,
    pub purpose_version_id: String,
    pub version_number: i64,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedArtifact {
    pub artifact_id: String,
    pub status: ArtifactStatus,
    pub valid_till: DateTime<Utc>,
    pub purposes: Vec<GrantedPurpose>,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub artifact_id: String,
    pub is_valid: bool,
    pub status: ArtifactStatus,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub purpose_id: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkValidationItem {
    pub artifact_id: String,
    pub purpose_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkValidationOutcome {
    pub artifact_id: String,
    pub result: Option<ValidationResult>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawOutcome {
    pub artifact_id: String,
    pub status: ArtifactStatus,
    pub withdrawn_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalOutcome {
    /// The artifact that carries the grant forward.
    pub artifact_id: String,
    /// Set when the renewal issued a replacement instead of extending.
    pub superseded_artifact_id: Option<String>,
    pub expires_at: DateTime<Utc>,
}
