// ABOUTME: Consent artifact storage layer using SQLite
// ABOUTME: Conditional status flips keep transitions monotonic under concurrency

use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use sammati_storage::StorageError;

use super::types::{ArtifactPurpose, ArtifactStatus, ConsentArtifact};

pub struct NewArtifact {
    pub id: String,
    pub fiduciary_id: String,
    pub principal_id: String,
    pub external_user_id: String,
    pub request_id: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consent_text_hash: String,
    pub metadata: Option<serde_json::Value>,
}

pub struct ArtifactStorage {
    pool: SqlitePool,
}

impl ArtifactStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: &str) -> Result<Option<ConsentArtifact>, StorageError> {
        let row = sqlx::query("SELECT * FROM consent_artifacts WHERE id = ? AND is_deleted = 0")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        match row {
            Some(row) => Ok(Some(row_to_artifact(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn purposes_for(&self, artifact_id: &str) -> Result<Vec<ArtifactPurpose>, StorageError> {
        let rows = sqlx::query(
            "SELECT purpose_id, purpose_version_id FROM consent_artifact_purposes WHERE artifact_id = ?",
        )
        .bind(artifact_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        rows.iter()
            .map(|row| {
                Ok(ArtifactPurpose {
                    purpose_id: row.try_get("purpose_id")?,
                    purpose_version_id: row.try_get("purpose_version_id")?,
                })
            })
            .collect()
    }

    /// Insert an artifact inside a caller-owned transaction. Artifacts are
    /// born ACTIVE; the GRANT history row records the PENDING→ACTIVE step.
    pub async fn insert_in(
        conn: &mut sqlx::SqliteConnection,
        input: &NewArtifact,
    ) -> Result<(), StorageError> {
        let now = Utc::now();

        debug!("Inserting consent artifact: {}", input.id);

        sqlx::query(
            r#"
            INSERT INTO consent_artifacts (
                id, fiduciary_id, principal_id, external_user_id, request_id, status,
                requested_at, granted_at, expires_at, consent_text_hash, metadata,
                is_deleted, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&input.id)
        .bind(&input.fiduciary_id)
        .bind(&input.principal_id)
        .bind(&input.external_user_id)
        .bind(&input.request_id)
        .bind(ArtifactStatus::Active)
        .bind(input.requested_at)
        .bind(input.granted_at)
        .bind(input.expires_at)
        .bind(&input.consent_text_hash)
        .bind(input.metadata.as_ref().map(|m| m.to_string()))
        .bind(now)
        .bind(now)
        .execute(conn)
        .await
        .map_err(StorageError::Sqlx)?;

        Ok(())
    }

    pub async fn bind_purpose_in(
        conn: &mut sqlx::SqliteConnection,
        artifact_id: &str,
        purpose_id: &str,
        purpose_version_id: &str,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO consent_artifact_purposes (artifact_id, purpose_id, purpose_version_id) VALUES (?, ?, ?)",
        )
        .bind(artifact_id)
        .bind(purpose_id)
        .bind(purpose_version_id)
        .execute(conn)
        .await
        .map_err(StorageError::Sqlx)?;

        Ok(())
    }

    /// ACTIVE→WITHDRAWN, only if still ACTIVE. Returns false when the
    /// conditional update found no row to flip.
    pub async fn withdraw_in(
        conn: &mut sqlx::SqliteConnection,
        artifact_id: &str,
        withdrawn_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE consent_artifacts SET status = ?, withdrawn_at = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(ArtifactStatus::Withdrawn)
        .bind(withdrawn_at)
        .bind(withdrawn_at)
        .bind(artifact_id)
        .bind(ArtifactStatus::Active)
        .execute(conn)
        .await
        .map_err(StorageError::Sqlx)?;

        Ok(result.rows_affected() == 1)
    }

    /// ACTIVE→EXPIRED, only if still ACTIVE. Rerunning an expiry pass is a
    /// no-op for rows already flipped.
    pub async fn expire_in(
        conn: &mut sqlx::SqliteConnection,
        artifact_id: &str,
        expired_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE consent_artifacts SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(ArtifactStatus::Expired)
        .bind(expired_at)
        .bind(artifact_id)
        .bind(ArtifactStatus::Active)
        .execute(conn)
        .await
        .map_err(StorageError::Sqlx)?;

        Ok(result.rows_affected() == 1)
    }

    /// Push expiry out on a renewal extension; the artifact becomes
    /// eligible for the next reminder window again.
    pub async fn extend_expiry_in(
        conn: &mut sqlx::SqliteConnection,
        artifact_id: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE consent_artifacts SET expires_at = ?, reminder_sent_at = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(new_expires_at)
        .bind(Utc::now())
        .bind(artifact_id)
        .execute(conn)
        .await
        .map_err(StorageError::Sqlx)?;

        Ok(())
    }

    /// A lost update here is benign; validation freshness is advisory.
    pub async fn touch_validated(
        &self,
        artifact_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE consent_artifacts SET last_validated_at = ? WHERE id = ?")
            .bind(at)
            .bind(artifact_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        Ok(())
    }

    /// IDs of ACTIVE artifacts whose expiry has passed. The status filter
    /// is the idempotence guard for the expiry job.
    pub async fn due_for_expiry(&self, now: DateTime<Utc>) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query(
            "SELECT id FROM consent_artifacts WHERE status = ? AND expires_at < ? AND is_deleted = 0",
        )
        .bind(ArtifactStatus::Active)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        rows.iter()
            .map(|row| row.try_get("id").map_err(StorageError::Sqlx))
            .collect()
    }

    /// ACTIVE artifacts entering the reminder window that have not been
    /// reminded yet. The reminder_sent_at filter keeps reruns disjoint.
    pub async fn due_for_reminder(
        &self,
        now: DateTime<Utc>,
        window_days: i64,
    ) -> Result<Vec<ConsentArtifact>, StorageError> {
        let horizon = now + Duration::days(window_days);

        let rows = sqlx::query(
            r#"
            SELECT * FROM consent_artifacts
            WHERE status = ? AND expires_at >= ? AND expires_at <= ?
              AND reminder_sent_at IS NULL AND is_deleted = 0
            "#,
        )
        .bind(ArtifactStatus::Active)
        .bind(now)
        .bind(horizon)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        rows.iter().map(row_to_artifact).collect()
    }

    pub async fn mark_reminder_sent(
        &self,
        artifact_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE consent_artifacts SET reminder_sent_at = ?, updated_at = ? WHERE id = ?")
            .bind(at)
            .bind(at)
            .bind(artifact_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        Ok(())
    }
}

fn row_to_artifact(row: &sqlx::sqlite::SqliteRow) -> Result<ConsentArtifact, StorageError> {
    let metadata: Option<String> = row.try_get("metadata")?;

    Ok(ConsentArtifact {
        id: row.try_get("id")?,
        fiduciary_id: row.try_get("fiduciary_id")?,
        principal_id: row.try_get("principal_id")?,
        external_user_id: row.try_get("external_user_id")?,
        request_id: row.try_get("request_id")?,
        status: row.try_get("status")?,
        requested_at: row.try_get("requested_at")?,
        granted_at: row.try_get("granted_at")?,
        expires_at: row.try_get("expires_at")?,
        withdrawn_at: row.try_get("withdrawn_at")?,
        last_validated_at: row.try_get("last_validated_at")?,
        reminder_sent_at: row.try_get("reminder_sent_at")?,
        consent_text_hash: row.try_get("consent_text_hash")?,
        metadata: metadata.and_then(|s| serde_json::from_str(&s).ok()),
        is_deleted: row.try_get::<i64, _>("is_deleted")? != 0,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
