// ABOUTME: Consent request storage layer using SQLite
// ABOUTME: Ephemeral single-use records; status moves forward via conditional updates

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use sammati_core::new_id;
use sammati_storage::StorageError;

use super::types::{ConsentRequest, RequestStatus};

pub struct NewConsentRequest {
    pub fiduciary_id: String,
    pub external_user_id: String,
    pub purpose_ids: Vec<String>,
    pub language: String,
    pub redirect_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub expires_at: DateTime<Utc>,
}

pub struct RequestStorage {
    pool: SqlitePool,
}

impl RequestStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, input: NewConsentRequest) -> Result<ConsentRequest, StorageError> {
        let id = new_id("req");
        let now = Utc::now();

        debug!("Creating consent request: {}", id);

        sqlx::query(
            r#"
            INSERT INTO consent_requests (
                id, fiduciary_id, external_user_id, purpose_ids, status, language,
                redirect_url, metadata, requested_at, expires_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&input.fiduciary_id)
        .bind(&input.external_user_id)
        .bind(serde_json::to_string(&input.purpose_ids).unwrap_or_else(|_| "[]".to_string()))
        .bind(RequestStatus::Initiated)
        .bind(&input.language)
        .bind(&input.redirect_url)
        .bind(input.metadata.as_ref().map(|m| m.to_string()))
        .bind(now)
        .bind(input.expires_at)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        self.get(&id).await?.ok_or_else(|| {
            StorageError::Database(format!("request {} vanished after insert", id))
        })
    }

    pub async fn get(&self, id: &str) -> Result<Option<ConsentRequest>, StorageError> {
        let row = sqlx::query("SELECT * FROM consent_requests WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        match row {
            Some(row) => Ok(Some(row_to_request(&row)?)),
            None => Ok(None),
        }
    }

    /// First read wins: only an INITIATED request picks up viewed_at.
    pub async fn mark_viewed(&self, id: &str) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE consent_requests SET status = ?, viewed_at = ? WHERE id = ? AND status = ?",
        )
        .bind(RequestStatus::Viewed)
        .bind(Utc::now())
        .bind(id)
        .bind(RequestStatus::Initiated)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        Ok(())
    }

    /// Flip a lapsed request to EXPIRED. Conditional on it still being open.
    pub async fn expire(&self, id: &str) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE consent_requests SET status = ? WHERE id = ? AND status IN (?, ?)",
        )
        .bind(RequestStatus::Expired)
        .bind(id)
        .bind(RequestStatus::Initiated)
        .bind(RequestStatus::Viewed)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        Ok(())
    }

    /// Transactional SUBMITTED flip. Returns false when another submission
    /// won the race (or the request was never open), leaving the caller to
    /// roll back.
    pub async fn mark_submitted_in(
        conn: &mut sqlx::SqliteConnection,
        id: &str,
        submitted_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE consent_requests SET status = ?, submitted_at = ? WHERE id = ? AND status IN (?, ?)",
        )
        .bind(RequestStatus::Submitted)
        .bind(submitted_at)
        .bind(id)
        .bind(RequestStatus::Initiated)
        .bind(RequestStatus::Viewed)
        .execute(conn)
        .await
        .map_err(StorageError::Sqlx)?;

        Ok(result.rows_affected() == 1)
    }
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<ConsentRequest, StorageError> {
    let purpose_ids: String = row.try_get("purpose_ids")?;
    let metadata: Option<String> = row.try_get("metadata")?;

    Ok(ConsentRequest {
        id: row.try_get("id")?,
        fiduciary_id: row.try_get("fiduciary_id")?,
        external_user_id: row.try_get("external_user_id")?,
        purpose_ids: serde_json::from_str(&purpose_ids).unwrap_or_default(),
        status: row.try_get("status")?,
        language: row.try_get("language")?,
        redirect_url: row.try_get("redirect_url")?,
        metadata: metadata.and_then(|s| serde_json::from_str(&s).ok()),
        requested_at: row.try_get("requested_at")?,
        expires_at: row.try_get("expires_at")?,
        viewed_at: row.try_get("viewed_at")?,
        submitted_at: row.try_get("submitted_at")?,
    })
}
