// ABOUTME: Renewal-pending marker storage using SQLite
// ABOUTME: A marker must be confirmed explicitly before any artifact changes

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use sammati_core::new_id;
use sammati_storage::StorageError;

use super::types::{InitiatedBy, RenewalRequest, RenewalStatus};

pub struct RenewalStorage {
    pool: SqlitePool,
}

impl RenewalStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        artifact_id: &str,
        fiduciary_id: &str,
        initiated_by: InitiatedBy,
        requested_extension_days: i64,
    ) -> Result<RenewalRequest, StorageError> {
        let id = new_id("ren");
        let now = Utc::now();

        debug!("Creating renewal marker {} for artifact {}", id, artifact_id);

        sqlx::query(
            r#"
            INSERT INTO renewal_requests (
                id, artifact_id, fiduciary_id, initiated_by,
                requested_extension_days, status, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(artifact_id)
        .bind(fiduciary_id)
        .bind(initiated_by)
        .bind(requested_extension_days)
        .bind(RenewalStatus::Pending)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        self.get(&id).await?.ok_or_else(|| {
            StorageError::Database(format!("renewal {} vanished after insert", id))
        })
    }

    pub async fn get(&self, id: &str) -> Result<Option<RenewalRequest>, StorageError> {
        let row = sqlx::query("SELECT * FROM renewal_requests WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        match row {
            Some(row) => Ok(Some(row_to_renewal(&row)?)),
            None => Ok(None),
        }
    }

    /// PENDING→CONFIRMED, single use. Returns false when another
    /// confirmation won the race.
    pub async fn confirm_in(
        conn: &mut sqlx::SqliteConnection,
        id: &str,
        confirmed_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE renewal_requests SET status = ?, confirmed_at = ? WHERE id = ? AND status = ?",
        )
        .bind(RenewalStatus::Confirmed)
        .bind(confirmed_at)
        .bind(id)
        .bind(RenewalStatus::Pending)
        .execute(conn)
        .await
        .map_err(StorageError::Sqlx)?;

        Ok(result.rows_affected() == 1)
    }
}

fn row_to_renewal(row: &sqlx::sqlite::SqliteRow) -> Result<RenewalRequest, StorageError> {
    Ok(RenewalRequest {
        id: row.try_get("id")?,
        artifact_id: row.try_get("artifact_id")?,
        fiduciary_id: row.try_get("fiduciary_id")?,
        initiated_by: row.try_get("initiated_by")?,
        requested_extension_days: row.try_get("requested_extension_days")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
        confirmed_at: row.try_get("confirmed_at")?,
    })
}
