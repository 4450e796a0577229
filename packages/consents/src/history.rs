// ABOUTME: Append-only consent history ledger using SQLite
// ABOUTME: One row per transition, written in the same transaction as the status change

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use sammati_core::new_id;
use sammati_storage::StorageError;

use super::types::{ArtifactStatus, ConsentHistoryEntry, HistoryAction, PerformedByType};

pub struct NewHistoryEntry {
    pub artifact_id: String,
    pub action: HistoryAction,
    pub previous_status: Option<ArtifactStatus>,
    pub new_status: ArtifactStatus,
    pub performed_by: String,
    pub performed_by_type: PerformedByType,
    pub notes: Option<String>,
}

pub struct HistoryStorage {
    pool: SqlitePool,
}

impl HistoryStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append inside a caller-owned transaction, pairing the row with the
    /// status change it records.
    pub async fn append_in(
        conn: &mut sqlx::SqliteConnection,
        entry: NewHistoryEntry,
    ) -> Result<String, StorageError> {
        let id = new_id("hist");

        sqlx::query(
            r#"
            INSERT INTO consent_history (
                id, artifact_id, action, previous_status, new_status,
                performed_by, performed_by_type, performed_at, notes
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&entry.artifact_id)
        .bind(entry.action)
        .bind(entry.previous_status)
        .bind(entry.new_status)
        .bind(&entry.performed_by)
        .bind(entry.performed_by_type)
        .bind(Utc::now())
        .bind(&entry.notes)
        .execute(conn)
        .await
        .map_err(StorageError::Sqlx)?;

        Ok(id)
    }

    /// Standalone append for audited reads (validation). No surrounding
    /// transaction is needed because nothing else changes with it.
    pub async fn append(&self, entry: NewHistoryEntry) -> Result<String, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(StorageError::Sqlx)?;
        Self::append_in(&mut conn, entry).await
    }

    /// Full trail for an artifact, oldest first.
    pub async fn list_for_artifact(
        &self,
        artifact_id: &str,
    ) -> Result<Vec<ConsentHistoryEntry>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM consent_history WHERE artifact_id = ? ORDER BY performed_at ASC, id ASC",
        )
        .bind(artifact_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        rows.iter().map(row_to_entry).collect()
    }

    pub async fn count_for_artifact(
        &self,
        artifact_id: &str,
        action: HistoryAction,
    ) -> Result<i64, StorageError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM consent_history WHERE artifact_id = ? AND action = ?",
        )
        .bind(artifact_id)
        .bind(action)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        Ok(count)
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<ConsentHistoryEntry, StorageError> {
    Ok(ConsentHistoryEntry {
        id: row.try_get("id")?,
        artifact_id: row.try_get("artifact_id")?,
        action: row.try_get("action")?,
        previous_status: row.try_get("previous_status")?,
        new_status: row.try_get("new_status")?,
        performed_by: row.try_get("performed_by")?,
        performed_by_type: row.try_get("performed_by_type")?,
        performed_at: row.try_get("performed_at")?,
        notes: row.try_get("notes")?,
    })
}
