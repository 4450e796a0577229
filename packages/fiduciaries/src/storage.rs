// ABOUTME: Fiduciary storage layer using SQLite
// ABOUTME: Read-mostly lookups plus a minimal create used by provisioning and tests

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use sammati_core::new_id;
use sammati_storage::StorageError;

use super::types::{DataFiduciary, FiduciaryCreateInput};

pub struct FiduciaryStorage {
    pool: SqlitePool,
}

impl FiduciaryStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a fiduciary record. Onboarding approval flows live outside
    /// this service; this exists for provisioning scripts and tests.
    pub async fn create(&self, input: FiduciaryCreateInput) -> Result<DataFiduciary, StorageError> {
        let id = new_id("fid");
        let now = Utc::now();

        debug!("Creating fiduciary: {} ({})", input.name, id);

        sqlx::query(
            r#"
            INSERT INTO data_fiduciaries (id, name, webhook_url, contact_email, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&input.name)
        .bind(&input.webhook_url)
        .bind(&input.contact_email)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        self.get(&id)
            .await?
            .ok_or_else(|| StorageError::Database(format!("fiduciary {} vanished after insert", id)))
    }

    pub async fn get(&self, id: &str) -> Result<Option<DataFiduciary>, StorageError> {
        let row = sqlx::query("SELECT * FROM data_fiduciaries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        match row {
            Some(row) => Ok(Some(self.row_to_fiduciary(&row)?)),
            None => Ok(None),
        }
    }

    /// Fetch only active fiduciaries; inactive ones cannot start consent flows.
    pub async fn get_active(&self, id: &str) -> Result<Option<DataFiduciary>, StorageError> {
        let row = sqlx::query("SELECT * FROM data_fiduciaries WHERE id = ? AND is_active = 1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        match row {
            Some(row) => Ok(Some(self.row_to_fiduciary(&row)?)),
            None => Ok(None),
        }
    }

    /// Webhook target for outbound events, if the fiduciary registered one.
    pub async fn webhook_url(&self, id: &str) -> Result<Option<String>, StorageError> {
        let url: Option<Option<String>> =
            sqlx::query_scalar("SELECT webhook_url FROM data_fiduciaries WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(StorageError::Sqlx)?;

        Ok(url.flatten())
    }

    fn row_to_fiduciary(&self, row: &sqlx::sqlite::SqliteRow) -> Result<DataFiduciary, StorageError> {
        Ok(DataFiduciary {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            webhook_url: row.try_get("webhook_url")?,
            contact_email: row.try_get("contact_email")?,
            is_active: row.try_get::<i64, _>("is_active")? != 0,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
