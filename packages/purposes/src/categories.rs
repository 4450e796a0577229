// ABOUTME: Purpose category lookups
// ABOUTME: Category CRUD is out of scope; this covers ownership checks and seeding

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use sammati_core::new_id;
use sammati_storage::StorageError;

use super::types::PurposeCategory;

pub struct CategoryStorage {
    pool: SqlitePool,
}

impl CategoryStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        fiduciary_id: &str,
        name: &str,
    ) -> Result<PurposeCategory, StorageError> {
        let id = new_id("cat");
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO purpose_categories (id, fiduciary_id, name, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(fiduciary_id)
        .bind(name)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        Ok(PurposeCategory {
            id,
            fiduciary_id: fiduciary_id.to_string(),
            name: name.to_string(),
            created_at: now,
        })
    }

    pub async fn get(&self, id: &str) -> Result<Option<PurposeCategory>, StorageError> {
        let row = sqlx::query("SELECT * FROM purpose_categories WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        match row {
            Some(row) => Ok(Some(PurposeCategory {
                id: row.try_get("id")?,
                fiduciary_id: row.try_get("fiduciary_id")?,
                name: row.try_get("name")?,
                created_at: row.try_get("created_at")?,
            })),
            None => Ok(None),
        }
    }

    /// True when the category exists and belongs to the given fiduciary.
    pub async fn owned_by(&self, id: &str, fiduciary_id: &str) -> Result<bool, StorageError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM purpose_categories WHERE id = ? AND fiduciary_id = ?",
        )
        .bind(id)
        .bind(fiduciary_id)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        Ok(count > 0)
    }
}
