// ABOUTME: Principal registry storage layer using SQLite
// ABOUTME: Upserts principals on first interaction and tracks fiduciary-principal links

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use sammati_core::new_id;
use sammati_storage::StorageError;

use super::types::{DataPrincipal, PrincipalUpsertInput};

pub struct PrincipalStorage {
    pool: SqlitePool,
}

impl PrincipalStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Resolve an external user ID to a principal record, creating or
    /// refreshing it. Provided contact fields overwrite, absent ones are
    /// kept.
    pub async fn register_or_update(
        &self,
        input: PrincipalUpsertInput,
    ) -> Result<DataPrincipal, StorageError> {
        let id = new_id("prn");
        let now = Utc::now();

        debug!("Upserting principal for external id: {}", input.external_id);

        sqlx::query(
            r#"
            INSERT INTO data_principals (id, external_id, email, phone, language, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(external_id) DO UPDATE SET
                email = COALESCE(excluded.email, data_principals.email),
                phone = COALESCE(excluded.phone, data_principals.phone),
                language = COALESCE(NULLIF(excluded.language, ''), data_principals.language),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&id)
        .bind(&input.external_id)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(input.language.as_deref().unwrap_or(""))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        self.get_by_external(&input.external_id)
            .await?
            .ok_or_else(|| {
                StorageError::Database(format!(
                    "principal for external id {} vanished after upsert",
                    input.external_id
                ))
            })
    }

    pub async fn get(&self, id: &str) -> Result<Option<DataPrincipal>, StorageError> {
        let row = sqlx::query("SELECT * FROM data_principals WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        match row {
            Some(row) => Ok(Some(row_to_principal(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn get_by_external(
        &self,
        external_id: &str,
    ) -> Result<Option<DataPrincipal>, StorageError> {
        let row = sqlx::query("SELECT * FROM data_principals WHERE external_id = ?")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        match row {
            Some(row) => Ok(Some(row_to_principal(&row)?)),
            None => Ok(None),
        }
    }

    /// Record that a principal has consented to this fiduciary at least
    /// once. Idempotent; the first timestamp wins.
    pub async fn link_fiduciary(
        &self,
        fiduciary_id: &str,
        principal_id: &str,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT OR IGNORE INTO fiduciary_principals (fiduciary_id, principal_id, first_consent_at) VALUES (?, ?, ?)",
        )
        .bind(fiduciary_id)
        .bind(principal_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        Ok(())
    }
}

fn row_to_principal(row: &sqlx::sqlite::SqliteRow) -> Result<DataPrincipal, StorageError> {
    let language: String = row.try_get("language")?;
    Ok(DataPrincipal {
        id: row.try_get("id")?,
        external_id: row.try_get("external_id")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        language: if language.is_empty() {
            "en".to_string()
        } else {
            language
        },
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
