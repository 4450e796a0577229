// ABOUTME: Purpose version store using SQLite
// ABOUTME: Tracked-field edits publish a new immutable version inside one transaction

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info};

use sammati_core::new_id;
use sammati_storage::StorageError;

use super::types::{Purpose, PurposeCreateInput, PurposeUpdateInput, PurposeVersion, PurposeWithVersion};

#[derive(Error, Debug)]
pub enum PurposeStoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Purpose not found: {0}")]
    NotFound(String),
    #[error("Category {category_id} is not owned by fiduciary {fiduciary_id}")]
    CategoryNotOwned {
        category_id: String,
        fiduciary_id: String,
    },
    #[error("Invalid renewal policy: {0}")]
    RenewalPolicy(String),
    #[error("Purpose {0} has versions referenced by consent artifacts; deactivate it instead")]
    VersionsReferenced(String),
}

pub type PurposeResult<T> = Result<T, PurposeStoreError>;

/// The fields whose change publishes a new version. Everything else
/// (display order, active flag) mutates in place.
fn tracked_change(
    purpose: &Purpose,
    current: &PurposeVersion,
    patch: &PurposeUpdateInput,
) -> bool {
    fn differs<T: PartialEq>(patch: &Option<T>, existing: &T) -> bool {
        matches!(patch, Some(v) if v != existing)
    }

    differs(&patch.title, &current.title)
        || differs(&patch.description, &current.description)
        || matches!(&patch.legal_basis, Some(v) if Some(v) != current.legal_basis.as_ref())
        || matches!(&patch.category_id, Some(v) if Some(v) != purpose.category_id.as_ref())
        || differs(&patch.is_mandatory, &purpose.is_mandatory)
        || differs(&patch.requires_renewal, &purpose.requires_renewal)
        || matches!(&patch.renewal_period_days, Some(v) if Some(*v) != purpose.renewal_period_days)
        || differs(&patch.retention_period_days, &purpose.retention_period_days)
        || matches!(&patch.data_fields, Some(v) if !same_set(v, &current.data_fields))
        || matches!(&patch.processing_activities, Some(v) if !same_set(v, &current.processing_activities))
}

/// Order-insensitive comparison; reordering data fields is not an edit.
fn same_set(a: &[String], b: &[String]) -> bool {
    let left: HashSet<&str> = a.iter().map(String::as_str).collect();
    let right: HashSet<&str> = b.iter().map(String::as_str).collect();
    left == right
}

pub struct PurposeStorage {
    pool: SqlitePool,
}

impl PurposeStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a purpose and publish version 1 in one transaction.
    pub async fn create_purpose(&self, input: PurposeCreateInput) -> PurposeResult<PurposeWithVersion> {
        if input.requires_renewal && input.renewal_period_days.is_none() {
            return Err(PurposeStoreError::RenewalPolicy(
                "requires_renewal set without renewal_period_days".to_string(),
            ));
        }

        if let Some(category_id) = &input.category_id {
            self.ensure_category_owned(category_id, &input.fiduciary_id)
                .await?;
        }

        let purpose_id = new_id("pur");
        let version_id = new_id("pv");
        let now = Utc::now();

        debug!("Creating purpose: {}", purpose_id);

        let mut tx = self.pool.begin().await.map_err(StorageError::Sqlx)?;

        sqlx::query(
            r#"
            INSERT INTO purposes (
                id, fiduciary_id, category_id, is_mandatory, is_active,
                requires_renewal, renewal_period_days, retention_period_days,
                display_order, created_at, updated_at
            ) VALUES (?, ?, ?, ?, 1, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&purpose_id)
        .bind(&input.fiduciary_id)
        .bind(&input.category_id)
        .bind(input.is_mandatory)
        .bind(input.requires_renewal)
        .bind(input.renewal_period_days)
        .bind(input.retention_period_days)
        .bind(input.display_order.unwrap_or(0))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(StorageError::Sqlx)?;

        sqlx::query(
            r#"
            INSERT INTO purpose_versions (
                id, purpose_id, version_number, title, description, legal_basis,
                data_fields, processing_activities, language_code, is_current, published_at
            ) VALUES (?, ?, 1, ?, ?, ?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(&version_id)
        .bind(&purpose_id)
        .bind(&input.title)
        .bind(&input.description)
        .bind(&input.legal_basis)
        .bind(to_json(&input.data_fields.unwrap_or_default()))
        .bind(to_json(&input.processing_activities.unwrap_or_default()))
        .bind(input.language_code.as_deref().unwrap_or("en"))
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(StorageError::Sqlx)?;

        tx.commit().await.map_err(StorageError::Sqlx)?;

        info!("Created purpose {} at version 1", purpose_id);
        self.get_with_current(&purpose_id).await
    }

    /// Apply a patch. A tracked-field change flips the current version and
    /// inserts the next one; a cosmetic patch only touches the purpose row.
    pub async fn update_purpose(
        &self,
        purpose_id: &str,
        patch: PurposeUpdateInput,
    ) -> PurposeResult<PurposeWithVersion> {
        let existing = self.get_with_current(purpose_id).await?;
        let purpose = &existing.purpose;
        let current = &existing.version;

        if let Some(category_id) = &patch.category_id {
            self.ensure_category_owned(category_id, &purpose.fiduciary_id)
                .await?;
        }

        let requires_renewal = patch.requires_renewal.unwrap_or(purpose.requires_renewal);
        let renewal_period_days = patch.renewal_period_days.or(purpose.renewal_period_days);
        if requires_renewal && renewal_period_days.is_none() {
            return Err(PurposeStoreError::RenewalPolicy(
                "requires_renewal set without renewal_period_days".to_string(),
            ));
        }

        let publish_version = tracked_change(purpose, current, &patch);
        let now = Utc::now();

        let mut tx = self.pool.begin().await.map_err(StorageError::Sqlx)?;

        sqlx::query(
            r#"
            UPDATE purposes
            SET category_id = ?, is_mandatory = ?, requires_renewal = ?,
                renewal_period_days = ?, retention_period_days = ?,
                display_order = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(patch.category_id.as_ref().or(purpose.category_id.as_ref()))
        .bind(patch.is_mandatory.unwrap_or(purpose.is_mandatory))
        .bind(requires_renewal)
        .bind(renewal_period_days)
        .bind(
            patch
                .retention_period_days
                .unwrap_or(purpose.retention_period_days),
        )
        .bind(patch.display_order.unwrap_or(purpose.display_order))
        .bind(now)
        .bind(purpose_id)
        .execute(&mut *tx)
        .await
        .map_err(StorageError::Sqlx)?;

        if publish_version {
            sqlx::query(
                "UPDATE purpose_versions SET is_current = 0, deprecated_at = ? WHERE purpose_id = ? AND is_current = 1",
            )
            .bind(now)
            .bind(purpose_id)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::Sqlx)?;

            let next_number: i64 = sqlx::query_scalar(
                "SELECT COALESCE(MAX(version_number), 0) + 1 FROM purpose_versions WHERE purpose_id = ?",
            )
            .bind(purpose_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(StorageError::Sqlx)?;

            let version_id = new_id("pv");

            sqlx::query(
                r#"
                INSERT INTO purpose_versions (
                    id, purpose_id, version_number, title, description, legal_basis,
                    data_fields, processing_activities, language_code, is_current, published_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)
                "#,
            )
            .bind(&version_id)
            .bind(purpose_id)
            .bind(next_number)
            .bind(patch.title.as_ref().unwrap_or(&current.title))
            .bind(patch.description.as_ref().unwrap_or(&current.description))
            .bind(patch.legal_basis.as_ref().or(current.legal_basis.as_ref()))
            .bind(to_json(patch.data_fields.as_ref().unwrap_or(&current.data_fields)))
            .bind(to_json(
                patch
                    .processing_activities
                    .as_ref()
                    .unwrap_or(&current.processing_activities),
            ))
            .bind(&current.language_code)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::Sqlx)?;

            info!("Published purpose {} version {}", purpose_id, next_number);
        }

        tx.commit().await.map_err(StorageError::Sqlx)?;

        self.get_with_current(purpose_id).await
    }

    pub async fn get_purpose(&self, purpose_id: &str) -> PurposeResult<Option<Purpose>> {
        let row = sqlx::query("SELECT * FROM purposes WHERE id = ?")
            .bind(purpose_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        match row {
            Some(row) => Ok(Some(row_to_purpose(&row)?)),
            None => Ok(None),
        }
    }

    /// The version currently presented to principals.
    pub async fn current_version(&self, purpose_id: &str) -> PurposeResult<PurposeVersion> {
        let row = sqlx::query(
            "SELECT * FROM purpose_versions WHERE purpose_id = ? AND is_current = 1",
        )
        .bind(purpose_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        match row {
            Some(row) => Ok(row_to_version(&row)?),
            None => Err(PurposeStoreError::NotFound(purpose_id.to_string())),
        }
    }

    /// Full version history, newest first.
    pub async fn version_history(&self, purpose_id: &str) -> PurposeResult<Vec<PurposeVersion>> {
        let rows = sqlx::query(
            "SELECT * FROM purpose_versions WHERE purpose_id = ? ORDER BY version_number DESC",
        )
        .bind(purpose_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        rows.iter()
            .map(|row| row_to_version(row).map_err(PurposeStoreError::from))
            .collect()
    }

    pub async fn get_version(&self, version_id: &str) -> PurposeResult<Option<PurposeVersion>> {
        let row = sqlx::query("SELECT * FROM purpose_versions WHERE id = ?")
            .bind(version_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        match row {
            Some(row) => Ok(Some(row_to_version(&row)?)),
            None => Ok(None),
        }
    }

    /// Purpose plus its current version, the shape the notice and the
    /// engine bind against.
    pub async fn get_with_current(&self, purpose_id: &str) -> PurposeResult<PurposeWithVersion> {
        let purpose = self
            .get_purpose(purpose_id)
            .await?
            .ok_or_else(|| PurposeStoreError::NotFound(purpose_id.to_string()))?;
        let version = self.current_version(purpose_id).await?;
        Ok(PurposeWithVersion { purpose, version })
    }

    /// Bulk resolve of current versions, preserving input order.
    pub async fn current_versions(
        &self,
        purpose_ids: &[String],
    ) -> PurposeResult<Vec<PurposeWithVersion>> {
        let mut out = Vec::with_capacity(purpose_ids.len());
        for id in purpose_ids {
            out.push(self.get_with_current(id).await?);
        }
        Ok(out)
    }

    /// Cosmetic: flips visibility without touching version history.
    pub async fn set_active(&self, purpose_id: &str, active: bool) -> PurposeResult<()> {
        let result = sqlx::query("UPDATE purposes SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(Utc::now())
            .bind(purpose_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        if result.rows_affected() == 0 {
            return Err(PurposeStoreError::NotFound(purpose_id.to_string()));
        }
        Ok(())
    }

    /// Deletion is allowed only while no artifact references any version.
    /// Audit continuity wins over tidiness: referenced purposes must be
    /// deactivated instead.
    pub async fn delete_purpose(&self, purpose_id: &str) -> PurposeResult<()> {
        if self.get_purpose(purpose_id).await?.is_none() {
            return Err(PurposeStoreError::NotFound(purpose_id.to_string()));
        }

        let references: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM consent_artifact_purposes WHERE purpose_id = ?",
        )
        .bind(purpose_id)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        if references > 0 {
            return Err(PurposeStoreError::VersionsReferenced(purpose_id.to_string()));
        }

        let mut tx = self.pool.begin().await.map_err(StorageError::Sqlx)?;

        sqlx::query("DELETE FROM purpose_versions WHERE purpose_id = ?")
            .bind(purpose_id)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::Sqlx)?;

        sqlx::query("DELETE FROM purposes WHERE id = ?")
            .bind(purpose_id)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::Sqlx)?;

        tx.commit().await.map_err(StorageError::Sqlx)?;

        info!("Deleted purpose {} and its versions", purpose_id);
        Ok(())
    }

    async fn ensure_category_owned(
        &self,
        category_id: &str,
        fiduciary_id: &str,
    ) -> PurposeResult<()> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM purpose_categories WHERE id = ? AND fiduciary_id = ?",
        )
        .bind(category_id)
        .bind(fiduciary_id)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        if count == 0 {
            return Err(PurposeStoreError::CategoryNotOwned {
                category_id: category_id.to_string(),
                fiduciary_id: fiduciary_id.to_string(),
            });
        }
        Ok(())
    }
}

fn to_json(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

fn row_to_purpose(row: &sqlx::sqlite::SqliteRow) -> Result<Purpose, StorageError> {
    Ok(Purpose {
        id: row.try_get("id")?,
        fiduciary_id: row.try_get("fiduciary_id")?,
        category_id: row.try_get("category_id")?,
        is_mandatory: row.try_get::<i64, _>("is_mandatory")? != 0,
        is_active: row.try_get::<i64, _>("is_active")? != 0,
        requires_renewal: row.try_get::<i64, _>("requires_renewal")? != 0,
        renewal_period_days: row.try_get("renewal_period_days")?,
        retention_period_days: row.try_get("retention_period_days")?,
        display_order: row.try_get("display_order")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_version(row: &sqlx::sqlite::SqliteRow) -> Result<PurposeVersion, StorageError> {
    let data_fields: String = row.try_get("data_fields")?;
    let processing_activities: String = row.try_get("processing_activities")?;

    Ok(PurposeVersion {
        id: row.try_get("id")?,
        purpose_id: row.try_get("purpose_id")?,
        version_number: row.try_get("version_number")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        legal_basis: row.try_get("legal_basis")?,
        data_fields: serde_json::from_str(&data_fields).unwrap_or_default(),
        processing_activities: serde_json::from_str(&processing_activities).unwrap_or_default(),
        language_code: row.try_get("language_code")?,
        is_current: row.try_get::<i64, _>("is_current")? != 0,
        published_at: row.try_get("published_at")?,
        deprecated_at: row.try_get("deprecated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sammati_fiduciaries::{FiduciaryCreateInput, FiduciaryStorage};
    use sammati_storage::connect_in_memory;

    async fn setup() -> (SqlitePool, String) {
        let pool = connect_in_memory().await.unwrap();
        let fiduciaries = FiduciaryStorage::new(pool.clone());
        let fiduciary = fiduciaries
            .create(FiduciaryCreateInput {
                name: "Test Fiduciary".to_string(),
                webhook_url: None,
                contact_email: None,
            })
            .await
            .unwrap();
        (pool, fiduciary.id)
    }

    fn base_input(fiduciary_id: &str) -> PurposeCreateInput {
        PurposeCreateInput {
            fiduciary_id: fiduciary_id.to_string(),
            category_id: None,
            title: "Order fulfilment".to_string(),
            description: "Process delivery address and contact details".to_string(),
            legal_basis: Some("contract".to_string()),
            data_fields: Some(vec!["address".to_string(), "phone".to_string()]),
            processing_activities: Some(vec!["shipping".to_string()]),
            language_code: None,
            is_mandatory: false,
            requires_renewal: false,
            renewal_period_days: None,
            retention_period_days: 365,
            display_order: None,
        }
    }

    #[tokio::test]
    async fn test_create_publishes_version_one() {
        let (pool, fid) = setup().await;
        let storage = PurposeStorage::new(pool);

        let created = storage.create_purpose(base_input(&fid)).await.unwrap();

        assert_eq!(created.version.version_number, 1);
        assert!(created.version.is_current);
        assert!(created.version.deprecated_at.is_none());
    }

    #[tokio::test]
    async fn test_tracked_edit_publishes_next_version() {
        let (pool, fid) = setup().await;
        let storage = PurposeStorage::new(pool);
        let created = storage.create_purpose(base_input(&fid)).await.unwrap();

        let updated = storage
            .update_purpose(
                &created.purpose.id,
                PurposeUpdateInput {
                    title: Some("Order fulfilment and returns".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.version.version_number, 2);
        assert!(updated.version.is_current);

        let history = storage.version_history(&created.purpose.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].version_number, 2);
        assert_eq!(history[1].version_number, 1);
        assert!(!history[1].is_current);
        assert!(history[1].deprecated_at.is_some());

        // Exactly one current version
        let current_count = history.iter().filter(|v| v.is_current).count();
        assert_eq!(current_count, 1);
    }

    #[tokio::test]
    async fn test_cosmetic_edit_keeps_version() {
        let (pool, fid) = setup().await;
        let storage = PurposeStorage::new(pool);
        let created = storage.create_purpose(base_input(&fid)).await.unwrap();

        let updated = storage
            .update_purpose(
                &created.purpose.id,
                PurposeUpdateInput {
                    display_order: Some(7),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.version.version_number, 1);
        assert_eq!(updated.purpose.display_order, 7);
        assert_eq!(
            storage
                .version_history(&created.purpose.id)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_reordered_data_fields_are_not_an_edit() {
        let (pool, fid) = setup().await;
        let storage = PurposeStorage::new(pool);
        let created = storage.create_purpose(base_input(&fid)).await.unwrap();

        let updated = storage
            .update_purpose(
                &created.purpose.id,
                PurposeUpdateInput {
                    data_fields: Some(vec!["phone".to_string(), "address".to_string()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.version.version_number, 1);
    }

    #[tokio::test]
    async fn test_renewal_without_period_rejected() {
        let (pool, fid) = setup().await;
        let storage = PurposeStorage::new(pool);

        let mut input = base_input(&fid);
        input.requires_renewal = true;
        input.renewal_period_days = None;

        let result = storage.create_purpose(input).await;
        assert!(matches!(result, Err(PurposeStoreError::RenewalPolicy(_))));

        // The same guard applies on update
        let created = storage.create_purpose(base_input(&fid)).await.unwrap();
        let result = storage
            .update_purpose(
                &created.purpose.id,
                PurposeUpdateInput {
                    requires_renewal: Some(true),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(PurposeStoreError::RenewalPolicy(_))));
    }

    #[tokio::test]
    async fn test_category_ownership_enforced() {
        let (pool, fid) = setup().await;
        let fiduciaries = FiduciaryStorage::new(pool.clone());
        let other = fiduciaries
            .create(FiduciaryCreateInput {
                name: "Other Fiduciary".to_string(),
                webhook_url: None,
                contact_email: None,
            })
            .await
            .unwrap();

        let categories = crate::categories::CategoryStorage::new(pool.clone());
        let foreign_category = categories.create(&other.id, "Marketing").await.unwrap();

        let storage = PurposeStorage::new(pool);
        let mut input = base_input(&fid);
        input.category_id = Some(foreign_category.id);

        let result = storage.create_purpose(input).await;
        assert!(matches!(
            result,
            Err(PurposeStoreError::CategoryNotOwned { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_guarded_by_artifact_references() {
        let (pool, fid) = setup().await;
        let storage = PurposeStorage::new(pool.clone());
        let created = storage.create_purpose(base_input(&fid)).await.unwrap();

        // Simulate a granted artifact bound to version 1
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO data_principals (id, external_id, language, created_at, updated_at) VALUES ('prn-t', 'ext-1', 'en', ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            r#"
            INSERT INTO consent_artifacts (
                id, fiduciary_id, principal_id, external_user_id, status,
                requested_at, granted_at, expires_at, consent_text_hash, created_at, updated_at
            ) VALUES ('art-t', ?, 'prn-t', 'ext-1', 'ACTIVE', ?, ?, ?, 'h', ?, ?)
            "#,
        )
        .bind(&fid)
        .bind(now)
        .bind(now)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO consent_artifact_purposes (artifact_id, purpose_id, purpose_version_id) VALUES ('art-t', ?, ?)",
        )
        .bind(&created.purpose.id)
        .bind(&created.version.id)
        .execute(&pool)
        .await
        .unwrap();

        let result = storage.delete_purpose(&created.purpose.id).await;
        assert!(matches!(
            result,
            Err(PurposeStoreError::VersionsReferenced(_))
        ));

        // An unreferenced purpose deletes cleanly
        let other = storage.create_purpose(base_input(&fid)).await.unwrap();
        storage.delete_purpose(&other.purpose.id).await.unwrap();
        assert!(storage.get_purpose(&other.purpose.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_version_numbers_stay_monotonic() {
        let (pool, fid) = setup().await;
        let storage = PurposeStorage::new(pool);
        let created = storage.create_purpose(base_input(&fid)).await.unwrap();

        for n in 0..3 {
            storage
                .update_purpose(
                    &created.purpose.id,
                    PurposeUpdateInput {
                        description: Some(format!("revision {}", n)),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }

        let current = storage.current_version(&created.purpose.id).await.unwrap();
        assert_eq!(current.version_number, 4);
    }
}
