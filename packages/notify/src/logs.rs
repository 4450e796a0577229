// ABOUTME: Webhook delivery log storage layer using SQLite
// ABOUTME: Append-only record of every outbound attempt for operator reconciliation

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use sammati_core::new_id;
use sammati_storage::StorageError;

use super::types::WebhookLog;

pub struct WebhookLogStorage {
    pool: SqlitePool,
}

pub struct WebhookLogEntry {
    pub fiduciary_id: String,
    pub event_type: String,
    pub url: String,
    pub status_code: Option<i64>,
    pub response_time_ms: Option<i64>,
    pub success: bool,
    pub error_message: Option<String>,
}

impl WebhookLogStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, entry: WebhookLogEntry) -> Result<WebhookLog, StorageError> {
        let id = new_id("whl");
        let now = Utc::now();

        debug!(
            "Recording webhook attempt for {}: {} ({})",
            entry.fiduciary_id,
            entry.event_type,
            if entry.success { "ok" } else { "failed" }
        );

        sqlx::query(
            r#"
            INSERT INTO webhook_logs (
                id, fiduciary_id, event_type, url, method, status_code,
                response_time_ms, success, error_message, created_at
            ) VALUES (?, ?, ?, ?, 'POST', ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&entry.fiduciary_id)
        .bind(&entry.event_type)
        .bind(&entry.url)
        .bind(entry.status_code)
        .bind(entry.response_time_ms)
        .bind(entry.success)
        .bind(&entry.error_message)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        Ok(WebhookLog {
            id,
            fiduciary_id: entry.fiduciary_id,
            event_type: entry.event_type,
            url: entry.url,
            method: "POST".to_string(),
            status_code: entry.status_code,
            response_time_ms: entry.response_time_ms,
            success: entry.success,
            error_message: entry.error_message,
            created_at: now,
        })
    }

    pub async fn list_for_fiduciary(
        &self,
        fiduciary_id: &str,
        limit: i64,
    ) -> Result<Vec<WebhookLog>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM webhook_logs WHERE fiduciary_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(fiduciary_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        rows.iter().map(row_to_log).collect()
    }
}

fn row_to_log(row: &sqlx::sqlite::SqliteRow) -> Result<WebhookLog, StorageError> {
    Ok(WebhookLog {
        id: row.try_get("id")?,
        fiduciary_id: row.try_get("fiduciary_id")?,
        event_type: row.try_get("event_type")?,
        url: row.try_get("url")?,
        method: row.try_get("method")?,
        status_code: row.try_get("status_code")?,
        response_time_ms: row.try_get("response_time_ms")?,
        success: row.try_get::<i64, _>("success")? != 0,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
    })
}
