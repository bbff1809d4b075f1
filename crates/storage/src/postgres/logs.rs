use chrono::{DateTime, Utc};

use radar_core::{ImportantLog, LogLevel, NewImportantLog, SchedulerStatus};

use super::PgStore;
use crate::error::StorageError;
use crate::traits::LogStore;

#[derive(sqlx::FromRow)]
struct LogRow {
    id: i64,
    level: String,
    event_type: String,
    message: String,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<LogRow> for ImportantLog {
    type Error = StorageError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        let level = LogLevel::parse(&row.level)
            .ok_or_else(|| StorageError::InvalidRow(format!("unknown log level '{}'", row.level)))?;
        Ok(Self {
            id: row.id,
            level,
            event_type: row.event_type,
            message: row.message,
            metadata: row.metadata,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct StatusRow {
    last_run_at: DateTime<Utc>,
    last_error: String,
    updated_at: DateTime<Utc>,
}

#[async_trait::async_trait]
impl LogStore for PgStore {
    async fn save(&self, entry: &NewImportantLog) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO important_logs (level, event_type, message, metadata)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(entry.level.as_str())
        .bind(&entry.event_type)
        .bind(&entry.message)
        .bind(&entry.metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<ImportantLog>, StorageError> {
        let rows = sqlx::query_as::<_, LogRow>(
            "SELECT id, level, event_type, message, metadata, created_at
             FROM important_logs
             ORDER BY created_at DESC, id DESC
             LIMIT $1",
        )
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ImportantLog::try_from).collect()
    }

    async fn cleanup(&self, before: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM important_logs WHERE created_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn update_status(
        &self,
        last_run_at: DateTime<Utc>,
        last_error: &str,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO scheduler_status (id, last_run_at, last_error, updated_at)
             VALUES (1, $1, $2, NOW())
             ON CONFLICT (id) DO UPDATE SET
                 last_run_at = EXCLUDED.last_run_at,
                 last_error = EXCLUDED.last_error,
                 updated_at = NOW()",
        )
        .bind(last_run_at)
        .bind(last_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn status(&self) -> Result<Option<SchedulerStatus>, StorageError> {
        let row = sqlx::query_as::<_, StatusRow>(
            "SELECT last_run_at, last_error, updated_at
             FROM scheduler_status
             WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| SchedulerStatus {
            last_run_at: r.last_run_at,
            last_error: r.last_error,
            updated_at: r.updated_at,
        }))
    }
}
