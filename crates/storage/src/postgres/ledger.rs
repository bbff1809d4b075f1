use chrono::{DateTime, Utc};

use radar_core::LedgerKey;

use super::PgStore;
use crate::error::StorageError;
use crate::traits::NotificationLedger;

#[async_trait::async_trait]
impl NotificationLedger for PgStore {
    async fn exists(&self, key: &LedgerKey) -> Result<bool, StorageError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (
                 SELECT 1 FROM notifications
                 WHERE rule_id = $1 AND event_id = $2 AND notify_key = $3
             )",
        )
        .bind(key.rule_id)
        .bind(key.event_id)
        .bind(key.trigger.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn record(&self, key: &LedgerKey) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "INSERT INTO notifications (rule_id, event_id, notify_key, sent_at)
             VALUES ($1, $2, $3, NOW())
             ON CONFLICT (rule_id, event_id, notify_key) DO NOTHING",
        )
        .bind(key.rule_id)
        .bind(key.event_id)
        .bind(key.trigger.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn cleanup(&self, before: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM notifications WHERE sent_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
