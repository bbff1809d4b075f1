//! Storage contracts consumed by the scheduler.
//!
//! Each trait is implemented by a PostgreSQL-backed store (see
//! [`crate::postgres`]) and by [`crate::MemoryStore`].

use chrono::{DateTime, Utc};

use radar_core::{
    EventSnapshot, ImportantLog, LedgerKey, NewImportantLog, Rule, SchedulerStatus,
};

use crate::error::StorageError;

/// Source of subscription rules.
#[async_trait::async_trait]
pub trait RuleSource: Send + Sync {
    /// All rules with `is_active = true`, most recently updated first.
    ///
    /// Rules with an empty keyword list are included; the scheduler skips
    /// and logs them.
    async fn list_active(&self) -> Result<Vec<Rule>, StorageError>;
}

/// Latest known snapshot per external event id.
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn find_by_event_id(&self, event_id: i64) -> Result<Option<EventSnapshot>, StorageError>;

    /// Insert or overwrite the snapshot keyed on `event_id`, returning the
    /// internal id (stable across repeated sightings).
    async fn upsert(&self, snapshot: &EventSnapshot) -> Result<i64, StorageError>;

    /// Store `snapshot` and return whatever was stored before it.
    ///
    /// The default reads then writes; backends that can do both in one
    /// statement override it.
    async fn swap(
        &self,
        snapshot: &EventSnapshot,
    ) -> Result<(Option<EventSnapshot>, i64), StorageError> {
        let previous = self.find_by_event_id(snapshot.event_id).await?;
        let id = self.upsert(snapshot).await?;
        Ok((previous, id))
    }

    /// Delete snapshots retrieved strictly before `before`. Returns rows removed.
    async fn cleanup(&self, before: DateTime<Utc>) -> Result<u64, StorageError>;
}

/// Record of notifications already sent.
#[async_trait::async_trait]
pub trait NotificationLedger: Send + Sync {
    async fn exists(&self, key: &LedgerKey) -> Result<bool, StorageError>;

    /// Record a sent notification. Recording an existing key is a no-op;
    /// returns whether a new entry was written.
    async fn record(&self, key: &LedgerKey) -> Result<bool, StorageError>;

    /// Delete entries sent strictly before `before`. Returns rows removed.
    async fn cleanup(&self, before: DateTime<Utc>) -> Result<u64, StorageError>;
}

/// Important logs and the scheduler status singleton.
#[async_trait::async_trait]
pub trait LogStore: Send + Sync {
    async fn save(&self, entry: &NewImportantLog) -> Result<(), StorageError>;

    /// Newest first.
    async fn list_recent(&self, limit: i64) -> Result<Vec<ImportantLog>, StorageError>;

    async fn cleanup(&self, before: DateTime<Utc>) -> Result<u64, StorageError>;

    async fn update_status(
        &self,
        last_run_at: DateTime<Utc>,
        last_error: &str,
    ) -> Result<(), StorageError>;

    async fn status(&self) -> Result<Option<SchedulerStatus>, StorageError>;
}
