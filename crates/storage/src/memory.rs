//! In-memory implementation of every storage trait.
//!
//! Enforces the same identity rules as the PostgreSQL schema: one snapshot
//! per external event id with a stable internal id, and one ledger entry
//! per (rule, event, trigger). Uses `std::sync::Mutex`; no lock is held
//! across an await point.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use radar_core::{
    EventSnapshot, ImportantLog, LedgerEntry, LedgerKey, NewImportantLog, Rule, SchedulerStatus,
};

use crate::error::StorageError;
use crate::traits::{LogStore, NotificationLedger, RuleSource, SnapshotStore};

#[derive(Default)]
struct Inner {
    rules: Vec<Rule>,
    snapshots: HashMap<i64, EventSnapshot>,
    next_snapshot_id: i64,
    ledger: HashMap<LedgerKey, DateTime<Utc>>,
    logs: Vec<ImportantLog>,
    next_log_id: i64,
    status: Option<SchedulerStatus>,
}

/// Shared in-memory store. Clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with rules.
    pub fn with_rules(rules: Vec<Rule>) -> Self {
        let store = Self::new();
        store.lock().rules = rules;
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_rules(&self, rules: Vec<Rule>) {
        self.lock().rules = rules;
    }

    pub fn snapshot_count(&self) -> usize {
        self.lock().snapshots.len()
    }

    pub fn snapshot(&self, event_id: i64) -> Option<EventSnapshot> {
        self.lock().snapshots.get(&event_id).cloned()
    }

    /// All ledger entries, ordered by key for stable assertions.
    pub fn ledger_entries(&self) -> Vec<LedgerEntry> {
        let mut entries: Vec<LedgerEntry> = self
            .lock()
            .ledger
            .iter()
            .map(|(key, sent_at)| LedgerEntry {
                key: *key,
                sent_at: *sent_at,
            })
            .collect();
        entries.sort_by_key(|e| (e.key.rule_id, e.key.event_id, e.key.trigger));
        entries
    }

    /// Record a ledger entry with an explicit send time.
    pub fn record_at(&self, key: LedgerKey, sent_at: DateTime<Utc>) -> bool {
        let mut inner = self.lock();
        if inner.ledger.contains_key(&key) {
            return false;
        }
        inner.ledger.insert(key, sent_at);
        true
    }

    /// Insert an important log with an explicit creation time.
    pub fn save_log_at(&self, entry: &NewImportantLog, created_at: DateTime<Utc>) {
        let mut inner = self.lock();
        inner.next_log_id += 1;
        let id = inner.next_log_id;
        inner.logs.push(ImportantLog {
            id,
            level: entry.level,
            event_type: entry.event_type.clone(),
            message: entry.message.clone(),
            metadata: entry.metadata.clone(),
            created_at,
        });
    }

    /// Every stored important log, oldest first.
    pub fn logs(&self) -> Vec<ImportantLog> {
        self.lock().logs.clone()
    }
}

#[async_trait::async_trait]
impl RuleSource for MemoryStore {
    async fn list_active(&self) -> Result<Vec<Rule>, StorageError> {
        let mut rules: Vec<Rule> = self
            .lock()
            .rules
            .iter()
            .filter(|r| r.is_active)
            .cloned()
            .collect();
        rules.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(rules)
    }
}

#[async_trait::async_trait]
impl SnapshotStore for MemoryStore {
    async fn find_by_event_id(&self, event_id: i64) -> Result<Option<EventSnapshot>, StorageError> {
        Ok(self.lock().snapshots.get(&event_id).cloned())
    }

    async fn upsert(&self, snapshot: &EventSnapshot) -> Result<i64, StorageError> {
        let mut inner = self.lock();
        let id = match inner.snapshots.get(&snapshot.event_id) {
            Some(existing) => existing.id,
            None => {
                inner.next_snapshot_id += 1;
                inner.next_snapshot_id
            }
        };
        let mut stored = snapshot.clone();
        stored.id = id;
        inner.snapshots.insert(snapshot.event_id, stored);
        Ok(id)
    }

    async fn cleanup(&self, before: DateTime<Utc>) -> Result<u64, StorageError> {
        let mut inner = self.lock();
        let len = inner.snapshots.len();
        inner.snapshots.retain(|_, s| s.retrieved_at >= before);
        Ok((len - inner.snapshots.len()) as u64)
    }
}

#[async_trait::async_trait]
impl NotificationLedger for MemoryStore {
    async fn exists(&self, key: &LedgerKey) -> Result<bool, StorageError> {
        Ok(self.lock().ledger.contains_key(key))
    }

    async fn record(&self, key: &LedgerKey) -> Result<bool, StorageError> {
        Ok(self.record_at(*key, Utc::now()))
    }

    async fn cleanup(&self, before: DateTime<Utc>) -> Result<u64, StorageError> {
        let mut inner = self.lock();
        let len = inner.ledger.len();
        inner.ledger.retain(|_, sent_at| *sent_at >= before);
        Ok((len - inner.ledger.len()) as u64)
    }
}

#[async_trait::async_trait]
impl LogStore for MemoryStore {
    async fn save(&self, entry: &NewImportantLog) -> Result<(), StorageError> {
        self.save_log_at(entry, Utc::now());
        Ok(())
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<ImportantLog>, StorageError> {
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(self.lock().logs.iter().rev().take(limit).cloned().collect())
    }

    async fn cleanup(&self, before: DateTime<Utc>) -> Result<u64, StorageError> {
        let mut inner = self.lock();
        let len = inner.logs.len();
        inner.logs.retain(|l| l.created_at >= before);
        Ok((len - inner.logs.len()) as u64)
    }

    async fn update_status(
        &self,
        last_run_at: DateTime<Utc>,
        last_error: &str,
    ) -> Result<(), StorageError> {
        self.lock().status = Some(SchedulerStatus {
            last_run_at,
            last_error: last_error.to_string(),
            updated_at: Utc::now(),
        });
        Ok(())
    }

    async fn status(&self) -> Result<Option<SchedulerStatus>, StorageError> {
        Ok(self.lock().status.clone())
    }
}
