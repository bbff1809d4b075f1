use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use radar_core::config::{RetentionConfig, SchedulerConfig};
use radar_core::{
    EventSnapshot, ImportantLog, LedgerKey, NewImportantLog, RadarError, Rule, SchedulerStatus,
    TriggerKind,
};
use radar_notify::{Notification, Notifier, NotifyError};
use radar_scheduler::{EventSource, Scheduler};
use radar_storage::{
    LogStore, MemoryStore, NotificationLedger, RuleSource, SnapshotStore, StorageError,
};

pub fn make_rule(id: i64, keywords: &[&str], triggers: Vec<TriggerKind>) -> Rule {
    let now = Utc::now();
    Rule {
        id,
        user_id: 1,
        guild_id: "guild".to_string(),
        channel_id: format!("channel-{id}"),
        channel_name: "events".to_string(),
        name: format!("rule {id}"),
        description: String::new(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        location: String::new(),
        triggers,
        capacity_threshold: 0,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

pub fn make_event(event_id: i64, accepted: i32, limit: i32) -> EventSnapshot {
    EventSnapshot {
        id: 0,
        event_id,
        title: format!("Event {event_id}"),
        event_url: format!("https://rust.connpass.com/event/{event_id}/"),
        started_at: None,
        ended_at: None,
        limit,
        accepted,
        waiting: 0,
        updated_at: None,
        retrieved_at: Utc::now(),
        owner_nickname: String::new(),
        series_title: String::new(),
        hash_digest: String::new(),
    }
}

pub fn scheduler_config(retention: RetentionConfig) -> SchedulerConfig {
    SchedulerConfig {
        poll_interval: Duration::from_secs(60),
        default_threshold: 80,
        retention,
    }
}

pub fn build_scheduler<S>(store: Arc<S>, source: Arc<FakeSource>, notifier: Arc<FakeNotifier>) -> Scheduler
where
    S: RuleSource + SnapshotStore + NotificationLedger + LogStore + 'static,
{
    Scheduler::new(store, source, notifier, &scheduler_config(RetentionConfig::default()))
}

pub fn log_types(store: &MemoryStore) -> Vec<String> {
    store.logs().into_iter().map(|l| l.event_type).collect()
}

// ── Event source ────────────────────────────────────────────────────

/// Canned per-keyword responses. Unknown keywords return no events.
#[derive(Default)]
pub struct FakeSource {
    pub responses: Mutex<HashMap<String, Result<Vec<EventSnapshot>, String>>>,
    pub calls: AtomicUsize,
    pub keywords: Mutex<Vec<String>>,
    /// Cancel the caller's token during the Nth call (1-based).
    pub cancel_on_call: Option<usize>,
    pub delay: Option<Duration>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_events(&self, keyword: &str, events: Vec<EventSnapshot>) {
        self.responses.lock().unwrap().insert(keyword.to_string(), Ok(events));
    }

    pub fn set_failure(&self, keyword: &str, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(keyword.to_string(), Err(message.to_string()));
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl EventSource for FakeSource {
    async fn fetch(
        &self,
        keyword: &str,
        _location: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<EventSnapshot>, RadarError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.keywords.lock().unwrap().push(keyword.to_string());
        if self.cancel_on_call == Some(n) {
            cancel.cancel();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.responses.lock().unwrap().get(keyword) {
            Some(Ok(events)) => Ok(events.clone()),
            Some(Err(message)) => Err(RadarError::Upstream(message.clone())),
            None => Ok(Vec::new()),
        }
    }
}

// ── Notifier ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeNotifier {
    pub sent: Mutex<Vec<(String, Notification)>>,
    pub failing: AtomicBool,
}

impl FakeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Notifier for FakeNotifier {
    async fn send(&self, destination: &str, notification: &Notification) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Rejected {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), notification.clone()));
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "fake"
    }
}

// ── Faulty store ────────────────────────────────────────────────────

/// Wraps a [`MemoryStore`] and injects failures.
#[derive(Clone, Default)]
pub struct FaultyStore {
    pub inner: MemoryStore,
    pub fail_rules: bool,
    pub fail_event: Option<i64>,
}

impl FaultyStore {
    fn injected(what: &str) -> StorageError {
        StorageError::InvalidRow(format!("injected {what} failure"))
    }
}

#[async_trait::async_trait]
impl RuleSource for FaultyStore {
    async fn list_active(&self) -> Result<Vec<Rule>, StorageError> {
        if self.fail_rules {
            return Err(Self::injected("rule"));
        }
        self.inner.list_active().await
    }
}

#[async_trait::async_trait]
impl SnapshotStore for FaultyStore {
    async fn find_by_event_id(&self, event_id: i64) -> Result<Option<EventSnapshot>, StorageError> {
        self.inner.find_by_event_id(event_id).await
    }

    async fn upsert(&self, snapshot: &EventSnapshot) -> Result<i64, StorageError> {
        if self.fail_event == Some(snapshot.event_id) {
            return Err(Self::injected("snapshot"));
        }
        self.inner.upsert(snapshot).await
    }

    async fn cleanup(&self, before: DateTime<Utc>) -> Result<u64, StorageError> {
        SnapshotStore::cleanup(&self.inner, before).await
    }
}

#[async_trait::async_trait]
impl NotificationLedger for FaultyStore {
    async fn exists(&self, key: &LedgerKey) -> Result<bool, StorageError> {
        self.inner.exists(key).await
    }

    async fn record(&self, key: &LedgerKey) -> Result<bool, StorageError> {
        self.inner.record(key).await
    }

    async fn cleanup(&self, before: DateTime<Utc>) -> Result<u64, StorageError> {
        NotificationLedger::cleanup(&self.inner, before).await
    }
}

#[async_trait::async_trait]
impl LogStore for FaultyStore {
    async fn save(&self, entry: &NewImportantLog) -> Result<(), StorageError> {
        self.inner.save(entry).await
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<ImportantLog>, StorageError> {
        self.inner.list_recent(limit).await
    }

    async fn cleanup(&self, before: DateTime<Utc>) -> Result<u64, StorageError> {
        LogStore::cleanup(&self.inner, before).await
    }

    async fn update_status(
        &self,
        last_run_at: DateTime<Utc>,
        last_error: &str,
    ) -> Result<(), StorageError> {
        self.inner.update_status(last_run_at, last_error).await
    }

    async fn status(&self) -> Result<Option<SchedulerStatus>, StorageError> {
        self.inner.status().await
    }
}
