//! Operator-facing run journal.
//!
//! Every decision point of a scheduler run is recorded as a [`JournalEvent`]:
//! emitted through `tracing` and persisted as an important log. Persistence
//! failures are logged and never abort the caller.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use radar_core::{LogLevel, NewImportantLog, TriggerKind};
use radar_storage::LogStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum JournalEvent {
    SchedulerStarted,
    RulesLoaded {
        count: usize,
    },
    RuleLoadFailed {
        error: String,
    },
    RuleSkipped {
        rule_id: i64,
        rule_name: String,
        reason: String,
    },
    RuleProcessing {
        rule_id: i64,
        rule_name: String,
        keywords: Vec<String>,
    },
    FetchStarted {
        rule_id: i64,
        keyword: String,
        location: String,
    },
    FetchCompleted {
        rule_id: i64,
        keyword: String,
        location: String,
        events: usize,
    },
    FetchFailed {
        rule_id: i64,
        keyword: String,
        error: String,
    },
    StorageFailed {
        rule_id: i64,
        event_id: i64,
        keyword: String,
        error: String,
    },
    TriggerDetected {
        rule_id: i64,
        event_id: i64,
        triggers: Vec<TriggerKind>,
    },
    NotificationSent {
        rule_id: i64,
        event_id: i64,
        trigger: TriggerKind,
        channel_id: String,
    },
    NotificationFailed {
        rule_id: i64,
        event_id: i64,
        trigger: TriggerKind,
        error: String,
    },
    LedgerRecordFailed {
        rule_id: i64,
        event_id: i64,
        trigger: TriggerKind,
        error: String,
    },
    CleanupCompleted {
        target: String,
        removed: u64,
    },
    CleanupFailed {
        target: String,
        error: String,
    },
    SchedulerCompleted {
        duration_ms: u64,
        notifications: usize,
        failures: usize,
    },
    SchedulerCancelled,
}

impl JournalEvent {
    /// Stable name used as the important-log `event_type`.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SchedulerStarted => "scheduler_started",
            Self::RulesLoaded { .. } => "rules_loaded",
            Self::RuleLoadFailed { .. } => "rule_load_failed",
            Self::RuleSkipped { .. } => "rule_skipped",
            Self::RuleProcessing { .. } => "rule_processing",
            Self::FetchStarted { .. } => "fetch_started",
            Self::FetchCompleted { .. } => "fetch_completed",
            Self::FetchFailed { .. } => "fetch_failed",
            Self::StorageFailed { .. } => "storage_failed",
            Self::TriggerDetected { .. } => "trigger_detected",
            Self::NotificationSent { .. } => "notification_sent",
            Self::NotificationFailed { .. } => "notification_failed",
            Self::LedgerRecordFailed { .. } => "ledger_record_failed",
            Self::CleanupCompleted { .. } => "cleanup_completed",
            Self::CleanupFailed { .. } => "cleanup_failed",
            Self::SchedulerCompleted { .. } => "scheduler_completed",
            Self::SchedulerCancelled => "scheduler_cancelled",
        }
    }

    pub fn level(&self) -> LogLevel {
        match self {
            Self::RuleLoadFailed { .. }
            | Self::FetchFailed { .. }
            | Self::StorageFailed { .. }
            | Self::NotificationFailed { .. } => LogLevel::Error,
            Self::RuleSkipped { .. }
            | Self::LedgerRecordFailed { .. }
            | Self::CleanupFailed { .. }
            | Self::SchedulerCancelled => LogLevel::Warning,
            _ => LogLevel::Info,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::SchedulerStarted => "Scheduler run started".to_string(),
            Self::RulesLoaded { count } => format!("Processing {count} active rules"),
            Self::RuleLoadFailed { error } => format!("Failed to load active rules: {error}"),
            Self::RuleSkipped { reason, .. } => format!("Rule skipped: {reason}"),
            Self::RuleProcessing { rule_name, .. } => format!("Processing rule '{rule_name}'"),
            Self::FetchStarted { keyword, .. } => format!("Fetching events for '{keyword}'"),
            Self::FetchCompleted { keyword, events, .. } => {
                format!("Fetched {events} events for '{keyword}'")
            }
            Self::FetchFailed { keyword, error, .. } => {
                format!("Fetch failed for '{keyword}': {error}")
            }
            Self::StorageFailed { event_id, error, .. } => {
                format!("Snapshot storage failed for event {event_id}: {error}")
            }
            Self::TriggerDetected { triggers, .. } => {
                format!("Detected {} notification triggers", triggers.len())
            }
            Self::NotificationSent { trigger, .. } => format!("Sent {trigger} notification"),
            Self::NotificationFailed { trigger, error, .. } => {
                format!("Failed to send {trigger} notification: {error}")
            }
            Self::LedgerRecordFailed { trigger, error, .. } => {
                format!("Sent {trigger} notification but could not record it: {error}")
            }
            Self::CleanupCompleted { target, removed } => {
                format!("Removed {removed} expired {target}")
            }
            Self::CleanupFailed { target, error } => format!("Cleanup of {target} failed: {error}"),
            Self::SchedulerCompleted { duration_ms, .. } => {
                format!("Scheduler run completed in {duration_ms}ms")
            }
            Self::SchedulerCancelled => "Scheduler run cancelled".to_string(),
        }
    }

    /// Structured fields of the event, without the `event_type` tag.
    pub fn metadata(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(map) = value.as_object_mut() {
            map.remove("event_type");
        }
        value
    }
}

#[derive(Clone)]
pub struct Journal {
    store: Arc<dyn LogStore>,
}

impl Journal {
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self { store }
    }

    pub async fn record(&self, event: JournalEvent) {
        let entry = NewImportantLog {
            level: event.level(),
            event_type: event.event_type().to_string(),
            message: event.message(),
            metadata: event.metadata(),
        };

        match entry.level {
            LogLevel::Info => info!(event_type = %entry.event_type, metadata = %entry.metadata, "{}", entry.message),
            LogLevel::Warning => warn!(event_type = %entry.event_type, metadata = %entry.metadata, "{}", entry.message),
            LogLevel::Error => error!(event_type = %entry.event_type, metadata = %entry.metadata, "{}", entry.message),
        }

        if let Err(e) = self.store.save(&entry).await {
            warn!(error = %e, event_type = %entry.event_type, "Failed to persist important log");
        }
    }
}
