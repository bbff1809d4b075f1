//! The scheduler run cycle.
//!
//! `run_once` loads active rules and, rule by rule and keyword by keyword,
//! fetches events, swaps their snapshots, evaluates triggers and dispatches
//! notifications. Failures below rule loading only skip their unit of work.
//! Cancellation is checked before every fetch, event and send, and races
//! the gate wait and the outbound send; a cancelled run skips cleanup and
//! leaves the status untouched.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use radar_core::config::{RetentionConfig, SchedulerConfig};
use radar_core::{EventSnapshot, RadarError, Rule, SchedulerStatus};
use radar_notify::{Notifier, NotifyError};
use radar_storage::{LogStore, NotificationLedger, RuleSource, SnapshotStore};

use crate::dispatcher::{DispatchError, DispatchOutcome, Dispatcher};
use crate::evaluator::TriggerEvaluator;
use crate::fetcher::EventSource;
use crate::journal::{Journal, JournalEvent};

/// Counters for one completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub rules_processed: usize,
    pub rules_skipped: usize,
    pub fetches: usize,
    pub fetch_failures: usize,
    pub events_seen: usize,
    pub storage_failures: usize,
    pub notifications_sent: usize,
    pub already_notified: usize,
    pub notification_failures: usize,
    pub record_failures: usize,
}

impl RunSummary {
    /// Skipped units of work; none of them fails the run.
    pub fn failures(&self) -> usize {
        self.fetch_failures + self.storage_failures + self.notification_failures + self.record_failures
    }
}

pub struct Scheduler {
    rules: Arc<dyn RuleSource>,
    snapshots: Arc<dyn SnapshotStore>,
    ledger: Arc<dyn NotificationLedger>,
    logs: Arc<dyn LogStore>,
    source: Arc<dyn EventSource>,
    dispatcher: Dispatcher,
    evaluator: TriggerEvaluator,
    journal: Journal,
    retention: RetentionConfig,
    running: Mutex<()>,
}

impl Scheduler {
    /// Build a scheduler over a single store implementing every storage trait.
    pub fn new<S>(
        store: Arc<S>,
        source: Arc<dyn EventSource>,
        notifier: Arc<dyn Notifier>,
        config: &SchedulerConfig,
    ) -> Self
    where
        S: RuleSource + SnapshotStore + NotificationLedger + LogStore + 'static,
    {
        let ledger: Arc<dyn NotificationLedger> = store.clone();
        let logs: Arc<dyn LogStore> = store.clone();
        Self {
            rules: store.clone(),
            snapshots: store,
            dispatcher: Dispatcher::new(Arc::clone(&ledger), notifier),
            journal: Journal::new(Arc::clone(&logs)),
            ledger,
            logs,
            source,
            evaluator: TriggerEvaluator::new(config.default_threshold),
            retention: config.retention,
            running: Mutex::new(()),
        }
    }

    /// Latest run outcome, if any run has finished.
    pub async fn status(&self) -> Result<Option<SchedulerStatus>, RadarError> {
        Ok(self.logs.status().await?)
    }

    /// Send a test message through the configured channel.
    pub async fn test_channel(&self, destination: &str) -> Result<(), NotifyError> {
        self.dispatcher.test_channel(destination).await
    }

    /// Perform one full run.
    ///
    /// Returns [`RadarError::AlreadyRunning`] if another run is in progress,
    /// [`RadarError::Cancelled`] if `cancel` fired (status untouched), or the
    /// rule-loading error (also written to status). Every other failure is
    /// journaled and counted in the summary.
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<RunSummary, RadarError> {
        let _running = self.running.try_lock().map_err(|_| RadarError::AlreadyRunning)?;

        if cancel.is_cancelled() {
            return self.cancelled().await;
        }

        let started_at = Utc::now();
        let clock = Instant::now();
        self.journal.record(JournalEvent::SchedulerStarted).await;

        let rules = match self.rules.list_active().await {
            Ok(rules) => rules,
            Err(e) => {
                let err = RadarError::from(e);
                let message = err.to_string();
                self.journal
                    .record(JournalEvent::RuleLoadFailed { error: message.clone() })
                    .await;
                self.write_status(started_at, &message).await;
                return Err(err);
            }
        };
        self.journal
            .record(JournalEvent::RulesLoaded { count: rules.len() })
            .await;

        let mut summary = RunSummary::default();
        for rule in &rules {
            if !rule.is_schedulable() {
                summary.rules_skipped += 1;
                self.journal
                    .record(JournalEvent::RuleSkipped {
                        rule_id: rule.id,
                        rule_name: rule.name.clone(),
                        reason: if rule.keywords.is_empty() {
                            "no keywords configured".to_string()
                        } else {
                            "rule is inactive".to_string()
                        },
                    })
                    .await;
                continue;
            }

            if self.process_rule(rule, cancel, &mut summary).await.is_break() {
                return self.cancelled().await;
            }
        }

        if cancel.is_cancelled() {
            return self.cancelled().await;
        }
        self.cleanup().await;

        if cancel.is_cancelled() {
            return self.cancelled().await;
        }
        self.write_status(Utc::now(), "").await;
        self.journal
            .record(JournalEvent::SchedulerCompleted {
                duration_ms: clock.elapsed().as_millis() as u64,
                notifications: summary.notifications_sent,
                failures: summary.failures(),
            })
            .await;
        Ok(summary)
    }

    /// Breaks only when the run was cancelled.
    async fn process_rule(
        &self,
        rule: &Rule,
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) -> ControlFlow<()> {
        summary.rules_processed += 1;
        self.journal
            .record(JournalEvent::RuleProcessing {
                rule_id: rule.id,
                rule_name: rule.name.clone(),
                keywords: rule.keywords.clone(),
            })
            .await;

        for keyword in &rule.keywords {
            if cancel.is_cancelled() {
                return ControlFlow::Break(());
            }

            self.journal
                .record(JournalEvent::FetchStarted {
                    rule_id: rule.id,
                    keyword: keyword.clone(),
                    location: rule.location.clone(),
                })
                .await;

            let snapshots = match self.source.fetch(keyword, &rule.location, cancel).await {
                Ok(snapshots) => snapshots,
                Err(RadarError::Cancelled) => return ControlFlow::Break(()),
                Err(e) => {
                    summary.fetch_failures += 1;
                    self.journal
                        .record(JournalEvent::FetchFailed {
                            rule_id: rule.id,
                            keyword: keyword.clone(),
                            error: e.to_string(),
                        })
                        .await;
                    continue;
                }
            };
            summary.fetches += 1;
            self.journal
                .record(JournalEvent::FetchCompleted {
                    rule_id: rule.id,
                    keyword: keyword.clone(),
                    location: rule.location.clone(),
                    events: snapshots.len(),
                })
                .await;

            for snapshot in &snapshots {
                if cancel.is_cancelled() {
                    return ControlFlow::Break(());
                }
                if self
                    .process_event(rule, keyword, snapshot, cancel, summary)
                    .await
                    .is_break()
                {
                    return ControlFlow::Break(());
                }
            }
        }
        ControlFlow::Continue(())
    }

    /// Breaks only when the run was cancelled.
    async fn process_event(
        &self,
        rule: &Rule,
        keyword: &str,
        snapshot: &EventSnapshot,
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) -> ControlFlow<()> {
        summary.events_seen += 1;

        let previous = match self.snapshots.swap(snapshot).await {
            Ok((previous, _id)) => previous,
            Err(e) => {
                summary.storage_failures += 1;
                self.journal
                    .record(JournalEvent::StorageFailed {
                        rule_id: rule.id,
                        event_id: snapshot.event_id,
                        keyword: keyword.to_string(),
                        error: e.to_string(),
                    })
                    .await;
                return ControlFlow::Continue(());
            }
        };

        let triggers = self
            .evaluator
            .evaluate(rule, snapshot, previous.as_ref(), Utc::now());
        if triggers.is_empty() {
            return ControlFlow::Continue(());
        }
        self.journal
            .record(JournalEvent::TriggerDetected {
                rule_id: rule.id,
                event_id: snapshot.event_id,
                triggers: triggers.clone(),
            })
            .await;

        for trigger in triggers {
            if cancel.is_cancelled() {
                return ControlFlow::Break(());
            }
            match self.dispatcher.notify(rule, snapshot, trigger, cancel).await {
                Ok(DispatchOutcome::Sent) => {
                    summary.notifications_sent += 1;
                    self.journal
                        .record(JournalEvent::NotificationSent {
                            rule_id: rule.id,
                            event_id: snapshot.event_id,
                            trigger,
                            channel_id: rule.channel_id.clone(),
                        })
                        .await;
                }
                Ok(DispatchOutcome::AlreadyNotified) => summary.already_notified += 1,
                Err(DispatchError::Cancelled) => return ControlFlow::Break(()),
                Err(DispatchError::Record(e)) => {
                    summary.notifications_sent += 1;
                    summary.record_failures += 1;
                    self.journal
                        .record(JournalEvent::LedgerRecordFailed {
                            rule_id: rule.id,
                            event_id: snapshot.event_id,
                            trigger,
                            error: e.to_string(),
                        })
                        .await;
                }
                Err(e) => {
                    summary.notification_failures += 1;
                    self.journal
                        .record(JournalEvent::NotificationFailed {
                            rule_id: rule.id,
                            event_id: snapshot.event_id,
                            trigger,
                            error: e.to_string(),
                        })
                        .await;
                }
            }
        }
        ControlFlow::Continue(())
    }

    async fn cleanup(&self) {
        let now = Utc::now();

        let snapshots = self.snapshots.cleanup(cutoff(now, self.retention.snapshots)).await;
        self.record_cleanup("snapshots", snapshots.map_err(RadarError::from)).await;

        let ledger = self.ledger.cleanup(cutoff(now, self.retention.ledger)).await;
        self.record_cleanup("notifications", ledger.map_err(RadarError::from)).await;

        let logs = self.logs.cleanup(cutoff(now, self.retention.logs)).await;
        self.record_cleanup("important logs", logs.map_err(RadarError::from)).await;
    }

    async fn record_cleanup(&self, target: &str, result: Result<u64, RadarError>) {
        let event = match result {
            Ok(removed) => JournalEvent::CleanupCompleted {
                target: target.to_string(),
                removed,
            },
            Err(e) => JournalEvent::CleanupFailed {
                target: target.to_string(),
                error: e.to_string(),
            },
        };
        self.journal.record(event).await;
    }

    async fn write_status(&self, last_run_at: DateTime<Utc>, last_error: &str) {
        if let Err(e) = self.logs.update_status(last_run_at, last_error).await {
            error!(error = %e, "Failed to update scheduler status");
        }
    }

    async fn cancelled(&self) -> Result<RunSummary, RadarError> {
        self.journal.record(JournalEvent::SchedulerCancelled).await;
        Err(RadarError::Cancelled)
    }

    /// Run on every `interval` tick, first tick immediately, until `cancel` fires.
    pub async fn run_periodic(&self, interval: Duration, cancel: &CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.run_once(cancel).await {
                Ok(summary) => info!(
                    notifications = summary.notifications_sent,
                    failures = summary.failures(),
                    "Scheduler run finished"
                ),
                Err(RadarError::Cancelled) => break,
                Err(RadarError::AlreadyRunning) => warn!("Previous run still in progress, skipping tick"),
                Err(e) => error!(error = %e, "Scheduler run failed"),
            }
        }
        info!("Scheduler loop stopped");
    }
}

/// `now - retention`, saturating at the earliest representable time.
fn cutoff(now: DateTime<Utc>, retention: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(retention)
        .ok()
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
