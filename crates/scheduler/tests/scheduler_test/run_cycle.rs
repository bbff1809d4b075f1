use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use radar_core::{LogLevel, RadarError, TriggerKind};
use radar_storage::MemoryStore;

use crate::helpers::*;

#[tokio::test]
async fn open_fires_once_across_runs() {
    let store = Arc::new(MemoryStore::with_rules(vec![make_rule(1, &["rust"], vec![TriggerKind::Open])]));
    let source = Arc::new(FakeSource::new());
    source.set_events("rust", vec![make_event(100, 5, 50)]);
    let notifier = Arc::new(FakeNotifier::new());
    let scheduler = build_scheduler(store.clone(), source.clone(), notifier.clone());
    let cancel = CancellationToken::new();

    let first = scheduler.run_once(&cancel).await.unwrap();
    let second = scheduler.run_once(&cancel).await.unwrap();

    assert_eq!(first.notifications_sent, 1);
    assert_eq!(second.notifications_sent, 0);
    assert_eq!(notifier.sent_count(), 1);
    assert_eq!(store.ledger_entries().len(), 1);
    assert_eq!(source.call_count(), 2);

    let (destination, notification) = notifier.sent.lock().unwrap()[0].clone();
    assert_eq!(destination, "channel-1");
    assert!(notification.subject.contains("Event 100"));
    assert_eq!(notification.metadata.get("trigger").map(String::as_str), Some("open"));

    let status = scheduler.status().await.unwrap().unwrap();
    assert!(status.is_healthy());
}

#[tokio::test]
async fn almost_full_fires_when_threshold_is_crossed() {
    let store = Arc::new(MemoryStore::with_rules(vec![make_rule(
        1,
        &["rust"],
        vec![TriggerKind::AlmostFull],
    )]));
    let source = Arc::new(FakeSource::new());
    let notifier = Arc::new(FakeNotifier::new());
    let scheduler = build_scheduler(store.clone(), source.clone(), notifier.clone());
    let cancel = CancellationToken::new();

    source.set_events("rust", vec![make_event(7, 50, 100)]);
    scheduler.run_once(&cancel).await.unwrap();
    assert_eq!(notifier.sent_count(), 0);

    source.set_events("rust", vec![make_event(7, 85, 100)]);
    let summary = scheduler.run_once(&cancel).await.unwrap();
    assert_eq!(summary.notifications_sent, 1);

    // Still above the threshold: the ledger suppresses a repeat.
    let summary = scheduler.run_once(&cancel).await.unwrap();
    assert_eq!(summary.notifications_sent, 0);
    assert_eq!(summary.already_notified, 1);
    assert_eq!(notifier.sent_count(), 1);
}

#[tokio::test]
async fn failed_send_is_retried_on_next_run() {
    let store = Arc::new(MemoryStore::with_rules(vec![make_rule(
        1,
        &["rust"],
        vec![TriggerKind::AlmostFull],
    )]));
    let source = Arc::new(FakeSource::new());
    source.set_events("rust", vec![make_event(7, 90, 100)]);
    let notifier = Arc::new(FakeNotifier::new());
    let scheduler = build_scheduler(store.clone(), source, notifier.clone());
    let cancel = CancellationToken::new();

    notifier.set_failing(true);
    let summary = scheduler.run_once(&cancel).await.unwrap();
    assert_eq!(summary.notification_failures, 1);
    assert!(store.ledger_entries().is_empty());
    assert!(scheduler.status().await.unwrap().unwrap().is_healthy());

    notifier.set_failing(false);
    let summary = scheduler.run_once(&cancel).await.unwrap();
    assert_eq!(summary.notifications_sent, 1);
    assert_eq!(store.ledger_entries().len(), 1);
}

#[tokio::test]
async fn one_failing_keyword_does_not_stop_the_rule() {
    let store = Arc::new(MemoryStore::with_rules(vec![make_rule(
        1,
        &["rust", "go", "zig"],
        vec![TriggerKind::Open],
    )]));
    let source = Arc::new(FakeSource::new());
    source.set_events("rust", vec![make_event(1, 1, 10)]);
    source.set_failure("go", "connpass status 500: boom");
    source.set_events("zig", vec![make_event(3, 1, 10)]);
    let notifier = Arc::new(FakeNotifier::new());
    let scheduler = build_scheduler(store.clone(), source.clone(), notifier.clone());

    let summary = scheduler.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(source.call_count(), 3);
    assert_eq!(*source.keywords.lock().unwrap(), vec!["rust", "go", "zig"]);
    assert_eq!(summary.fetches, 2);
    assert_eq!(summary.fetch_failures, 1);
    assert_eq!(summary.notifications_sent, 2);

    let failed: Vec<_> = store
        .logs()
        .into_iter()
        .filter(|l| l.event_type == "fetch_failed")
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].level, LogLevel::Error);
    assert_eq!(failed[0].metadata["keyword"], "go");

    let status = store_status(&store).await;
    assert_eq!(status, "");
}

#[tokio::test]
async fn storage_failure_skips_only_that_event() {
    let store = Arc::new(FaultyStore {
        fail_event: Some(2),
        ..Default::default()
    });
    store.inner.set_rules(vec![make_rule(1, &["rust"], vec![TriggerKind::Open])]);
    let source = Arc::new(FakeSource::new());
    source.set_events(
        "rust",
        vec![make_event(1, 1, 10), make_event(2, 1, 10), make_event(3, 1, 10)],
    );
    let notifier = Arc::new(FakeNotifier::new());
    let scheduler = build_scheduler(store.clone(), source, notifier.clone());

    let summary = scheduler.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(summary.events_seen, 3);
    assert_eq!(summary.storage_failures, 1);
    assert_eq!(summary.notifications_sent, 2);
    assert!(store.inner.snapshot(2).is_none());
    assert!(log_types(&store.inner).contains(&"storage_failed".to_string()));
}

#[tokio::test]
async fn rule_load_failure_is_written_to_status() {
    let store = Arc::new(FaultyStore {
        fail_rules: true,
        ..Default::default()
    });
    let source = Arc::new(FakeSource::new());
    let scheduler = build_scheduler(store.clone(), source.clone(), Arc::new(FakeNotifier::new()));

    let err = scheduler.run_once(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, RadarError::Storage(_)));
    assert_eq!(source.call_count(), 0);
    let status = scheduler.status().await.unwrap().unwrap();
    assert!(!status.is_healthy());
    assert!(status.last_error.contains("injected rule failure"));
    assert!(log_types(&store.inner).contains(&"rule_load_failed".to_string()));
}

#[tokio::test]
async fn rules_without_keywords_are_skipped() {
    let store = Arc::new(MemoryStore::with_rules(vec![
        make_rule(1, &[], vec![TriggerKind::Open]),
        make_rule(2, &["rust"], vec![TriggerKind::Open]),
    ]));
    let source = Arc::new(FakeSource::new());
    let scheduler = build_scheduler(store.clone(), source.clone(), Arc::new(FakeNotifier::new()));

    let summary = scheduler.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(summary.rules_skipped, 1);
    assert_eq!(summary.rules_processed, 1);
    assert_eq!(source.call_count(), 1);
    let skipped = store
        .logs()
        .into_iter()
        .find(|l| l.event_type == "rule_skipped")
        .unwrap();
    assert_eq!(skipped.level, LogLevel::Warning);
    assert_eq!(skipped.metadata["rule_id"], 1);
}

#[tokio::test]
async fn cancelled_before_start_does_nothing() {
    let store = Arc::new(MemoryStore::with_rules(vec![make_rule(1, &["rust"], vec![TriggerKind::Open])]));
    let source = Arc::new(FakeSource::new());
    let scheduler = build_scheduler(store.clone(), source.clone(), Arc::new(FakeNotifier::new()));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = scheduler.run_once(&cancel).await.unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(source.call_count(), 0);
    assert!(scheduler.status().await.unwrap().is_none());
    assert_eq!(log_types(&store), vec!["scheduler_cancelled"]);
}

#[tokio::test]
async fn cancellation_stops_at_the_next_keyword() {
    let store = Arc::new(MemoryStore::with_rules(vec![make_rule(
        1,
        &["rust", "go", "zig"],
        vec![TriggerKind::Open],
    )]));
    let source = Arc::new(FakeSource {
        cancel_on_call: Some(1),
        ..Default::default()
    });
    let scheduler = build_scheduler(store.clone(), source.clone(), Arc::new(FakeNotifier::new()));

    let err = scheduler.run_once(&CancellationToken::new()).await.unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(source.call_count(), 1);
    assert!(scheduler.status().await.unwrap().is_none());
    assert!(log_types(&store).contains(&"scheduler_cancelled".to_string()));
    assert!(!log_types(&store).contains(&"scheduler_completed".to_string()));
}

#[tokio::test]
async fn cancellation_during_the_last_fetch_sends_nothing() {
    let store = Arc::new(MemoryStore::with_rules(vec![make_rule(1, &["rust"], vec![TriggerKind::Open])]));
    let source = Arc::new(FakeSource {
        cancel_on_call: Some(1),
        ..Default::default()
    });
    source.set_events("rust", (1..=5).map(|id| make_event(id, 1, 10)).collect());
    let notifier = Arc::new(FakeNotifier::new());
    let scheduler = build_scheduler(store.clone(), source.clone(), notifier.clone());

    let err = scheduler.run_once(&CancellationToken::new()).await.unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(source.call_count(), 1);
    assert_eq!(notifier.sent_count(), 0);
    assert!(store.ledger_entries().is_empty());
    assert_eq!(store.snapshot_count(), 0);
    assert!(scheduler.status().await.unwrap().is_none());
    let types = log_types(&store);
    assert!(types.contains(&"scheduler_cancelled".to_string()));
    assert!(!types.contains(&"cleanup_completed".to_string()));
    assert!(!types.contains(&"scheduler_completed".to_string()));
}

#[tokio::test(start_paused = true)]
async fn overlapping_run_is_rejected() {
    let store = Arc::new(MemoryStore::with_rules(vec![make_rule(1, &["rust"], vec![TriggerKind::Open])]));
    let source = Arc::new(FakeSource {
        delay: Some(Duration::from_secs(10)),
        ..Default::default()
    });
    let scheduler = Arc::new(build_scheduler(store, source, Arc::new(FakeNotifier::new())));
    let cancel = CancellationToken::new();

    let first = {
        let scheduler = Arc::clone(&scheduler);
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run_once(&cancel).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;

    let err = scheduler.run_once(&cancel).await.unwrap_err();
    assert!(matches!(err, RadarError::AlreadyRunning));

    assert!(first.await.unwrap().is_ok());
    assert!(scheduler.run_once(&cancel).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn periodic_loop_exits_on_cancel() {
    let store = Arc::new(MemoryStore::with_rules(vec![make_rule(1, &["rust"], vec![TriggerKind::Open])]));
    let source = Arc::new(FakeSource::new());
    let scheduler = Arc::new(build_scheduler(store, source.clone(), Arc::new(FakeNotifier::new())));
    let cancel = CancellationToken::new();

    let handle = {
        let scheduler = Arc::clone(&scheduler);
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run_periodic(Duration::from_secs(60), &cancel).await })
    };

    tokio::time::sleep(Duration::from_secs(150)).await;
    cancel.cancel();
    handle.await.unwrap();

    // Ticks at 0s, 60s and 120s.
    assert_eq!(source.call_count(), 3);
}

async fn store_status(store: &MemoryStore) -> String {
    use radar_storage::LogStore;
    store.status().await.unwrap().unwrap().last_error
}
