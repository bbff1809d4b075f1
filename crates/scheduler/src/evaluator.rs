//! Pure trigger evaluation: which of a rule's trigger kinds fire for a snapshot.

use chrono::{DateTime, Duration, Utc};

use radar_core::{EventSnapshot, Rule, TriggerKind};

/// Half-width of the `start` and `before_deadline` windows.
pub fn time_window() -> Duration {
    Duration::minutes(30)
}

/// How long before the event end `before_deadline` is centred.
pub fn deadline_lead() -> Duration {
    Duration::hours(1)
}

#[derive(Debug, Clone, Copy)]
pub struct TriggerEvaluator {
    default_threshold: i32,
}

impl TriggerEvaluator {
    /// `default_threshold` applies to rules whose own threshold is 0.
    pub fn new(default_threshold: i32) -> Self {
        Self { default_threshold }
    }

    /// Trigger kinds that fire now, in [`TriggerKind::ALL`] order.
    ///
    /// Only kinds enabled on `rule` are considered; each is evaluated
    /// independently, so one snapshot may fire several.
    pub fn evaluate(
        &self,
        rule: &Rule,
        new: &EventSnapshot,
        previous: Option<&EventSnapshot>,
        now: DateTime<Utc>,
    ) -> Vec<TriggerKind> {
        TriggerKind::ALL
            .into_iter()
            .filter(|kind| rule.has_trigger(*kind))
            .filter(|kind| match kind {
                TriggerKind::Open => previous.is_none(),
                TriggerKind::Start => within_window(new.started_at, now),
                TriggerKind::AlmostFull => new
                    .occupancy_percent()
                    .is_some_and(|pct| pct >= i64::from(rule.effective_threshold(self.default_threshold))),
                TriggerKind::BeforeDeadline => {
                    within_window(new.ended_at.map(|end| end - deadline_lead()), now)
                }
            })
            .collect()
    }
}

/// Strictly inside `(now - window, now + window)`. Unset targets never match.
fn within_window(target: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match target {
        Some(t) => t > now - time_window() && t < now + time_window(),
        None => false,
    }
}
