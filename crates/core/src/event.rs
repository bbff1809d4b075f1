//! Event snapshots and notification ledger records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rule::TriggerKind;

/// The scheduler's view of one external event at one point in time.
///
/// Timestamps that could not be parsed from the upstream payload are `None`
/// and never satisfy a time-window trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSnapshot {
    /// Internal row id; 0 until the snapshot has been stored.
    pub id: i64,
    /// Stable identity of the event in the external API.
    pub event_id: i64,
    pub title: String,
    pub event_url: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub limit: i32,
    pub accepted: i32,
    pub waiting: i32,
    /// Upstream last-modified timestamp.
    pub updated_at: Option<DateTime<Utc>>,
    /// When this process fetched the snapshot.
    pub retrieved_at: DateTime<Utc>,
    pub owner_nickname: String,
    pub series_title: String,
    /// Content fingerprint over id, title, last-modified, accepted and limit.
    pub hash_digest: String,
}

impl EventSnapshot {
    /// Occupancy in whole percent, rounded half-up. `None` when there is no limit.
    pub fn occupancy_percent(&self) -> Option<i64> {
        if self.limit <= 0 {
            return None;
        }
        let accepted = i64::from(self.accepted.max(0));
        let limit = i64::from(self.limit);
        Some((accepted * 200 + limit) / (2 * limit))
    }
}

/// Identity of a single notification: at most one send per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerKey {
    pub rule_id: i64,
    pub event_id: i64,
    pub trigger: TriggerKind,
}

impl LedgerKey {
    pub fn new(rule_id: i64, event_id: i64, trigger: TriggerKind) -> Self {
        Self {
            rule_id,
            event_id,
            trigger,
        }
    }
}

/// A recorded notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub key: LedgerKey,
    pub sent_at: DateTime<Utc>,
}
