//! Subscription rules and the closed set of trigger kinds they can enable.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Condition under which a rule sends a notification for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// First sighting of an external event id.
    Open,
    /// Event start is imminent.
    Start,
    /// Accepted/limit ratio crossed the capacity threshold.
    AlmostFull,
    /// One hour before the event ends.
    BeforeDeadline,
}

impl TriggerKind {
    pub const ALL: [TriggerKind; 4] = [
        TriggerKind::Open,
        TriggerKind::Start,
        TriggerKind::AlmostFull,
        TriggerKind::BeforeDeadline,
    ];

    /// Stable wire/storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Open => "open",
            TriggerKind::Start => "start",
            TriggerKind::AlmostFull => "almost_full",
            TriggerKind::BeforeDeadline => "before_deadline",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored trigger name is not one of the known kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTriggerKind(pub String);

impl fmt::Display for UnknownTriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown trigger kind '{}'", self.0)
    }
}

impl std::error::Error for UnknownTriggerKind {}

impl FromStr for TriggerKind {
    type Err = UnknownTriggerKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "open" => Ok(TriggerKind::Open),
            "start" => Ok(TriggerKind::Start),
            "almost_full" => Ok(TriggerKind::AlmostFull),
            "before_deadline" => Ok(TriggerKind::BeforeDeadline),
            other => Err(UnknownTriggerKind(other.to_string())),
        }
    }
}

/// A user-owned subscription, read-only to the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: i64,
    pub user_id: i64,
    pub guild_id: String,
    /// Messaging destination the notifications are sent to.
    pub channel_id: String,
    pub channel_name: String,
    pub name: String,
    pub description: String,
    /// Search keywords, in stored order.
    pub keywords: Vec<String>,
    /// Optional address filter; empty means no filter.
    pub location: String,
    pub triggers: Vec<TriggerKind>,
    /// Capacity percentage for `almost_full`; 0 means "use the default".
    pub capacity_threshold: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    pub fn has_trigger(&self, kind: TriggerKind) -> bool {
        self.triggers.contains(&kind)
    }

    /// Threshold to compare against, falling back to the process default.
    pub fn effective_threshold(&self, default_threshold: i32) -> i32 {
        if self.capacity_threshold == 0 {
            default_threshold
        } else {
            self.capacity_threshold
        }
    }

    /// Whether the scheduler should consider this rule at all.
    pub fn is_schedulable(&self) -> bool {
        self.is_active && !self.keywords.is_empty()
    }
}
