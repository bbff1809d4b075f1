//! Scheduler status singleton and persisted important-log records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of the most recent scheduler run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub last_run_at: DateTime<Utc>,
    /// Empty string means the last run completed.
    pub last_error: String,
    pub updated_at: DateTime<Utc>,
}

impl SchedulerStatus {
    pub fn is_healthy(&self) -> bool {
        self.last_error.is_empty()
    }
}

/// Severity of an important-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INFO" => Some(LogLevel::Info),
            "WARNING" => Some(LogLevel::Warning),
            "ERROR" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted, operator-facing log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportantLog {
    pub id: i64,
    pub level: LogLevel,
    pub event_type: String,
    pub message: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// An important-log entry before it has been stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewImportantLog {
    pub level: LogLevel,
    pub event_type: String,
    pub message: String,
    pub metadata: serde_json::Value,
}
