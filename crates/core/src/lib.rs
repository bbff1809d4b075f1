//! Shared domain model, configuration, and error taxonomy for the event radar.

pub mod config;
pub mod duration;
pub mod error;
pub mod event;
pub mod rule;
pub mod status;

pub use config::Config;
pub use error::*;
pub use event::{EventSnapshot, LedgerEntry, LedgerKey};
pub use rule::{Rule, TriggerKind};
pub use status::{ImportantLog, LogLevel, NewImportantLog, SchedulerStatus};
