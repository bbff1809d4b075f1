//! Persistence for rules, event snapshots, the notification ledger, and
//! operator-facing logs.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use error::StorageError;
pub use memory::MemoryStore;
pub use postgres::{connect_with_retry, migrate, PgStore};
pub use traits::{LogStore, NotificationLedger, RuleSource, SnapshotStore};
