//! Event-polling and notification scheduling engine.
//!
//! A [`Scheduler`] run walks every active rule's keywords, fetches matching
//! events through a shared [`RateGate`], compares each snapshot against the
//! previous one, and sends at-most-once notifications for the triggers that
//! fire.

pub mod dispatcher;
pub mod evaluator;
pub mod fetcher;
pub mod gate;
pub mod journal;
pub mod runner;

pub use dispatcher::{DispatchError, DispatchOutcome, Dispatcher};
pub use evaluator::TriggerEvaluator;
pub use fetcher::{ConnpassClient, EventSource};
pub use gate::RateGate;
pub use journal::{Journal, JournalEvent};
pub use runner::{RunSummary, Scheduler};
