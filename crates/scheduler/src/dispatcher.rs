//! At-most-once notification dispatch.
//!
//! Per (rule, event, trigger): ledger check, render, send, then record.
//! The ledger entry is written only after the channel accepted the message,
//! so a failed send is retried by a later run. Concurrent calls for the same
//! key are serialized in-process; the storage uniqueness constraint covers
//! everything else. A cancelled send is abandoned and never recorded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use radar_core::{EventSnapshot, LedgerKey, RadarError, Rule, TriggerKind};
use radar_notify::{Notifier, NotifyError, TemplateContext, TemplateRenderer};
use radar_storage::{NotificationLedger, StorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    /// The ledger already held this key; nothing was sent.
    AlreadyNotified,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("ledger lookup failed: {0}")]
    Lookup(#[source] StorageError),

    #[error("message rendering failed: {0}")]
    Render(#[source] NotifyError),

    #[error("send failed: {0}")]
    Send(#[source] NotifyError),

    /// The message went out but the ledger write failed; the next run may
    /// send it again.
    #[error("sent but not recorded: {0}")]
    Record(#[source] StorageError),

    #[error("cancelled")]
    Cancelled,
}

impl From<DispatchError> for RadarError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Lookup(s) | DispatchError::Record(s) => s.into(),
            DispatchError::Render(n) | DispatchError::Send(n) => n.into(),
            DispatchError::Cancelled => RadarError::Cancelled,
        }
    }
}

type KeyLock = Arc<tokio::sync::Mutex<()>>;

/// A dispatcher's lock for one key; the map entry is released on drop, even
/// when the owning future is dropped while waiting.
struct KeyLockHandle<'a> {
    dispatcher: &'a Dispatcher,
    key: LedgerKey,
    lock: KeyLock,
}

impl Drop for KeyLockHandle<'_> {
    fn drop(&mut self) {
        self.dispatcher.release(self.key, &self.lock);
    }
}

pub struct Dispatcher {
    ledger: Arc<dyn NotificationLedger>,
    notifier: Arc<dyn Notifier>,
    renderer: TemplateRenderer,
    key_locks: Mutex<HashMap<LedgerKey, KeyLock>>,
}

impl Dispatcher {
    pub fn new(ledger: Arc<dyn NotificationLedger>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            ledger,
            notifier,
            renderer: TemplateRenderer::new(),
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Send the channel's fixed test message to `destination`. Bypasses the ledger.
    pub async fn test_channel(&self, destination: &str) -> Result<(), NotifyError> {
        self.notifier.test(destination).await
    }

    /// Send the notification for `trigger` unless the ledger already has it.
    ///
    /// Returns [`DispatchError::Cancelled`] if `cancel` fires before the
    /// channel accepted the message; nothing is recorded then.
    pub async fn notify(
        &self,
        rule: &Rule,
        snapshot: &EventSnapshot,
        trigger: TriggerKind,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome, DispatchError> {
        let key = LedgerKey::new(rule.id, snapshot.event_id, trigger);
        let handle = self.lock_for(key);
        let _held = handle.lock.lock().await;
        self.notify_locked(key, rule, snapshot, trigger, cancel).await
    }

    async fn notify_locked(
        &self,
        key: LedgerKey,
        rule: &Rule,
        snapshot: &EventSnapshot,
        trigger: TriggerKind,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome, DispatchError> {
        if cancel.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }
        if self.ledger.exists(&key).await.map_err(DispatchError::Lookup)? {
            debug!(rule_id = key.rule_id, event_id = key.event_id, %trigger, "Already notified");
            return Ok(DispatchOutcome::AlreadyNotified);
        }

        let ctx = TemplateContext::new(rule, snapshot, trigger, Utc::now());
        let notification = self.renderer.render_event(&ctx).map_err(DispatchError::Render)?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DispatchError::Cancelled),
            sent = self.notifier.send(&rule.channel_id, &notification) => {
                sent.map_err(DispatchError::Send)?;
            }
        }

        // A concurrent writer outside this process may have recorded it first;
        // either way the key is now in the ledger.
        self.ledger.record(&key).await.map_err(DispatchError::Record)?;
        Ok(DispatchOutcome::Sent)
    }

    fn lock_for(&self, key: LedgerKey) -> KeyLockHandle<'_> {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        KeyLockHandle {
            dispatcher: self,
            key,
            lock: Arc::clone(locks.entry(key).or_default()),
        }
    }

    fn release(&self, key: LedgerKey, key_lock: &KeyLock) {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map plus ours: nobody else is waiting.
        if Arc::strong_count(key_lock) <= 2 {
            locks.remove(&key);
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.key_locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
