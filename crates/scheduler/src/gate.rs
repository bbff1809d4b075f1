//! Process-wide minimum-interval gate for outbound events API calls.
//!
//! One [`RateGate`] is shared by every caller that talks to the events API.
//! A caller holds the returned [`GatePermit`] for the whole outbound call;
//! the gate's clock starts when the permit is dropped, i.e. when the call
//! has returned.

use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use radar_core::RadarError;

pub struct RateGate {
    interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

/// Exclusive right to issue one outbound call.
pub struct GatePermit<'a> {
    last_call: MutexGuard<'a, Option<Instant>>,
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        *self.last_call = Some(Instant::now());
    }
}

impl RateGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_call: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until no other call is in flight and `interval` has passed since
    /// the previous call returned.
    ///
    /// Returns [`RadarError::Cancelled`] as soon as `cancel` fires, including
    /// when it has already fired before the call.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<GatePermit<'_>, RadarError> {
        let guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RadarError::Cancelled),
            guard = self.last_call.lock() => guard,
        };

        if let Some(last) = *guard {
            let ready_at = last + self.interval;
            if ready_at > Instant::now() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(RadarError::Cancelled),
                    _ = tokio::time::sleep_until(ready_at) => {}
                }
            }
        }

        Ok(GatePermit { last_call: guard })
    }
}
