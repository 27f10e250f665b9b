//! Rate limiting for partial-load notifications.
//!
//! The first offer after a quiet period emits immediately. Offers inside the
//! interval are coalesced into one pending emission that becomes due when the
//! interval since the last emission elapses.

use std::time::Duration;

use tokio::time::Instant;

/// Roughly one rendering tick.
pub const DEFAULT_PARTIAL_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last_emit: Option<Instant>,
    pending: bool,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
            pending: false,
        }
    }

    /// Record new data at `now`; returns `true` when it should be emitted now.
    pub fn offer(&mut self, now: Instant) -> bool {
        match self.last_emit {
            Some(last) if now.saturating_duration_since(last) < self.interval => {
                self.pending = true;
                false
            }
            _ => {
                self.last_emit = Some(now);
                self.pending = false;
                true
            }
        }
    }

    /// When the pending emission is due, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        if !self.pending {
            return None;
        }
        self.last_emit.map(|last| last + self.interval)
    }

    /// Take the pending emission if it is due at `now`.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline() {
            Some(due) if due <= now => {
                self.last_emit = Some(now);
                self.pending = false;
                true
            }
            _ => false,
        }
    }

    /// Drop any pending emission.
    pub fn cancel(&mut self) {
        self.pending = false;
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(DEFAULT_PARTIAL_INTERVAL)
    }
}
