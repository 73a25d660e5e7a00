// Time source abstraction
// Every "now" in resolution and scheduling comes through a Clock

use chrono::{DateTime, Duration, FixedOffset, Utc};
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    /// Current instant, expressed in the configured offset basis.
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Wall clock pinned to the configured UTC offset.
///
/// The machine's local zone is never consulted: the offset sent to the API
/// and the offset used here are the same value.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}

/// Clock that only moves when told to. Used for `--at` lookups and tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl ManualClock {
    pub fn new(start: DateTime<FixedOffset>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, to: DateTime<FixedOffset>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
