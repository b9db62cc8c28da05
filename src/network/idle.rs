//! Activity tracking
//!
//! Last-activity timestamp shared between an endpoint's read loop (single
//! writer) and idle queries from any thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, SecondsFormat, Utc};

/// Atomic wall-clock stamp, stored as milliseconds since the Unix epoch
///
/// Updates use `fetch_max`, so the stamp never moves backwards even if the
/// system clock does.
#[derive(Debug)]
pub struct ActivityClock {
    last_ms: AtomicU64,
}

impl ActivityClock {
    /// Create a clock stamped with the current time
    pub fn new() -> Self {
        Self::starting_at(SystemTime::now())
    }

    /// Create a clock stamped with the given time
    pub fn starting_at(time: SystemTime) -> Self {
        Self {
            last_ms: AtomicU64::new(to_millis(time)),
        }
    }

    /// Record activity now
    pub fn touch(&self) {
        self.touch_at(SystemTime::now());
    }

    /// Record activity at the given time (ignored if older than the stamp)
    pub fn touch_at(&self, time: SystemTime) {
        self.last_ms.fetch_max(to_millis(time), Ordering::AcqRel);
    }

    /// Time of the last recorded activity
    pub fn last(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.last_ms.load(Ordering::Acquire))
    }

    /// How long the clock has been idle as of `now`
    pub fn idle_for(&self, now: SystemTime) -> Duration {
        now.duration_since(self.last()).unwrap_or(Duration::ZERO)
    }

    /// Check whether `threshold` has elapsed since the last activity
    pub fn is_idle_at(&self, now: SystemTime, threshold: Duration) -> bool {
        self.idle_for(now) >= threshold
    }

    /// Last activity as an RFC 3339 UTC timestamp
    pub fn format_last(&self) -> String {
        DateTime::<Utc>::from(self.last()).to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}

fn to_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
