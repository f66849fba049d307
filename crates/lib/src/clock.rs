//! Time provider abstraction.
//!
//! [`write`](crate::ConfigStore::write) accepts an optional client-supplied
//! timestamp; when the client omits one the request handler must still
//! produce a wall-clock value. Routing that through a trait instead of
//! calling [`std::time::SystemTime`] directly keeps the last-writer-wins
//! tests deterministic.

use std::fmt::Debug;
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(any(test, feature = "testing"))]
use std::sync::Mutex;

/// A source of the current wall-clock time, in milliseconds since the
/// Unix epoch.
pub trait Clock: Send + Sync + Debug {
    fn now_millis(&self) -> i64;
}

/// Production clock backed by [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// A manually-advanced clock for deterministic tests of the stale-write
/// and tie-overwrite rules.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug)]
pub struct FixedClock {
    millis: Mutex<i64>,
}

#[cfg(any(test, feature = "testing"))]
impl FixedClock {
    pub fn new(millis: i64) -> Self {
        Self {
            millis: Mutex::new(millis),
        }
    }

    pub fn set(&self, millis: i64) {
        *self.millis.lock().unwrap() = millis;
    }

    pub fn advance(&self, delta_ms: i64) {
        *self.millis.lock().unwrap() += delta_ms;
    }
}

#[cfg(any(test, feature = "testing"))]
impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        *self.millis.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_reports_set_value_until_advanced() {
        let clock = FixedClock::new(100);
        assert_eq!(clock.now_millis(), 100);
        clock.advance(5);
        assert_eq!(clock.now_millis(), 105);
        clock.set(0);
        assert_eq!(clock.now_millis(), 0);
    }
}
