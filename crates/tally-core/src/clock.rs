//! Wall-clock source for the governor
//!
//! Quota windows are calendar-aligned in local time, so the governor never
//! calls `Local::now()` directly; it asks a [`Clock`]. Tests and simulations
//! swap in a [`ManualClock`] to cross month and day boundaries on demand.

use std::sync::Mutex;

use chrono::{Duration, Local, NaiveDateTime};

/// Source of "now" for window evaluation
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Jump to an absolute time
    pub fn set(&self, to: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }

    /// Move forward by `by`
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_manual_clock_set_and_advance() {
        let clock = ManualClock::new(at(2026, 1, 31));
        assert_eq!(clock.now(), at(2026, 1, 31));

        clock.advance(Duration::days(1));
        assert_eq!(clock.now(), at(2026, 2, 1));

        clock.set(at(2027, 6, 15));
        assert_eq!(clock.now(), at(2027, 6, 15));
    }

    #[test]
    fn test_system_clock_is_recent() {
        let now = SystemClock.now();
        let local = Local::now().naive_local();
        assert!((local - now).num_seconds().abs() < 5);
    }
}
