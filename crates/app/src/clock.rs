//! [`Clock`] implementations.

use std::sync::Mutex;

use chrono::{Local, NaiveDateTime, TimeDelta, Utc};

use sporehub_domain::time::Timestamp;

use crate::ports::Clock;

/// Wall clock of the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }

    fn local_now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock that only moves when told to. Local time is the UTC time.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: Timestamp) {
        *self.lock() = at;
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.lock();
        *now += by;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Timestamp> {
        // A poisoned lock still holds a valid timestamp.
        self.now
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.lock()
    }

    fn local_now(&self) -> NaiveDateTime {
        self.lock().naive_utc()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Weekday};

    use super::*;

    #[test]
    fn should_advance_manual_clock() {
        let start = Utc.with_ymd_and_hms(2026, 6, 1, 23, 59, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(TimeDelta::minutes(2));
        assert_eq!(clock.now(), start + TimeDelta::minutes(2));
        assert_eq!(clock.local_now().to_string(), "2026-06-02 00:01:00");
    }

    #[test]
    fn should_derive_weekday_from_local_time() {
        // 2026-06-01 is a Monday.
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap());
        assert_eq!(clock.weekday(), Weekday::Mon);
    }

    #[test]
    fn should_report_increasing_system_time() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
