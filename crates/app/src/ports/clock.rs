//! Clock port: lets the engine run against real or simulated time.

use chrono::{Datelike, NaiveDateTime, Weekday};

use sporehub_domain::time::Timestamp;

pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Timestamp;

    /// Current wall-clock time in the enclosure's time zone. Schedule
    /// windows are evaluated against this.
    fn local_now(&self) -> NaiveDateTime;

    fn weekday(&self) -> Weekday {
        self.local_now().weekday()
    }
}

impl<T: Clock + ?Sized> Clock for std::sync::Arc<T> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }

    fn local_now(&self) -> NaiveDateTime {
        (**self).local_now()
    }
}
