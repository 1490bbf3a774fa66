//! Schedule window: "is this time of day inside the window?".
//!
//! Bounds are inclusive and minute-resolution. A window whose start is
//! after its end wraps midnight; one whose start equals its end is open for
//! that single minute.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::time::TimeOfDay;

/// Daily window during which a relay is eligible to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleWindow {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl ScheduleWindow {
    /// `00:00`–`23:59`: every minute of the day.
    pub const ALL_DAY: Self = Self {
        start: TimeOfDay::MIDNIGHT,
        end: TimeOfDay::LAST_MINUTE,
    };

    #[must_use]
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Self {
        Self { start, end }
    }

    /// Whether the window crosses midnight.
    #[must_use]
    pub fn wraps_midnight(&self) -> bool {
        self.start > self.end
    }

    #[must_use]
    pub fn contains(&self, now: TimeOfDay) -> bool {
        use std::cmp::Ordering;
        match self.start.cmp(&self.end) {
            Ordering::Less | Ordering::Equal => self.start <= now && now <= self.end,
            Ordering::Greater => now >= self.start || now <= self.end,
        }
    }
}

impl Default for ScheduleWindow {
    fn default() -> Self {
        Self::ALL_DAY
    }
}

impl fmt::Display for ScheduleWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}
