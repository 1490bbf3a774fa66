//! Time and timestamp helpers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// UTC timestamp used for sensor captures, override expiry, events, etc.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Minute-resolution wall-clock time of day, written `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub const MIDNIGHT: Self = Self { hour: 0, minute: 0 };
    pub const LAST_MINUTE: Self = Self {
        hour: 23,
        minute: 59,
    };

    /// Build from hour and minute.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTimeOfDay`] if either part is out of range.
    pub fn new(hour: u8, minute: u8) -> Result<Self, ValidationError> {
        if hour < 24 && minute < 60 {
            Ok(Self { hour, minute })
        } else {
            Err(ValidationError::InvalidTimeOfDay(format!(
                "{hour:02}:{minute:02}"
            )))
        }
    }

    /// Build from literal parts known to be in range.
    pub(crate) const fn hm(hour: u8, minute: u8) -> Self {
        debug_assert!(hour < 24 && minute < 60);
        Self { hour, minute }
    }

    /// Truncate a wall-clock time to the minute.
    #[must_use]
    pub fn from_naive(time: NaiveTime) -> Self {
        // hour() < 24 and minute() < 60, so both fit in a u8.
        Self {
            hour: u8::try_from(time.hour()).unwrap_or(0),
            minute: u8::try_from(time.minute()).unwrap_or(0),
        }
    }

    #[must_use]
    pub fn hour(self) -> u8 {
        self.hour
    }

    #[must_use]
    pub fn minute(self) -> u8 {
        self.minute
    }

    /// Minutes elapsed since midnight.
    #[must_use]
    pub fn minutes_since_midnight(self) -> u16 {
        u16::from(self.hour) * 60 + u16::from(self.minute)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidTimeOfDay(s.to_string());
        let (h, m) = s.split_once(':').ok_or_else(invalid)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(invalid());
        }
        let hour: u8 = h.parse().map_err(|_| invalid())?;
        let minute: u8 = m.parse().map_err(|_| invalid())?;
        Self::new(hour, minute).map_err(|_| invalid())
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> Self {
        t.to_string()
    }
}
