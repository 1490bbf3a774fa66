//! Typed identifiers: relays, sensors, and events.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Stable identifier of a relay, `1..=8`, fixed at configuration time.
///
/// Displayed as `relay<N>`. Parsing accepts either `relay<N>` or `<N>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct RelayId(u8);

impl RelayId {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 8;

    /// Validate and wrap a relay number.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidRelayId`] when `n` is outside `1..=8`.
    pub fn new(n: u8) -> Result<Self, ValidationError> {
        if (Self::MIN..=Self::MAX).contains(&n) {
            Ok(Self(n))
        } else {
            Err(ValidationError::InvalidRelayId(n))
        }
    }

    /// Wrap a relay number known to be in range, such as a literal from the
    /// built-in board layout.
    pub(crate) const fn known(n: u8) -> Self {
        debug_assert!(n >= Self::MIN && n <= Self::MAX);
        Self(n)
    }

    /// The relay number.
    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }

    /// Every valid relay id in ascending order.
    pub fn all() -> impl Iterator<Item = Self> {
        (Self::MIN..=Self::MAX).map(Self)
    }
}

impl TryFrom<u8> for RelayId {
    type Error = ValidationError;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Self::new(n)
    }
}

impl From<RelayId> for u8 {
    fn from(id: RelayId) -> Self {
        id.0
    }
}

impl fmt::Display for RelayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "relay{}", self.0)
    }
}

impl FromStr for RelayId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("relay").unwrap_or(s);
        let n: u8 = digits
            .parse()
            .map_err(|_| ValidationError::MalformedRelayId(s.to_string()))?;
        Self::new(n)
    }
}

/// One of the three physical sensors feeding the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorId {
    /// Temperature/humidity probe near the top of the enclosure.
    UpperDht,
    /// Temperature/humidity probe near the floor.
    LowerDht,
    /// CO2 sensor, also reporting temperature and humidity.
    Scd40,
}

impl SensorId {
    pub const ALL: [Self; 3] = [Self::UpperDht, Self::LowerDht, Self::Scd40];
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpperDht => f.write_str("upper_dht"),
            Self::LowerDht => f.write_str("lower_dht"),
            Self::Scd40 => f.write_str("scd40"),
        }
    }
}

/// Unique identifier for an [`Event`](crate::event::Event).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(uuid::Uuid);

impl Default for EventId {
    fn default() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl EventId {
    /// Generate a new random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
