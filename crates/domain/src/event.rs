//! Event: an immutable record of something that happened.
//!
//! Events are produced by the automation engine when relays switch, driver
//! writes fail, sensor data goes stale or recovers, and overrides or
//! profiles are applied.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::{EventId, RelayId};
use crate::sensor::Quantity;
use crate::time::Timestamp;

/// Why a relay was switched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCause {
    /// A manual override is in effect.
    Override,
    /// Clamped OFF because a master is overridden OFF.
    Interlock,
    /// Master switched on behalf of its dependents.
    Dependency,
    Threshold(Quantity),
    /// Schedule window opened or closed.
    Schedule,
    Cycle,
    /// Mirrors a followed relay.
    Follow,
    /// Environmental input unavailable; failing safe OFF.
    SensorStale,
    /// Nothing requests the relay.
    Idle,
    Startup,
    Shutdown,
    /// Pulsed by a relay self-test.
    SelfTest,
    /// Released by a factory reset.
    FactoryReset,
}

impl fmt::Display for ChangeCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Override => f.write_str("override"),
            Self::Interlock => f.write_str("interlock"),
            Self::Dependency => f.write_str("dependency"),
            Self::Threshold(quantity) => write!(f, "threshold({quantity})"),
            Self::Schedule => f.write_str("schedule"),
            Self::Cycle => f.write_str("cycle"),
            Self::Follow => f.write_str("follow"),
            Self::SensorStale => f.write_str("sensor_stale"),
            Self::Idle => f.write_str("idle"),
            Self::Startup => f.write_str("startup"),
            Self::Shutdown => f.write_str("shutdown"),
            Self::SelfTest => f.write_str("self_test"),
            Self::FactoryReset => f.write_str("factory_reset"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayChanged {
    pub relay_id: RelayId,
    pub new_state: bool,
    pub cause: ChangeCause,
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    RelayChanged(RelayChanged),
    DriverWriteFailed {
        relay_id: RelayId,
        desired_on: bool,
        error: String,
    },
    /// Sensor data became unusable. Raised once per stale period.
    SensorStale { captured_at: Option<Timestamp> },
    SensorRecovered,
    OverrideEngaged {
        relay_id: RelayId,
        desired_on: bool,
        expires_at: Timestamp,
    },
    OverrideExpired { relay_id: RelayId },
    /// Override removed before it ran out.
    OverrideCleared { relay_id: RelayId },
    ProfileApplied,
    /// A relay self-test finished; `not_passed` lists failed and skipped relays.
    SelfTestCompleted { tested: usize, not_passed: Vec<RelayId> },
    /// Outputs released, overrides cleared and the default profile restored.
    FactoryReset,
}

impl EventKind {
    /// Relay the event is about, if any.
    #[must_use]
    pub fn relay_id(&self) -> Option<RelayId> {
        match self {
            Self::RelayChanged(RelayChanged { relay_id, .. })
            | Self::DriverWriteFailed { relay_id, .. }
            | Self::OverrideEngaged { relay_id, .. }
            | Self::OverrideExpired { relay_id }
            | Self::OverrideCleared { relay_id } => Some(*relay_id),
            Self::SensorStale { .. }
            | Self::SensorRecovered
            | Self::ProfileApplied
            | Self::SelfTestCompleted { .. }
            | Self::FactoryReset => None,
        }
    }
}

/// An immutable record of something that happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn new(kind: EventKind) -> Self {
        Self::at(kind, crate::time::now())
    }

    /// Create an event with an explicit timestamp.
    #[must_use]
    pub fn at(kind: EventKind, timestamp: Timestamp) -> Self {
        Self {
            id: EventId::new(),
            timestamp,
            kind,
        }
    }

    #[must_use]
    pub fn relay_changed(relay_id: RelayId, new_state: bool, cause: ChangeCause, at: Timestamp) -> Self {
        Self::at(
            EventKind::RelayChanged(RelayChanged {
                relay_id,
                new_state,
                cause,
            }),
            at,
        )
    }
}
