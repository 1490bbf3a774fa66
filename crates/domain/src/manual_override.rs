//! Manual override: time-bounded state superseding automation.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::id::RelayId;
use crate::time::Timestamp;

/// A user request to force a relay ON or OFF. Consumed once by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideCommand {
    pub relay_id: RelayId,
    pub desired_on: bool,
    pub issued_at: Timestamp,
}

impl OverrideCommand {
    #[must_use]
    pub fn new(relay_id: RelayId, desired_on: bool, issued_at: Timestamp) -> Self {
        Self {
            relay_id,
            desired_on,
            issued_at,
        }
    }
}

/// An override in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveOverride {
    pub desired_on: bool,
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
}

/// Whether a relay follows its automation or a manual override.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelayMode {
    #[default]
    Automatic,
    Override(ActiveOverride),
}

impl RelayMode {
    /// Enter override mode; a newer command replaces an active one.
    pub fn engage(&mut self, command: &OverrideCommand, timeout_secs: u32) -> ActiveOverride {
        let active = ActiveOverride {
            desired_on: command.desired_on,
            issued_at: command.issued_at,
            expires_at: command.issued_at + TimeDelta::seconds(i64::from(timeout_secs)),
        };
        *self = Self::Override(active);
        active
    }

    /// Return to automatic mode if the override has run out.
    ///
    /// Returns the override that just expired.
    pub fn expire_if_due(&mut self, now: Timestamp) -> Option<ActiveOverride> {
        match *self {
            Self::Override(active) if now >= active.expires_at => {
                *self = Self::Automatic;
                Some(active)
            }
            _ => None,
        }
    }

    /// Drop any override immediately.
    pub fn clear(&mut self) -> Option<ActiveOverride> {
        match std::mem::take(self) {
            Self::Override(active) => Some(active),
            Self::Automatic => None,
        }
    }

    /// Value forced by an active override.
    #[must_use]
    pub fn override_value(&self) -> Option<bool> {
        match self {
            Self::Override(active) => Some(active.desired_on),
            Self::Automatic => None,
        }
    }

    #[must_use]
    pub fn is_override(&self) -> bool {
        matches!(self, Self::Override(_))
    }
}
