//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`SporeHubError`] via `#[from]` (domain) or an explicit `From` impl
//! (adapters, which box their source).

use crate::id::{RelayId, SensorId};

/// Boxed source error produced by an adapter.
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error shared by every crate in the workspace.
#[derive(Debug, thiserror::Error)]
pub enum SporeHubError {
    #[error("validation error")]
    Validation(#[from] ValidationError),

    #[error("not found")]
    NotFound(#[from] NotFoundError),

    #[error("invalid relay configuration")]
    Configuration(#[from] ConfigurationError),

    /// A relay output could not be written.
    #[error("relay driver error")]
    Driver(#[source] BoxedSource),

    /// A sensor could not be read.
    #[error("sensor error")]
    Sensor(#[source] BoxedSource),

    /// The engine runtime has stopped and no longer accepts commands.
    #[error("automation engine is not running")]
    EngineStopped,
}

/// A value or command was rejected. No state was changed.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("relay id {0} is outside 1..=8")]
    InvalidRelayId(u8),

    #[error("invalid relay id `{0}`")]
    MalformedRelayId(String),

    #[error("invalid time of day `{0}`, expected HH:MM")]
    InvalidTimeOfDay(String),

    #[error("{quantity} thresholds must be finite")]
    NonFiniteThreshold { quantity: &'static str },

    #[error("{quantity} low threshold {low} must be below high threshold {high}")]
    ThresholdOrder {
        quantity: &'static str,
        low: f64,
        high: f64,
    },

    #[error("co2 tub fan threshold {0} must be positive")]
    TubFanThreshold(f64),

    #[error("{cycle} cycle needs 0 < on ({on_minutes}) < interval ({interval_minutes}) minutes")]
    CycleDuration {
        cycle: &'static str,
        on_minutes: u32,
        interval_minutes: u32,
    },

    #[error("reading from {sensor} rejected: {reason}")]
    InvalidReading {
        sensor: SensorId,
        reason: &'static str,
    },

    #[error("unknown profile preset `{0}`")]
    UnknownPreset(String),

    #[error("malformed profile document")]
    MalformedProfile(#[source] serde_json::Error),
}

/// A referenced item does not exist.
#[derive(Debug, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

impl NotFoundError {
    /// Shorthand for a missing relay.
    #[must_use]
    pub fn relay(id: RelayId) -> Self {
        Self {
            entity: "Relay",
            id: id.to_string(),
        }
    }
}

/// The relay set violates a structural invariant. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("no relays are defined")]
    EmptyRelaySet,

    #[error("{0} is defined more than once")]
    DuplicateRelay(RelayId),

    #[error("output channel {channel} is used by both {first} and {second}")]
    DuplicateChannel {
        channel: u8,
        first: RelayId,
        second: RelayId,
    },

    #[error("{0} depends on itself")]
    SelfDependency(RelayId),

    #[error("{relay} depends on undefined {depends_on}")]
    UnknownDependency { relay: RelayId, depends_on: RelayId },

    #[error("dependency cycle through {}", format_cycle(.0))]
    CyclicDependency(Vec<RelayId>),

    #[error("{relay} depends on {master}, which itself has dependencies")]
    ChainedDependency { relay: RelayId, master: RelayId },

    #[error("{relay} is depended upon but does not have the master role")]
    NotMaster { relay: RelayId },

    #[error("master {0} must not depend on other relays")]
    MasterWithDependencies(RelayId),

    #[error("{relay} pairs with {partner}, which does not pair back")]
    PartnerMismatch { relay: RelayId, partner: RelayId },

    #[error("{relay} follows {target}, which is not a latch relay")]
    InvalidFollowTarget { relay: RelayId, target: RelayId },
}

fn format_cycle(cycle: &[RelayId]) -> String {
    cycle
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_convert_validation_error_into_top_level_error() {
        let err: SporeHubError = ValidationError::EmptyName.into();
        assert!(matches!(
            err,
            SporeHubError::Validation(ValidationError::EmptyName)
        ));
    }

    #[test]
    fn should_display_not_found_relay() {
        let relay = RelayId::new(3).unwrap();
        assert_eq!(NotFoundError::relay(relay).to_string(), "Relay relay3 not found");
    }

    #[test]
    fn should_display_dependency_cycle_path() {
        let a = RelayId::new(2).unwrap();
        let b = RelayId::new(4).unwrap();
        let err = ConfigurationError::CyclicDependency(vec![a, b, a]);
        assert_eq!(
            err.to_string(),
            "dependency cycle through relay2 -> relay4 -> relay2"
        );
    }

    #[test]
    fn should_describe_threshold_order_violation() {
        let err = ValidationError::ThresholdOrder {
            quantity: "humidity",
            low: 85.0,
            high: 50.0,
        };
        assert_eq!(
            err.to_string(),
            "humidity low threshold 85 must be below high threshold 50"
        );
    }
}
