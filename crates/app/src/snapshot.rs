//! Read model published after every tick.

use chrono::{NaiveDateTime, Weekday};
use serde::Serialize;

use sporehub_domain::id::RelayId;
use sporehub_domain::profile::AutomationProfile;
use sporehub_domain::relay::{OutputChannel, RelayDefinition, RelayRole, RelayRuntimeState};
use sporehub_domain::sensor::SensorSnapshot;
use sporehub_domain::time::Timestamp;

/// Freshness of the sensor data the engine holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorStatus {
    /// No snapshot received yet.
    AwaitingData,
    Fresh,
    /// The held snapshot is older than the staleness limit.
    Stale,
}

/// One relay: definition summary plus runtime state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayView {
    pub id: RelayId,
    pub display_name: String,
    pub output_channel: OutputChannel,
    pub visible: bool,
    pub role: RelayRole,
    pub depends_on: Vec<RelayId>,
    pub state: RelayRuntimeState,
}

impl RelayView {
    #[must_use]
    pub fn new(definition: &RelayDefinition, state: RelayRuntimeState) -> Self {
        Self {
            id: definition.id,
            display_name: definition.display_name.clone(),
            output_channel: definition.output_channel,
            visible: definition.default_visible,
            role: definition.role,
            depends_on: definition.depends_on.iter().copied().collect(),
            state,
        }
    }
}

/// Immutable view of the engine, shared through a `watch` channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    pub taken_at: Timestamp,
    pub local_time: NaiveDateTime,
    pub weekday: Weekday,
    pub sensor_status: SensorStatus,
    pub sensors: Option<SensorSnapshot>,
    pub profile: AutomationProfile,
    pub relays: Vec<RelayView>,
}

impl EngineSnapshot {
    #[must_use]
    pub fn relay(&self, id: RelayId) -> Option<&RelayView> {
        self.relays.iter().find(|r| r.id == id)
    }

    /// Whether the relay output is currently energized.
    #[must_use]
    pub fn is_on(&self, id: RelayId) -> bool {
        self.relay(id).is_some_and(|r| r.state.physical_on)
    }
}
