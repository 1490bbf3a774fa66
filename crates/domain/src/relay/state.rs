use serde::{Deserialize, Serialize};

use crate::cycle::CyclePhase;
use crate::event::ChangeCause;
use crate::id::RelayId;
use crate::latch::LatchState;
use crate::manual_override::RelayMode;
use crate::sensor::Quantity;
use crate::time::Timestamp;

/// Why a relay's environmental logic is suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "quantity", rename_all = "snake_case")]
pub enum PauseReason {
    /// The held snapshot is older than the staleness limit.
    SensorStale,
    /// Every sensor reporting this quantity is flagged.
    SensorUnavailable(Quantity),
}

/// What the engine tracks for one relay while running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayRuntimeState {
    pub relay_id: RelayId,
    pub physical_on: bool,
    pub mode: RelayMode,
    pub latch: Option<LatchState>,
    pub cycle: Option<CyclePhase>,
    pub paused: Option<PauseReason>,
    pub last_cause: Option<ChangeCause>,
    pub last_changed: Option<Timestamp>,
    pub write_failures: u32,
}

impl RelayRuntimeState {
    /// Initial state: output OFF, automatic mode.
    #[must_use]
    pub fn new(relay_id: RelayId) -> Self {
        Self {
            relay_id,
            physical_on: false,
            mode: RelayMode::Automatic,
            latch: None,
            cycle: None,
            paused: None,
            last_cause: None,
            last_changed: None,
            write_failures: 0,
        }
    }

    /// Record a successful write.
    pub fn record_change(&mut self, on: bool, cause: ChangeCause, at: Timestamp) {
        self.physical_on = on;
        self.last_cause = Some(cause);
        self.last_changed = Some(at);
        self.write_failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_start_off_in_automatic_mode() {
        let state = RelayRuntimeState::new(RelayId::new(3).unwrap());
        assert!(!state.physical_on);
        assert_eq!(state.mode, RelayMode::Automatic);
        assert_eq!(state.write_failures, 0);
        assert!(state.last_changed.is_none());
    }

    #[test]
    fn should_reset_failure_count_on_successful_write() {
        let mut state = RelayRuntimeState::new(RelayId::new(3).unwrap());
        state.write_failures = 2;
        let at = crate::time::now();
        state.record_change(true, ChangeCause::Cycle, at);
        assert!(state.physical_on);
        assert_eq!(state.write_failures, 0);
        assert_eq!(state.last_cause, Some(ChangeCause::Cycle));
        assert_eq!(state.last_changed, Some(at));
    }

    #[test]
    fn should_serialize_pause_reason_with_quantity() {
        let json = serde_json::to_value(PauseReason::SensorUnavailable(Quantity::Co2)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"reason": "sensor_unavailable", "quantity": "co2"})
        );
    }
}
