//! Cycle timer: duty cycles and alternating pairs.
//!
//! A timer holds an epoch. The phase inside the cycle is the time elapsed
//! since the epoch, modulo the cycle period: the interval for a plain duty
//! cycle, twice the ON duration for an alternating pair. The epoch is dropped whenever the
//! schedule window closes, so entering the window restarts the cycle at
//! its ON phase. A clock stepped backwards also restarts the epoch.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::time::Timestamp;

/// Fixed ON duration repeated every fixed interval, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutyCycle {
    pub on_minutes: u32,
    pub interval_minutes: u32,
}

impl DutyCycle {
    #[must_use]
    pub fn new(on_minutes: u32, interval_minutes: u32) -> Self {
        Self {
            on_minutes,
            interval_minutes,
        }
    }

    /// Check `0 < on < interval`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::CycleDuration`] otherwise.
    pub fn validate(&self, cycle: &'static str) -> Result<(), ValidationError> {
        if self.on_minutes == 0 || self.on_minutes >= self.interval_minutes {
            return Err(ValidationError::CycleDuration {
                cycle,
                on_minutes: self.on_minutes,
                interval_minutes: self.interval_minutes,
            });
        }
        Ok(())
    }

    fn on(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.on_minutes))
    }

    fn interval(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.interval_minutes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    On,
    Off,
}

impl CyclePhase {
    #[must_use]
    pub fn from_on(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }

    #[must_use]
    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

/// Position of a relay in an alternating pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairSlot {
    /// ON during `[0, on)`.
    First,
    /// ON during `[on, 2·on)`.
    Second,
}

impl PairSlot {
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::First => Self::Second,
            Self::Second => Self::First,
        }
    }
}

/// `elapsed mod period`.
fn position(elapsed: TimeDelta, period: TimeDelta) -> TimeDelta {
    let period_ms = period.num_milliseconds().max(1);
    TimeDelta::milliseconds(elapsed.num_milliseconds().rem_euclid(period_ms))
}

/// Whether a duty cycle is in its ON phase after `elapsed`.
#[must_use]
pub fn duty_on(elapsed: TimeDelta, cycle: &DutyCycle) -> bool {
    position(elapsed, cycle.interval()) < cycle.on()
}

/// Whether `slot` of an alternating pair is ON after `elapsed`.
///
/// The pair repeats every `2·on`; exactly one slot is ON at any time.
#[must_use]
pub fn alternating_on(elapsed: TimeDelta, cycle: &DutyCycle, slot: PairSlot) -> bool {
    let on = cycle.on();
    let first = position(elapsed, on + on) < on;
    match slot {
        PairSlot::First => first,
        PairSlot::Second => !first,
    }
}

/// Epoch holder shared by the relays that run on one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleTimer {
    epoch: Option<Timestamp>,
}

impl CycleTimer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn epoch(&self) -> Option<Timestamp> {
        self.epoch
    }

    /// Forget the epoch; the next in-window evaluation starts a fresh cycle.
    pub fn restart(&mut self) {
        self.epoch = None;
    }

    /// Time elapsed in the current cycle, or `None` while the window is closed.
    fn elapsed(&mut self, now: Timestamp, in_window: bool) -> Option<TimeDelta> {
        if !in_window {
            self.epoch = None;
            return None;
        }
        let epoch = match self.epoch {
            Some(epoch) if epoch <= now => epoch,
            _ => {
                self.epoch = Some(now);
                now
            }
        };
        Some(now - epoch)
    }

    /// Phase of a plain duty cycle.
    pub fn duty_phase(&mut self, now: Timestamp, in_window: bool, cycle: &DutyCycle) -> CyclePhase {
        let on = self
            .elapsed(now, in_window)
            .is_some_and(|elapsed| duty_on(elapsed, cycle));
        CyclePhase::from_on(on)
    }

    /// Phase of one slot of an alternating pair.
    pub fn alternating_phase(
        &mut self,
        now: Timestamp,
        in_window: bool,
        cycle: &DutyCycle,
        slot: PairSlot,
    ) -> CyclePhase {
        let on = self
            .elapsed(now, in_window)
            .is_some_and(|elapsed| alternating_on(elapsed, cycle, slot));
        CyclePhase::from_on(on)
    }
}
