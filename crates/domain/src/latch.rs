//! Threshold latch: hysteresis state machine.
//!
//! A value below `low` puts the latch in [`LatchZone::Below`], a value above
//! `high` in [`LatchZone::Above`]. Inside `[low, high]` the latch is
//! [`LatchZone::Between`] and keeps its previous output, so it never
//! chatters while the value hovers in the dead band.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A `low`/`high` threshold pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub low: f64,
    pub high: f64,
}

impl Thresholds {
    #[must_use]
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Check that both bounds are finite and `low < high`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NonFiniteThreshold`] or
    /// [`ValidationError::ThresholdOrder`].
    pub fn validate(&self, quantity: &'static str) -> Result<(), ValidationError> {
        if !self.low.is_finite() || !self.high.is_finite() {
            return Err(ValidationError::NonFiniteThreshold { quantity });
        }
        if self.low >= self.high {
            return Err(ValidationError::ThresholdOrder {
                quantity,
                low: self.low,
                high: self.high,
            });
        }
        Ok(())
    }

    /// Zone the value falls into.
    #[must_use]
    pub fn zone_of(&self, value: f64) -> LatchZone {
        if value < self.low {
            LatchZone::Below
        } else if value > self.high {
            LatchZone::Above
        } else {
            LatchZone::Between
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatchZone {
    Below,
    Between,
    Above,
}

/// Which side of the band energizes the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Heater, humidifier: ON below `low`, OFF above `high`.
    OnBelow,
    /// Ventilation: ON above `high`, OFF below `low`.
    OnAbove,
}

/// Zone plus output of one latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatchState {
    pub zone: LatchZone,
    pub on: bool,
}

impl Default for LatchState {
    /// `Above`, output OFF: the state before any valid reading.
    fn default() -> Self {
        Self {
            zone: LatchZone::Above,
            on: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdLatch {
    pub polarity: Polarity,
}

impl ThresholdLatch {
    #[must_use]
    pub fn new(polarity: Polarity) -> Self {
        Self { polarity }
    }

    /// Compute the next latch state from a fresh value.
    #[must_use]
    pub fn evaluate(&self, value: f64, thresholds: &Thresholds, previous: LatchState) -> LatchState {
        let zone = thresholds.zone_of(value);
        let on = match (zone, self.polarity) {
            (LatchZone::Between, _) => previous.on,
            (LatchZone::Below, Polarity::OnBelow) | (LatchZone::Above, Polarity::OnAbove) => true,
            (LatchZone::Below, Polarity::OnAbove) | (LatchZone::Above, Polarity::OnBelow) => false,
        };
        LatchState { zone, on }
    }
}
