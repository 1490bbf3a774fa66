use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cycle::PairSlot;
use crate::id::RelayId;
use crate::latch::Polarity;
use crate::sensor::Quantity;

/// How the engine decides a relay's automatic state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelayRole {
    /// Power rail; ON while any dependent needs it.
    Master,
    /// Hysteresis output on a sensor quantity.
    Latch { input: LatchInput },
    /// Plain duty cycle inside the cycle's window.
    Cycle { cycle: CycleSource },
    /// Duty cycle OR a CO2 trigger OR a followed latch relay, gated by the
    /// cycle's window.
    Hybrid {
        cycle: CycleSource,
        co2: Co2Trigger,
        #[serde(default)]
        follows: Option<RelayId>,
    },
    /// One half of a light pair sharing a single cycle timer.
    AlternatingPair { partner: RelayId, slot: PairSlot },
    /// No automation; OFF unless overridden.
    Manual,
}

impl RelayRole {
    #[must_use]
    pub fn is_master(&self) -> bool {
        matches!(self, Self::Master)
    }

    #[must_use]
    pub fn is_latch(&self) -> bool {
        matches!(self, Self::Latch { .. })
    }

    /// Short machine name of the role.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Latch { .. } => "latch",
            Self::Cycle { .. } => "cycle",
            Self::Hybrid { .. } => "hybrid",
            Self::AlternatingPair { .. } => "alternating_pair",
            Self::Manual => "manual",
        }
    }
}

/// Sensor quantity driving a latch relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatchInput {
    Humidity,
    Temperature,
}

impl LatchInput {
    /// Both humidifier and heater energize below `low`.
    #[must_use]
    pub fn polarity(self) -> Polarity {
        Polarity::OnBelow
    }

    #[must_use]
    pub fn quantity(self) -> Quantity {
        match self {
            Self::Humidity => Quantity::Humidity,
            Self::Temperature => Quantity::Temperature,
        }
    }
}

/// Which profile cycle a relay runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleSource {
    Fan,
    Light,
}

impl fmt::Display for CycleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fan => f.write_str("fan"),
            Self::Light => f.write_str("light"),
        }
    }
}

/// How CO2 concentration switches a hybrid relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Co2Trigger {
    /// Fresh-air exchange: on-above latch over `co2.low`/`co2.high`.
    Ventilate,
    /// In-tub circulation: ON while `co2 < co2.tub_fan_low`.
    Circulate,
}
