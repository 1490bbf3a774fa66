//! Automation profile: thresholds, duty cycles and schedule windows.
//!
//! A profile is a plain value. The engine holds it behind an `Arc` and swaps
//! the whole profile between ticks; it is never mutated in place.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cycle::DutyCycle;
use crate::error::ValidationError;
use crate::latch::Thresholds;
use crate::relay::{CycleSource, LatchInput};
use crate::schedule::ScheduleWindow;
use crate::time::TimeOfDay;

/// Humidity band plus the window in which the humidifier may run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HumidityControl {
    #[serde(flatten)]
    pub thresholds: Thresholds,
    #[serde(flatten)]
    pub window: ScheduleWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Co2Control {
    /// Ventilation turns OFF below this.
    pub low: f64,
    /// Ventilation turns ON above this.
    pub high: f64,
    /// Tub fans circulate while CO2 is below this.
    pub tub_fan_low: f64,
}

impl Co2Control {
    #[must_use]
    pub fn thresholds(&self) -> Thresholds {
        Thresholds::new(self.low, self.high)
    }
}

/// A duty cycle and the window it runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSettings {
    #[serde(flatten)]
    pub duty: DutyCycle,
    #[serde(flatten)]
    pub window: ScheduleWindow,
    /// A disabled cycle keeps its relays OFF whatever the window says.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

impl CycleSettings {
    #[must_use]
    pub fn new(duty: DutyCycle, window: ScheduleWindow) -> Self {
        Self {
            duty,
            window,
            enabled: true,
        }
    }

    #[must_use]
    pub fn disabled(duty: DutyCycle) -> Self {
        Self {
            enabled: false,
            ..Self::new(duty, ScheduleWindow::ALL_DAY)
        }
    }

    /// Whether the cycle may run at local time `now`.
    #[must_use]
    pub fn is_open(&self, now: TimeOfDay) -> bool {
        self.enabled && self.window.contains(now)
    }
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationProfile {
    pub humidity: HumidityControl,
    pub temperature: Thresholds,
    pub co2: Co2Control,
    pub fan_cycle: CycleSettings,
    pub light_cycle: CycleSettings,
}

impl AutomationProfile {
    /// Build the profile of a named preset.
    #[must_use]
    pub fn preset(preset: ProfilePreset) -> Self {
        let light_duty = DutyCycle::new(30, 60);
        let (temperature, co2, light_cycle) = match preset {
            ProfilePreset::Test => (
                Thresholds::new(20.0, 24.0),
                (1000.0, 1600.0),
                CycleSettings::new(
                    light_duty,
                    ScheduleWindow::new(TimeOfDay::hm(9, 0), TimeOfDay::hm(21, 0)),
                ),
            ),
            // No light while the mycelium colonises the substrate.
            ProfilePreset::Colonisation => (
                Thresholds::new(24.0, 27.0),
                (1500.0, 3000.0),
                CycleSettings::disabled(light_duty),
            ),
            ProfilePreset::Fruiting => (
                Thresholds::new(18.0, 22.0),
                (800.0, 1200.0),
                CycleSettings::new(
                    light_duty,
                    ScheduleWindow::new(TimeOfDay::hm(8, 0), TimeOfDay::hm(22, 0)),
                ),
            ),
        };
        Self {
            humidity: HumidityControl {
                thresholds: Thresholds::new(50.0, 85.0),
                window: ScheduleWindow::ALL_DAY,
            },
            temperature,
            co2: Co2Control {
                low: co2.0,
                high: co2.1,
                tub_fan_low: 1100.0,
            },
            fan_cycle: CycleSettings::new(DutyCycle::new(15, 60), ScheduleWindow::ALL_DAY),
            light_cycle,
        }
    }

    /// Check every threshold pair and duty cycle.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.humidity.thresholds.validate("humidity")?;
        self.temperature.validate("temperature")?;
        self.co2.thresholds().validate("co2")?;
        if !self.co2.tub_fan_low.is_finite() || self.co2.tub_fan_low <= 0.0 {
            return Err(ValidationError::TubFanThreshold(self.co2.tub_fan_low));
        }
        self.fan_cycle.duty.validate("fan")?;
        self.light_cycle.duty.validate("light")?;
        Ok(())
    }

    /// Thresholds for a latch input.
    #[must_use]
    pub fn latch_thresholds(&self, input: LatchInput) -> Thresholds {
        match input {
            LatchInput::Humidity => self.humidity.thresholds,
            LatchInput::Temperature => self.temperature,
        }
    }

    /// Window gating a latch input. Temperature is always eligible.
    #[must_use]
    pub fn latch_window(&self, input: LatchInput) -> Option<ScheduleWindow> {
        match input {
            LatchInput::Humidity => Some(self.humidity.window),
            LatchInput::Temperature => None,
        }
    }

    #[must_use]
    pub fn cycle(&self, source: CycleSource) -> &CycleSettings {
        match source {
            CycleSource::Fan => &self.fan_cycle,
            CycleSource::Light => &self.light_cycle,
        }
    }

    /// Serialize to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MalformedProfile`] if serialization fails.
    pub fn export_json(&self) -> Result<String, ValidationError> {
        serde_json::to_string_pretty(self).map_err(ValidationError::MalformedProfile)
    }

    /// Parse and validate a profile previously written by [`Self::export_json`].
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MalformedProfile`] for unparsable input, or
    /// the validation error of the parsed profile.
    pub fn import_json(json: &str) -> Result<Self, ValidationError> {
        let profile: Self = serde_json::from_str(json).map_err(ValidationError::MalformedProfile)?;
        profile.validate()?;
        Ok(profile)
    }
}

impl Default for AutomationProfile {
    fn default() -> Self {
        Self::preset(ProfilePreset::default())
    }
}

/// Built-in profiles for the stages of a grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfilePreset {
    #[default]
    Test,
    Colonisation,
    Fruiting,
}

impl fmt::Display for ProfilePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Test => f.write_str("test"),
            Self::Colonisation => f.write_str("colonisation"),
            Self::Fruiting => f.write_str("fruiting"),
        }
    }
}

impl FromStr for ProfilePreset {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "test" => Ok(Self::Test),
            "colonisation" | "colonization" => Ok(Self::Colonisation),
            "fruiting" => Ok(Self::Fruiting),
            _ => Err(ValidationError::UnknownPreset(s.to_string())),
        }
    }
}
