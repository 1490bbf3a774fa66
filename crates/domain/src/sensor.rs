//! Sensor readings and the aggregated snapshot the engine consumes.
//!
//! Three sensors feed the enclosure: two temperature/humidity probes and a
//! CO2 sensor that also reports temperature and humidity. The
//! [`SensorAggregator`] keeps the latest valid reading of each and reduces
//! them into one [`SensorSnapshot`].

mod aggregator;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use aggregator::{AggregatorSettings, SensorAggregator};

use crate::error::ValidationError;
use crate::id::SensorId;
use crate::time::Timestamp;

/// An environmental quantity the engine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    Temperature,
    Humidity,
    Co2,
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Temperature => f.write_str("temperature"),
            Self::Humidity => f.write_str("humidity"),
            Self::Co2 => f.write_str("co2"),
        }
    }
}

/// One raw reading from a sensor. Fields the sensor does not measure are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub co2: Option<f64>,
}

impl SensorReading {
    const TEMPERATURE_RANGE: (f64, f64) = (-40.0, 85.0);
    const HUMIDITY_RANGE: (f64, f64) = (0.0, 100.0);
    const CO2_RANGE: (f64, f64) = (0.0, 40_000.0);

    /// Temperature and humidity probe reading.
    #[must_use]
    pub fn climate(temperature: f64, humidity: f64) -> Self {
        Self {
            temperature: Some(temperature),
            humidity: Some(humidity),
            co2: None,
        }
    }

    /// CO2 sensor reading, with its own temperature and humidity.
    #[must_use]
    pub fn with_co2(temperature: f64, humidity: f64, co2: f64) -> Self {
        Self {
            co2: Some(co2),
            ..Self::climate(temperature, humidity)
        }
    }

    /// Reject readings missing a value the sensor must report, and values
    /// outside the physical range of the sensors.
    ///
    /// Every sensor reports temperature and humidity; the SCD40 also reports
    /// CO2.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidReading`] naming the first bad field.
    pub fn validate(&self, sensor: SensorId) -> Result<(), ValidationError> {
        let missing = if self.temperature.is_none() {
            Some("missing temperature")
        } else if self.humidity.is_none() {
            Some("missing humidity")
        } else if sensor == SensorId::Scd40 && self.co2.is_none() {
            Some("missing co2")
        } else {
            None
        };
        if let Some(reason) = missing {
            return Err(ValidationError::InvalidReading { sensor, reason });
        }

        let checks = [
            (self.temperature, Self::TEMPERATURE_RANGE, "temperature out of range"),
            (self.humidity, Self::HUMIDITY_RANGE, "humidity out of range"),
            (self.co2, Self::CO2_RANGE, "co2 out of range"),
        ];
        for (value, (min, max), reason) in checks {
            if let Some(v) = value
                && !(v.is_finite() && (min..=max).contains(&v))
            {
                return Err(ValidationError::InvalidReading { sensor, reason });
            }
        }
        Ok(())
    }
}

/// Aggregated view of all sensors at one instant.
///
/// Values of flagged sensors are kept for display but excluded from the
/// derived averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub upper_temp: f64,
    pub upper_humidity: f64,
    pub lower_temp: f64,
    pub lower_humidity: f64,
    pub scd_temp: f64,
    pub scd_humidity: f64,
    pub co2: f64,
    pub captured_at: Timestamp,
    pub error_flags: BTreeSet<SensorId>,
}

impl SensorSnapshot {
    /// Snapshot where every sensor reports the same values and none is flagged.
    #[must_use]
    pub fn uniform(temp: f64, humidity: f64, co2: f64, captured_at: Timestamp) -> Self {
        Self {
            upper_temp: temp,
            upper_humidity: humidity,
            lower_temp: temp,
            lower_humidity: humidity,
            scd_temp: temp,
            scd_humidity: humidity,
            co2,
            captured_at,
            error_flags: BTreeSet::new(),
        }
    }

    /// Flag a sensor as errored.
    #[must_use]
    pub fn with_error(mut self, sensor: SensorId) -> Self {
        self.error_flags.insert(sensor);
        self
    }

    #[must_use]
    pub fn is_flagged(&self, sensor: SensorId) -> bool {
        self.error_flags.contains(&sensor)
    }

    fn climate(&self, sensor: SensorId) -> (f64, f64) {
        match sensor {
            SensorId::UpperDht => (self.upper_temp, self.upper_humidity),
            SensorId::LowerDht => (self.lower_temp, self.lower_humidity),
            SensorId::Scd40 => (self.scd_temp, self.scd_humidity),
        }
    }

    fn mean_over_healthy(&self, pick: impl Fn((f64, f64)) -> f64) -> Option<f64> {
        let values: Vec<f64> = SensorId::ALL
            .into_iter()
            .filter(|s| !self.is_flagged(*s))
            .map(|s| pick(self.climate(s)))
            .collect();
        if values.is_empty() {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let count = values.len() as f64;
        Some(values.iter().sum::<f64>() / count)
    }

    /// Mean temperature over unflagged sensors.
    #[must_use]
    pub fn avg_temp(&self) -> Option<f64> {
        self.mean_over_healthy(|(t, _)| t)
    }

    /// Mean humidity over unflagged sensors.
    #[must_use]
    pub fn avg_humidity(&self) -> Option<f64> {
        self.mean_over_healthy(|(_, h)| h)
    }

    /// CO2 concentration, available while the SCD40 is not flagged.
    #[must_use]
    pub fn co2_ppm(&self) -> Option<f64> {
        (!self.is_flagged(SensorId::Scd40)).then_some(self.co2)
    }

    /// Derived value of a quantity.
    #[must_use]
    pub fn value(&self, quantity: Quantity) -> Option<f64> {
        match quantity {
            Quantity::Temperature => self.avg_temp(),
            Quantity::Humidity => self.avg_humidity(),
            Quantity::Co2 => self.co2_ppm(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> Timestamp {
        crate::time::now()
    }

    #[test]
    fn should_average_over_all_sensors_when_none_flagged() {
        let mut snap = SensorSnapshot::uniform(20.0, 60.0, 900.0, at());
        snap.upper_temp = 23.0;
        snap.lower_humidity = 66.0;
        assert_eq!(snap.avg_temp(), Some(21.0));
        assert_eq!(snap.avg_humidity(), Some(62.0));
        assert_eq!(snap.co2_ppm(), Some(900.0));
    }

    #[test]
    fn should_exclude_flagged_sensors_from_averages() {
        let mut snap = SensorSnapshot::uniform(20.0, 60.0, 900.0, at()).with_error(SensorId::UpperDht);
        snap.upper_temp = 99.0;
        snap.upper_humidity = 0.0;
        assert_eq!(snap.avg_temp(), Some(20.0));
        assert_eq!(snap.avg_humidity(), Some(60.0));
    }

    #[test]
    fn should_drop_co2_when_scd40_is_flagged() {
        let snap = SensorSnapshot::uniform(20.0, 60.0, 900.0, at()).with_error(SensorId::Scd40);
        assert_eq!(snap.co2_ppm(), None);
        assert_eq!(snap.value(Quantity::Temperature), Some(20.0));
    }

    #[test]
    fn should_have_no_climate_values_when_every_sensor_is_flagged() {
        let snap = SensorId::ALL
            .into_iter()
            .fold(SensorSnapshot::uniform(20.0, 60.0, 900.0, at()), SensorSnapshot::with_error);
        assert_eq!(snap.avg_temp(), None);
        assert_eq!(snap.avg_humidity(), None);
        assert_eq!(snap.value(Quantity::Co2), None);
    }

    #[test]
    fn should_accept_plausible_readings() {
        assert!(SensorReading::climate(22.5, 70.0).validate(SensorId::UpperDht).is_ok());
        assert!(SensorReading::with_co2(22.5, 70.0, 1200.0).validate(SensorId::Scd40).is_ok());
    }

    #[test]
    fn should_reject_out_of_range_or_non_finite_readings() {
        let bad = [
            SensorReading::climate(22.0, 101.0),
            SensorReading::climate(-41.0, 50.0),
            SensorReading::climate(f64::NAN, 50.0),
            SensorReading::with_co2(22.0, 50.0, 40_001.0),
            SensorReading::default(),
        ];
        for reading in bad {
            assert!(
                matches!(
                    reading.validate(SensorId::Scd40),
                    Err(ValidationError::InvalidReading { .. })
                ),
                "{reading:?} should be rejected"
            );
        }
    }

    #[test]
    fn should_reject_partial_readings() {
        let no_humidity = SensorReading {
            humidity: None,
            ..SensorReading::climate(22.0, 70.0)
        };
        let no_temperature = SensorReading {
            temperature: None,
            ..SensorReading::climate(22.0, 70.0)
        };
        for (sensor, reading, reason) in [
            (SensorId::UpperDht, no_humidity, "missing humidity"),
            (SensorId::LowerDht, no_temperature, "missing temperature"),
            (SensorId::Scd40, SensorReading::climate(22.0, 70.0), "missing co2"),
        ] {
            assert!(matches!(
                reading.validate(sensor),
                Err(ValidationError::InvalidReading { reason: r, .. }) if r == reason
            ));
        }
    }
}
