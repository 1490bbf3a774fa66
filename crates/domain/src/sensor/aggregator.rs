use std::collections::{BTreeMap, BTreeSet};

use chrono::TimeDelta;

use super::{SensorReading, SensorSnapshot};
use crate::error::ValidationError;
use crate::id::SensorId;
use crate::time::Timestamp;

/// Tuning for [`SensorAggregator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorSettings {
    /// Consecutive failures after which a sensor is flagged.
    pub error_threshold: u32,
    /// A reading older than this flags its sensor.
    pub max_reading_age: TimeDelta,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            error_threshold: 5,
            max_reading_age: TimeDelta::seconds(90),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Channel {
    latest: Option<(SensorReading, Timestamp)>,
    consecutive_failures: u32,
}

/// Reduces the three sensor streams into one [`SensorSnapshot`].
#[derive(Debug, Clone)]
pub struct SensorAggregator {
    settings: AggregatorSettings,
    channels: BTreeMap<SensorId, Channel>,
}

impl SensorAggregator {
    #[must_use]
    pub fn new(settings: AggregatorSettings) -> Self {
        let channels = SensorId::ALL
            .into_iter()
            .map(|id| (id, Channel::default()))
            .collect();
        Self { settings, channels }
    }

    #[must_use]
    pub fn settings(&self) -> AggregatorSettings {
        self.settings
    }

    /// Store a reading. An invalid reading counts as a failure.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidReading`] when the reading is rejected.
    pub fn record_reading(
        &mut self,
        sensor: SensorId,
        reading: SensorReading,
        at: Timestamp,
    ) -> Result<(), ValidationError> {
        let channel = self.channels.entry(sensor).or_default();
        if let Err(err) = reading.validate(sensor) {
            channel.consecutive_failures = channel.consecutive_failures.saturating_add(1);
            return Err(err);
        }
        channel.latest = Some((reading, at));
        channel.consecutive_failures = 0;
        Ok(())
    }

    /// Count a failed read.
    pub fn record_failure(&mut self, sensor: SensorId) {
        let channel = self.channels.entry(sensor).or_default();
        channel.consecutive_failures = channel.consecutive_failures.saturating_add(1);
    }

    #[must_use]
    pub fn consecutive_failures(&self, sensor: SensorId) -> u32 {
        self.channels
            .get(&sensor)
            .map_or(0, |c| c.consecutive_failures)
    }

    /// Forget every failure count.
    pub fn reset_error_counts(&mut self) {
        for channel in self.channels.values_mut() {
            channel.consecutive_failures = 0;
        }
    }

    fn is_flagged(&self, channel: &Channel, at: Timestamp) -> bool {
        if channel.consecutive_failures >= self.settings.error_threshold {
            return true;
        }
        match channel.latest {
            None => true,
            Some((_, read_at)) => at - read_at > self.settings.max_reading_age,
        }
    }

    /// Build the snapshot as of `at`.
    #[must_use]
    pub fn snapshot(&self, at: Timestamp) -> SensorSnapshot {
        let mut error_flags = BTreeSet::new();
        let mut reading_of = |id: SensorId| -> SensorReading {
            match self.channels.get(&id) {
                Some(channel) => {
                    if self.is_flagged(channel, at) {
                        error_flags.insert(id);
                    }
                    channel.latest.map(|(r, _)| r).unwrap_or_default()
                }
                None => {
                    error_flags.insert(id);
                    SensorReading::default()
                }
            }
        };
        let upper = reading_of(SensorId::UpperDht);
        let lower = reading_of(SensorId::LowerDht);
        let scd = reading_of(SensorId::Scd40);

        SensorSnapshot {
            upper_temp: upper.temperature.unwrap_or_default(),
            upper_humidity: upper.humidity.unwrap_or_default(),
            lower_temp: lower.temperature.unwrap_or_default(),
            lower_humidity: lower.humidity.unwrap_or_default(),
            scd_temp: scd.temperature.unwrap_or_default(),
            scd_humidity: scd.humidity.unwrap_or_default(),
            co2: scd.co2.unwrap_or_default(),
            captured_at: at,
            error_flags,
        }
    }
}

impl Default for SensorAggregator {
    fn default() -> Self {
        Self::new(AggregatorSettings::default())
    }
}
