//! Sensor source port: raw readings from the enclosure sensors.

use std::future::Future;

use sporehub_domain::error::SporeHubError;
use sporehub_domain::id::SensorId;
use sporehub_domain::sensor::SensorReading;

/// Reads the enclosure sensors one at a time.
pub trait SensorSource {
    /// Take one reading from `sensor`.
    ///
    /// # Errors
    ///
    /// Returns [`SporeHubError::Sensor`] when the sensor did not answer.
    fn read(
        &self,
        sensor: SensorId,
    ) -> impl Future<Output = Result<SensorReading, SporeHubError>> + Send;
}

impl<T: SensorSource + Send + Sync> SensorSource for std::sync::Arc<T> {
    fn read(
        &self,
        sensor: SensorId,
    ) -> impl Future<Output = Result<SensorReading, SporeHubError>> + Send {
        (**self).read(sensor)
    }
}
