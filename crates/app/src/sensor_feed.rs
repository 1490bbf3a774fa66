//! Sensor polling: reads every sensor, aggregates, and feeds the engine.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use sporehub_domain::error::SporeHubError;
use sporehub_domain::id::SensorId;
use sporehub_domain::sensor::{AggregatorSettings, SensorAggregator, SensorSnapshot};

use crate::ports::{Clock, SensorSource};
use crate::runtime::EngineHandle;

pub struct SensorFeed<S, C> {
    source: S,
    clock: C,
    aggregator: SensorAggregator,
    handle: EngineHandle,
    poll_interval: Duration,
}

impl<S, C> SensorFeed<S, C>
where
    S: SensorSource,
    C: Clock,
{
    #[must_use]
    pub fn new(
        source: S,
        clock: C,
        handle: EngineHandle,
        settings: AggregatorSettings,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            clock,
            aggregator: SensorAggregator::new(settings),
            handle,
            poll_interval,
        }
    }

    #[must_use]
    pub fn aggregator(&self) -> &SensorAggregator {
        &self.aggregator
    }

    /// Clear the consecutive failure counters of every sensor.
    pub fn reset_error_counts(&mut self) {
        self.aggregator.reset_error_counts();
        tracing::info!("sensor error counts reset");
    }

    /// Read each sensor once and submit the resulting snapshot.
    ///
    /// Read failures and rejected readings are logged and counted; they
    /// never fail the poll.
    ///
    /// # Errors
    ///
    /// Returns [`SporeHubError::EngineStopped`] when the engine is gone.
    pub async fn poll_once(&mut self) -> Result<SensorSnapshot, SporeHubError> {
        for sensor in SensorId::ALL {
            match self.source.read(sensor).await {
                Ok(reading) => {
                    let at = self.clock.now();
                    if let Err(err) = self.aggregator.record_reading(sensor, reading, at) {
                        tracing::warn!(%sensor, %err, "sensor reading rejected");
                    }
                }
                Err(err) => {
                    self.aggregator.record_failure(sensor);
                    tracing::warn!(
                        %sensor,
                        %err,
                        failures = self.aggregator.consecutive_failures(sensor),
                        "sensor read failed"
                    );
                }
            }
        }

        let snapshot = self.aggregator.snapshot(self.clock.now());
        if !snapshot.error_flags.is_empty() {
            tracing::debug!(flags = ?snapshot.error_flags, "sensors flagged in snapshot");
        }
        self.handle.submit_snapshot(snapshot.clone()).await?;
        Ok(snapshot)
    }

    /// Poll on a fixed interval until `stop` turns `true`, its sender is
    /// dropped, or the engine stops.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = self.poll_once().await {
                        tracing::warn!(%err, "sensor feed stopping");
                        break;
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
    }
}
