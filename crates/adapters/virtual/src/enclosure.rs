//! Simulated grow enclosure.
//!
//! A coarse climate model: each [`step`](VirtualEnclosure::step) nudges
//! temperature, humidity and CO2 according to which outputs are energized on
//! the shared [`VirtualRelayBoard`]. The three sensors report the same
//! climate with fixed per-sensor offsets.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;

use sporehub_app::ports::SensorSource;
use sporehub_domain::error::SporeHubError;
use sporehub_domain::id::SensorId;
use sporehub_domain::relay::{Co2Trigger, LatchInput, OutputChannel, RelayRole, RelaySet};
use sporehub_domain::sensor::SensorReading;

use crate::VirtualError;
use crate::board::VirtualRelayBoard;

const AMBIENT_TEMP: f64 = 19.0;
const AMBIENT_CO2: f64 = 450.0;

/// Output channels that affect the simulated climate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnclosureWiring {
    pub heaters: Vec<OutputChannel>,
    pub humidifiers: Vec<OutputChannel>,
    /// Fans exchanging air with the room.
    pub exhaust: Vec<OutputChannel>,
}

impl EnclosureWiring {
    /// Derive the wiring from relay roles.
    #[must_use]
    pub fn from_relays(relays: &RelaySet) -> Self {
        let mut wiring = Self::default();
        for def in relays.iter() {
            match def.role {
                RelayRole::Latch {
                    input: LatchInput::Temperature,
                } => wiring.heaters.push(def.output_channel),
                RelayRole::Latch {
                    input: LatchInput::Humidity,
                } => wiring.humidifiers.push(def.output_channel),
                RelayRole::Hybrid {
                    co2: Co2Trigger::Ventilate,
                    ..
                } => wiring.exhaust.push(def.output_channel),
                _ => {}
            }
        }
        wiring
    }
}

/// Current simulated air state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Climate {
    pub temperature: f64,
    pub humidity: f64,
    pub co2: f64,
}

impl Default for Climate {
    fn default() -> Self {
        Self {
            temperature: 21.0,
            humidity: 65.0,
            co2: 900.0,
        }
    }
}

impl Climate {
    fn advance(&mut self, heating: bool, humidifying: bool, exhausting: bool) {
        if heating {
            self.temperature += 0.3;
        } else if self.temperature > AMBIENT_TEMP {
            self.temperature = (self.temperature - 0.1).max(AMBIENT_TEMP);
        }

        self.humidity += if humidifying { 2.0 } else { -0.5 };
        if exhausting {
            self.humidity -= 0.3;
            self.co2 = (self.co2 - 80.0).max(AMBIENT_CO2);
        } else {
            // Mycelium respiration.
            self.co2 += 40.0;
        }

        self.humidity = self.humidity.clamp(0.0, 100.0);
        self.co2 = self.co2.min(5000.0);
    }
}

pub struct VirtualEnclosure {
    board: Arc<VirtualRelayBoard>,
    wiring: EnclosureWiring,
    climate: Mutex<Climate>,
    faults: Mutex<BTreeSet<SensorId>>,
}

impl VirtualEnclosure {
    #[must_use]
    pub fn new(board: Arc<VirtualRelayBoard>, wiring: EnclosureWiring, climate: Climate) -> Self {
        Self {
            board,
            wiring,
            climate: Mutex::new(climate),
            faults: Mutex::new(BTreeSet::new()),
        }
    }

    #[must_use]
    pub fn climate(&self) -> Climate {
        *lock(&self.climate)
    }

    /// Make `sensor` stop answering (`faulted = true`) or recover.
    pub fn set_sensor_fault(&self, sensor: SensorId, faulted: bool) {
        let mut faults = lock(&self.faults);
        if faulted {
            faults.insert(sensor);
        } else {
            faults.remove(&sensor);
        }
    }

    /// Advance the climate model by one step.
    pub fn step(&self) -> Climate {
        let any_on = |channels: &[OutputChannel]| channels.iter().any(|c| self.board.is_on(*c));
        let heating = any_on(&self.wiring.heaters);
        let humidifying = any_on(&self.wiring.humidifiers);
        let exhausting = any_on(&self.wiring.exhaust);

        let mut climate = lock(&self.climate);
        climate.advance(heating, humidifying, exhausting);
        tracing::trace!(
            temperature = climate.temperature,
            humidity = climate.humidity,
            co2 = climate.co2,
            "enclosure stepped"
        );
        *climate
    }

    /// Step on a fixed interval until `stop` turns `true` or its sender is
    /// dropped.
    pub async fn run(&self, step_interval: Duration, mut stop: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(step_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.step();
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
    }

    fn reading(&self, sensor: SensorId) -> Result<SensorReading, VirtualError> {
        if lock(&self.faults).contains(&sensor) {
            return Err(VirtualError::SensorFault(sensor));
        }
        let climate = self.climate();
        let reading = match sensor {
            // Warm air rises; the floor probe runs a little wetter.
            SensorId::UpperDht => SensorReading::climate(
                climate.temperature + 0.3,
                (climate.humidity - 1.0).max(0.0),
            ),
            SensorId::LowerDht => SensorReading::climate(
                climate.temperature - 0.3,
                (climate.humidity + 1.0).min(100.0),
            ),
            SensorId::Scd40 => {
                SensorReading::with_co2(climate.temperature, climate.humidity, climate.co2)
            }
        };
        Ok(reading)
    }
}

impl SensorSource for VirtualEnclosure {
    fn read(
        &self,
        sensor: SensorId,
    ) -> impl Future<Output = Result<SensorReading, SporeHubError>> + Send {
        let result = self.reading(sensor).map_err(SporeHubError::from);
        async move { result }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
