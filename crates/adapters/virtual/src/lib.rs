//! # sporehub-adapter-virtual
//!
//! Virtual hardware for running the engine without a relay board or sensors.
//!
//! ## Provided adapters
//!
//! | Adapter | Port | Behaviour |
//! |---------|------|-----------|
//! | [`VirtualRelayBoard`] | `RelayDriver` | Keeps channel states in memory, can inject faults |
//! | [`VirtualEnclosure`] | `SensorSource` | Climate model driven by the board's outputs |
//!
//! ## Dependency rule
//!
//! Depends on `sporehub-app` (port traits) and `sporehub-domain` only.

mod board;
mod enclosure;

pub use board::VirtualRelayBoard;
pub use enclosure::{Climate, EnclosureWiring, VirtualEnclosure};

use sporehub_domain::error::SporeHubError;
use sporehub_domain::id::SensorId;
use sporehub_domain::relay::OutputChannel;

/// Failures injected into the virtual hardware.
#[derive(Debug, thiserror::Error)]
pub enum VirtualError {
    #[error("output {0} is faulted")]
    ChannelFault(OutputChannel),

    #[error("sensor {0} did not respond")]
    SensorFault(SensorId),
}

impl From<VirtualError> for SporeHubError {
    fn from(err: VirtualError) -> Self {
        match err {
            VirtualError::ChannelFault(_) => SporeHubError::Driver(Box::new(err)),
            VirtualError::SensorFault(_) => SporeHubError::Sensor(Box::new(err)),
        }
    }
}
