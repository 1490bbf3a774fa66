//! Relay: a switched power output driven by the automation engine.
//!
//! A [`RelayDefinition`] is static configuration, a [`RelaySet`] is the
//! validated collection of definitions (including the master/dependent
//! graph), and a [`RelayRuntimeState`] is what the engine tracks per relay
//! while running.

mod definition;
mod role;
mod set;
mod state;

pub use definition::{
    DEFAULT_OVERRIDE_TIMEOUT_SECS, OutputChannel, RelayDefinition, RelayDefinitionBuilder,
};
pub use role::{Co2Trigger, CycleSource, LatchInput, RelayRole};
pub use self_test::{SelfTestOutcome, SelfTestReport};
pub use set::RelaySet;
pub use state::{PauseReason, RelayRuntimeState};
