//! # sporehub-app
//!
//! Application layer: the automation engine and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `RelayDriver`: switch a relay output on or off
//!   - `SensorSource`: read one sensor
//!   - `Clock`: current instant and local wall-clock time
//!   - `EventPublisher`: broadcast domain events
//! - Provide the `AutomationEngine`, which turns sensor snapshots, the active
//!   profile and manual overrides into relay writes once per tick
//! - Run the engine on a tokio task behind a command queue (`EngineRuntime`,
//!   `EngineHandle`) and poll sensors into it (`SensorFeed`)
//! - Provide **in-process infrastructure** (event bus, clocks) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `sporehub-domain` only (plus `tokio::sync` and `tokio::time`).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod automation_engine;
pub mod clock;
pub mod event_bus;
pub mod ports;
pub mod runtime;
pub mod sensor_feed;
pub mod snapshot;
