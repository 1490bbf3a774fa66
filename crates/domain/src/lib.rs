//! # sporehub-domain
//!
//! Pure domain model for the sporehub enclosure controller.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps and
//!   minute-resolution time-of-day
//! - Define **Relays** (definitions, roles, the validated dependency graph and
//!   the per-relay runtime state)
//! - Define **Profiles** (thresholds, duty cycles, schedule windows)
//! - Define **Sensor snapshots** and the aggregator that produces them
//! - Provide the pure state machines the engine composes: schedule windows,
//!   threshold latches, cycle timers, manual overrides, dependency resolution
//! - Define **Events** emitted by the engine
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod cycle;
pub mod dependency;
pub mod event;
pub mod latch;
pub mod manual_override;
pub mod profile;
pub mod relay;
pub mod schedule;
pub mod sensor;
