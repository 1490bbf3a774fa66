//! In-memory relay board.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use sporehub_app::ports::RelayDriver;
use sporehub_domain::error::SporeHubError;
use sporehub_domain::relay::OutputChannel;

use crate::VirtualError;

/// A relay board that records output levels instead of driving GPIO lines.
///
/// Channels never written read as released. Faulted channels reject every
/// write until the fault is cleared.
#[derive(Debug, Default)]
pub struct VirtualRelayBoard {
    outputs: Mutex<BTreeMap<OutputChannel, bool>>,
    faults: Mutex<BTreeSet<OutputChannel>>,
}

impl VirtualRelayBoard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `channel` is currently energized.
    #[must_use]
    pub fn is_on(&self, channel: OutputChannel) -> bool {
        lock(&self.outputs).get(&channel).copied().unwrap_or(false)
    }

    /// Channels currently energized, ascending.
    #[must_use]
    pub fn energized(&self) -> Vec<OutputChannel> {
        lock(&self.outputs)
            .iter()
            .filter_map(|(channel, on)| on.then_some(*channel))
            .collect()
    }

    /// Make writes to `channel` fail (`faulted = true`) or succeed again.
    pub fn set_fault(&self, channel: OutputChannel, faulted: bool) {
        let mut faults = lock(&self.faults);
        if faulted {
            faults.insert(channel);
        } else {
            faults.remove(&channel);
        }
    }
}

impl RelayDriver for VirtualRelayBoard {
    fn set(&self, channel: OutputChannel, on: bool) -> Result<(), SporeHubError> {
        if lock(&self.faults).contains(&channel) {
            return Err(VirtualError::ChannelFault(channel).into());
        }
        let previous = lock(&self.outputs).insert(channel, on);
        if previous != Some(on) {
            tracing::debug!(%channel, on, "virtual output written");
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
