//! Relay driver port: the physical output lines.

use sporehub_domain::error::SporeHubError;
use sporehub_domain::relay::OutputChannel;

/// Drives relay outputs.
///
/// Writes are synchronous and expected to return quickly. The engine is the
/// only caller; a failed write leaves the relay's recorded state unchanged
/// and is retried on the next tick.
pub trait RelayDriver: Send + Sync {
    /// Energize (`on = true`) or release an output channel.
    ///
    /// # Errors
    ///
    /// Returns [`SporeHubError::Driver`] when the output could not be written.
    fn set(&self, channel: OutputChannel, on: bool) -> Result<(), SporeHubError>;
}

impl<T: RelayDriver + ?Sized> RelayDriver for std::sync::Arc<T> {
    fn set(&self, channel: OutputChannel, on: bool) -> Result<(), SporeHubError> {
        (**self).set(channel, on)
    }
}
