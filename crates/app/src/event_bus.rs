//! In-process event bus backed by a tokio broadcast channel.

use std::future::Future;

use tokio::sync::broadcast;

use sporehub_domain::error::SporeHubError;
use sporehub_domain::event::{Event, EventKind, RelayChanged};
use sporehub_domain::id::RelayId;
use sporehub_domain::time::Timestamp;

use crate::ports::EventPublisher;

/// In-process event bus using a tokio [`broadcast`] channel.
///
/// Publishing succeeds even when there are no active subscribers
/// (the event is simply dropped).
pub struct InProcessEventBus {
    sender: broadcast::Sender<Event>,
}

impl InProcessEventBus {
    /// Create a new event bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events published *after* this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Subscribe to relay transitions only, optionally for a single relay.
    #[must_use]
    pub fn subscribe_relay_changes(&self, relay: Option<RelayId>) -> RelayChanges {
        RelayChanges {
            receiver: self.sender.subscribe(),
            relay,
        }
    }
}

/// Stream of [`RelayChanged`] events cut from the bus.
pub struct RelayChanges {
    receiver: broadcast::Receiver<Event>,
    relay: Option<RelayId>,
}

impl RelayChanges {
    /// Next matching transition with its timestamp, or `None` once the bus is gone.
    ///
    /// A lagging receiver skips what it missed and keeps going.
    pub async fn next(&mut self) -> Option<(Timestamp, RelayChanged)> {
        loop {
            match self.receiver.recv().await {
                Ok(Event {
                    kind: EventKind::RelayChanged(change),
                    timestamp,
                    ..
                }) if self.relay.is_none_or(|id| id == change.relay_id) => {
                    return Some((timestamp, change));
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "relay change feed lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl EventPublisher for InProcessEventBus {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), SporeHubError>> + Send {
        // Fails only with zero receivers.
        let _ = self.sender.send(event);
        async { Ok(()) }
    }
}
