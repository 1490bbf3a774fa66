//! Tokio runtime around the [`AutomationEngine`].
//!
//! The engine runs on a single task that owns it exclusively. Everything
//! else talks to it through an [`EngineHandle`]: commands go in through a
//! bounded queue and are applied at the start of the next tick, and every
//! tick publishes an [`EngineSnapshot`] on a `watch` channel.
//!
//! A relay self-test runs between two ticks: the engine energizes the relays,
//! the runtime waits one pulse, then the engine releases them. No tick runs
//! while a pulse is in progress.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;

use sporehub_domain::error::{NotFoundError, SporeHubError};
use sporehub_domain::event::Event;
use sporehub_domain::id::RelayId;
use sporehub_domain::manual_override::OverrideCommand;
use sporehub_domain::profile::AutomationProfile;
use sporehub_domain::relay::{RelaySet, SelfTestReport};
use sporehub_domain::sensor::SensorSnapshot;

use crate::automation_engine::{AutomationEngine, Command};
use crate::ports::{Clock, EventPublisher, RelayDriver};
use crate::snapshot::EngineSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub tick_interval: Duration,
    /// Commands that may queue up between two ticks before senders wait.
    pub command_capacity: usize,
    /// How long a self-test keeps each relay energized.
    pub self_test_pulse: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            command_capacity: 64,
            self_test_pulse: Duration::from_secs(1),
        }
    }
}

enum Request {
    Command(Command),
    SelfTest {
        relays: Vec<RelayId>,
        reply: oneshot::Sender<Result<SelfTestReport, SporeHubError>>,
    },
}

/// Cloneable access to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    requests: mpsc::Sender<Request>,
    relays: Arc<RelaySet>,
    snapshots: watch::Receiver<Arc<EngineSnapshot>>,
}

impl EngineHandle {
    /// Hand a fresh sensor snapshot to the engine.
    ///
    /// # Errors
    ///
    /// Returns [`SporeHubError::EngineStopped`] once the engine task is gone.
    pub async fn submit_snapshot(&self, snapshot: SensorSnapshot) -> Result<(), SporeHubError> {
        self.send(Command::UpdateSnapshot(snapshot)).await
    }

    /// Replace the active profile from the next tick on.
    ///
    /// # Errors
    ///
    /// Returns [`SporeHubError::Validation`] for an invalid profile, without
    /// queueing it, or [`SporeHubError::EngineStopped`].
    #[tracing::instrument(skip(self, profile))]
    pub async fn apply_profile(&self, profile: AutomationProfile) -> Result<(), SporeHubError> {
        profile.validate()?;
        self.send(Command::ApplyProfile(Arc::new(profile))).await
    }

    /// Force a relay ON or OFF until its override timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SporeHubError::NotFound`] for an unknown relay, or
    /// [`SporeHubError::EngineStopped`].
    #[tracing::instrument(skip(self))]
    pub async fn override_relay(&self, command: OverrideCommand) -> Result<(), SporeHubError> {
        self.ensure_known(command.relay_id)?;
        self.send(Command::Override(command)).await
    }

    /// Return a relay to automatic control.
    ///
    /// # Errors
    ///
    /// Returns [`SporeHubError::NotFound`] for an unknown relay, or
    /// [`SporeHubError::EngineStopped`].
    #[tracing::instrument(skip(self))]
    pub async fn reset_override(&self, relay_id: RelayId) -> Result<(), SporeHubError> {
        self.ensure_known(relay_id)?;
        self.send(Command::ResetOverride(relay_id)).await
    }

    /// Return every relay to automatic control.
    ///
    /// # Errors
    ///
    /// Returns [`SporeHubError::EngineStopped`] once the engine task is gone.
    #[tracing::instrument(skip(self))]
    pub async fn clear_overrides(&self) -> Result<(), SporeHubError> {
        self.send(Command::ClearOverrides).await
    }

    /// Drive every output OFF, end every override and restore the default
    /// profile.
    ///
    /// # Errors
    ///
    /// Returns [`SporeHubError::EngineStopped`] once the engine task is gone.
    #[tracing::instrument(skip(self))]
    pub async fn factory_reset(&self) -> Result<(), SporeHubError> {
        self.send(Command::FactoryReset).await
    }

    /// Pulse one relay ON then OFF and report whether the driver took both
    /// writes.
    ///
    /// # Errors
    ///
    /// Returns [`SporeHubError::NotFound`] for an unknown relay, or
    /// [`SporeHubError::EngineStopped`].
    #[tracing::instrument(skip(self))]
    pub async fn test_relay(&self, relay_id: RelayId) -> Result<SelfTestReport, SporeHubError> {
        self.ensure_known(relay_id)?;
        self.self_test(vec![relay_id]).await
    }

    /// Pulse every relay, masters first.
    ///
    /// # Errors
    ///
    /// Returns [`SporeHubError::EngineStopped`] once the engine task is gone.
    #[tracing::instrument(skip(self))]
    pub async fn test_all_relays(&self) -> Result<SelfTestReport, SporeHubError> {
        self.self_test(self.relays.ids().collect()).await
    }

    /// The snapshot published after the most recent tick.
    #[must_use]
    pub fn snapshot(&self) -> Arc<EngineSnapshot> {
        Arc::clone(&self.snapshots.borrow())
    }

    /// Receiver notified after every tick.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<EngineSnapshot>> {
        self.snapshots.clone()
    }

    #[must_use]
    pub fn relays(&self) -> &Arc<RelaySet> {
        &self.relays
    }

    fn ensure_known(&self, relay_id: RelayId) -> Result<(), SporeHubError> {
        if self.relays.contains(relay_id) {
            Ok(())
        } else {
            Err(NotFoundError::relay(relay_id).into())
        }
    }

    async fn send(&self, command: Command) -> Result<(), SporeHubError> {
        self.requests
            .send(Request::Command(command))
            .await
            .map_err(|_| SporeHubError::EngineStopped)
    }

    async fn self_test(&self, relays: Vec<RelayId>) -> Result<SelfTestReport, SporeHubError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request::SelfTest { relays, reply })
            .await
            .map_err(|_| SporeHubError::EngineStopped)?;
        response.await.map_err(|_| SporeHubError::EngineStopped)?
    }
}

/// Owns the engine and drives it on a fixed interval.
pub struct EngineRuntime<D, C, P> {
    engine: AutomationEngine<D, C>,
    requests: mpsc::Receiver<Request>,
    snapshots: watch::Sender<Arc<EngineSnapshot>>,
    publisher: P,
    tick_interval: Duration,
    self_test_pulse: Duration,
}

impl<D, C, P> EngineRuntime<D, C, P>
where
    D: RelayDriver,
    C: Clock,
    P: EventPublisher,
{
    #[must_use]
    pub fn new(
        engine: AutomationEngine<D, C>,
        publisher: P,
        settings: RuntimeSettings,
    ) -> (Self, EngineHandle) {
        let (request_tx, request_rx) = mpsc::channel(settings.command_capacity.max(1));
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(engine.snapshot()));
        let handle = EngineHandle {
            requests: request_tx,
            relays: Arc::clone(engine.relays()),
            snapshots: snapshot_rx,
        };
        let runtime = Self {
            engine,
            requests: request_rx,
            snapshots: snapshot_tx,
            publisher,
            tick_interval: settings.tick_interval,
            self_test_pulse: settings.self_test_pulse,
        };
        (runtime, handle)
    }

    /// Initialize the outputs, tick until `stop` turns `true` (or its
    /// sender is dropped), then drive every output OFF.
    ///
    /// Returns the engine so callers can inspect its final state.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> AutomationEngine<D, C> {
        let events = self.engine.initialize();
        self.publish(events).await;
        self.publish_snapshot();

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval = ?self.tick_interval, "automation engine started");

        loop {
            tokio::select! {
                _ = interval.tick() => self.tick().await,
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }

        let events = self.engine.shutdown();
        self.publish(events).await;
        self.publish_snapshot();
        tracing::info!("automation engine stopped");
        self.engine
    }

    async fn tick(&mut self) {
        while let Ok(request) = self.requests.try_recv() {
            match request {
                Request::Command(command) => {
                    if let Err(err) = self.engine.handle(command) {
                        tracing::warn!(%err, "engine command rejected");
                    }
                }
                Request::SelfTest { relays, reply } => {
                    let result = self.self_test(&relays).await;
                    // The caller may have given up waiting.
                    let _ = reply.send(result);
                }
            }
        }
        let report = self.engine.tick();
        self.publish(report.events).await;
        self.publish_snapshot();
    }

    async fn self_test(&mut self, relays: &[RelayId]) -> Result<SelfTestReport, SporeHubError> {
        let pulse = self.engine.begin_self_test(relays)?;
        self.publish_snapshot();
        tokio::time::sleep(self.self_test_pulse).await;
        Ok(self.engine.end_self_test(pulse))
    }

    async fn publish(&self, events: Vec<Event>) {
        for event in events {
            // Fire-and-forget: a failed publish never stops the engine.
            let _ = self.publisher.publish(event).await;
        }
    }

    fn publish_snapshot(&self) {
        // Stores the value even when every receiver is gone.
        self.snapshots.send_replace(Arc::new(self.engine.snapshot()));
    }
}
