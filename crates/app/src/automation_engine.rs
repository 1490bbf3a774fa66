//! Automation engine: turns sensor data, the active profile and manual
//! overrides into relay writes.
//!
//! The engine is synchronous and owns all relay runtime state. Inputs
//! (snapshots, profiles, override commands) are applied between ticks; each
//! [`tick`](AutomationEngine::tick):
//! 1. expires due overrides;
//! 2. derives the sensor inputs and detects stale data;
//! 3. decides every non-master relay (hybrids last, so they can follow);
//! 4. resolves masters and interlocks;
//! 5. writes the relays whose state must change, OFF writes before ON
//!    writes, never energizing a dependent before its master.

mod decision;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::TimeDelta;

use sporehub_domain::cycle::CycleTimer;
use sporehub_domain::dependency::{Decision, DependencyResolver};
use sporehub_domain::error::{NotFoundError, SporeHubError, ValidationError};
use sporehub_domain::event::{ChangeCause, Event, EventKind};
use sporehub_domain::id::RelayId;
use sporehub_domain::manual_override::OverrideCommand;
use sporehub_domain::profile::AutomationProfile;
use sporehub_domain::relay::{
    RelayDefinition, RelayRole, RelayRuntimeState, RelaySet, SelfTestOutcome, SelfTestReport,
};
use sporehub_domain::sensor::SensorSnapshot;
use sporehub_domain::time::{TimeOfDay, Timestamp};

use self::decision::{SensorInputs, TickContext};
use crate::ports::{Clock, RelayDriver};
use crate::snapshot::{EngineSnapshot, RelayView, SensorStatus};

/// Engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// A snapshot older than this pauses environmental logic.
    pub stale_after: TimeDelta,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            stale_after: TimeDelta::seconds(120),
        }
    }
}

/// An input for the engine, applied between ticks in receipt order.
#[derive(Debug, Clone)]
pub enum Command {
    UpdateSnapshot(SensorSnapshot),
    ApplyProfile(Arc<AutomationProfile>),
    Override(OverrideCommand),
    ResetOverride(RelayId),
    ClearOverrides,
    FactoryReset,
}

/// Relays energized by [`AutomationEngine::begin_self_test`] and not yet
/// released.
#[derive(Debug, Default)]
#[must_use = "energized relays stay on until the pulse is ended"]
pub struct SelfTestPulse {
    energized: Vec<RelayId>,
    report: SelfTestReport,
}

/// Outcome of one tick.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Events raised since the previous tick, in order.
    pub events: Vec<Event>,
    /// Successful driver writes.
    pub writes: usize,
}

pub struct AutomationEngine<D, C> {
    relays: Arc<RelaySet>,
    profile: Arc<AutomationProfile>,
    driver: D,
    clock: C,
    settings: EngineSettings,
    states: BTreeMap<RelayId, RelayRuntimeState>,
    timers: BTreeMap<RelayId, CycleTimer>,
    sensors: Option<SensorSnapshot>,
    sensor_status: SensorStatus,
    /// Events raised by commands, delivered with the next tick.
    pending: Vec<Event>,
}

impl<D, C> AutomationEngine<D, C>
where
    D: RelayDriver,
    C: Clock,
{
    /// Create an engine with every relay OFF and in automatic mode.
    ///
    /// # Errors
    ///
    /// Returns [`SporeHubError::Validation`] if `profile` is invalid.
    pub fn new(
        relays: Arc<RelaySet>,
        profile: Arc<AutomationProfile>,
        driver: D,
        clock: C,
        settings: EngineSettings,
    ) -> Result<Self, SporeHubError> {
        profile.validate()?;
        let states = relays
            .ids()
            .map(|id| (id, RelayRuntimeState::new(id)))
            .collect();
        Ok(Self {
            relays,
            profile,
            driver,
            clock,
            settings,
            states,
            timers: BTreeMap::new(),
            sensors: None,
            sensor_status: SensorStatus::AwaitingData,
            pending: Vec::new(),
        })
    }

    #[must_use]
    pub fn relays(&self) -> &Arc<RelaySet> {
        &self.relays
    }

    #[must_use]
    pub fn profile(&self) -> &Arc<AutomationProfile> {
        &self.profile
    }

    #[must_use]
    pub fn state(&self, id: RelayId) -> Option<&RelayRuntimeState> {
        self.states.get(&id)
    }

    #[must_use]
    pub fn sensor_status(&self) -> SensorStatus {
        self.sensor_status
    }

    #[must_use]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Drive every output OFF, whatever the board was left in.
    pub fn initialize(&mut self) -> Vec<Event> {
        let now = self.clock.now();
        let mut events = Vec::new();
        let relays = Arc::clone(&self.relays);
        for def in off_order(&relays) {
            self.write(def, false, ChangeCause::Startup, now, &mut events);
        }
        tracing::info!(relays = relays.len(), "relay outputs initialized off");
        events
    }

    /// Drive every output OFF before the process exits.
    pub fn shutdown(&mut self) -> Vec<Event> {
        let now = self.clock.now();
        let mut events = std::mem::take(&mut self.pending);
        let relays = Arc::clone(&self.relays);
        for def in off_order(&relays) {
            self.write(def, false, ChangeCause::Shutdown, now, &mut events);
        }
        tracing::info!("relay outputs driven off for shutdown");
        events
    }

    // ── Commands ───────────────────────────────────────────────────

    /// Apply one queued command.
    ///
    /// # Errors
    ///
    /// Returns the error of the underlying operation; engine state is
    /// unchanged when it fails.
    pub fn handle(&mut self, command: Command) -> Result<(), SporeHubError> {
        match command {
            Command::UpdateSnapshot(snapshot) => {
                self.update_snapshot(snapshot);
                Ok(())
            }
            Command::ApplyProfile(profile) => {
                self.apply_profile(profile).map_err(SporeHubError::from)
            }
            Command::Override(command) => self.apply_override(command),
            Command::ResetOverride(id) => self.reset_override(id),
            Command::ClearOverrides => {
                self.clear_overrides();
                Ok(())
            }
            Command::FactoryReset => {
                self.factory_reset();
                Ok(())
            }
        }
    }

    /// Hold a new sensor snapshot. Returns `false` if it is older than the
    /// one already held and was ignored.
    pub fn update_snapshot(&mut self, snapshot: SensorSnapshot) -> bool {
        if let Some(held) = &self.sensors
            && snapshot.captured_at < held.captured_at
        {
            tracing::debug!(
                captured_at = %snapshot.captured_at,
                held = %held.captured_at,
                "ignoring out-of-order sensor snapshot"
            );
            return false;
        }
        self.sensors = Some(snapshot);
        true
    }

    /// Swap the active profile.
    ///
    /// # Errors
    ///
    /// Returns the [`ValidationError`] of an invalid profile; the previous
    /// profile stays active.
    pub fn apply_profile(
        &mut self,
        profile: Arc<AutomationProfile>,
    ) -> Result<(), ValidationError> {
        profile.validate()?;
        self.profile = profile;
        self.pending
            .push(Event::at(EventKind::ProfileApplied, self.clock.now()));
        tracing::info!("automation profile applied");
        Ok(())
    }

    /// Force a relay ON or OFF until its override timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SporeHubError::NotFound`] for an unknown relay.
    pub fn apply_override(&mut self, command: OverrideCommand) -> Result<(), SporeHubError> {
        let id = command.relay_id;
        let timeout = self
            .relays
            .get(id)
            .map(|def| def.override_timeout_secs)
            .ok_or_else(|| NotFoundError::relay(id))?;
        let state = self
            .states
            .get_mut(&id)
            .ok_or_else(|| NotFoundError::relay(id))?;
        let active = state.mode.engage(&command, timeout);
        tracing::info!(relay = %id, on = command.desired_on, expires_at = %active.expires_at, "override engaged");
        self.pending.push(Event::at(
            EventKind::OverrideEngaged {
                relay_id: id,
                desired_on: active.desired_on,
                expires_at: active.expires_at,
            },
            self.clock.now(),
        ));
        Ok(())
    }

    /// End a relay's override now.
    ///
    /// # Errors
    ///
    /// Returns [`SporeHubError::NotFound`] for an unknown relay.
    pub fn reset_override(&mut self, id: RelayId) -> Result<(), SporeHubError> {
        let state = self
            .states
            .get_mut(&id)
            .ok_or_else(|| NotFoundError::relay(id))?;
        if state.mode.clear().is_some() {
            tracing::info!(relay = %id, "override cleared");
            self.pending.push(Event::at(
                EventKind::OverrideCleared { relay_id: id },
                self.clock.now(),
            ));
            self.restart_timer(id);
        }
        Ok(())
    }

    /// End every active override.
    pub fn clear_overrides(&mut self) {
        let ids: Vec<RelayId> = self.states.keys().copied().collect();
        for id in ids {
            // Every id comes from `states`, so this cannot miss.
            let _ = self.reset_override(id);
        }
    }

    // ── Maintenance ────────────────────────────────────────────────

    /// Energize `ids` for a self-test.
    ///
    /// Masters come up before their dependents. A relay held OFF by an
    /// override, its own or a master's, is skipped. A relay that is already
    /// ON only gets its level rewritten and stays on afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`SporeHubError::NotFound`] for an unknown relay; nothing is
    /// written in that case.
    pub fn begin_self_test(&mut self, ids: &[RelayId]) -> Result<SelfTestPulse, SporeHubError> {
        if let Some(unknown) = ids.iter().find(|id| !self.relays.contains(**id)) {
            return Err(NotFoundError::relay(*unknown).into());
        }
        let now = self.clock.now();
        let relays = Arc::clone(&self.relays);
        let mut events = Vec::new();
        let mut pulse = SelfTestPulse::default();

        for def in on_order(&relays) {
            if !ids.contains(&def.id) {
                continue;
            }
            let outcome = self.pulse_on(&relays, def, now, &mut pulse.energized, &mut events);
            pulse.report.results.insert(def.id, outcome);
        }
        self.pending.extend(events);
        Ok(pulse)
    }

    fn pulse_on(
        &mut self,
        relays: &RelaySet,
        def: &RelayDefinition,
        now: Timestamp,
        energized: &mut Vec<RelayId>,
        events: &mut Vec<Event>,
    ) -> SelfTestOutcome {
        if let Some(held) = std::iter::once(def.id)
            .chain(def.depends_on.iter().copied())
            .find(|id| self.held_off(*id))
        {
            return SelfTestOutcome::Skipped {
                message: format!("relay {held} is held off by an override"),
            };
        }
        for master in &def.depends_on {
            if self.is_on(*master) {
                continue;
            }
            let Some(master_def) = relays.get(*master) else {
                continue;
            };
            if let Err(err) = self.try_write(master_def, true, ChangeCause::SelfTest, now, events) {
                return SelfTestOutcome::Failed {
                    message: format!("master {master} could not be energized: {err}"),
                };
            }
            energized.push(*master);
        }
        let was_on = self.is_on(def.id);
        if let Err(message) = self.try_write(def, true, ChangeCause::SelfTest, now, events) {
            return SelfTestOutcome::Failed { message };
        }
        if !was_on {
            energized.push(def.id);
        }
        SelfTestOutcome::Passed
    }

    /// Release what [`Self::begin_self_test`] energized, dependents first,
    /// and report every pulsed relay.
    pub fn end_self_test(&mut self, pulse: SelfTestPulse) -> SelfTestReport {
        let SelfTestPulse {
            energized,
            mut report,
        } = pulse;
        let now = self.clock.now();
        let relays = Arc::clone(&self.relays);
        let mut events = Vec::new();

        for def in off_order(&relays) {
            if !energized.contains(&def.id) {
                continue;
            }
            if relays.dependents_of(def.id).any(|d| self.is_on(d.id)) {
                // Left to the next tick, like any master with a live dependent.
                continue;
            }
            if let Err(err) = self.try_write(def, false, ChangeCause::SelfTest, now, &mut events)
                && let Some(outcome) = report.results.get_mut(&def.id)
                && outcome.is_passed()
            {
                *outcome = SelfTestOutcome::Failed {
                    message: format!("release failed: {err}"),
                };
            }
        }

        let not_passed = report.not_passed();
        tracing::info!(tested = report.results.len(), ?not_passed, "relay self-test complete");
        events.push(Event::at(
            EventKind::SelfTestCompleted {
                tested: report.results.len(),
                not_passed,
            },
            now,
        ));
        self.pending.extend(events);
        report
    }

    /// Drive every output OFF, end every override and restore the default
    /// profile. Automation resumes from a clean state on the next tick.
    pub fn factory_reset(&mut self) {
        let now = self.clock.now();
        let relays = Arc::clone(&self.relays);
        let mut events = Vec::new();
        for def in off_order(&relays) {
            if relays.dependents_of(def.id).any(|d| self.is_on(d.id)) {
                continue;
            }
            self.write(def, false, ChangeCause::FactoryReset, now, &mut events);
        }
        self.pending.extend(events);

        self.clear_overrides();
        for state in self.states.values_mut() {
            state.latch = None;
        }
        self.timers.clear();
        self.profile = Arc::new(AutomationProfile::default());
        self.pending.push(Event::at(EventKind::FactoryReset, now));
        tracing::info!("factory reset: outputs off, overrides cleared, default profile restored");
    }

    fn held_off(&self, id: RelayId) -> bool {
        self.states
            .get(&id)
            .is_some_and(|s| s.mode.override_value() == Some(false))
    }

    // ── Tick ───────────────────────────────────────────────────────

    /// Run one evaluate-and-apply cycle.
    pub fn tick(&mut self) -> TickReport {
        let now = self.clock.now();
        let local = TimeOfDay::from_naive(self.clock.local_now().time());
        let mut events = std::mem::take(&mut self.pending);

        self.expire_overrides(now, &mut events);
        let inputs = self.refresh_sensor_inputs(now, &mut events);

        let relays = Arc::clone(&self.relays);
        let profile = Arc::clone(&self.profile);
        let ctx = TickContext {
            now,
            local,
            profile: &profile,
            inputs,
        };

        let mut decisions = BTreeMap::new();
        let (hybrids, others): (Vec<&RelayDefinition>, Vec<&RelayDefinition>) = relays
            .iter()
            .partition(|def| matches!(def.role, RelayRole::Hybrid { .. }));
        for def in others.into_iter().chain(hybrids) {
            let Some(state) = self.states.get_mut(&def.id) else {
                continue;
            };
            if let Some(d) = decision::decide(def, state, &mut self.timers, &decisions, &ctx) {
                decisions.insert(def.id, d);
            }
        }

        let states = &self.states;
        DependencyResolver::new(&relays).resolve(&mut decisions, |id| {
            states.get(&id).is_some_and(|s| s.physical_on)
        });

        let writes = self.apply(&relays, &decisions, now, &mut events);
        tracing::trace!(writes, events = events.len(), "tick complete");
        TickReport { events, writes }
    }

    fn expire_overrides(&mut self, now: Timestamp, events: &mut Vec<Event>) {
        let mut expired = Vec::new();
        for (id, state) in &mut self.states {
            if let Some(active) = state.mode.expire_if_due(now) {
                tracing::info!(relay = %id, was_on = active.desired_on, "override expired");
                events.push(Event::at(EventKind::OverrideExpired { relay_id: *id }, now));
                expired.push(*id);
            }
        }
        for id in expired {
            self.restart_timer(id);
        }
    }

    fn restart_timer(&mut self, id: RelayId) {
        if let Some(def) = self.relays.get(id)
            && let Some(timer) = self.timers.get_mut(&decision::timer_key(def))
        {
            timer.restart();
        }
    }

    fn refresh_sensor_inputs(&mut self, now: Timestamp, events: &mut Vec<Event>) -> SensorInputs {
        let (status, inputs) = match &self.sensors {
            None => (SensorStatus::AwaitingData, SensorInputs::stale()),
            Some(snapshot) if now - snapshot.captured_at > self.settings.stale_after => {
                (SensorStatus::Stale, SensorInputs::stale())
            }
            Some(snapshot) => (SensorStatus::Fresh, SensorInputs::from_snapshot(snapshot)),
        };

        let captured_at = self.sensors.as_ref().map(|s| s.captured_at);
        match (self.sensor_status, status) {
            (SensorStatus::Stale, SensorStatus::Stale) => {}
            (_, SensorStatus::Stale) => {
                tracing::warn!(?captured_at, "sensor data is stale, environmental relays paused");
                events.push(Event::at(EventKind::SensorStale { captured_at }, now));
            }
            (SensorStatus::Stale, SensorStatus::Fresh) => {
                tracing::info!("sensor data recovered");
                events.push(Event::at(EventKind::SensorRecovered, now));
            }
            _ => {}
        }
        self.sensor_status = status;
        inputs
    }

    /// Write every relay whose decision differs from its output.
    fn apply(
        &mut self,
        relays: &RelaySet,
        decisions: &BTreeMap<RelayId, Decision>,
        now: Timestamp,
        events: &mut Vec<Event>,
    ) -> usize {
        let mut writes = 0;

        for def in off_order(relays) {
            let Some(decision) = decisions.get(&def.id) else {
                continue;
            };
            if decision.on || !self.is_on(def.id) {
                continue;
            }
            if let Some(dependent) = relays.dependents_of(def.id).find(|d| self.is_on(d.id)) {
                tracing::debug!(relay = %def.id, dependent = %dependent.id, "master off deferred");
                continue;
            }
            if self.write(def, false, decision.cause, now, events) {
                writes += 1;
            }
        }

        for def in on_order(relays) {
            let Some(decision) = decisions.get(&def.id) else {
                continue;
            };
            if !decision.on || self.is_on(def.id) {
                continue;
            }
            if let Some(master) = def.depends_on.iter().find(|m| !self.is_on(**m)) {
                tracing::debug!(relay = %def.id, %master, "on write deferred until master is energized");
                continue;
            }
            if self.write(def, true, decision.cause, now, events) {
                writes += 1;
            }
        }

        writes
    }

    fn is_on(&self, id: RelayId) -> bool {
        self.states.get(&id).is_some_and(|s| s.physical_on)
    }

    /// Write one output. Returns whether the driver accepted it.
    fn write(
        &mut self,
        def: &RelayDefinition,
        on: bool,
        cause: ChangeCause,
        now: Timestamp,
        events: &mut Vec<Event>,
    ) -> bool {
        self.try_write(def, on, cause, now, events).is_ok()
    }

    /// Write one output, returning the driver error chain on failure.
    fn try_write(
        &mut self,
        def: &RelayDefinition,
        on: bool,
        cause: ChangeCause,
        now: Timestamp,
        events: &mut Vec<Event>,
    ) -> Result<(), String> {
        let Some(state) = self.states.get_mut(&def.id) else {
            return Err(NotFoundError::relay(def.id).to_string());
        };
        match self.driver.set(def.output_channel, on) {
            Ok(()) => {
                let changed = state.physical_on != on;
                state.record_change(on, cause, now);
                if changed {
                    tracing::info!(relay = %def.id, name = %def.display_name, on, %cause, "relay switched");
                    events.push(Event::relay_changed(def.id, on, cause, now));
                }
                Ok(())
            }
            Err(err) => {
                state.write_failures = state.write_failures.saturating_add(1);
                tracing::warn!(
                    relay = %def.id,
                    on,
                    %err,
                    failures = state.write_failures,
                    "relay write failed"
                );
                let error = error_chain(&err);
                events.push(Event::at(
                    EventKind::DriverWriteFailed {
                        relay_id: def.id,
                        desired_on: on,
                        error: error.clone(),
                    },
                    now,
                ));
                Err(error)
            }
        }
    }

    // ── Read model ─────────────────────────────────────────────────

    /// Copy of the current engine state.
    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        let relays = self
            .relays
            .iter()
            .filter_map(|def| {
                self.states
                    .get(&def.id)
                    .map(|state| RelayView::new(def, state.clone()))
            })
            .collect();
        EngineSnapshot {
            taken_at: self.clock.now(),
            local_time: self.clock.local_now(),
            weekday: self.clock.weekday(),
            sensor_status: self.sensor_status,
            sensors: self.sensors.clone(),
            profile: (*self.profile).clone(),
            relays,
        }
    }
}

/// Dependents before masters.
fn off_order(relays: &RelaySet) -> Vec<&RelayDefinition> {
    let (masters, mut order): (Vec<_>, Vec<_>) = relays.iter().partition(|d| d.role.is_master());
    order.extend(masters);
    order
}

/// Masters before dependents.
fn on_order(relays: &RelaySet) -> Vec<&RelayDefinition> {
    let (mut order, dependents): (Vec<_>, Vec<_>) = relays.iter().partition(|d| d.role.is_master());
    order.extend(dependents);
    order
}

/// `err: source: source…`
fn error_chain(err: &SporeHubError) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::TimeZone;

    use super::*;
    use crate::clock::ManualClock;
    use sporehub_domain::cycle::{CyclePhase, DutyCycle};
    use sporehub_domain::event::RelayChanged;
    use sporehub_domain::id::SensorId;
    use sporehub_domain::relay::{CycleSource, LatchInput, OutputChannel, PauseReason};
    use sporehub_domain::schedule::ScheduleWindow;
    use sporehub_domain::sensor::Quantity;

    // ── Recording driver ───────────────────────────────────────────

    #[derive(Default)]
    struct RecordingDriver {
        writes: Mutex<Vec<(u8, bool)>>,
        failing: Mutex<Vec<u8>>,
    }

    #[derive(Debug)]
    struct Stuck;

    impl std::fmt::Display for Stuck {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("channel stuck")
        }
    }

    impl std::error::Error for Stuck {}

    impl RelayDriver for RecordingDriver {
        fn set(&self, channel: OutputChannel, on: bool) -> Result<(), SporeHubError> {
            if self.failing.lock().unwrap().contains(&channel.get()) {
                return Err(SporeHubError::Driver(Box::new(Stuck)));
            }
            self.writes.lock().unwrap().push((channel.get(), on));
            Ok(())
        }
    }

    impl RecordingDriver {
        fn fail(&self, channel: u8) {
            self.failing.lock().unwrap().push(channel);
        }

        fn heal(&self) {
            self.failing.lock().unwrap().clear();
        }

        fn writes(&self) -> Vec<(u8, bool)> {
            self.writes.lock().unwrap().clone()
        }

        fn clear(&self) {
            self.writes.lock().unwrap().clear();
        }
    }

    // ── Helpers ────────────────────────────────────────────────────

    type TestEngine = AutomationEngine<Arc<RecordingDriver>, Arc<ManualClock>>;

    struct Harness {
        engine: TestEngine,
        driver: Arc<RecordingDriver>,
        clock: Arc<ManualClock>,
    }

    impl Harness {
        fn new(relays: RelaySet, profile: AutomationProfile) -> Self {
            let driver = Arc::new(RecordingDriver::default());
            let clock = Arc::new(ManualClock::new(t0()));
            let mut engine = AutomationEngine::new(
                Arc::new(relays),
                Arc::new(profile),
                Arc::clone(&driver),
                Arc::clone(&clock),
                EngineSettings::default(),
            )
            .unwrap();
            engine.initialize();
            driver.clear();
            Self {
                engine,
                driver,
                clock,
            }
        }

        fn standard() -> Self {
            Self::new(RelaySet::standard(), AutomationProfile::default())
        }

        fn feed(&mut self, temp: f64, humidity: f64, co2: f64) {
            let snapshot = SensorSnapshot::uniform(temp, humidity, co2, self.clock.now());
            self.engine.update_snapshot(snapshot);
        }

        fn advance(&self, secs: i64) {
            self.clock.advance(TimeDelta::seconds(secs));
        }

        fn on(&self, n: u8) -> bool {
            self.engine.state(id(n)).unwrap().physical_on
        }

        fn override_relay(&mut self, n: u8, on: bool) {
            let command = OverrideCommand::new(id(n), on, self.clock.now());
            self.engine.apply_override(command).unwrap();
        }
    }

    /// Monday noon: inside every default window.
    fn t0() -> Timestamp {
        chrono::Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap()
    }

    fn id(n: u8) -> RelayId {
        RelayId::new(n).unwrap()
    }

    fn relay(n: u8, role: RelayRole, deps: &[u8]) -> RelayDefinition {
        let mut builder = RelayDefinition::builder(id(n))
            .name(format!("relay {n}"))
            .channel(n + 10)
            .role(role);
        for &d in deps {
            builder = builder.depends_on(id(d));
        }
        builder.build().unwrap()
    }

    /// Master plus humidifier only.
    fn psu_and_humidifier() -> RelaySet {
        RelaySet::new(vec![
            relay(1, RelayRole::Master, &[]),
            relay(
                5,
                RelayRole::Latch {
                    input: LatchInput::Humidity,
                },
                &[1],
            ),
        ])
        .unwrap()
    }

    fn relay_changes(events: &[Event]) -> Vec<RelayChanged> {
        events
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::RelayChanged(change) => Some(*change),
                _ => None,
            })
            .collect()
    }

    fn assert_dependency_invariant(engine: &TestEngine) {
        for def in engine.relays().iter() {
            if engine.state(def.id).unwrap().physical_on {
                for master in &def.depends_on {
                    assert!(
                        engine.state(*master).unwrap().physical_on,
                        "{} is on while master {master} is off",
                        def.id
                    );
                }
            }
        }
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    #[test]
    fn should_drive_every_output_off_on_initialize() {
        let driver = Arc::new(RecordingDriver::default());
        let clock = Arc::new(ManualClock::new(t0()));
        let mut engine = AutomationEngine::new(
            Arc::new(RelaySet::standard()),
            Arc::new(AutomationProfile::default()),
            Arc::clone(&driver),
            clock,
            EngineSettings::default(),
        )
        .unwrap();
        let events = engine.initialize();
        assert!(events.is_empty());
        let writes = driver.writes();
        assert_eq!(writes.len(), 8);
        assert!(writes.iter().all(|(_, on)| !on));
        // Main PSU (channel 18) is released last.
        assert_eq!(writes.last(), Some(&(18, false)));
        assert_eq!(
            engine.state(id(3)).unwrap().last_cause,
            Some(ChangeCause::Startup)
        );
    }

    #[test]
    fn should_reject_invalid_profile_at_construction() {
        let mut profile = AutomationProfile::default();
        profile.temperature.low = 30.0;
        let result = AutomationEngine::new(
            Arc::new(RelaySet::standard()),
            Arc::new(profile),
            RecordingDriver::default(),
            ManualClock::new(t0()),
            EngineSettings::default(),
        );
        assert!(matches!(result, Err(SporeHubError::Validation(_))));
    }

    #[test]
    fn should_drive_everything_off_on_shutdown() {
        let mut h = Harness::standard();
        h.feed(22.0, 45.0, 900.0);
        h.engine.tick();
        assert!(h.on(1));
        assert!(h.on(5));

        let events = h.engine.shutdown();
        assert!(RelayId::all().all(|r| !h.on(r.get())));
        let changes = relay_changes(&events);
        assert!(changes.iter().all(|c| c.cause == ChangeCause::Shutdown && !c.new_state));
        assert_eq!(changes.last().map(|c| c.relay_id), Some(id(1)));
    }

    // ── Thresholds ─────────────────────────────────────────────────

    #[test]
    fn should_run_humidifier_scenario() {
        let mut h = Harness::standard();
        h.feed(22.0, 45.0, 900.0);
        let report = h.engine.tick();
        assert!(h.on(5));
        assert!(relay_changes(&report.events).contains(&RelayChanged {
            relay_id: id(5),
            new_state: true,
            cause: ChangeCause::Threshold(Quantity::Humidity),
        }));

        h.advance(1);
        h.feed(22.0, 86.0, 900.0);
        h.engine.tick();
        assert!(!h.on(5));

        h.advance(1);
        h.feed(22.0, 60.0, 900.0);
        h.engine.tick();
        assert!(!h.on(5));
    }

    #[test]
    fn should_run_ventilation_scenario() {
        let mut profile = AutomationProfile::default();
        profile.co2.low = 1100.0;
        profile.co2.high = 1600.0;
        profile.fan_cycle.duty = DutyCycle::new(1, 60);
        let mut h = Harness::new(RelaySet::standard(), profile);
        h.feed(22.0, 70.0, 1000.0);
        h.engine.tick();
        // Leave the fan cycle's ON minute.
        h.advance(120);
        h.feed(22.0, 70.0, 1000.0);
        h.engine.tick();
        assert!(!h.on(7));

        h.advance(1);
        h.feed(22.0, 70.0, 1700.0);
        h.engine.tick();
        assert!(h.on(7));
        assert_eq!(
            h.engine.state(id(7)).unwrap().last_cause,
            Some(ChangeCause::Threshold(Quantity::Co2))
        );

        h.advance(1);
        h.feed(22.0, 70.0, 900.0);
        h.engine.tick();
        assert!(!h.on(7));
    }

    #[test]
    fn should_heat_without_power_rail() {
        let relays = RelaySet::new(vec![
            relay(1, RelayRole::Master, &[]),
            relay(
                6,
                RelayRole::Latch {
                    input: LatchInput::Temperature,
                },
                &[],
            ),
        ])
        .unwrap();
        let mut h = Harness::new(relays, AutomationProfile::default());
        h.feed(18.0, 70.0, 900.0);
        h.engine.tick();
        assert!(h.on(6));
        assert!(!h.on(1));
        assert_eq!(h.driver.writes(), vec![(16, true)]);
    }

    // ── Dependencies ───────────────────────────────────────────────

    #[test]
    fn should_energize_master_before_dependent() {
        let mut h = Harness::new(psu_and_humidifier(), AutomationProfile::default());
        h.feed(22.0, 45.0, 900.0);
        let report = h.engine.tick();
        assert_eq!(h.driver.writes(), vec![(11, true), (15, true)]);
        assert_eq!(report.writes, 2);
        assert_eq!(
            h.engine.state(id(1)).unwrap().last_cause,
            Some(ChangeCause::Dependency)
        );
    }

    #[test]
    fn should_release_master_one_tick_after_last_dependent() {
        let mut h = Harness::new(psu_and_humidifier(), AutomationProfile::default());
        h.feed(22.0, 45.0, 900.0);
        h.engine.tick();

        h.advance(1);
        h.feed(22.0, 90.0, 900.0);
        h.engine.tick();
        assert!(!h.on(5));
        assert!(h.on(1));

        h.advance(1);
        h.engine.tick();
        assert!(!h.on(1));
    }

    #[test]
    fn should_defer_dependent_while_master_write_fails() {
        let mut h = Harness::new(psu_and_humidifier(), AutomationProfile::default());
        h.driver.fail(11);
        h.feed(22.0, 45.0, 900.0);
        let report = h.engine.tick();
        assert!(!h.on(1));
        assert!(!h.on(5));
        assert_eq!(h.engine.state(id(1)).unwrap().write_failures, 1);
        assert!(report.events.iter().any(|e| matches!(
            &e.kind,
            EventKind::DriverWriteFailed { relay_id, error, .. }
                if *relay_id == id(1) && error == "relay driver error: channel stuck"
        )));

        h.driver.heal();
        h.advance(1);
        h.engine.tick();
        assert!(h.on(1));
        assert!(h.on(5));
        assert_eq!(h.engine.state(id(1)).unwrap().write_failures, 0);
    }

    #[test]
    fn should_keep_master_on_while_dependent_off_write_fails() {
        let mut h = Harness::new(psu_and_humidifier(), AutomationProfile::default());
        h.feed(22.0, 45.0, 900.0);
        h.engine.tick();
        h.driver.fail(15);
        for _ in 0..3 {
            h.advance(1);
            h.feed(22.0, 90.0, 900.0);
            h.engine.tick();
            assert!(h.on(5));
            assert!(h.on(1));
        }
    }

    #[test]
    fn should_clamp_dependent_while_master_is_overridden_off() {
        let mut h = Harness::standard();
        h.feed(22.0, 45.0, 900.0);
        h.engine.tick();
        assert!(h.on(5));

        h.override_relay(1, false);
        h.advance(1);
        h.feed(22.0, 45.0, 900.0);
        let report = h.engine.tick();
        assert!(!h.on(1));
        assert!(!h.on(5));
        assert!(relay_changes(&report.events).contains(&RelayChanged {
            relay_id: id(5),
            new_state: false,
            cause: ChangeCause::Interlock,
        }));
        assert_dependency_invariant(&h.engine);

        h.advance(300);
        h.feed(22.0, 45.0, 900.0);
        let report = h.engine.tick();
        assert!(h.on(1));
        assert!(h.on(5));
        assert!(report.events.iter().any(|e| matches!(
            e.kind,
            EventKind::OverrideExpired { relay_id } if relay_id == id(1)
        )));
    }

    #[test]
    fn should_clamp_dependent_even_under_its_own_override() {
        let mut h = Harness::standard();
        h.feed(22.0, 70.0, 1500.0);
        h.override_relay(1, false);
        h.override_relay(8, true);
        h.override_relay(2, true);
        h.engine.tick();
        assert!(!h.on(2));
        assert!(h.on(8));
    }

    #[test]
    fn should_hold_dependency_invariant_over_a_simulated_day() {
        let mut h = Harness::standard();
        for minute in 0..(24 * 60) {
            let humidity = 40.0 + f64::from(minute % 60);
            let co2 = 700.0 + f64::from(minute % 90) * 12.0;
            h.feed(21.0, humidity, co2);
            h.engine.tick();
            assert_dependency_invariant(&h.engine);
            h.advance(60);
        }
    }

    // ── Overrides ──────────────────────────────────────────────────

    #[test]
    fn should_return_to_automatic_decision_after_override_timeout() {
        let mut h = Harness::standard();
        h.feed(22.0, 45.0, 900.0);
        h.engine.tick();
        assert!(h.on(5));

        h.override_relay(5, false);
        let report = h.engine.tick();
        assert!(!h.on(5));
        assert!(report.events.iter().any(|e| matches!(
            e.kind,
            EventKind::OverrideEngaged { desired_on: false, .. }
        )));
        assert_eq!(
            h.engine.state(id(5)).unwrap().last_cause,
            Some(ChangeCause::Override)
        );

        h.advance(299);
        h.feed(22.0, 45.0, 900.0);
        h.engine.tick();
        assert!(!h.on(5));

        h.advance(2);
        h.feed(22.0, 45.0, 900.0);
        h.engine.tick();
        assert!(h.on(5));
        assert!(!h.engine.state(id(5)).unwrap().mode.is_override());
    }

    #[test]
    fn should_return_not_found_for_unknown_relay() {
        let mut h = Harness::new(psu_and_humidifier(), AutomationProfile::default());
        let result = h
            .engine
            .apply_override(OverrideCommand::new(id(8), true, t0()));
        assert!(matches!(result, Err(SporeHubError::NotFound(_))));
        assert!(matches!(
            h.engine.reset_override(id(7)),
            Err(SporeHubError::NotFound(_))
        ));
    }

    #[test]
    fn should_reset_override_early() {
        let mut h = Harness::standard();
        h.override_relay(8, true);
        h.engine.tick();
        assert!(h.on(8));

        h.engine.reset_override(id(8)).unwrap();
        let report = h.engine.tick();
        assert!(!h.on(8));
        assert!(report.events.iter().any(|e| matches!(
            e.kind,
            EventKind::OverrideCleared { relay_id } if relay_id == id(8)
        )));
    }

    #[test]
    fn should_clear_every_override() {
        let mut h = Harness::standard();
        h.override_relay(8, true);
        h.override_relay(6, true);
        h.engine.clear_overrides();
        assert!(
            RelayId::all().all(|r| !h.engine.state(r).unwrap().mode.is_override())
        );
        let report = h.engine.tick();
        let cleared = report
            .events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::OverrideCleared { .. }))
            .count();
        assert_eq!(cleared, 2);
    }

    // ── Cycles and schedules ───────────────────────────────────────

    #[test]
    fn should_accumulate_duty_cycle_on_time() {
        let relays = RelaySet::new(vec![relay(
            7,
            RelayRole::Cycle {
                cycle: CycleSource::Fan,
            },
            &[],
        )])
        .unwrap();
        let mut h = Harness::new(relays, AutomationProfile::default());
        let mut on_minutes = 0;
        for _ in 0..(3 * 60) {
            h.engine.tick();
            if h.on(7) {
                on_minutes += 1;
            }
            h.advance(60);
        }
        assert_eq!(on_minutes, 3 * 15);
    }

    #[test]
    fn should_never_run_both_lights_together() {
        let mut h = Harness::standard();
        let mut uv_minutes = 0;
        let mut grow_minutes = 0;
        for _ in 0..(24 * 60) {
            h.engine.tick();
            assert!(!(h.on(2) && h.on(3)));
            uv_minutes += u32::from(h.on(2));
            grow_minutes += u32::from(h.on(3));
            h.advance(60);
        }
        // 09:00-21:00 with 30/60 alternation: both about six hours.
        assert!((355..=365).contains(&uv_minutes), "uv {uv_minutes}");
        assert!((355..=365).contains(&grow_minutes), "grow {grow_minutes}");
    }

    #[test]
    fn should_keep_lights_off_outside_light_window() {
        let mut h = Harness::standard();
        h.clock.set(chrono::Utc.with_ymd_and_hms(2026, 1, 5, 22, 0, 0).unwrap());
        h.engine.tick();
        assert!(!h.on(2));
        assert!(!h.on(3));
        assert_eq!(h.engine.state(id(2)).unwrap().cycle, Some(CyclePhase::Off));
    }

    #[test]
    fn should_restart_cycle_after_override_ends() {
        let relays = RelaySet::new(vec![relay(
            7,
            RelayRole::Cycle {
                cycle: CycleSource::Fan,
            },
            &[],
        )])
        .unwrap();
        let mut h = Harness::new(relays, AutomationProfile::default());
        h.engine.tick();
        h.override_relay(7, false);
        // Minute 20 of the original cycle would be an OFF phase.
        h.advance(20 * 60);
        h.engine.tick();
        assert!(h.on(7));
    }

    #[test]
    fn should_hold_humidifier_outside_its_window() {
        let mut profile = AutomationProfile::default();
        profile.humidity.window =
            ScheduleWindow::new("20:00".parse().unwrap(), "08:00".parse().unwrap());
        let mut h = Harness::new(psu_and_humidifier(), profile);
        h.feed(22.0, 45.0, 900.0);
        h.engine.tick();
        assert!(!h.on(5));
        assert!(!h.on(1));
    }

    // ── Sensor data ────────────────────────────────────────────────

    #[test]
    fn should_pause_environmental_relays_until_first_snapshot() {
        let mut h = Harness::standard();
        let report = h.engine.tick();
        assert_eq!(h.engine.sensor_status(), SensorStatus::AwaitingData);
        assert!(!h.on(5));
        assert!(!h.on(6));
        assert_eq!(
            h.engine.state(id(6)).unwrap().paused,
            Some(PauseReason::SensorStale)
        );
        assert!(!report
            .events
            .iter()
            .any(|e| matches!(e.kind, EventKind::SensorStale { .. })));
    }

    #[test]
    fn should_raise_stale_once_and_recover() {
        let mut h = Harness::new(psu_and_humidifier(), AutomationProfile::default());
        h.feed(22.0, 45.0, 900.0);
        h.engine.tick();
        assert!(h.on(5));

        h.advance(121);
        let report = h.engine.tick();
        assert_eq!(h.engine.sensor_status(), SensorStatus::Stale);
        assert!(!h.on(5));
        assert_eq!(
            h.engine.state(id(5)).unwrap().last_cause,
            Some(ChangeCause::SensorStale)
        );
        let stale_events = |events: &[Event]| {
            events
                .iter()
                .filter(|e| matches!(e.kind, EventKind::SensorStale { .. }))
                .count()
        };
        assert_eq!(stale_events(&report.events), 1);

        h.advance(1);
        let report = h.engine.tick();
        assert_eq!(stale_events(&report.events), 0);

        h.feed(22.0, 45.0, 900.0);
        let report = h.engine.tick();
        assert_eq!(h.engine.sensor_status(), SensorStatus::Fresh);
        assert!(h.on(5));
        assert!(report
            .events
            .iter()
            .any(|e| matches!(e.kind, EventKind::SensorRecovered)));
    }

    #[test]
    fn should_mark_latch_paused_when_quantity_unavailable() {
        let mut h = Harness::standard();
        let snapshot = SensorId::ALL.into_iter().fold(
            SensorSnapshot::uniform(18.0, 45.0, 900.0, t0()),
            SensorSnapshot::with_error,
        );
        h.engine.update_snapshot(snapshot);
        h.engine.tick();
        assert!(!h.on(6));
        assert_eq!(
            h.engine.state(id(6)).unwrap().paused,
            Some(PauseReason::SensorUnavailable(Quantity::Temperature))
        );
    }

    #[test]
    fn should_ignore_snapshots_older_than_the_held_one() {
        let mut h = Harness::standard();
        h.feed(22.0, 45.0, 900.0);
        let older = SensorSnapshot::uniform(22.0, 90.0, 900.0, t0() - TimeDelta::seconds(5));
        assert!(!h.engine.update_snapshot(older));
        h.engine.tick();
        assert!(h.on(5));
    }

    // ── Profiles and read model ────────────────────────────────────

    #[test]
    fn should_keep_previous_profile_when_new_one_is_invalid() {
        let mut h = Harness::standard();
        let mut bad = AutomationProfile::default();
        bad.fan_cycle.duty = DutyCycle::new(0, 60);
        let result = h.engine.handle(Command::ApplyProfile(Arc::new(bad)));
        assert!(matches!(result, Err(SporeHubError::Validation(_))));
        assert_eq!(**h.engine.profile(), AutomationProfile::default());
    }

    #[test]
    fn should_apply_new_profile_on_next_tick() {
        let mut h = Harness::standard();
        h.feed(22.0, 60.0, 900.0);
        h.engine.tick();
        assert!(!h.on(5));

        let mut wetter = AutomationProfile::default();
        wetter.humidity.thresholds.low = 70.0;
        wetter.humidity.thresholds.high = 95.0;
        h.engine
            .handle(Command::ApplyProfile(Arc::new(wetter)))
            .unwrap();
        let report = h.engine.tick();
        assert!(h.on(5));
        assert!(report
            .events
            .iter()
            .any(|e| matches!(e.kind, EventKind::ProfileApplied)));
    }

    #[test]
    fn should_expose_relays_in_snapshot() {
        let mut h = Harness::standard();
        h.feed(22.0, 45.0, 900.0);
        h.engine.tick();
        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.relays.len(), 8);
        assert_eq!(snapshot.sensor_status, SensorStatus::Fresh);
        assert!(snapshot.is_on(id(5)));
        let psu = snapshot.relay(id(1)).unwrap();
        assert_eq!(psu.display_name, "Main PSU");
        assert!(!psu.visible);
        assert_eq!(snapshot.local_time, t0().naive_utc());

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["relays"][4]["state"]["physical_on"], true);
    }

    // ── Maintenance ────────────────────────────────────────────────

    #[test]
    fn should_pulse_dependent_after_bringing_up_its_master() {
        let mut h = Harness::new(psu_and_humidifier(), AutomationProfile::default());
        let pulse = h.engine.begin_self_test(&[id(5)]).unwrap();
        assert_eq!(h.driver.writes(), vec![(11, true), (15, true)]);
        assert_dependency_invariant(&h.engine);

        let report = h.engine.end_self_test(pulse);
        assert_eq!(
            h.driver.writes(),
            vec![(11, true), (15, true), (15, false), (11, false)]
        );
        assert_eq!(report.results.len(), 1);
        assert!(report.all_passed());
        assert!(!h.on(1));
        assert!(!h.on(5));
        assert_eq!(
            h.engine.state(id(5)).unwrap().last_cause,
            Some(ChangeCause::SelfTest)
        );
    }

    #[test]
    fn should_skip_pulse_while_master_is_overridden_off() {
        let mut h = Harness::new(psu_and_humidifier(), AutomationProfile::default());
        h.override_relay(1, false);
        let pulse = h.engine.begin_self_test(&[id(5)]).unwrap();
        assert!(h.driver.writes().is_empty());
        let report = h.engine.end_self_test(pulse);
        assert!(matches!(
            report.outcome(id(5)),
            Some(SelfTestOutcome::Skipped { .. })
        ));
        assert!(h.driver.writes().is_empty());
    }

    #[test]
    fn should_report_failed_pulse_and_still_release_master() {
        let mut h = Harness::new(psu_and_humidifier(), AutomationProfile::default());
        h.driver.fail(15);
        let pulse = h.engine.begin_self_test(&[id(1), id(5)]).unwrap();
        let report = h.engine.end_self_test(pulse);

        assert_eq!(h.driver.writes(), vec![(11, true), (11, false)]);
        assert!(report.outcome(id(1)).unwrap().is_passed());
        match report.outcome(id(5)) {
            Some(SelfTestOutcome::Failed { message }) => {
                assert!(message.contains("channel stuck"), "{message}");
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        let events = h.engine.tick().events;
        assert!(events.iter().any(|e| matches!(
            &e.kind,
            EventKind::SelfTestCompleted { tested: 2, not_passed } if *not_passed == vec![id(5)]
        )));
    }

    #[test]
    fn should_leave_running_relay_on_after_self_test() {
        let mut h = Harness::new(psu_and_humidifier(), AutomationProfile::default());
        h.feed(22.0, 45.0, 900.0);
        h.engine.tick();
        assert!(h.on(5));
        h.driver.clear();

        let pulse = h.engine.begin_self_test(&[id(5)]).unwrap();
        let report = h.engine.end_self_test(pulse);
        assert!(report.all_passed());
        assert_eq!(h.driver.writes(), vec![(15, true)]);
        assert!(h.on(1));
        assert!(h.on(5));
    }

    #[test]
    fn should_reject_self_test_of_unknown_relay() {
        let mut h = Harness::new(psu_and_humidifier(), AutomationProfile::default());
        let err = h.engine.begin_self_test(&[id(5), id(3)]).unwrap_err();
        assert!(matches!(err, SporeHubError::NotFound(_)));
        assert!(h.driver.writes().is_empty());
    }

    #[test]
    fn should_restore_defaults_on_factory_reset() {
        let mut drier = AutomationProfile::default();
        drier.humidity.thresholds.low = 30.0;
        let mut h = Harness::new(psu_and_humidifier(), drier);
        h.feed(22.0, 45.0, 900.0);
        h.override_relay(5, true);
        h.engine.tick();
        assert!(h.on(1) && h.on(5));
        h.driver.clear();

        h.engine.handle(Command::FactoryReset).unwrap();
        assert_eq!(h.driver.writes(), vec![(15, false), (11, false)]);
        assert!(!h.engine.state(id(5)).unwrap().mode.is_override());
        assert_eq!(**h.engine.profile(), AutomationProfile::default());

        let events = h.engine.tick().events;
        assert!(events
            .iter()
            .any(|e| matches!(e.kind, EventKind::FactoryReset)));
        assert!(events
            .iter()
            .any(|e| matches!(e.kind, EventKind::OverrideCleared { relay_id } if relay_id == id(5))));
        // Default thresholds (50/85) put 45 % back under the band.
        assert!(h.on(5));
    }
}
