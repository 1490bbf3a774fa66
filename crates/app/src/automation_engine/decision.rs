//! Per-relay automatic decisions (pass 1 of a tick).
//!
//! Each function updates the relay's latch, cycle phase and pause reason
//! as a side effect, so the runtime state always reflects the last
//! evaluation even while an override masks the result.

use std::collections::BTreeMap;

use sporehub_domain::cycle::{CycleTimer, PairSlot};
use sporehub_domain::dependency::Decision;
use sporehub_domain::event::ChangeCause;
use sporehub_domain::id::RelayId;
use sporehub_domain::latch::{Polarity, ThresholdLatch};
use sporehub_domain::profile::AutomationProfile;
use sporehub_domain::relay::{
    Co2Trigger, CycleSource, LatchInput, PauseReason, RelayDefinition, RelayRole,
    RelayRuntimeState,
};
use sporehub_domain::sensor::{Quantity, SensorSnapshot};
use sporehub_domain::time::{TimeOfDay, Timestamp};

/// Environmental inputs usable this tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(super) struct SensorInputs {
    temperature: Option<f64>,
    humidity: Option<f64>,
    co2: Option<f64>,
    /// Set when nothing is usable because the data is missing or too old.
    stale: bool,
}

impl SensorInputs {
    pub(super) fn stale() -> Self {
        Self {
            stale: true,
            ..Self::default()
        }
    }

    pub(super) fn from_snapshot(snapshot: &SensorSnapshot) -> Self {
        Self {
            temperature: snapshot.avg_temp(),
            humidity: snapshot.avg_humidity(),
            co2: snapshot.co2_ppm(),
            stale: false,
        }
    }

    fn value(&self, quantity: Quantity) -> Option<f64> {
        match quantity {
            Quantity::Temperature => self.temperature,
            Quantity::Humidity => self.humidity,
            Quantity::Co2 => self.co2,
        }
    }

    fn pause_reason(&self, quantity: Quantity) -> PauseReason {
        if self.stale {
            PauseReason::SensorStale
        } else {
            PauseReason::SensorUnavailable(quantity)
        }
    }
}

pub(super) struct TickContext<'a> {
    pub now: Timestamp,
    pub local: TimeOfDay,
    pub profile: &'a AutomationProfile,
    pub inputs: SensorInputs,
}

/// Key of the cycle timer a relay runs on. Both halves of an alternating
/// pair share the timer of the `first` slot.
pub(super) fn timer_key(definition: &RelayDefinition) -> RelayId {
    match definition.role {
        RelayRole::AlternatingPair {
            partner,
            slot: PairSlot::Second,
        } => partner,
        _ => definition.id,
    }
}

/// Desired state of one relay before dependency resolution.
///
/// Returns `None` for a master in automatic mode; the resolver decides it.
/// `decided` holds the decisions already made this tick, which a hybrid
/// relay reads to follow another relay.
pub(super) fn decide(
    definition: &RelayDefinition,
    state: &mut RelayRuntimeState,
    timers: &mut BTreeMap<RelayId, CycleTimer>,
    decided: &BTreeMap<RelayId, Decision>,
    ctx: &TickContext<'_>,
) -> Option<Decision> {
    state.paused = None;
    let automatic = match definition.role {
        RelayRole::Master => None,
        RelayRole::Latch { input } => Some(latch(input, state, ctx)),
        RelayRole::Cycle { cycle } => {
            let timer = timers.entry(definition.id).or_default();
            Some(duty_cycle(cycle, timer, state, ctx))
        }
        RelayRole::Hybrid {
            cycle,
            co2,
            follows,
        } => {
            let timer = timers.entry(definition.id).or_default();
            let cycle_decision = duty_cycle(cycle, timer, state, ctx);
            let follow_on = follows.is_some_and(|target| decided.get(&target).is_some_and(|d| d.on));
            Some(hybrid(cycle_decision, co2, follow_on, state, ctx))
        }
        RelayRole::AlternatingPair { slot, .. } => {
            let timer = timers.entry(timer_key(definition)).or_default();
            Some(alternating(slot, timer, state, ctx))
        }
        RelayRole::Manual => Some(Decision::automatic(false, ChangeCause::Idle)),
    };

    match state.mode.override_value() {
        Some(on) => Some(Decision::overridden(on)),
        None => automatic,
    }
}

fn latch(input: LatchInput, state: &mut RelayRuntimeState, ctx: &TickContext<'_>) -> Decision {
    let quantity = input.quantity();
    let Some(value) = ctx.inputs.value(quantity) else {
        state.latch = None;
        state.paused = Some(ctx.inputs.pause_reason(quantity));
        return Decision::automatic(false, ChangeCause::SensorStale);
    };

    let latch = ThresholdLatch::new(input.polarity()).evaluate(
        value,
        &ctx.profile.latch_thresholds(input),
        state.latch.unwrap_or_default(),
    );
    state.latch = Some(latch);

    let in_window = ctx
        .profile
        .latch_window(input)
        .is_none_or(|window| window.contains(ctx.local));
    let cause = if latch.on && !in_window {
        ChangeCause::Schedule
    } else {
        ChangeCause::Threshold(quantity)
    };
    Decision::automatic(latch.on && in_window, cause)
}

fn duty_cycle(
    source: CycleSource,
    timer: &mut CycleTimer,
    state: &mut RelayRuntimeState,
    ctx: &TickContext<'_>,
) -> Decision {
    let settings = ctx.profile.cycle(source);
    let in_window = settings.is_open(ctx.local);
    let phase = timer.duty_phase(ctx.now, in_window, &settings.duty);
    state.cycle = Some(phase);
    let cause = if in_window {
        ChangeCause::Cycle
    } else {
        ChangeCause::Schedule
    };
    Decision::automatic(phase.is_on(), cause)
}

fn hybrid(
    cycle: Decision,
    trigger: Co2Trigger,
    follow_on: bool,
    state: &mut RelayRuntimeState,
    ctx: &TickContext<'_>,
) -> Decision {
    let co2_on = match ctx.inputs.co2 {
        None => {
            state.latch = None;
            state.paused = Some(ctx.inputs.pause_reason(Quantity::Co2));
            false
        }
        Some(ppm) => match trigger {
            Co2Trigger::Ventilate => {
                let latch = ThresholdLatch::new(Polarity::OnAbove).evaluate(
                    ppm,
                    &ctx.profile.co2.thresholds(),
                    state.latch.unwrap_or_default(),
                );
                state.latch = Some(latch);
                latch.on
            }
            Co2Trigger::Circulate => ppm < ctx.profile.co2.tub_fan_low,
        },
    };

    // The cycle's window gates every contribution.
    if cycle.cause == ChangeCause::Schedule {
        return cycle;
    }
    let cause = if cycle.on {
        ChangeCause::Cycle
    } else if co2_on {
        ChangeCause::Threshold(Quantity::Co2)
    } else if follow_on {
        ChangeCause::Follow
    } else if state.paused.is_some() {
        ChangeCause::SensorStale
    } else {
        ChangeCause::Idle
    };
    Decision::automatic(cycle.on || co2_on || follow_on, cause)
}

fn alternating(
    slot: PairSlot,
    timer: &mut CycleTimer,
    state: &mut RelayRuntimeState,
    ctx: &TickContext<'_>,
) -> Decision {
    let settings = &ctx.profile.light_cycle;
    let in_window = settings.is_open(ctx.local);
    let phase = timer.alternating_phase(ctx.now, in_window, &settings.duty, slot);
    state.cycle = Some(phase);
    let cause = if in_window {
        ChangeCause::Cycle
    } else {
        ChangeCause::Schedule
    };
    Decision::automatic(phase.is_on(), cause)
}
