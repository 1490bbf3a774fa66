//! Dependency resolution between master relays and their dependents.
//!
//! The engine first computes every non-master relay's desired state as if
//! its masters were available. The resolver then:
//! 1. turns each automatic master ON iff any dependent wants to be ON or is
//!    still physically ON, so a master drops one tick after its last
//!    dependent;
//! 2. clamps every dependent of a master overridden OFF to OFF.

use std::collections::BTreeMap;

use crate::event::ChangeCause;
use crate::id::RelayId;
use crate::relay::RelaySet;

/// Desired output of one relay for the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub on: bool,
    pub cause: ChangeCause,
    /// Set when the value comes from a manual override.
    pub overridden: bool,
}

impl Decision {
    #[must_use]
    pub fn automatic(on: bool, cause: ChangeCause) -> Self {
        Self {
            on,
            cause,
            overridden: false,
        }
    }

    #[must_use]
    pub fn overridden(on: bool) -> Self {
        Self {
            on,
            cause: ChangeCause::Override,
            overridden: true,
        }
    }
}

pub struct DependencyResolver<'a> {
    relays: &'a RelaySet,
}

impl<'a> DependencyResolver<'a> {
    #[must_use]
    pub fn new(relays: &'a RelaySet) -> Self {
        Self { relays }
    }

    /// Fill in master decisions and apply override interlocks.
    ///
    /// `decisions` must hold a decision for every non-master relay; master
    /// entries are only read when overridden.
    pub fn resolve(
        &self,
        decisions: &mut BTreeMap<RelayId, Decision>,
        physical_on: impl Fn(RelayId) -> bool,
    ) {
        for master in self.relays.masters() {
            if decisions.get(&master.id).is_some_and(|d| d.overridden) {
                continue;
            }
            let needed = self.relays.dependents_of(master.id).any(|dep| {
                decisions.get(&dep.id).is_some_and(|d| d.on) || physical_on(dep.id)
            });
            decisions.insert(master.id, Decision::automatic(needed, ChangeCause::Dependency));
        }

        for master in self.relays.masters() {
            let forced_off = decisions
                .get(&master.id)
                .is_some_and(|d| d.overridden && !d.on);
            if !forced_off {
                continue;
            }
            for dep in self.relays.dependents_of(master.id) {
                let overridden = decisions.get(&dep.id).is_some_and(|d| d.overridden);
                decisions.insert(
                    dep.id,
                    Decision {
                        on: false,
                        cause: ChangeCause::Interlock,
                        overridden,
                    },
                );
            }
        }
    }
}
