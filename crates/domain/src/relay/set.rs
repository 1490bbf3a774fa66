use std::collections::{BTreeMap, BTreeSet};

use super::{
    Co2Trigger, CycleSource, DEFAULT_OVERRIDE_TIMEOUT_SECS, LatchInput, OutputChannel,
    RelayDefinition, RelayRole,
};
use crate::cycle::PairSlot;
use crate::error::ConfigurationError;
use crate::id::RelayId;

/// Validated collection of relay definitions.
///
/// Construction checks every structural invariant, so code holding a
/// `RelaySet` can rely on:
/// - ids and output channels are unique;
/// - dependencies exist, are acyclic and one level deep, and point at
///   [`RelayRole::Master`] relays;
/// - alternating pairs point at each other with opposite slots;
/// - hybrid `follows` targets are latch relays.
#[derive(Debug, Clone, PartialEq)]
pub struct RelaySet {
    relays: BTreeMap<RelayId, RelayDefinition>,
}

impl RelaySet {
    /// Validate definitions and build the set.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigurationError`] found.
    pub fn new(definitions: Vec<RelayDefinition>) -> Result<Self, ConfigurationError> {
        if definitions.is_empty() {
            return Err(ConfigurationError::EmptyRelaySet);
        }

        let mut relays = BTreeMap::new();
        let mut channels: BTreeMap<u8, RelayId> = BTreeMap::new();
        for def in definitions {
            if let Some(&first) = channels.get(&def.output_channel.get())
                && first != def.id
            {
                return Err(ConfigurationError::DuplicateChannel {
                    channel: def.output_channel.get(),
                    first,
                    second: def.id,
                });
            }
            if relays.contains_key(&def.id) {
                return Err(ConfigurationError::DuplicateRelay(def.id));
            }
            channels.insert(def.output_channel.get(), def.id);
            relays.insert(def.id, def);
        }

        let set = Self { relays };
        set.check_dependency_targets()?;
        set.check_acyclic()?;
        set.check_masters()?;
        set.check_pairs()?;
        set.check_follows()?;
        Ok(set)
    }

    /// The original eight-relay board layout.
    #[must_use]
    pub fn standard() -> Self {
        let relays = standard_definitions()
            .into_iter()
            .map(|def| (def.id, def))
            .collect();
        Self { relays }
    }

    #[must_use]
    pub fn get(&self, id: RelayId) -> Option<&RelayDefinition> {
        self.relays.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: RelayId) -> bool {
        self.relays.contains_key(&id)
    }

    /// Definitions in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &RelayDefinition> {
        self.relays.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = RelayId> + '_ {
        self.relays.keys().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.relays.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    pub fn masters(&self) -> impl Iterator<Item = &RelayDefinition> {
        self.relays.values().filter(|def| def.role.is_master())
    }

    /// Relays that list `master` in their `depends_on`.
    pub fn dependents_of(&self, master: RelayId) -> impl Iterator<Item = &RelayDefinition> {
        self.relays
            .values()
            .filter(move |def| def.depends_on.contains(&master))
    }

    fn check_dependency_targets(&self) -> Result<(), ConfigurationError> {
        for def in self.relays.values() {
            for &target in &def.depends_on {
                if target == def.id {
                    return Err(ConfigurationError::SelfDependency(def.id));
                }
                if !self.relays.contains_key(&target) {
                    return Err(ConfigurationError::UnknownDependency {
                        relay: def.id,
                        depends_on: target,
                    });
                }
            }
        }
        Ok(())
    }

    fn check_acyclic(&self) -> Result<(), ConfigurationError> {
        let mut done = BTreeSet::new();
        for &start in self.relays.keys() {
            let mut path = Vec::new();
            self.visit(start, &mut path, &mut done)?;
        }
        Ok(())
    }

    fn visit(
        &self,
        id: RelayId,
        path: &mut Vec<RelayId>,
        done: &mut BTreeSet<RelayId>,
    ) -> Result<(), ConfigurationError> {
        if done.contains(&id) {
            return Ok(());
        }
        if let Some(pos) = path.iter().position(|&p| p == id) {
            let mut cycle = path[pos..].to_vec();
            cycle.push(id);
            return Err(ConfigurationError::CyclicDependency(cycle));
        }
        path.push(id);
        if let Some(def) = self.relays.get(&id) {
            for &next in &def.depends_on {
                self.visit(next, path, done)?;
            }
        }
        path.pop();
        done.insert(id);
        Ok(())
    }

    fn check_masters(&self) -> Result<(), ConfigurationError> {
        for def in self.relays.values() {
            if def.role.is_master() && !def.depends_on.is_empty() {
                return Err(ConfigurationError::MasterWithDependencies(def.id));
            }
            for &target in &def.depends_on {
                let Some(master) = self.relays.get(&target) else {
                    continue;
                };
                if !master.depends_on.is_empty() {
                    return Err(ConfigurationError::ChainedDependency {
                        relay: def.id,
                        master: target,
                    });
                }
                if !master.role.is_master() {
                    return Err(ConfigurationError::NotMaster { relay: target });
                }
            }
        }
        Ok(())
    }

    fn check_pairs(&self) -> Result<(), ConfigurationError> {
        for def in self.relays.values() {
            let RelayRole::AlternatingPair { partner, slot } = def.role else {
                continue;
            };
            let points_back = self.relays.get(&partner).is_some_and(|other| {
                matches!(
                    other.role,
                    RelayRole::AlternatingPair { partner: back, slot: other_slot }
                        if back == def.id && other_slot == slot.opposite()
                )
            });
            if partner == def.id || !points_back {
                return Err(ConfigurationError::PartnerMismatch {
                    relay: def.id,
                    partner,
                });
            }
        }
        Ok(())
    }

    fn check_follows(&self) -> Result<(), ConfigurationError> {
        for def in self.relays.values() {
            let RelayRole::Hybrid {
                follows: Some(target),
                ..
            } = def.role
            else {
                continue;
            };
            let is_latch = self.relays.get(&target).is_some_and(|t| t.role.is_latch());
            if !is_latch {
                return Err(ConfigurationError::InvalidFollowTarget {
                    relay: def.id,
                    target,
                });
            }
        }
        Ok(())
    }
}

/// `(id, name, channel, visible, depends on relay 1, role)`
fn standard_definitions() -> Vec<RelayDefinition> {
    let r = RelayId::known;
    let table = [
        (1, "Main PSU", 18, false, false, RelayRole::Master),
        (
            2,
            "UV Light",
            24,
            true,
            true,
            RelayRole::AlternatingPair {
                partner: r(3),
                slot: PairSlot::First,
            },
        ),
        (
            3,
            "Grow Light",
            25,
            true,
            true,
            RelayRole::AlternatingPair {
                partner: r(2),
                slot: PairSlot::Second,
            },
        ),
        (
            4,
            "Tub Fans",
            6,
            true,
            true,
            RelayRole::Hybrid {
                cycle: CycleSource::Fan,
                co2: Co2Trigger::Circulate,
                follows: Some(r(5)),
            },
        ),
        (
            5,
            "Humidifiers",
            26,
            true,
            true,
            RelayRole::Latch {
                input: LatchInput::Humidity,
            },
        ),
        (
            6,
            "Heater",
            19,
            true,
            false,
            RelayRole::Latch {
                input: LatchInput::Temperature,
            },
        ),
        (
            7,
            "IN/OUT Fans",
            13,
            true,
            true,
            RelayRole::Hybrid {
                cycle: CycleSource::Fan,
                co2: Co2Trigger::Ventilate,
                follows: None,
            },
        ),
        (8, "Reserved", 16, false, false, RelayRole::Manual),
    ];

    table
        .into_iter()
        .map(|(n, name, channel, visible, needs_psu, role)| {
            let depends_on = if needs_psu {
                BTreeSet::from([r(1)])
            } else {
                BTreeSet::new()
            };
            RelayDefinition {
                id: r(n),
                display_name: name.to_string(),
                output_channel: OutputChannel::new(channel),
                default_visible: visible,
                depends_on,
                override_timeout_secs: DEFAULT_OVERRIDE_TIMEOUT_SECS,
                role,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> RelayId {
        RelayId::new(n).unwrap()
    }

    fn def(n: u8, channel: u8, role: RelayRole, deps: &[u8]) -> RelayDefinition {
        let mut builder = RelayDefinition::builder(id(n))
            .name(format!("Relay {n}"))
            .channel(channel)
            .role(role);
        for &d in deps {
            builder = builder.depends_on(id(d));
        }
        builder.build().unwrap()
    }

    fn latch() -> RelayRole {
        RelayRole::Latch {
            input: LatchInput::Humidity,
        }
    }

    #[test]
    fn should_validate_standard_layout() {
        let standard = RelaySet::standard();
        let rebuilt = RelaySet::new(standard.iter().cloned().collect()).unwrap();
        assert_eq!(rebuilt, standard);
        assert_eq!(standard.len(), 8);
    }

    #[test]
    fn should_describe_standard_layout() {
        let set = RelaySet::standard();
        let psu = set.get(id(1)).unwrap();
        assert_eq!(psu.display_name, "Main PSU");
        assert_eq!(psu.output_channel.get(), 18);
        assert!(!psu.default_visible);

        let dependents: Vec<u8> = set.dependents_of(id(1)).map(|d| d.id.get()).collect();
        assert_eq!(dependents, vec![2, 3, 4, 5, 7]);

        let masters: Vec<u8> = set.masters().map(|d| d.id.get()).collect();
        assert_eq!(masters, vec![1]);

        assert!(set.get(id(6)).unwrap().depends_on.is_empty());
        assert!(set.iter().all(|d| d.override_timeout_secs == 300));
    }

    #[test]
    fn should_reject_empty_set() {
        assert_eq!(RelaySet::new(vec![]), Err(ConfigurationError::EmptyRelaySet));
    }

    #[test]
    fn should_reject_duplicate_ids() {
        let result = RelaySet::new(vec![
            def(1, 10, RelayRole::Manual, &[]),
            def(1, 11, RelayRole::Manual, &[]),
        ]);
        assert_eq!(result, Err(ConfigurationError::DuplicateRelay(id(1))));
    }

    #[test]
    fn should_reject_shared_output_channel() {
        let result = RelaySet::new(vec![
            def(1, 10, RelayRole::Manual, &[]),
            def(2, 10, RelayRole::Manual, &[]),
        ]);
        assert_eq!(
            result,
            Err(ConfigurationError::DuplicateChannel {
                channel: 10,
                first: id(1),
                second: id(2),
            })
        );
    }

    #[test]
    fn should_reject_self_dependency() {
        let result = RelaySet::new(vec![def(1, 10, RelayRole::Manual, &[1])]);
        assert_eq!(result, Err(ConfigurationError::SelfDependency(id(1))));
    }

    #[test]
    fn should_reject_unknown_dependency() {
        let result = RelaySet::new(vec![def(2, 10, latch(), &[1])]);
        assert_eq!(
            result,
            Err(ConfigurationError::UnknownDependency {
                relay: id(2),
                depends_on: id(1),
            })
        );
    }

    #[test]
    fn should_name_the_cycle_in_cyclic_dependency() {
        let result = RelaySet::new(vec![
            def(2, 10, RelayRole::Master, &[4]),
            def(4, 11, RelayRole::Master, &[2]),
        ]);
        assert_eq!(
            result,
            Err(ConfigurationError::CyclicDependency(vec![id(2), id(4), id(2)]))
        );
    }

    #[test]
    fn should_reject_dependency_chain_deeper_than_one_level() {
        let result = RelaySet::new(vec![
            def(1, 10, RelayRole::Master, &[]),
            def(2, 11, RelayRole::Master, &[1]),
            def(3, 12, latch(), &[2]),
        ]);
        assert!(matches!(
            result,
            Err(ConfigurationError::MasterWithDependencies(_) | ConfigurationError::ChainedDependency { .. })
        ));
    }

    #[test]
    fn should_reject_dependency_on_non_master() {
        let result = RelaySet::new(vec![
            def(1, 10, RelayRole::Manual, &[]),
            def(2, 11, latch(), &[1]),
        ]);
        assert_eq!(result, Err(ConfigurationError::NotMaster { relay: id(1) }));
    }

    #[test]
    fn should_reject_one_sided_pair() {
        let result = RelaySet::new(vec![
            def(
                2,
                10,
                RelayRole::AlternatingPair {
                    partner: id(3),
                    slot: PairSlot::First,
                },
                &[],
            ),
            def(3, 11, RelayRole::Manual, &[]),
        ]);
        assert_eq!(
            result,
            Err(ConfigurationError::PartnerMismatch {
                relay: id(2),
                partner: id(3),
            })
        );
    }

    #[test]
    fn should_reject_pair_with_same_slot() {
        let pair = |partner: u8| RelayRole::AlternatingPair {
            partner: id(partner),
            slot: PairSlot::First,
        };
        let result = RelaySet::new(vec![def(2, 10, pair(3), &[]), def(3, 11, pair(2), &[])]);
        assert!(matches!(
            result,
            Err(ConfigurationError::PartnerMismatch { .. })
        ));
    }

    #[test]
    fn should_reject_follow_of_non_latch_relay() {
        let result = RelaySet::new(vec![
            def(
                4,
                10,
                RelayRole::Hybrid {
                    cycle: CycleSource::Fan,
                    co2: Co2Trigger::Circulate,
                    follows: Some(id(8)),
                },
                &[],
            ),
            def(8, 11, RelayRole::Manual, &[]),
        ]);
        assert_eq!(
            result,
            Err(ConfigurationError::InvalidFollowTarget {
                relay: id(4),
                target: id(8),
            })
        );
    }
}
