//! Flattening synthesized movesets into the interchange shape.
//!
//! Storage and rendering collaborators consume an ordered list of
//! level-behavior blocks rather than the nested [`Moveset`]. Flattening is a
//! pure value conversion; empty sections produce no block.

use serde::Serialize;

use crate::synth::{EmittedAction, HpGroup, Moveset, RepeatGroup, TimedGroup};

/// One group of behavior within a level block, in presentation order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BehaviorGroup {
    /// Always-on abilities, shown before anything turn-based.
    Passive { actions: Vec<EmittedAction> },
    /// Fired once, before the first player turn.
    Preemptive { actions: Vec<EmittedAction> },
    /// Player-buff removal, hoisted out of the turn cadence.
    Dispel { actions: Vec<EmittedAction> },
    /// Status-triggered enrage, hoisted out of the turn cadence.
    Status { actions: Vec<EmittedAction> },
    /// Turn cadence within one HP band, highest band first.
    Standard {
        hp: u32,
        timed: Vec<TimedGroup>,
        repeating: Vec<RepeatGroup>,
    },
    /// Alternate cadence while at most `enemies` remain on screen. Children
    /// are Dispel, Status and Standard groups of the alternate.
    Remaining {
        enemies: u32,
        groups: Vec<BehaviorGroup>,
    },
    /// Fired on defeat, shown last.
    Death { actions: Vec<EmittedAction> },
}

/// All behavior for one entity at one level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LevelBehavior {
    pub level: i64,
    pub groups: Vec<BehaviorGroup>,
}

/// The flattened interchange record for one entity: level blocks ascending
/// by level, one per distinct moveset.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EntityBehavior {
    pub levels: Vec<LevelBehavior>,
}

impl EntityBehavior {
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Folds a lone one-enemy alternate back into the standard cadence.
///
/// When the only alternate is the one-enemy case, nothing repeats anywhere,
/// and each alternate band is a single timed group, the alternate reads as
/// "and then this, once you are down to the last one". Its actions join the
/// front of the matching band's turn-one group instead of standing alone.
fn merge_lone_remaining(moveset: &mut Moveset) {
    let Some(alt) = moveset.remaining.first() else {
        return;
    };
    let foldable = moveset.remaining.len() == 1
        && alt.enemies == 1
        && alt.dispel_action.is_none()
        && alt.status_action.is_none()
        && moveset.groups.iter().all(|g| g.repeating.is_empty())
        && alt.groups.iter().all(|g| g.repeating.is_empty() && g.timed.len() == 1);
    if !foldable {
        return;
    }

    let alt = moveset.remaining.remove(0);
    for band in alt.groups {
        let mut timed = band.timed;
        let actions = timed.remove(0).actions;

        let idx = match moveset.groups.iter().position(|g| g.hp == band.hp) {
            Some(idx) => idx,
            None => {
                moveset.groups.push(HpGroup {
                    hp: band.hp,
                    timed: Vec::new(),
                    repeating: Vec::new(),
                });
                moveset.groups.sort_by(|a, b| b.hp.cmp(&a.hp));
                moveset
                    .groups
                    .iter()
                    .position(|g| g.hp == band.hp)
                    .unwrap_or(0)
            }
        };
        let target = &mut moveset.groups[idx];

        match target.timed.iter_mut().find(|t| t.turn == 1) {
            Some(group) => {
                for action in actions.into_iter().rev() {
                    group.actions.insert(0, action);
                }
            }
            None => target.timed.insert(
                0,
                TimedGroup {
                    turn: 1,
                    end_turn: None,
                    hp_floor: None,
                    actions,
                },
            ),
        }
    }
}

fn push_hoisted(groups: &mut Vec<BehaviorGroup>, dispel: &Option<EmittedAction>, status: &Option<EmittedAction>) {
    if let Some(action) = dispel {
        groups.push(BehaviorGroup::Dispel {
            actions: vec![action.clone()],
        });
    }
    if let Some(action) = status {
        groups.push(BehaviorGroup::Status {
            actions: vec![action.clone()],
        });
    }
}

fn flatten_one(moveset: &Moveset) -> LevelBehavior {
    let mut moveset = moveset.clone();
    merge_lone_remaining(&mut moveset);

    let mut groups = Vec::new();
    if !moveset.passives.is_empty() {
        groups.push(BehaviorGroup::Passive {
            actions: moveset.passives.clone(),
        });
    }
    if !moveset.preemptives.is_empty() {
        groups.push(BehaviorGroup::Preemptive {
            actions: moveset.preemptives.clone(),
        });
    }
    push_hoisted(&mut groups, &moveset.dispel_action, &moveset.status_action);
    for band in &moveset.groups {
        groups.push(BehaviorGroup::Standard {
            hp: band.hp,
            timed: band.timed.clone(),
            repeating: band.repeating.clone(),
        });
    }
    for alt in &moveset.remaining {
        let mut children = Vec::new();
        push_hoisted(&mut children, &alt.dispel_action, &alt.status_action);
        for band in &alt.groups {
            children.push(BehaviorGroup::Standard {
                hp: band.hp,
                timed: band.timed.clone(),
                repeating: band.repeating.clone(),
            });
        }
        groups.push(BehaviorGroup::Remaining {
            enemies: alt.enemies,
            groups: children,
        });
    }
    if !moveset.death_actions.is_empty() {
        groups.push(BehaviorGroup::Death {
            actions: moveset.death_actions.clone(),
        });
    }
    LevelBehavior {
        level: moveset.level,
        groups,
    }
}

/// Converts one entity's per-level movesets into level-behavior blocks.
///
/// Levels whose moveset carries nothing player-visible are dropped entirely.
pub fn flatten(movesets: &[Moveset]) -> EntityBehavior {
    EntityBehavior {
        levels: movesets
            .iter()
            .filter(|m| m.has_actions() || !m.passives.is_empty())
            .map(flatten_one)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::{HpGroup, RemainingMoveset};
    use crate::types::InstructionId;

    fn action(id: u32, name: &str) -> EmittedAction {
        EmittedAction {
            instruction: InstructionId(id),
            name: name.to_string(),
            use_chance: 100,
            fires_once: false,
            countdown: None,
        }
    }

    fn moveset(level: i64) -> Moveset {
        Moveset {
            level,
            passives: vec![action(1, "Fire Resist")],
            preemptives: vec![action(2, "Opening Roar")],
            death_actions: vec![action(3, "Last Words")],
            dispel_action: None,
            status_action: None,
            groups: vec![
                HpGroup {
                    hp: 100,
                    timed: vec![TimedGroup {
                        turn: 1,
                        end_turn: None,
                        hp_floor: None,
                        actions: vec![action(4, "Warmup")],
                    }],
                    repeating: vec![RepeatGroup {
                        phase: 1,
                        end_phase: None,
                        interval: 1,
                        hp_floor: None,
                        actions: vec![action(5, "Scratch")],
                    }],
                },
                HpGroup {
                    hp: 49,
                    timed: Vec::new(),
                    repeating: vec![RepeatGroup {
                        phase: 1,
                        end_phase: None,
                        interval: 1,
                        hp_floor: None,
                        actions: vec![action(6, "Enrage")],
                    }],
                },
            ],
            remaining: Vec::new(),
        }
    }

    fn timed_band(hp: u32, actions: Vec<EmittedAction>) -> HpGroup {
        HpGroup {
            hp,
            timed: vec![TimedGroup {
                turn: 1,
                end_turn: None,
                hp_floor: None,
                actions,
            }],
            repeating: Vec::new(),
        }
    }

    #[test]
    fn groups_come_out_in_presentation_order() {
        let mut full = moveset(1);
        full.dispel_action = Some(action(7, "Purge"));
        full.remaining.push(RemainingMoveset {
            enemies: 1,
            dispel_action: None,
            status_action: None,
            groups: vec![HpGroup {
                hp: 100,
                timed: Vec::new(),
                repeating: vec![RepeatGroup {
                    phase: 1,
                    end_phase: None,
                    interval: 1,
                    hp_floor: None,
                    actions: vec![action(8, "Lone Fury")],
                }],
            }],
        });

        let flat = flatten(&[full]);
        assert_eq!(flat.levels.len(), 1);
        let groups = &flat.levels[0].groups;
        assert!(matches!(groups[0], BehaviorGroup::Passive { .. }));
        assert!(matches!(groups[1], BehaviorGroup::Preemptive { .. }));
        assert!(matches!(groups[2], BehaviorGroup::Dispel { .. }));
        assert!(matches!(groups[3], BehaviorGroup::Standard { hp: 100, .. }));
        assert!(matches!(groups[4], BehaviorGroup::Standard { hp: 49, .. }));
        assert!(matches!(groups[5], BehaviorGroup::Remaining { enemies: 1, .. }));
        assert!(matches!(groups[6], BehaviorGroup::Death { .. }));
    }

    #[test]
    fn empty_sections_emit_no_block() {
        let mut bare = moveset(1);
        bare.passives.clear();
        bare.preemptives.clear();
        bare.death_actions.clear();
        let flat = flatten(&[bare]);
        let groups = &flat.levels[0].groups;
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| matches!(g, BehaviorGroup::Standard { .. })));
    }

    #[test]
    fn action_free_levels_are_dropped() {
        let mut inert = moveset(1);
        inert.passives.clear();
        inert.preemptives.clear();
        inert.death_actions.clear();
        inert.groups.clear();
        let flat = flatten(&[inert, moveset(50)]);
        assert_eq!(flat.levels.len(), 1);
        assert_eq!(flat.levels[0].level, 50);
    }

    #[test]
    fn lone_one_enemy_alternate_folds_into_turn_one() {
        let mut moveset = Moveset::empty(1);
        moveset.groups = vec![timed_band(100, vec![action(4, "Warmup")])];
        moveset.remaining = vec![RemainingMoveset {
            enemies: 1,
            dispel_action: None,
            status_action: None,
            groups: vec![
                timed_band(100, vec![action(8, "Finale")]),
                timed_band(49, vec![action(9, "Desperation")]),
            ],
        }];

        let flat = flatten(&[moveset]);
        let groups = &flat.levels[0].groups;
        assert_eq!(groups.len(), 2);

        // Alternate actions join the front of the matching band; a band the
        // standard cadence lacked is created in descending order.
        let BehaviorGroup::Standard { hp: 100, timed, .. } = &groups[0] else {
            panic!("expected a standard band at 100");
        };
        let names: Vec<&str> = timed[0].actions.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["Finale", "Warmup"]);

        let BehaviorGroup::Standard { hp: 49, timed, .. } = &groups[1] else {
            panic!("expected a standard band at 49");
        };
        assert_eq!(timed[0].actions[0].name, "Desperation");
    }

    #[test]
    fn repeating_alternate_stays_a_remaining_block() {
        let mut moveset = Moveset::empty(1);
        moveset.groups = vec![timed_band(100, vec![action(4, "Warmup")])];
        moveset.remaining = vec![RemainingMoveset {
            enemies: 1,
            dispel_action: None,
            status_action: None,
            groups: vec![HpGroup {
                hp: 100,
                timed: Vec::new(),
                repeating: vec![RepeatGroup {
                    phase: 1,
                    end_phase: None,
                    interval: 2,
                    hp_floor: None,
                    actions: vec![action(8, "Lone Fury")],
                }],
            }],
        }];

        let flat = flatten(&[moveset]);
        let groups = &flat.levels[0].groups;
        assert!(groups.iter().any(|g| matches!(g, BehaviorGroup::Remaining { enemies: 1, .. })));
    }
}
