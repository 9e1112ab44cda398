//! Per-level synthesis.
//!
//! Scripts can branch on the monster's level, so one entity may have several
//! distinct movesets. Only the levels the script actually distinguishes are
//! worth simulating; identical results collapse to the lowest level that
//! produces them.

use std::collections::{BTreeSet, HashSet};

use super::simulate::convert;
use super::{Moveset, SynthError};
use crate::graph::{InstructionArena, Script};
use crate::instruction::{BranchRule, InstructionKind, LogicKind};
use crate::types::{CounterParams, InstructionId};

/// Outcome of synthesizing one entity across its distinguishable levels.
#[derive(Debug, Default)]
pub struct LevelSynthesis {
    /// Distinct movesets, ascending by level. Each carries the lowest level
    /// that produces it.
    pub movesets: Vec<Moveset>,
    /// Levels that failed to synthesize, with the per-level failure.
    pub skipped: Vec<(i64, SynthError)>,
    /// Action instructions the script references but no level ever emits.
    pub unused: Vec<InstructionId>,
}

impl LevelSynthesis {
    pub fn is_empty(&self) -> bool {
        self.movesets.is_empty()
    }
}

/// Collects the levels a script can tell apart: level 1 always, plus every
/// level-branch operand and every preemptive marker's gate level.
pub fn extract_levels(script: &Script, arena: &InstructionArena) -> Vec<i64> {
    let mut levels: BTreeSet<i64> = BTreeSet::from([1]);
    for step in script.steps.iter().flatten() {
        match arena.at(step.instruction).kind {
            InstructionKind::Logic(LogicKind::Branch(BranchRule::Level(_))) => {
                levels.insert(step.ai as i64);
            }
            InstructionKind::Logic(LogicKind::Preemptive { level }) => {
                levels.insert(level);
            }
            _ => {}
        }
    }
    levels.into_iter().collect()
}

/// Level-independent fingerprint of a moveset, for deduplication.
fn canonical_form(moveset: &Moveset) -> Result<String, SynthError> {
    let mut rebased = moveset.clone();
    rebased.level = 0;
    Ok(serde_json::to_string(&rebased)?)
}

/// Every instruction id an action set references, looking through combos.
fn expand(id: InstructionId, arena: &InstructionArena, into: &mut HashSet<InstructionId>) {
    if !into.insert(id) {
        return;
    }
    let Some(index) = arena.index_of(id) else {
        return;
    };
    for &member in arena.members(index) {
        expand(arena.at(member).id, arena, into);
    }
}

/// Synthesizes the full level range for one script.
///
/// A level that fails is recorded and skipped; later levels proceed
/// independently. Duplicate movesets keep only the lowest producing level.
pub fn synthesize_levels(
    script: &Script,
    arena: &InstructionArena,
    counter: CounterParams,
    turn_bound: usize,
    force_one_enemy: bool,
) -> LevelSynthesis {
    let mut out = LevelSynthesis::default();
    let mut forms: HashSet<String> = HashSet::new();

    for level in extract_levels(script, arena) {
        match convert(script, arena, level, counter, turn_bound, force_one_enemy) {
            Ok(moveset) => match canonical_form(&moveset) {
                Ok(form) => {
                    if forms.insert(form) {
                        out.movesets.push(moveset);
                    } else {
                        tracing::debug!(level, "moveset identical to a lower level, dropped");
                    }
                }
                Err(err) => out.skipped.push((level, err)),
            },
            Err(err) => {
                tracing::warn!(level, error = %err, "level failed to synthesize");
                out.skipped.push((level, err));
            }
        }
    }

    // Unused accounting: action instructions the script references that no
    // surviving moveset ever emits. Renderers use this to spot dead rows.
    let mut emitted: HashSet<InstructionId> = HashSet::new();
    for moveset in &out.movesets {
        let bands = moveset
            .groups
            .iter()
            .chain(moveset.remaining.iter().flat_map(|r| &r.groups));
        let actions = moveset
            .passives
            .iter()
            .chain(&moveset.preemptives)
            .chain(&moveset.death_actions)
            .chain(&moveset.dispel_action)
            .chain(&moveset.status_action)
            .chain(moveset.remaining.iter().flat_map(|r| {
                r.dispel_action.iter().chain(&r.status_action)
            }))
            .map(|a| a.instruction)
            .chain(bands.flat_map(|g| {
                g.timed
                    .iter()
                    .flat_map(|t| &t.actions)
                    .chain(g.repeating.iter().flat_map(|r| &r.actions))
                    .map(|a| a.instruction)
            }));
        for id in actions {
            expand(id, arena, &mut emitted);
        }
    }

    let mut referenced: HashSet<InstructionId> = HashSet::new();
    for step in script.steps.iter().flatten() {
        let ins = arena.at(step.instruction);
        if ins.kind.is_action() || ins.kind.is_passive() {
            expand(ins.id, arena, &mut referenced);
        }
    }

    let mut unused: Vec<InstructionId> = referenced.difference(&emitted).copied().collect();
    unused.sort();
    out.unused = unused;
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{Instruction, decode_row};
    use crate::types::BehaviorRef;

    fn ins(fields: &[&str]) -> Instruction {
        let row: Vec<String> = fields.iter().map(|s| s.to_string()).collect();
        decode_row(&row).unwrap()
    }

    #[test]
    fn levels_come_from_branches_and_preemptive_gates() {
        let arena = InstructionArena::link(vec![
            ins(&["1", "LevelGate", "33", "0"]),
            ins(&["2", "Preempt", "49", "2", "7"]),
            ins(&["3", "Bite", "82", "0"]),
        ]);
        let refs = [
            BehaviorRef::new(InstructionId(2), 0, 0),
            BehaviorRef::new(InstructionId(1), 10, 4),
            BehaviorRef::new(InstructionId(3), 100, 0),
        ];
        let script = Script::build(&refs, &arena, false);
        assert_eq!(extract_levels(&script, &arena), [1, 7, 10]);
    }

    #[test]
    fn identical_levels_collapse_to_the_lowest() {
        // No level sensitivity at all: only level 1 remains.
        let arena = InstructionArena::link(vec![ins(&["1", "Bite", "82", "0"])]);
        let refs = [BehaviorRef::new(InstructionId(1), 100, 0)];
        let script = Script::build(&refs, &arena, false);

        let result = synthesize_levels(&script, &arena, CounterParams::default(), 8, false);
        assert_eq!(result.movesets.len(), 1);
        assert_eq!(result.movesets[0].level, 1);
        assert!(result.skipped.is_empty());
    }

    #[test]
    fn dedup_keeps_the_lowest_of_identical_levels() {
        // The level branch at 50 jumps into the same tail either way, so both
        // levels synthesize byte-identical movesets.
        let arena = InstructionArena::link(vec![
            ins(&["1", "LevelGate", "33", "0"]),
            ins(&["2", "Bite", "82", "0"]),
        ]);
        let refs = [
            BehaviorRef::new(InstructionId(1), 50, 2),
            BehaviorRef::new(InstructionId(2), 100, 0),
        ];
        let script = Script::build(&refs, &arena, false);
        assert_eq!(extract_levels(&script, &arena), [1, 50]);

        let result = synthesize_levels(&script, &arena, CounterParams::default(), 8, false);
        assert_eq!(result.movesets.len(), 1);
        assert_eq!(result.movesets[0].level, 1);
        assert!(result.skipped.is_empty());
    }

    #[test]
    fn level_branch_produces_two_distinct_movesets() {
        // Below level 50 Bite; at or above, Maul instead.
        let arena = InstructionArena::link(vec![
            ins(&["1", "LevelGate", "33", "0"]),
            ins(&["2", "Maul", "82", "0"]),
            ins(&["3", "Bite", "82", "0"]),
        ]);
        let refs = [
            BehaviorRef::new(InstructionId(1), 50, 3),
            BehaviorRef::new(InstructionId(2), 100, 0),
            BehaviorRef::new(InstructionId(3), 100, 0),
        ];
        let script = Script::build(&refs, &arena, false);

        let result = synthesize_levels(&script, &arena, CounterParams::default(), 8, false);
        assert_eq!(result.movesets.len(), 2);
        assert_eq!(result.movesets[0].level, 1);
        assert_eq!(result.movesets[1].level, 50);
        assert!(result.unused.is_empty());
    }

    #[test]
    fn orphaned_action_is_reported_unused() {
        // The jump skips straight past Ghost to Bite at every level.
        let arena = InstructionArena::link(vec![
            ins(&["1", "AlwaysJump", "23", "0"]),
            ins(&["2", "Ghost", "82", "0"]),
            ins(&["3", "Bite", "82", "0"]),
        ]);
        let refs = [
            BehaviorRef::new(InstructionId(1), 0, 3),
            BehaviorRef::new(InstructionId(2), 100, 0),
            BehaviorRef::new(InstructionId(3), 100, 0),
        ];
        let script = Script::build(&refs, &arena, false);

        let result = synthesize_levels(&script, &arena, CounterParams::default(), 8, false);
        assert_eq!(result.movesets.len(), 1);
        assert_eq!(result.unused, [InstructionId(2)]);
    }
}
