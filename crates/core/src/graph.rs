//! Behavior graph linking.
//!
//! Decoded instructions live in a flat arena indexed by stable id. Skill-set
//! instructions reference other instructions by id; linking resolves those
//! references to arena indices so that partial graphs (dangling or mutually
//! referential combos) stay representable. A dangling reference is a
//! structural defect in the feed: it is logged and omitted, never fatal.

use std::collections::{HashMap, HashSet};

use crate::instruction::{Condition, Instruction};
use crate::types::{BehaviorRef, CounterParams, InstructionId};

/// Flat arena of decoded instructions for one region, with skill-set
/// references resolved to indices.
#[derive(Clone, Debug)]
pub struct InstructionArena {
    items: Vec<Instruction>,
    by_id: HashMap<InstructionId, usize>,
    /// Resolved combo members, parallel to `items`. Empty for non-combos.
    resolved_sets: Vec<Vec<usize>>,
}

impl InstructionArena {
    /// Registers all instructions and resolves combo references.
    ///
    /// Duplicate registrations keep the first occurrence. Dangling combo
    /// references are dropped from the resolved member list; the combo itself
    /// survives with the members that did resolve.
    pub fn link(instructions: Vec<Instruction>) -> Self {
        let mut items: Vec<Instruction> = Vec::with_capacity(instructions.len());
        let mut by_id = HashMap::with_capacity(instructions.len());

        for ins in instructions {
            if by_id.contains_key(&ins.id) {
                tracing::warn!(instruction = %ins.id, "duplicate instruction registration, keeping first");
                continue;
            }
            by_id.insert(ins.id, items.len());
            items.push(ins);
        }

        let mut resolved_sets = vec![Vec::new(); items.len()];
        for (idx, ins) in items.iter().enumerate() {
            let Some(refs) = ins.set_refs() else {
                continue;
            };
            let mut members = Vec::with_capacity(refs.len());
            for &referenced in refs {
                match by_id.get(&referenced) {
                    Some(&target) => members.push(target),
                    None => {
                        tracing::warn!(
                            combo = %ins.id,
                            referenced = %referenced,
                            "dangling skill-set reference, dropping from combo"
                        );
                    }
                }
            }
            resolved_sets[idx] = members;
        }

        Self {
            items,
            by_id,
            resolved_sets,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: InstructionId) -> Option<&Instruction> {
        self.by_id.get(&id).map(|&idx| &self.items[idx])
    }

    pub fn index_of(&self, id: InstructionId) -> Option<usize> {
        self.by_id.get(&id).copied()
    }

    pub fn at(&self, index: usize) -> &Instruction {
        &self.items[index]
    }

    /// Resolved combo members for the instruction at `index`.
    pub fn members(&self, index: usize) -> &[usize] {
        &self.resolved_sets[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.items.iter()
    }

    /// Whether executing the instruction at `index` ends the battle, looking
    /// through combos. A visited set guards against reference cycles.
    pub fn ends_battle(&self, index: usize) -> bool {
        fn walk(arena: &InstructionArena, index: usize, visited: &mut HashSet<usize>) -> bool {
            if !visited.insert(index) {
                return false;
            }
            if arena.items[index].ends_battle() {
                return true;
            }
            arena.resolved_sets[index]
                .iter()
                .any(|&m| walk(arena, m, visited))
        }
        walk(self, index, &mut HashSet::new())
    }

    /// Post-link audit: every registered instruction should be reachable from
    /// exactly the script usages plus combo expansion. A mismatch means
    /// either an orphaned instruction or a duplicate registration upstream;
    /// it is logged for triage and is non-fatal.
    pub fn audit_coverage<'a>(&self, scripts: impl IntoIterator<Item = &'a Script>) {
        let mut reachable: HashSet<usize> = HashSet::new();
        let mut frontier: Vec<usize> = scripts
            .into_iter()
            .flat_map(|s| s.steps.iter().flatten())
            .map(|step| step.instruction)
            .collect();

        while let Some(idx) = frontier.pop() {
            if !reachable.insert(idx) {
                continue;
            }
            frontier.extend_from_slice(&self.resolved_sets[idx]);
        }

        if reachable.len() != self.items.len() {
            tracing::warn!(
                registered = self.items.len(),
                referenced = reachable.len(),
                "instruction coverage mismatch (orphaned instruction or duplicate registration)"
            );
        }
    }
}

/// One slot in a monster's behavior script: an arena index plus the usage
/// weights, with the trigger gate pre-derived for action slots.
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub instruction: usize,
    pub ai: u32,
    pub rnd: u32,
    pub condition: Option<Condition>,
}

/// A monster's full behavior script.
///
/// Scripts are 1-indexed in the feed: jump targets count from 1, so slot 0 is
/// padded with `None`. A handful of monsters are 0-indexed; callers pass
/// `zero_indexed` for those and the pad is skipped.
#[derive(Clone, Debug, Default)]
pub struct Script {
    pub steps: Vec<Option<Step>>,
}

impl Script {
    pub fn build(refs: &[BehaviorRef], arena: &InstructionArena, zero_indexed: bool) -> Script {
        let mut steps: Vec<Option<Step>> = Vec::with_capacity(refs.len() + 1);
        if !zero_indexed {
            steps.push(None);
        }

        for r in refs {
            let Some(index) = arena.index_of(r.instruction_id) else {
                tracing::warn!(
                    instruction = %r.instruction_id,
                    "script references unregistered instruction, slot left empty"
                );
                steps.push(None);
                continue;
            };
            let ins = arena.at(index);
            let condition = ins
                .kind
                .is_action()
                .then(|| Condition::from_usage(r.ai, r.rnd, ins));
            steps.push(Some(Step {
                instruction: index,
                ai: r.ai,
                rnd: r.rnd,
                condition,
            }));
        }

        Script { steps }
    }

    /// Number of populated slots.
    pub fn populated(&self) -> usize {
        self.steps.iter().flatten().count()
    }

    /// Injects synthetic once-ever flags into legacy scripts.
    ///
    /// Monsters whose counter never refills (`increment == 0`) predate
    /// explicit one-time costs; their always-fire bind actions would repeat
    /// forever under unrolling. Each such action gets a fresh flag bit above
    /// any explicit one-time value already present.
    pub fn inject_implicit_one_time(&mut self, counter: CounterParams, arena: &InstructionArena) {
        if counter.increment != 0 {
            return;
        }

        let max_flag = self
            .steps
            .iter()
            .flatten()
            .filter_map(|s| s.condition.as_ref().and_then(|c| c.one_time))
            .max()
            .unwrap_or(0)
            .max(0) as u64;
        let mut next_flag = (max_flag + 1).next_power_of_two();

        for step in self.steps.iter_mut().flatten() {
            let tag = arena.at(step.instruction).tag;
            // Only the early bind families are affected.
            if !matches!(tag, 1 | 2) {
                continue;
            }
            let Some(cond) = step.condition.as_mut() else {
                continue;
            };
            if cond.one_time.is_none() && cond.use_chance == 100 {
                cond.forced_one_time = Some(next_flag);
                next_flag <<= 1;
            }
        }
    }
}
