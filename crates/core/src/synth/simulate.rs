//! Script traversal and turn unrolling.
//!
//! One simulated turn walks the script from the top: logic instructions
//! steer (branches, flag and counter registers), actions accumulate into the
//! turn's result until a guaranteed action terminates traversal. Unrolling
//! repeats this per HP checkpoint until the fired-action sequence settles
//! into a verified cycle.

use std::collections::BTreeSet;

use super::context::SimContext;
use super::{
    EmittedAction, HpGroup, MAX_TRAVERSAL, Moveset, RemainingMoveset, RepeatGroup, SynthError,
    TimedGroup,
};
use crate::graph::{InstructionArena, Script, Step};
use crate::instruction::{
    ActionKind, BranchRule, Cmp, Condition, CounterOp, FlagOp, Instruction, InstructionKind,
    LogicKind,
};
use crate::types::CounterParams;

fn emit(ins: &Instruction, cond: Option<&Condition>) -> EmittedAction {
    EmittedAction {
        instruction: ins.id,
        name: ins.name.clone(),
        use_chance: cond.map(|c| c.use_chance).unwrap_or(100),
        fires_once: cond.map(|c| c.fires_once()).unwrap_or(false),
        countdown: None,
    }
}

fn emit_countdown(ins: &Instruction, value: i64) -> EmittedAction {
    EmittedAction {
        instruction: ins.id,
        name: "Countdown".to_string(),
        use_chance: 100,
        fires_once: false,
        countdown: Some(value),
    }
}

fn cmp(cmp: Cmp, lhs: i64, rhs: i64) -> bool {
    match cmp {
        Cmp::Lt => lhs < rhs,
        Cmp::Le => lhs <= rhs,
        Cmp::Eq => lhs == rhs,
        Cmp::Ge => lhs >= rhs,
    }
}

fn branch_taken(rule: BranchRule, value: i64, ctx: &SimContext) -> bool {
    match rule {
        BranchRule::Flag => {
            let v = value as u64;
            v & ctx.flags == v
        }
        BranchRule::Hp(c) => cmp(c, ctx.hp, value),
        BranchRule::Counter(c) => cmp(c, ctx.counter, value),
        // Level branches distinguish only "below" from "at or above".
        BranchRule::Level(Cmp::Lt) => ctx.level < value,
        BranchRule::Level(_) => ctx.level >= value,
        BranchRule::Cards => false,
        BranchRule::Combo => ctx.combos >= value,
        BranchRule::EnemiesRemaining => ctx.enemies == value,
    }
}

/// Executes one simulated turn, returning the actions that fire.
///
/// Mutates `steps` only to null out preemptive markers once crossed, so they
/// cannot re-trigger on later turns. Ends by refilling the one-time budget
/// and charging the first guaranteed one-time action that fired.
pub(crate) fn run_turn(
    ctx: &mut SimContext,
    steps: &mut [Option<Step>],
    arena: &InstructionArena,
) -> Vec<EmittedAction> {
    ctx.begin_traversal();

    let mut results: Vec<(EmittedAction, Option<Condition>)> = Vec::new();
    let mut traversed: BTreeSet<usize> = BTreeSet::new();
    let mut idx = 0usize;

    for _ in 0..MAX_TRAVERSAL {
        if idx >= steps.len() || traversed.contains(&idx) {
            break;
        }
        traversed.insert(idx);

        let Some(step) = steps[idx].clone() else {
            idx += 1;
            continue;
        };
        let ins = arena.at(step.instruction);

        match &ins.kind {
            InstructionKind::Logic(LogicKind::Preemptive { level }) => {
                steps[idx] = None;
                ctx.is_preemptive = true;
                ctx.do_preemptive = *level <= ctx.level;
                idx += 1;
            }
            InstructionKind::Action(ActionKind::PreemptiveAttack) => {
                steps[idx] = None;
                ctx.is_preemptive = true;
                ctx.do_preemptive = true;
                results.push((emit(ins, step.condition.as_ref()), step.condition));
                break;
            }
            // Status-triggered enrage accumulates without terminating.
            InstructionKind::Action(ActionKind::Effect {
                label: "attack_up_status",
            }) => {
                results.push((emit(ins, step.condition.as_ref()), step.condition));
                idx += 1;
            }
            InstructionKind::Action(action) => {
                match &step.condition {
                    Some(cond) => {
                        if let Some(threshold) = cond.hp_threshold {
                            if ctx.hp >= threshold {
                                idx += 1;
                                continue;
                            }
                        }
                        if cond.use_chance == 100 && !action.continues_at_full_chance() {
                            // Guaranteed action: terminal once its one-time
                            // bookkeeping and effect state allow it.
                            if !ctx.can_use(cond) {
                                idx += 1;
                                continue;
                            }
                            if !ctx.apply_effect(action) {
                                idx += 1;
                                continue;
                            }
                            results.push((emit(ins, Some(cond)), step.condition.clone()));
                            break;
                        }
                        // Probabilistic: accumulate and keep walking. State
                        // must not commit for an action that may not happen.
                        if ctx.can_use(cond) && ctx.could_apply_effect(action) {
                            results.push((emit(ins, Some(cond)), step.condition.clone()));
                        }
                        idx += 1;
                    }
                    // No gate at all is terminal without being recorded.
                    None => {
                        if !ctx.apply_effect(action) {
                            idx += 1;
                            continue;
                        }
                        break;
                    }
                }
            }
            InstructionKind::Unknown => {
                // Opaque action: same gating as a probabilistic action so it
                // stays visible in the output.
                match &step.condition {
                    Some(cond) => {
                        if let Some(threshold) = cond.hp_threshold {
                            if ctx.hp >= threshold {
                                idx += 1;
                                continue;
                            }
                        }
                        if cond.use_chance == 100 {
                            if !ctx.can_use(cond) {
                                idx += 1;
                                continue;
                            }
                            results.push((emit(ins, Some(cond)), step.condition.clone()));
                            break;
                        }
                        if ctx.can_use(cond) {
                            results.push((emit(ins, Some(cond)), step.condition.clone()));
                        }
                        idx += 1;
                    }
                    None => break,
                }
            }
            InstructionKind::Logic(logic) => {
                let value = step.ai as i64;
                let target = step.rnd as usize;
                match logic {
                    LogicKind::Nop => idx += 1,
                    LogicKind::FlagOp(op) => {
                        let operand = step.ai as u64;
                        match op {
                            FlagOp::Set | FlagOp::Or => ctx.flags |= operand,
                            FlagOp::Unset => ctx.flags &= !operand,
                            FlagOp::Xor => ctx.flags ^= operand,
                        }
                        idx += 1;
                    }
                    LogicKind::SetCounter(op) => {
                        match op {
                            CounterOp::Assign => ctx.counter = value,
                            CounterOp::Add => ctx.counter += 1,
                            CounterOp::Sub => ctx.counter -= 1,
                        }
                        idx += 1;
                    }
                    LogicKind::SetCounterIf => {
                        if ctx.counter == step.ai as i64 {
                            ctx.counter = step.rnd as i64;
                        }
                        idx += 1;
                    }
                    LogicKind::Branch(rule) => {
                        idx = if branch_taken(*rule, value, ctx) {
                            target
                        } else {
                            idx + 1
                        };
                    }
                    LogicKind::EndPath => break,
                    LogicKind::Countdown => {
                        ctx.counter -= 1;
                        if ctx.counter > 0 {
                            results.push((emit_countdown(ins, ctx.counter), None));
                            break;
                        }
                        idx += 1;
                    }
                    LogicKind::Preemptive { .. } => unreachable!("handled above"),
                }
            }
            // Passives are extracted before simulation; a straggler is inert.
            InstructionKind::Passive(_) => idx += 1,
        }
    }

    if traversed.len() >= MAX_TRAVERSAL {
        tracing::warn!("script traversal exceeded {MAX_TRAVERSAL} slots in one turn");
    }

    ctx.refill_counter();

    // Charge the first guaranteed one-time action that fired this turn.
    for (_, cond) in &results {
        if let Some(cond) = cond {
            if cond.use_chance == 100 && cond.fires_once() {
                ctx.spend(cond);
                break;
            }
        }
    }

    results.into_iter().map(|(action, _)| action).collect()
}

/// Static info pulled out of a script before unrolling.
pub(crate) struct StaticInfo {
    pub passives: Vec<EmittedAction>,
    pub death_actions: Vec<EmittedAction>,
    /// Candidate HP thresholds, descending, always containing 100 and 0.
    pub hp_checkpoints: Vec<u32>,
    /// Whether any instruction observes the remaining-enemy count, making
    /// alternate traversals at lower counts worth probing.
    pub has_remaining_branch: bool,
}

/// Extracts passives and death actions (nulling their slots) and collects
/// every HP value the script can distinguish. Both a threshold and the value
/// just below it are checkpoints, so band edges are probed from both sides.
pub(crate) fn extract_static(steps: &mut [Option<Step>], arena: &InstructionArena) -> StaticInfo {
    let mut passives = Vec::new();
    let mut death_actions = Vec::new();
    let mut checkpoints: BTreeSet<u32> = BTreeSet::from([100, 0]);
    let mut has_remaining_branch = false;

    for slot in steps.iter_mut() {
        let Some(step) = slot else {
            continue;
        };
        let ins = arena.at(step.instruction);

        if ins.kind.is_passive() {
            passives.push(emit(ins, None));
            *slot = None;
            continue;
        }
        if ins.is_death_action() {
            death_actions.push(emit(ins, step.condition.as_ref()));
            *slot = None;
            continue;
        }

        match &ins.kind {
            InstructionKind::Logic(LogicKind::Branch(BranchRule::EnemiesRemaining))
            | InstructionKind::Action(ActionKind::Enrage {
                enemy_count: Some(_),
                ..
            })
            | InstructionKind::Action(ActionKind::Effect {
                label: "recover_enemy_ally",
            }) => has_remaining_branch = true,
            _ => {}
        }

        if let InstructionKind::Logic(LogicKind::Branch(BranchRule::Hp(_))) = ins.kind {
            let value = step.ai;
            checkpoints.insert(value);
            checkpoints.insert(value.saturating_sub(1));
        }
        if let Some(threshold) = step.condition.as_ref().and_then(|c| c.hp_threshold) {
            let threshold = threshold.max(0) as u32;
            checkpoints.insert(threshold);
            checkpoints.insert(threshold.saturating_sub(1));
        }
    }

    StaticInfo {
        passives,
        death_actions,
        hp_checkpoints: checkpoints.into_iter().rev().collect(),
        has_remaining_branch,
    }
}

/// Runs the first traversal looking for preemptives. On a hit whose level
/// gate passes, the context keeps the traversal's effects; otherwise it rolls
/// back untouched. Crossed markers stay consumed either way so normal turns
/// skip them.
pub(crate) fn extract_preemptives(
    ctx: &mut SimContext,
    steps: &mut [Option<Step>],
    arena: &InstructionArena,
) -> Option<Vec<EmittedAction>> {
    let snapshot = ctx.clone();
    let fired = run_turn(ctx, steps, arena);
    if ctx.is_preemptive && ctx.do_preemptive {
        Some(fired)
    } else {
        *ctx = snapshot;
        None
    }
}

/// Unrolls `turn_bound` turns at a fixed HP checkpoint.
fn extract_turn_behaviors(
    ctx: &SimContext,
    steps: &mut [Option<Step>],
    arena: &InstructionArena,
    hp: u32,
    turn_bound: usize,
) -> Vec<Vec<EmittedAction>> {
    let mut hp_ctx = ctx.clone();
    hp_ctx.hp = hp as i64;
    let mut turns = Vec::with_capacity(turn_bound);
    for _ in 0..turn_bound {
        let started_enraged = hp_ctx.is_enraged();
        turns.push(run_turn(&mut hp_ctx, steps, arena));
        // An enrage cast this turn must not lose a turn of its duration.
        let enraged_this_turn = !started_enraged && hp_ctx.is_enraged();
        hp_ctx.advance_turn(enraged_this_turn);
    }
    turns
}

/// Finds the earliest verified repeating window in the turn data.
///
/// A candidate `(start, end)` is verified only if the window repeats
/// unbroken through every complete window remaining in the data.
pub(crate) fn find_cycle(turn_data: &[Vec<EmittedAction>]) -> Option<(usize, usize)> {
    for start in 0..turn_data.len() {
        let mut candidates: Vec<(usize, usize)> = (start + 1..turn_data.len())
            .filter(|&j| turn_data[j] == turn_data[start])
            .map(|j| (start, j))
            .collect();
        if candidates.is_empty() {
            continue;
        }

        candidates.retain(|&(s, e)| {
            let period = e - s;
            let window = &turn_data[s..e];
            let mut verified = false;
            let mut j = e;
            while j + period <= turn_data.len() {
                verified = &turn_data[j..j + period] == window;
                if !verified {
                    break;
                }
                j += period;
            }
            verified
        });

        if let Some(&first) = candidates.first() {
            return Some(first);
        }
    }
    None
}

/// Splits unrolled turn data at the cycle boundary into timed and repeating
/// groups for one HP band.
fn split_cycle(
    hp: u32,
    turn_data: Vec<Vec<EmittedAction>>,
    start: usize,
    end: usize,
) -> HpGroup {
    let interval = (end - start) as u32;
    let mut timed = Vec::with_capacity(start);
    let mut repeating = Vec::with_capacity(end - start);

    for (idx, actions) in turn_data.into_iter().enumerate().take(end) {
        if idx < start {
            timed.push(TimedGroup {
                turn: (idx + 1) as u32,
                end_turn: None,
                hp_floor: None,
                actions,
            });
        } else {
            repeating.push(RepeatGroup {
                phase: (idx + 1 - start) as u32,
                end_phase: None,
                interval,
                hp_floor: None,
                actions,
            });
        }
    }

    HpGroup {
        hp,
        timed,
        repeating,
    }
}

/// Unrolls every HP checkpoint and smears identical behavior down-band.
///
/// Starting from the top band, a timed slot (or a whole repeating set) that
/// reproduces identically at a lower checkpoint is recorded once on the
/// higher band with an `hp_floor`, and cleared from the lower one.
fn compute_hp_actions(
    ctx: &SimContext,
    steps: &mut [Option<Step>],
    arena: &InstructionArena,
    checkpoints: &[u32],
    turn_bound: usize,
) -> Result<Vec<HpGroup>, SynthError> {
    let mut groups: Vec<HpGroup> = Vec::with_capacity(checkpoints.len());
    for &hp in checkpoints {
        let turn_data = extract_turn_behaviors(ctx, steps, arena, hp, turn_bound);
        let (start, end) =
            find_cycle(&turn_data).ok_or(SynthError::NoCycle { turn_bound, hp })?;
        groups.push(split_cycle(hp, turn_data, start, end));
    }

    for c in 0..groups.len() {
        // Timed slots: smear each one as far down as it stays identical.
        for t_idx in 0..groups[c].timed.len() {
            let current = groups[c].timed[t_idx].actions.clone();
            for n in c + 1..groups.len() {
                if t_idx >= groups[n].timed.len() {
                    break;
                }
                if groups[n].timed[t_idx].actions != current {
                    break;
                }
                groups[n].timed[t_idx].actions.clear();
                let floor = groups[n].hp;
                groups[c].timed[t_idx].hp_floor = Some(floor);
            }
        }

        // Repeating sets smear only as a whole.
        let current: Vec<Vec<EmittedAction>> = groups[c]
            .repeating
            .iter()
            .map(|r| r.actions.clone())
            .collect();
        for n in c + 1..groups.len() {
            let comp: Vec<&Vec<EmittedAction>> =
                groups[n].repeating.iter().map(|r| &r.actions).collect();
            if current.iter().collect::<Vec<_>>() != comp {
                break;
            }
            let floor = groups[n].hp;
            for r in groups[c].repeating.iter_mut() {
                r.hp_floor = Some(floor);
            }
            groups[n].repeating.clear();
        }
    }

    Ok(groups)
}

/// Merges consecutive timed groups with identical content into turn ranges.
fn collapse_timed(groups: Vec<TimedGroup>) -> Vec<TimedGroup> {
    let mut collapsed: Vec<TimedGroup> = Vec::with_capacity(groups.len());
    for group in groups {
        match collapsed.last_mut() {
            Some(last) if last.actions == group.actions && last.turn != group.turn => {
                last.end_turn = Some(group.turn);
            }
            _ => collapsed.push(group),
        }
    }
    collapsed
}

fn collapse_repeating(groups: Vec<RepeatGroup>) -> Vec<RepeatGroup> {
    let mut collapsed: Vec<RepeatGroup> = Vec::with_capacity(groups.len());
    for group in groups {
        match collapsed.last_mut() {
            Some(last) if last.actions == group.actions && last.phase != group.phase => {
                last.end_phase = Some(group.phase);
            }
            _ => collapsed.push(group),
        }
    }
    collapsed
}

/// Pulls dispels and status-triggered enrages out of every timed and
/// repeating group. They read better as one moveset-level entry than as a
/// line repeated in every phase. The first occurrence of each wins.
fn hoist_special_actions(
    groups: &mut [HpGroup],
    arena: &InstructionArena,
) -> (Option<EmittedAction>, Option<EmittedAction>) {
    let mut dispel: Option<EmittedAction> = None;
    let mut status: Option<EmittedAction> = None;

    let mut strip = |actions: &mut Vec<EmittedAction>| {
        actions.retain(|action| {
            let Some(idx) = arena.index_of(action.instruction) else {
                return true;
            };
            match &arena.at(idx).kind {
                InstructionKind::Action(ActionKind::Dispel) => {
                    dispel.get_or_insert_with(|| action.clone());
                    false
                }
                InstructionKind::Action(ActionKind::Effect {
                    label: "attack_up_status",
                }) => {
                    status.get_or_insert_with(|| action.clone());
                    false
                }
                _ => true,
            }
        });
    };

    for group in groups.iter_mut() {
        for timed in group.timed.iter_mut() {
            strip(&mut timed.actions);
        }
        for repeat in group.repeating.iter_mut() {
            strip(&mut repeat.actions);
        }
    }

    (dispel, status)
}

/// Final cleanup: hoist moveset-level actions, collapse ranges, drop empty
/// groups, and strip timed entries that merely restate the repeating cycle.
fn clean_groups(
    mut groups: Vec<HpGroup>,
    arena: &InstructionArena,
) -> (Vec<HpGroup>, Option<EmittedAction>, Option<EmittedAction>) {
    let (dispel, status) = hoist_special_actions(&mut groups, arena);
    let mut cleaned = Vec::with_capacity(groups.len());
    for mut group in groups {
        group.timed = collapse_timed(group.timed);
        group.repeating = collapse_repeating(group.repeating);
        group.timed.retain(|t| !t.actions.is_empty());
        group.repeating.retain(|r| !r.actions.is_empty());

        if group.timed.len() == 1 && group.repeating.len() == 1 {
            let repeated = group.repeating[0].actions.clone();
            let timed = &mut group.timed[0];
            if timed.actions.len() > 1 {
                timed.actions.retain(|a| !repeated.contains(a));
                if timed.actions.is_empty() {
                    group.timed.clear();
                }
            }
        }

        if !group.is_empty() {
            cleaned.push(group);
        }
    }
    (cleaned, dispel, status)
}

/// Clears from each remaining-enemy alternate whatever it shares with the
/// standard cadence or an earlier alternate, then drops alternates with
/// nothing of their own left.
fn dedupe_remaining(moveset: &mut Moveset) {
    let mut sets: Vec<(Option<EmittedAction>, Option<EmittedAction>, Vec<HpGroup>)> = Vec::new();
    sets.push((
        moveset.dispel_action.take(),
        moveset.status_action.take(),
        std::mem::take(&mut moveset.groups),
    ));
    let mut counts = Vec::with_capacity(moveset.remaining.len());
    for alt in moveset.remaining.drain(..) {
        counts.push(alt.enemies);
        sets.push((alt.dispel_action, alt.status_action, alt.groups));
    }

    for c in 0..sets.len() {
        for n in c + 1..sets.len() {
            let (head, tail) = sets.split_at_mut(n);
            let current = &head[c];
            let next = &mut tail[0];

            if next.0 == current.0 {
                next.0 = None;
            }
            if next.1 == current.1 {
                next.1 = None;
            }
            for band in &current.2 {
                let Some(other) = next.2.iter_mut().find(|g| g.hp == band.hp) else {
                    continue;
                };
                if other.timed == band.timed {
                    other.timed.clear();
                }
                if other.repeating == band.repeating {
                    other.repeating.clear();
                }
            }
        }
    }

    let mut sets = sets.into_iter();
    if let Some((dispel, status, groups)) = sets.next() {
        moveset.dispel_action = dispel;
        moveset.status_action = status;
        moveset.groups = groups;
    }
    for (enemies, (dispel_action, status_action, mut groups)) in counts.into_iter().zip(sets) {
        groups.retain(|g| !g.is_empty());
        if groups.is_empty() {
            continue;
        }
        moveset.remaining.push(RemainingMoveset {
            enemies,
            dispel_action,
            status_action,
            groups,
        });
    }
}

/// Synthesizes the moveset for one entity at one level.
///
/// `turn_bound` caps unrolling per HP checkpoint; exceeding it without a
/// verified cycle fails this level only. `force_one_enemy` pins the
/// remaining-enemy register at one and suppresses alternate traversals, for
/// entities flagged as always fighting alone.
pub fn convert(
    script: &Script,
    arena: &InstructionArena,
    level: i64,
    counter: CounterParams,
    turn_bound: usize,
    force_one_enemy: bool,
) -> Result<Moveset, SynthError> {
    let mut steps: Vec<Option<Step>> = script.steps.clone();
    let info = extract_static(&mut steps, arena);

    let mut moveset = Moveset::empty(level);
    moveset.passives = info.passives;
    moveset.death_actions = info.death_actions;

    let mut ctx = SimContext::new(level, counter);
    let mut simulate_remaining = info.has_remaining_branch;
    if force_one_enemy {
        ctx.enemies = 1;
        simulate_remaining = false;
    }

    if let Some(preemptives) = extract_preemptives(&mut ctx, &mut steps, arena) {
        let ends_battle = preemptives
            .iter()
            .filter_map(|a| arena.index_of(a.instruction))
            .any(|idx| arena.ends_battle(idx));
        moveset.preemptives = preemptives;
        if ends_battle {
            // The battle never reaches turn one; there is nothing to unroll.
            return Ok(moveset);
        }
    }

    let groups = compute_hp_actions(&ctx, &mut steps, arena, &info.hp_checkpoints, turn_bound)?;
    let (groups, dispel, status) = clean_groups(groups, arena);
    moveset.groups = groups;
    moveset.dispel_action = dispel;
    moveset.status_action = status;

    if simulate_remaining {
        // Probe each on-screen count separately; most collapse into the
        // standard cadence and dedupe away.
        for enemies in (1..=6).rev() {
            let mut alt_ctx = ctx.clone();
            alt_ctx.enemies = enemies;
            let groups =
                compute_hp_actions(&alt_ctx, &mut steps, arena, &info.hp_checkpoints, turn_bound)?;
            let (groups, dispel_action, status_action) = clean_groups(groups, arena);
            moveset.remaining.push(RemainingMoveset {
                enemies: enemies as u32,
                dispel_action,
                status_action,
                groups,
            });
        }
        dedupe_remaining(&mut moveset);
    }

    Ok(moveset)
}
