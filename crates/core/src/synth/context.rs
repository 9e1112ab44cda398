//! Simulated game state for one synthesis run.

use crate::instruction::{ActionKind, Condition, ShieldFamily};
use crate::types::CounterParams;

/// Mutable register state threaded through script traversal.
///
/// Only the registers the script language can observe are modeled: the flag
/// and counter registers, HP as a percentage, the monster level, the one-time
/// bookkeeping, and the active durations of enrages and timed effects. Team
/// composition and combo counts are fixed at values that make their branches
/// fall through.
#[derive(Clone, Debug)]
pub(crate) struct SimContext {
    pub turn: u32,
    /// Whether the current traversal crossed a preemptive marker.
    pub is_preemptive: bool,
    /// Whether the level gate on the preemptive marker passed.
    pub do_preemptive: bool,
    /// General-purpose flag register.
    pub flags: u64,
    /// Bits consumed by forced one-time actions; set-only.
    pub one_time_flags: u64,
    /// General-purpose counter register.
    pub counter: i64,
    /// Current HP percentage, 0-100.
    pub hp: i64,
    pub level: i64,
    /// Enemies on screen. Starts high so remaining-enemies branches fall
    /// through; alternate traversals lower it.
    pub enemies: i64,
    /// Combos made last turn. Fixed at zero.
    pub combos: i64,
    /// Spendable one-time budget, initialized full.
    pub skill_counter: i64,
    /// Enrage state: `None` until the first cast, then a cooldown counting up
    /// from negative, active turns counting down, or zero when expired.
    enraged: Option<i64>,
    /// Remaining turns per timed-effect family.
    shields: [i64; ShieldFamily::COUNT],
    counter_params: CounterParams,
}

impl SimContext {
    pub fn new(level: i64, counter_params: CounterParams) -> Self {
        SimContext {
            turn: 1,
            is_preemptive: false,
            do_preemptive: false,
            flags: 0,
            one_time_flags: 0,
            counter: 0,
            hp: 100,
            level,
            enemies: 999,
            combos: 0,
            skill_counter: counter_params.max,
            enraged: None,
            shields: [0; ShieldFamily::COUNT],
            counter_params,
        }
    }

    /// Per-turn reset of transient traversal state.
    pub fn begin_traversal(&mut self) {
        self.is_preemptive = false;
    }

    pub fn is_enraged(&self) -> bool {
        self.enraged.unwrap_or(0) > 0
    }

    /// Advances the turn and counts down active effect durations. An enrage
    /// cast this very turn keeps its full duration until the next one.
    pub fn advance_turn(&mut self, enraged_this_turn: bool) {
        self.turn += 1;
        if !enraged_this_turn {
            match &mut self.enraged {
                Some(t) if *t > 0 => *t -= 1,
                Some(t) if *t < 0 => *t += 1,
                _ => {}
            }
        }
        for slot in self.shields.iter_mut() {
            if *slot > 0 {
                *slot -= 1;
            }
        }
    }

    /// Records the durable state of a firing action, returning whether the
    /// cast goes through at all. A still-active effect suppresses its own
    /// re-cast; an enrage behind a cooldown starts the cooldown instead.
    pub fn apply_effect(&mut self, action: &ActionKind) -> bool {
        match action {
            ActionKind::Enrage {
                turns,
                enemy_count,
                cooldown,
            } => {
                if matches!(enemy_count, Some(count) if self.enemies > *count) {
                    return false;
                }
                match self.enraged {
                    None => {
                        if let Some(cooldown) = cooldown {
                            self.enraged = Some(-cooldown + 1);
                            false
                        } else {
                            self.enraged = Some(*turns);
                            true
                        }
                    }
                    Some(0) => {
                        self.enraged = Some(*turns);
                        true
                    }
                    Some(_) => false,
                }
            }
            ActionKind::Shield { family, turns, .. } => {
                let slot = &mut self.shields[family.slot()];
                if *slot == 0 {
                    *slot = *turns;
                    true
                } else {
                    false
                }
            }
            _ => true,
        }
    }

    /// Non-mutating twin of [`apply_effect`], used when accumulating
    /// probabilistic actions that must not commit state.
    ///
    /// [`apply_effect`]: SimContext::apply_effect
    pub fn could_apply_effect(&self, action: &ActionKind) -> bool {
        match action {
            ActionKind::Enrage {
                enemy_count,
                cooldown,
                ..
            } => {
                if matches!(enemy_count, Some(count) if self.enemies > *count) {
                    return false;
                }
                match self.enraged {
                    None => cooldown.is_none(),
                    Some(t) => t == 0,
                }
            }
            ActionKind::Shield { family, .. } => self.shields[family.slot()] == 0,
            _ => true,
        }
    }

    /// Refills the one-time budget at end of turn, capped at its maximum.
    pub fn refill_counter(&mut self) {
        self.skill_counter = (self.skill_counter + self.counter_params.increment)
            .min(self.counter_params.max);
    }

    /// Whether the bookkeeping permits this condition to fire.
    pub fn can_use(&self, cond: &Condition) -> bool {
        if let Some(cost) = cond.one_time {
            self.skill_counter >= cost
        } else if let Some(flag) = cond.forced_one_time {
            self.one_time_flags & flag == 0
        } else if let Some(required) = cond.enemies_remaining {
            self.enemies <= required
        } else {
            true
        }
    }

    /// Records a one-time use.
    pub fn spend(&mut self, cond: &Condition) {
        if let Some(cost) = cond.one_time {
            self.skill_counter -= cost;
        } else if let Some(flag) = cond.forced_one_time {
            self.one_time_flags |= flag;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Condition;

    fn one_time(cost: i64) -> Condition {
        Condition {
            use_chance: 100,
            hp_threshold: None,
            one_time: Some(cost),
            forced_one_time: None,
            enemies_remaining: None,
        }
    }

    #[test]
    fn counter_budget_spends_and_refills() {
        let mut ctx = SimContext::new(1, CounterParams::new(3, 1));
        let cond = one_time(3);
        assert!(ctx.can_use(&cond));
        ctx.spend(&cond);
        assert!(!ctx.can_use(&cond));

        // Three turns of refill restore the budget, capped at max.
        for _ in 0..5 {
            ctx.refill_counter();
        }
        assert_eq!(ctx.skill_counter, 3);
        assert!(ctx.can_use(&cond));
    }

    #[test]
    fn forced_one_time_flag_is_set_only() {
        let mut ctx = SimContext::new(1, CounterParams::default());
        let cond = Condition {
            use_chance: 100,
            hp_threshold: None,
            one_time: None,
            forced_one_time: Some(0b100),
            enemies_remaining: None,
        };
        assert!(ctx.can_use(&cond));
        ctx.spend(&cond);
        assert!(!ctx.can_use(&cond));
        ctx.advance_turn(false);
        ctx.refill_counter();
        assert!(!ctx.can_use(&cond));
    }

    #[test]
    fn active_shield_blocks_recast_until_it_expires() {
        let mut ctx = SimContext::new(1, CounterParams::default());
        let shield = ActionKind::Shield {
            family: ShieldFamily::Status,
            label: "status_shield",
            turns: 2,
        };

        assert!(ctx.apply_effect(&shield));
        assert!(!ctx.apply_effect(&shield));
        assert!(!ctx.could_apply_effect(&shield));

        ctx.advance_turn(false);
        assert!(!ctx.apply_effect(&shield));
        ctx.advance_turn(false);
        assert!(ctx.could_apply_effect(&shield));
        assert!(ctx.apply_effect(&shield));
    }

    #[test]
    fn enrage_cooldown_delays_the_first_cast() {
        let mut ctx = SimContext::new(1, CounterParams::default());
        let enrage = ActionKind::Enrage {
            turns: 2,
            enemy_count: None,
            cooldown: Some(3),
        };

        // The first attempt only starts the cooldown.
        assert!(!ctx.apply_effect(&enrage));
        ctx.advance_turn(false);
        assert!(!ctx.apply_effect(&enrage));
        ctx.advance_turn(false);
        assert!(ctx.apply_effect(&enrage));
        assert!(ctx.is_enraged());

        // While enraged, no re-cast.
        assert!(!ctx.apply_effect(&enrage));
    }

    #[test]
    fn enemy_count_gates_the_enrage() {
        let mut ctx = SimContext::new(1, CounterParams::default());
        let enrage = ActionKind::Enrage {
            turns: 2,
            enemy_count: Some(1),
            cooldown: None,
        };
        assert!(!ctx.could_apply_effect(&enrage));
        ctx.enemies = 1;
        assert!(ctx.apply_effect(&enrage));
    }
}
