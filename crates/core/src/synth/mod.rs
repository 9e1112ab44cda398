//! Moveset synthesis.
//!
//! The synthesizer probes a linked behavior script turn by turn, at every HP
//! checkpoint the script can distinguish, until the fired-action sequence
//! provably repeats. The result is a compact [`Moveset`]: what the monster
//! does before the first player turn, what it does as HP drops, and what it
//! does when defeated.
//!
//! Synthesis is pure over immutable inputs; a script that never settles into
//! a cycle within the turn bound is a recoverable per-level failure, not a
//! pipeline error.

mod context;
mod levels;
mod simulate;

pub use levels::{LevelSynthesis, extract_levels, synthesize_levels};
pub use simulate::convert;

use serde::Serialize;

use crate::types::InstructionId;

/// Default number of turns unrolled per HP checkpoint before giving up on
/// cycle detection. A handful of entities need a larger bound; the pipeline
/// keeps that allow-list in its config.
pub const DEFAULT_TURN_BOUND: usize = 20;

/// Hard cap on slots traversed within a single simulated turn. Scripts are
/// short; hitting this means a jump cycle that the traversed-set guard
/// somehow missed.
pub(crate) const MAX_TRAVERSAL: usize = 1000;

/// One action as it surfaces in a moveset: the instruction plus the usage
/// gating a reader cares about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmittedAction {
    pub instruction: InstructionId,
    pub name: String,
    /// Likelihood (0-100) of firing when its slot is reached.
    pub use_chance: u32,
    /// Whether this is a once-per-battle action.
    pub fires_once: bool,
    /// Synthetic countdown announcement value, for countdown logic turns.
    pub countdown: Option<i64>,
}

/// Actions executing on one specific turn, optionally spanning a turn range
/// after collapse.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TimedGroup {
    pub turn: u32,
    pub end_turn: Option<u32>,
    /// Lowest HP threshold this group was verified to extend down to; `None`
    /// means it holds only at its own band.
    pub hp_floor: Option<u32>,
    pub actions: Vec<EmittedAction>,
}

/// Actions executing every `interval` turns once the timed prefix has played
/// out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RepeatGroup {
    /// Position of this group within the cycle, 1-based.
    pub phase: u32,
    pub end_phase: Option<u32>,
    /// Cycle length in turns.
    pub interval: u32,
    pub hp_floor: Option<u32>,
    pub actions: Vec<EmittedAction>,
}

/// Behavior within one HP band, keyed by the band's upper threshold.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HpGroup {
    /// Upper HP percentage of this band (100 for the top band).
    pub hp: u32,
    pub timed: Vec<TimedGroup>,
    pub repeating: Vec<RepeatGroup>,
}

impl HpGroup {
    pub fn is_empty(&self) -> bool {
        self.timed.is_empty() && self.repeating.is_empty()
    }
}

/// Alternate turn cadence that applies only while exactly `enemies` remain
/// on screen. Kept as a delta against the standard cadence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RemainingMoveset {
    pub enemies: u32,
    pub dispel_action: Option<EmittedAction>,
    pub status_action: Option<EmittedAction>,
    pub groups: Vec<HpGroup>,
}

/// The synthesized, deduplicated description of one entity's combat behavior
/// at one level. Terminal artifact of the engine; never mutated after
/// synthesis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Moveset {
    pub level: i64,
    /// Always-on abilities (resists, resolve).
    pub passives: Vec<EmittedAction>,
    /// Performed once, before the first player turn.
    pub preemptives: Vec<EmittedAction>,
    /// Performed when the monster is defeated.
    pub death_actions: Vec<EmittedAction>,
    /// Player-buff removal hoisted out of the turn cadence.
    pub dispel_action: Option<EmittedAction>,
    /// Status-triggered enrage hoisted out of the turn cadence.
    pub status_action: Option<EmittedAction>,
    /// HP-banded behavior, ordered by descending threshold.
    pub groups: Vec<HpGroup>,
    /// Alternate cadences keyed by remaining-enemy count, descending.
    pub remaining: Vec<RemainingMoveset>,
}

impl Moveset {
    pub(crate) fn empty(level: i64) -> Self {
        Moveset {
            level,
            passives: Vec::new(),
            preemptives: Vec::new(),
            death_actions: Vec::new(),
            dispel_action: None,
            status_action: None,
            groups: Vec::new(),
            remaining: Vec::new(),
        }
    }

    /// Whether anything player-visible was reconstructed at this level.
    pub fn has_actions(&self) -> bool {
        !self.preemptives.is_empty()
            || !self.death_actions.is_empty()
            || self.dispel_action.is_some()
            || self.status_action.is_some()
            || !self.groups.is_empty()
            || !self.remaining.is_empty()
    }
}

/// Per-(entity, level) synthesis failure. Recoverable: the level is skipped
/// and later levels proceed independently.
#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    #[error("no repeating cycle found within {turn_bound} simulated turns at hp {hp}")]
    NoCycle { turn_bound: usize, hp: u32 },
    #[error("failed to canonicalize moveset: {0}")]
    Canonicalize(#[from] serde_json::Error),
}
