//! Shared identifier and region types.
//!
//! Every identity in the engine is a newtype over a plain integer so that
//! region-local ids, canonical ids, and instruction ids cannot be confused
//! at a call site.

use serde::{Deserialize, Serialize};

/// Stable identifier for one enemy skill instruction within a regional feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstructionId(pub u32);

impl core::fmt::Display for InstructionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Region-agnostic canonical identity for a monster.
///
/// Exactly one canonical number exists per logical monster; region-local
/// [`MonsterNo`]s map many-to-one onto it via the identity resolver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CardId(pub u32);

impl core::fmt::Display for CardId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Region-local monster number, exactly as it appears in one regional feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonsterNo(pub u32);

impl core::fmt::Display for MonsterNo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Regional game server a feed snapshot was pulled from.
///
/// The three servers version independently. JP receives content first, so it
/// is the reference region for both identity resolution and field fallback.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
    strum::EnumString,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Region {
    Jp,
    Na,
    Kr,
}

impl Region {
    /// Fallback order for reads from a composite record: JP, then NA, then KR.
    pub const AUTHORITY_ORDER: [Region; 3] = [Region::Jp, Region::Na, Region::Kr];

    /// Whether this region's local ids are canonical as-is.
    pub fn is_reference(self) -> bool {
        matches!(self, Region::Jp)
    }
}

/// Per-monster usage of an instruction: which skill, and the AI weights that
/// gate it for this particular monster.
///
/// `ai` is an additive chance applied under an HP threshold; `rnd` is the base
/// chance. The effective use chance is the larger of the two.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorRef {
    pub instruction_id: InstructionId,
    pub ai: u32,
    pub rnd: u32,
}

impl BehaviorRef {
    pub fn new(instruction_id: InstructionId, ai: u32, rnd: u32) -> Self {
        Self {
            instruction_id,
            ai,
            rnd,
        }
    }

    /// Likelihood (0-100) that the referenced instruction fires when reached.
    pub fn use_chance(&self) -> u32 {
        self.ai.max(self.rnd)
    }
}

/// Enemy-side turn counter parameters for one monster.
///
/// The counter starts at `max`, is spent by one-time skills, and refills by
/// `increment` each simulated turn (never exceeding `max`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterParams {
    pub max: i64,
    pub increment: i64,
}

impl CounterParams {
    pub fn new(max: i64, increment: i64) -> Self {
        Self { max, increment }
    }

    /// Conservative merge of two regional values: the larger wins on disagreement.
    pub fn merged_with(self, other: CounterParams) -> CounterParams {
        CounterParams {
            max: self.max.max(other.max),
            increment: self.increment.max(other.increment),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn use_chance_takes_larger_weight() {
        let r = BehaviorRef::new(InstructionId(1), 30, 100);
        assert_eq!(r.use_chance(), 100);
        let r = BehaviorRef::new(InstructionId(1), 100, 0);
        assert_eq!(r.use_chance(), 100);
    }

    #[test]
    fn counter_params_merge_is_conservative() {
        let jp = CounterParams::new(5, 1);
        let na = CounterParams::new(3, 2);
        assert_eq!(jp.merged_with(na), CounterParams::new(5, 2));
    }

    #[test]
    fn authority_order_starts_at_reference() {
        assert!(Region::AUTHORITY_ORDER[0].is_reference());
        assert!(!Region::Na.is_reference());
    }
}
