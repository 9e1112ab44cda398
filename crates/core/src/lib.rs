//! Deterministic enemy-behavior reconstruction shared across the pipeline.
//!
//! `bestiary-core` defines the instruction model (decoding, linking,
//! simulation, flattening) and exposes pure APIs with no I/O. Feed loading
//! and region reconciliation live in the supporting crates and depend on the
//! types re-exported here.
pub mod flatten;
pub mod graph;
pub mod instruction;
pub mod synth;
pub mod types;

pub use flatten::{BehaviorGroup, EntityBehavior, LevelBehavior, flatten};
pub use graph::{InstructionArena, Script, Step};
pub use instruction::{
    ActionKind, BranchRule, Cmp, Condition, CounterOp, DecodeError, FlagOp, Instruction,
    InstructionKind, LogicKind, Param, Params, PassiveKind, ShieldFamily, decode_row,
};
pub use synth::{
    DEFAULT_TURN_BOUND, EmittedAction, HpGroup, LevelSynthesis, Moveset, RemainingMoveset,
    RepeatGroup, SynthError, TimedGroup, convert, extract_levels, synthesize_levels,
};
pub use types::{BehaviorRef, CardId, CounterParams, InstructionId, MonsterNo, Region};
