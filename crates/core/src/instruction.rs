//! Raw instruction decoding.
//!
//! One raw feed row describes one enemy skill instruction:
//! `[id, name, type_tag, hex_flags, params...]`. The 16-bit flag field
//! controls which of the 16 parameter slots are present; present slots are
//! consumed from the trailing fields in ascending bit order, and an absent
//! bit means the slot is unset (not zero).
//!
//! The type tag selects the decoded variant through an exhaustive match over
//! the known tag set. A tag outside that set degrades to
//! [`InstructionKind::Unknown`] with a diagnostic log entry; live feeds grow
//! new tags faster than they get classified, so this is never an error.

use serde::Serialize;

use crate::types::InstructionId;

/// One optional parameter slot: most are integers, a few carry text
/// (death-cry messages, operator notes).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Param {
    Num(i64),
    Text(String),
}

impl Param {
    fn parse(field: &str) -> Param {
        match field.parse::<i64>() {
            Ok(n) => Param::Num(n),
            Err(_) => Param::Text(field.to_string()),
        }
    }
}

/// The 16 optional parameter slots of one instruction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Params {
    slots: Vec<Option<Param>>,
}

impl Params {
    pub const SLOTS: usize = 16;

    /// Extracts parameters from the trailing raw fields according to the
    /// presence flag. Bit `i` set means slot `i` is filled from the next
    /// unconsumed field.
    pub fn from_fields(flags: u16, fields: &[String]) -> Result<Params, DecodeError> {
        let mut slots = vec![None; Self::SLOTS];
        let mut next_field = 0usize;
        for bit in 0..Self::SLOTS {
            if (flags >> bit) & 1 == 0 {
                continue;
            }
            let field = fields.get(next_field).ok_or(DecodeError::MissingParam {
                bit: bit as u8,
                available: fields.len(),
            })?;
            slots[bit] = Some(Param::parse(field));
            next_field += 1;
        }
        Ok(Params { slots })
    }

    pub fn get(&self, slot: usize) -> Option<&Param> {
        self.slots.get(slot).and_then(|p| p.as_ref())
    }

    /// Numeric value of a slot, if present and numeric.
    pub fn num(&self, slot: usize) -> Option<i64> {
        match self.get(slot) {
            Some(Param::Num(n)) => Some(*n),
            _ => None,
        }
    }

    /// Text value of a slot, if present and textual.
    pub fn text(&self, slot: usize) -> Option<&str> {
        match self.get(slot) {
            Some(Param::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// A raw row that could not be decoded structurally.
///
/// This covers malformed rows only; unknown type tags are not errors.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("row has {count} fields, need at least 4 (id, name, tag, flags)")]
    TooShort { count: usize },
    #[error("field {index} ({text:?}) is not a valid integer")]
    BadInt { index: usize, text: String },
    #[error("flags field {text:?} is not valid hex")]
    BadFlags { text: String },
    #[error("presence bit {bit} set but only {available} parameter fields remain")]
    MissingParam { bit: u8, available: usize },
}

/// Flag-register operation performed by a logic instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum FlagOp {
    Set,
    Unset,
    Or,
    Xor,
}

/// Counter-register operation performed by a logic instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CounterOp {
    Assign,
    Add,
    Sub,
}

/// Comparison used by branch instructions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Cmp {
    Lt,
    Le,
    Eq,
    Ge,
}

/// What a branch instruction tests. The branch operand and jump target travel
/// on the per-monster usage ref, not on the instruction itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum BranchRule {
    /// Taken when `operand & flags == operand`.
    Flag,
    Hp(Cmp),
    Counter(Cmp),
    Level(Cmp),
    /// Taken when a specific card is on the player team. Team composition is
    /// not simulated, so this never branches.
    Cards,
    /// Taken when the player made at least `operand` combos last turn.
    Combo,
    /// Taken when exactly `operand` enemies remain on screen.
    EnemiesRemaining,
}

/// Meta-instructions that steer script traversal and never surface as
/// player-visible behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LogicKind {
    Nop,
    FlagOp(FlagOp),
    SetCounter(CounterOp),
    /// Assign `rnd` to the counter when it currently equals `ai`.
    SetCounterIf,
    Branch(BranchRule),
    EndPath,
    /// Decrement the counter; while it stays positive, announce the value and
    /// end the turn.
    Countdown,
    /// Enables preemptive actions for monsters at or above the given level.
    Preemptive { level: i64 },
}

/// Always-on abilities (resists, resolve). Extracted ahead of simulation and
/// emitted at the head of the flattened output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PassiveKind {
    AttributeResist,
    TypeResist,
    Resolve,
    TurnChange,
}

/// Duration register shared by a family of timed effects. Casting an effect
/// overwrites the family's previous one, so an active duration suppresses a
/// re-cast until it runs out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ShieldFamily {
    Status,
    Damage,
    Void,
    AbsorbDamage,
    AbsorbAttribute,
    AbsorbCombo,
    Movetime,
}

impl ShieldFamily {
    pub const COUNT: usize = 7;

    pub(crate) fn slot(self) -> usize {
        self as usize
    }
}

/// Player-visible actions.
///
/// Only actions with structural weight for the simulator get their own
/// variant; everything else is an [`ActionKind::Effect`] carrying a stable
/// label for the rendering collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum ActionKind {
    /// Plain attack: `multiplier` percent of base damage per hit.
    Attack {
        multiplier: i64,
        min_hits: i64,
        max_hits: i64,
    },
    /// Attack that fires before the first player turn and ends traversal.
    PreemptiveAttack,
    /// The monster does nothing this turn.
    Inactivity,
    /// Removes player buffs. Unlike other always-fire actions this is not
    /// terminal at 100% chance.
    Dispel,
    /// Fires when the monster is defeated; carries an optional message.
    DeathCry,
    /// An ordered combo of other instructions, referenced by id.
    SkillSet { refs: Vec<InstructionId> },
    /// A combo performed on defeat.
    SkillSetOnDeath { refs: Vec<InstructionId> },
    /// Immediately ends the battle.
    EndBattle,
    /// Attack boost lasting `turns`. `enemy_count` restricts the cast to
    /// when at most that many enemies remain; `cooldown` blocks the first
    /// cast until that many turns have passed.
    Enrage {
        turns: i64,
        enemy_count: Option<i64>,
        cooldown: Option<i64>,
    },
    /// Timed effect whose family shares one duration register; casting while
    /// the previous one is still active is suppressed.
    Shield {
        family: ShieldFamily,
        label: &'static str,
        turns: i64,
    },
    /// Any other classified action; the label names the effect family.
    Effect { label: &'static str },
}

impl ActionKind {
    /// Whether reaching this action at 100% chance still allows traversal to
    /// continue to the next slot.
    pub fn continues_at_full_chance(&self) -> bool {
        matches!(self, ActionKind::Dispel)
    }
}

/// Decoded variant of one instruction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum InstructionKind {
    Action(ActionKind),
    Logic(LogicKind),
    Passive(PassiveKind),
    /// Tag not in the registered set. The tag and name are preserved on the
    /// instruction for later triage; the simulator treats it as an opaque
    /// action so it still shows up in movesets.
    Unknown,
}

impl InstructionKind {
    pub fn is_action(&self) -> bool {
        matches!(self, InstructionKind::Action(_) | InstructionKind::Unknown)
    }

    pub fn is_logic(&self) -> bool {
        matches!(self, InstructionKind::Logic(_))
    }

    pub fn is_passive(&self) -> bool {
        matches!(self, InstructionKind::Passive(_))
    }
}

/// One decoded unit of enemy behavior. Immutable once decoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Instruction {
    pub id: InstructionId,
    pub name: String,
    pub tag: u16,
    pub params: Params,
    pub kind: InstructionKind,
}

impl Instruction {
    /// Whether this instruction, on its own, ends the battle. Skill sets are
    /// checked after linking, when their members are resolvable.
    pub fn ends_battle(&self) -> bool {
        matches!(self.kind, InstructionKind::Action(ActionKind::EndBattle))
    }

    pub fn is_death_action(&self) -> bool {
        matches!(
            self.kind,
            InstructionKind::Action(ActionKind::DeathCry)
                | InstructionKind::Action(ActionKind::SkillSetOnDeath { .. })
        )
    }

    /// Ids referenced by this instruction, if it is a combo.
    pub fn set_refs(&self) -> Option<&[InstructionId]> {
        match &self.kind {
            InstructionKind::Action(ActionKind::SkillSet { refs })
            | InstructionKind::Action(ActionKind::SkillSetOnDeath { refs }) => Some(refs),
            _ => None,
        }
    }
}

fn parse_int(fields: &[String], index: usize) -> Result<i64, DecodeError> {
    let text = &fields[index];
    text.parse::<i64>().map_err(|_| DecodeError::BadInt {
        index,
        text: text.clone(),
    })
}

/// Decodes one tokenized raw row into an [`Instruction`].
///
/// Unknown tags log a `warn` diagnostic and come back as
/// [`InstructionKind::Unknown`]; only structurally broken rows fail.
pub fn decode_row(fields: &[String]) -> Result<Instruction, DecodeError> {
    if fields.len() < 4 {
        return Err(DecodeError::TooShort {
            count: fields.len(),
        });
    }

    let id = InstructionId(parse_int(fields, 0)? as u32);
    let name = fields[1].replace('\n', " ");
    let tag = parse_int(fields, 2)? as u16;
    let flags = u16::from_str_radix(&fields[3], 16).map_err(|_| DecodeError::BadFlags {
        text: fields[3].clone(),
    })?;
    let params = Params::from_fields(flags, &fields[4..])?;

    let kind = classify(tag, &params);
    if kind == InstructionKind::Unknown {
        tracing::warn!(
            instruction = %id,
            tag,
            name = %name,
            "unclassified instruction tag, keeping as unknown"
        );
    }

    Ok(Instruction {
        id,
        name,
        tag,
        params,
        kind,
    })
}

/// Collects the combo member ids stored in parameter slots 1 through 10.
fn set_refs(params: &Params) -> Vec<InstructionId> {
    (1..=10)
        .filter_map(|slot| params.num(slot))
        .map(|id| InstructionId(id as u32))
        .collect()
}

/// Maps a type tag to its decoded variant.
///
/// The tag set mirrors the live format as currently understood; gaps in the
/// numbering are tags that have never been observed or belong to retired
/// mechanics.
fn classify(tag: u16, params: &Params) -> InstructionKind {
    use ActionKind as A;
    use InstructionKind::{Action, Logic, Passive};
    use LogicKind as L;

    let effect = |label: &'static str| Action(A::Effect { label });

    match tag {
        // Logic
        0 | 93 => Logic(L::Nop),
        22 => Logic(L::FlagOp(FlagOp::Set)),
        24 => Logic(L::FlagOp(FlagOp::Unset)),
        44 => Logic(L::FlagOp(FlagOp::Or)),
        45 => Logic(L::FlagOp(FlagOp::Xor)),
        25 => Logic(L::SetCounter(CounterOp::Assign)),
        26 => Logic(L::SetCounter(CounterOp::Add)),
        27 => Logic(L::SetCounter(CounterOp::Sub)),
        38 => Logic(L::SetCounterIf),
        23 | 43 => Logic(L::Branch(BranchRule::Flag)),
        28 => Logic(L::Branch(BranchRule::Hp(Cmp::Lt))),
        29 => Logic(L::Branch(BranchRule::Hp(Cmp::Ge))),
        30 => Logic(L::Branch(BranchRule::Counter(Cmp::Le))),
        31 => Logic(L::Branch(BranchRule::Counter(Cmp::Eq))),
        32 => Logic(L::Branch(BranchRule::Counter(Cmp::Ge))),
        33 => Logic(L::Branch(BranchRule::Level(Cmp::Lt))),
        34 => Logic(L::Branch(BranchRule::Level(Cmp::Eq))),
        35 => Logic(L::Branch(BranchRule::Level(Cmp::Ge))),
        90 => Logic(L::Branch(BranchRule::Cards)),
        113 => Logic(L::Branch(BranchRule::Combo)),
        120 => Logic(L::Branch(BranchRule::EnemiesRemaining)),
        36 => Logic(L::EndPath),
        37 => Logic(L::Countdown),
        49 => Logic(L::Preemptive {
            level: params.num(1).unwrap_or(1),
        }),

        // Passives
        72 => Passive(PassiveKind::AttributeResist),
        73 => Passive(PassiveKind::Resolve),
        106 => Passive(PassiveKind::TurnChange),
        118 => Passive(PassiveKind::TypeResist),

        // Structural actions
        15 => Action(A::Attack {
            multiplier: params.num(3).unwrap_or(100),
            min_hits: params.num(1).unwrap_or(1),
            max_hits: params.num(2).unwrap_or(1),
        }),
        82 => Action(A::Attack {
            multiplier: 100,
            min_hits: 1,
            max_hits: 1,
        }),
        47 => Action(A::PreemptiveAttack),
        16 | 66 => Action(A::Inactivity),
        6 => Action(A::Dispel),
        40 => Action(A::EndBattle),
        69 => Action(A::DeathCry),
        83 => Action(A::SkillSet {
            refs: set_refs(params),
        }),
        95 => Action(A::SkillSetOnDeath {
            refs: set_refs(params),
        }),

        // Enrages and timed defensive effects carry an active duration that
        // the simulator tracks to suppress re-casts.
        17 => Action(A::Enrage {
            turns: params.num(2).unwrap_or(1),
            enemy_count: params.num(1),
            cooldown: None,
        }),
        19 => Action(A::Enrage {
            turns: params.num(2).unwrap_or(1),
            enemy_count: None,
            // A cooldown of one means no delay at all.
            cooldown: params.num(1).filter(|&c| c > 1),
        }),
        20 => Action(A::Shield {
            family: ShieldFamily::Status,
            label: "status_shield",
            turns: params.num(1).unwrap_or(0),
        }),
        39 => Action(A::Shield {
            family: ShieldFamily::Movetime,
            label: "movetime_debuff",
            turns: params.num(1).unwrap_or(0),
        }),
        53 => Action(A::Shield {
            family: ShieldFamily::AbsorbAttribute,
            label: "absorb_attribute",
            turns: params.num(2).or_else(|| params.num(1)).unwrap_or(0),
        }),
        67 => Action(A::Shield {
            family: ShieldFamily::AbsorbCombo,
            label: "absorb_combo",
            turns: params.num(2).or_else(|| params.num(1)).unwrap_or(0),
        }),
        71 => Action(A::Shield {
            family: ShieldFamily::Void,
            label: "void_shield",
            turns: params.num(1).unwrap_or(0),
        }),
        74 => Action(A::Shield {
            family: ShieldFamily::Damage,
            label: "damage_shield",
            turns: params.num(1).unwrap_or(0),
        }),
        87 => Action(A::Shield {
            family: ShieldFamily::AbsorbDamage,
            label: "absorb_threshold",
            turns: params.num(1).unwrap_or(0),
        }),

        // Effect-only actions; labels name the effect family for renderers.
        1 => effect("bind_random"),
        2 => effect("bind_attribute"),
        3 => effect("bind_typing"),
        4 => effect("orb_change_single"),
        5 | 62 => effect("blind"),
        7 | 86 => effect("recover_enemy"),
        8 => effect("store_power"),
        12 => effect("jammer_change_single"),
        13 => effect("jammer_change_random"),
        14 => effect("bind_skill"),
        18 => effect("attack_up_status"),
        46 => effect("change_attribute"),
        48 => effect("orb_change_attack"),
        50 => effect("gravity"),
        52 => effect("recover_enemy_ally"),
        54 => effect("bind_target"),
        55 => effect("recover_player"),
        56 => effect("poison_change_single"),
        60 => effect("poison_change_random"),
        61 => effect("mortal_poison_change_random"),
        63 => effect("bind_attack"),
        64 => effect("poison_change_random_attack"),
        65 => effect("bind_random_sub"),
        68 | 96 => effect("skyfall"),
        75 => effect("leader_swap"),
        76 | 77 => effect("column_spawn"),
        78 | 79 => effect("row_spawn"),
        81 => effect("board_change_attack_flat"),
        84 => effect("board_change"),
        85 => effect("board_change_attack_bits"),
        88 => effect("bind_awoken"),
        89 => effect("skill_delay"),
        92 => effect("random_spawn"),
        94 => effect("orb_lock"),
        97 => effect("blind_sticky_random"),
        98 => effect("blind_sticky_fixed"),
        99 => effect("orb_seal_column"),
        100 => effect("orb_seal_row"),
        101 => effect("fixed_start"),
        102 => effect("bomb_random_spawn"),
        103 => effect("bomb_fixed_spawn"),
        104 => effect("cloud"),
        105 => effect("rcv_debuff"),
        107 => effect("attribute_block"),
        108 => effect("orb_change_attack_bits"),
        109 => effect("spinners_random"),
        110 => effect("spinners_fixed"),
        111 => effect("max_hp_change"),
        112 => effect("fixed_target"),
        119 | 123 => effect("invulnerable_on"),
        121 => effect("invulnerable_off"),
        122 => effect("turn_change_active"),
        124 => effect("gacha_fever"),
        125 => effect("leader_alter"),
        127 => effect("no_skyfall"),

        _ => InstructionKind::Unknown,
    }
}

/// Trigger gate attached to one action usage.
///
/// Built from the monster's usage ref plus the instruction's own parameter
/// slots: the HP threshold travels in slot 11, the one-time counter cost in
/// slot 13.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Condition {
    /// Likelihood (0-100) the action fires when reached.
    pub use_chance: u32,
    /// Only fires while HP is strictly under this percentage.
    pub hp_threshold: Option<i64>,
    /// Counter budget consumed when this fires; gates to at most a handful of
    /// uses per battle.
    pub one_time: Option<i64>,
    /// Synthetic once-ever flag bit injected for legacy scripts that predate
    /// explicit one-time costs.
    pub forced_one_time: Option<u64>,
    /// Only fires while at most this many enemies remain on screen.
    pub enemies_remaining: Option<i64>,
}

impl Condition {
    /// Derives the gate for an action usage. An HP threshold of zero, or one
    /// paired with a zero `ai` weight, is feed noise and is dropped, matching
    /// observed behavior.
    pub fn from_usage(ai: u32, rnd: u32, ins: &Instruction) -> Condition {
        let mut hp_threshold = ins.params.num(11).filter(|&t| t != 0);
        if ai == 0 {
            hp_threshold = None;
        }
        // Ally recovery needs an ally left to recover.
        let enemies_remaining = matches!(
            ins.kind,
            InstructionKind::Action(ActionKind::Effect {
                label: "recover_enemy_ally"
            })
        )
        .then_some(1);
        Condition {
            use_chance: ai.max(rnd),
            hp_threshold,
            one_time: ins.params.num(13),
            forced_one_time: None,
            enemies_remaining,
        }
    }

    pub fn fires_once(&self) -> bool {
        self.one_time.is_some() || self.forced_one_time.is_some()
    }
}
