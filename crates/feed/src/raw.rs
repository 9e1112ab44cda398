//! Raw monster records.
//!
//! A monster row arrives as one flat JSON array mixing integers, floats, and
//! strings. Only the enemy-behavior fields matter here; player-side stats are
//! skipped. The behavior ref list is length-prefixed inside the flat array:
//! the count sits at index 57 and the `(instruction_id, ai, rnd)` triples
//! follow it.

use anyhow::{Context, bail};
use serde_json::Value;

use bestiary_core::{BehaviorRef, CounterParams, InstructionId, MonsterNo};

const IDX_MONSTER_NO: usize = 0;
const IDX_NAME: usize = 1;
const IDX_SPAWN_KIND: usize = 9;
const IDX_ENEMY_MAX_LEVEL: usize = 37;
const IDX_USE_NEW_AI: usize = 52;
const IDX_COUNTER_MAX: usize = 53;
const IDX_COUNTER_INCREMENT: usize = 54;
const IDX_REF_COUNT: usize = 57;

/// One monster as it appears in a region feed, trimmed to the fields the
/// reconstruction needs.
#[derive(Clone, Debug)]
pub struct RawCard {
    pub monster_no: MonsterNo,
    pub name: String,
    /// Highest level this monster spawns at as an enemy.
    pub enemy_max_level: i64,
    /// Old-AI monsters predate explicit one-time costs.
    pub use_new_ai: bool,
    /// Spawn kind 5 marks a monster that always fights alone, so
    /// remaining-enemy branches resolve at a count of one.
    pub force_one_enemy: bool,
    pub counter: CounterParams,
    pub behavior_refs: Vec<BehaviorRef>,
}

fn num(row: &[Value], index: usize) -> anyhow::Result<i64> {
    let value = row
        .get(index)
        .with_context(|| format!("monster row too short, missing index {index}"))?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .with_context(|| format!("monster row index {index} is not numeric: {value}"))
}

fn text(row: &[Value], index: usize) -> anyhow::Result<String> {
    row.get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .with_context(|| format!("monster row index {index} is not a string"))
}

impl RawCard {
    /// Decodes one flat monster row.
    pub fn from_row(row: &[Value]) -> anyhow::Result<RawCard> {
        let monster_no = MonsterNo(num(row, IDX_MONSTER_NO)? as u32);
        let name = text(row, IDX_NAME)?;

        let ref_count = num(row, IDX_REF_COUNT)? as usize;
        let triples_start = IDX_REF_COUNT + 1;
        let triples_end = triples_start + ref_count * 3;
        if row.len() < triples_end {
            bail!(
                "monster {monster_no} declares {ref_count} behavior refs but the row ends early"
            );
        }
        let mut behavior_refs = Vec::with_capacity(ref_count);
        for i in (triples_start..triples_end).step_by(3) {
            behavior_refs.push(BehaviorRef::new(
                InstructionId(num(row, i)? as u32),
                num(row, i + 1)? as u32,
                num(row, i + 2)? as u32,
            ));
        }

        Ok(RawCard {
            monster_no,
            name,
            enemy_max_level: num(row, IDX_ENEMY_MAX_LEVEL)?,
            use_new_ai: num(row, IDX_USE_NEW_AI)? != 0,
            force_one_enemy: num(row, IDX_SPAWN_KIND)? == 5,
            counter: CounterParams::new(num(row, IDX_COUNTER_MAX)?, num(row, IDX_COUNTER_INCREMENT)?),
            behavior_refs,
        })
    }

    /// Whether this monster has any enemy behavior to reconstruct.
    pub fn has_behavior(&self) -> bool {
        !self.behavior_refs.is_empty()
    }
}
