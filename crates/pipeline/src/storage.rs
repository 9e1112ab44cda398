//! Storage seam.
//!
//! The pipeline emits one upsert-shaped record per reconstructed entity and
//! knows nothing about tables or SQL; a sink implementation owns those
//! concerns entirely. [`MemorySink`] backs tests and dry runs.

use serde::Serialize;

use bestiary_core::{CardId, EntityBehavior, InstructionId};

/// Everything the pipeline knows about one entity at the end of a run.
#[derive(Clone, Debug, Serialize)]
pub struct BehaviorRecord {
    pub card_id: CardId,
    pub name: String,
    pub behavior: EntityBehavior,
    /// Action instructions never emitted at any level, for human review.
    pub unused: Vec<InstructionId>,
    /// Levels whose synthesis failed and was skipped.
    pub skipped_levels: Vec<i64>,
}

/// Consumer of finished records, invoked once per entity.
pub trait EntitySink {
    fn upsert(&mut self, record: BehaviorRecord) -> anyhow::Result<()>;
}

/// Sink that keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<BehaviorRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink::default()
    }

    pub fn find(&self, card_id: CardId) -> Option<&BehaviorRecord> {
        self.records.iter().find(|r| r.card_id == card_id)
    }
}

impl EntitySink for MemorySink {
    fn upsert(&mut self, record: BehaviorRecord) -> anyhow::Result<()> {
        self.records.push(record);
        Ok(())
    }
}
