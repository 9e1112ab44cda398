//! Region feed loaders.
//!
//! Each region publishes two JSON documents: the instruction feed, whose
//! payload is one pseudo-CSV blob under `enemy_skills`, and the monster feed,
//! whose payload is an array of flat rows under `card`. Loading is the only
//! I/O in the pipeline; everything downstream works on the values produced
//! here.

use std::path::Path;

use serde::Deserialize;

use bestiary_core::{Instruction, Region, decode_row};

use crate::parse::tokenize_blob;
use crate::raw::RawCard;

/// Common result type for loaders.
pub type LoadResult<T> = anyhow::Result<T>;

fn read_file(path: &Path) -> LoadResult<String> {
    std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read file {}: {}", path.display(), e))
}

#[derive(Deserialize)]
struct InstructionEnvelope {
    enemy_skills: String,
    #[serde(default)]
    v: Option<i64>,
}

#[derive(Deserialize)]
struct CardEnvelope {
    card: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    v: Option<i64>,
}

/// One region's decoded instruction feed plus the rows that failed to
/// decode. Callers use the malformed count to reject a feed that is mostly
/// garbage rather than silently working with its remnants.
#[derive(Debug, Default)]
pub struct InstructionFeed {
    pub instructions: Vec<Instruction>,
    pub malformed_rows: usize,
}

/// Loads and decodes one region's instruction feed.
///
/// A structurally broken row is logged, counted, and skipped; the rest of
/// the feed still loads. Missing instructions later surface as empty script
/// slots.
pub fn load_instructions(path: &Path) -> LoadResult<InstructionFeed> {
    let content = read_file(path)?;
    let envelope: InstructionEnvelope = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse instruction feed {}: {}", path.display(), e))?;
    if let Some(v) = envelope.v {
        tracing::debug!(version = v, path = %path.display(), "instruction feed version");
    }

    let mut feed = InstructionFeed::default();
    for row in tokenize_blob(&envelope.enemy_skills) {
        match decode_row(&row) {
            Ok(ins) => feed.instructions.push(ins),
            Err(err) => {
                feed.malformed_rows += 1;
                tracing::warn!(row = ?row.first(), error = %err, "skipping malformed instruction row");
            }
        }
    }
    Ok(feed)
}

/// Loads and decodes one region's monster feed.
pub fn load_cards(path: &Path) -> LoadResult<Vec<RawCard>> {
    let content = read_file(path)?;
    let envelope: CardEnvelope = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse monster feed {}: {}", path.display(), e))?;
    if let Some(v) = envelope.v {
        tracing::debug!(version = v, path = %path.display(), "monster feed version");
    }

    let mut cards = Vec::with_capacity(envelope.card.len());
    for row in &envelope.card {
        match RawCard::from_row(row) {
            Ok(card) => cards.push(card),
            Err(err) => {
                tracing::warn!(error = %err, "skipping malformed monster row");
            }
        }
    }
    Ok(cards)
}

/// Everything one region contributes to a pipeline run.
#[derive(Debug)]
pub struct RegionData {
    pub region: Region,
    pub instructions: Vec<Instruction>,
    /// Instruction rows dropped during decoding.
    pub malformed_rows: usize,
    pub cards: Vec<RawCard>,
}

/// Loads both feeds for one region.
pub fn load_region(
    region: Region,
    instruction_path: &Path,
    card_path: &Path,
) -> LoadResult<RegionData> {
    let feed = load_instructions(instruction_path)?;
    let cards = load_cards(card_path)?;
    tracing::info!(
        %region,
        instructions = feed.instructions.len(),
        malformed = feed.malformed_rows,
        monsters = cards.len(),
        "region feed loaded"
    );
    Ok(RegionData {
        region,
        instructions: feed.instructions,
        malformed_rows: feed.malformed_rows,
        cards,
    })
}
