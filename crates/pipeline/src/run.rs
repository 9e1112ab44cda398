//! Run orchestration.
//!
//! One run is a synchronous batch over a fixed snapshot: merge the loaded
//! region feeds, link instructions once, then reconstruct entities one at a
//! time. Entities are independent; a failure inside one is logged and the
//! run continues. Only a pervasively broken snapshot aborts.

use anyhow::bail;

use bestiary_core::{InstructionArena, Script, flatten, synthesize_levels};
use bestiary_feed::RegionData;

use crate::config::SynthesisConfig;
use crate::ident::IdentResolver;
use crate::merge::{Composite, merge_cards, merge_instructions};
use crate::storage::{BehaviorRecord, EntitySink};

/// Totals for one pipeline run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Composite entities built from the merged feeds.
    pub entities: usize,
    /// Entities with behavior that produced a record.
    pub emitted: usize,
    /// (entity, level) syntheses that failed and were skipped.
    pub skipped_levels: usize,
    /// Entities flagged with unused action instructions.
    pub with_unused: usize,
}

/// Snapshot sanity check. A region that publishes monsters but no
/// instructions would silently produce empty movesets for every entity it
/// owns, so that aborts the run instead.
fn check_snapshot(feeds: &[RegionData]) -> anyhow::Result<()> {
    for feed in feeds {
        let with_behavior = feed.cards.iter().filter(|c| c.has_behavior()).count();
        if with_behavior > 0 && feed.instructions.is_empty() {
            bail!(
                "{} feed has {} monsters with behavior but zero instructions",
                feed.region,
                with_behavior
            );
        }
        if feed.malformed_rows > feed.instructions.len() {
            bail!(
                "{} feed dropped {} malformed instruction rows against {} decoded, snapshot unusable",
                feed.region,
                feed.malformed_rows,
                feed.instructions.len()
            );
        }
        tracing::info!(
            region = %feed.region,
            monsters = feed.cards.len(),
            with_behavior,
            instructions = feed.instructions.len(),
            malformed = feed.malformed_rows,
            "snapshot region"
        );
    }
    Ok(())
}

fn reconstruct(
    composite: &Composite,
    arena: &InstructionArena,
    config: &SynthesisConfig,
    script: &Script,
) -> BehaviorRecord {
    let synthesis = synthesize_levels(
        script,
        arena,
        composite.counter(),
        config.turn_bound_for(composite.card_id),
        composite.force_one_enemy(),
    );
    for (level, err) in &synthesis.skipped {
        tracing::warn!(
            card = %composite.card_id,
            level,
            error = %err,
            "level skipped"
        );
    }
    BehaviorRecord {
        card_id: composite.card_id,
        name: composite.name().to_string(),
        behavior: flatten(&synthesis.movesets),
        unused: synthesis.unused,
        skipped_levels: synthesis.skipped.iter().map(|(level, _)| *level).collect(),
    }
}

/// Executes one full reconstruction run over the loaded feeds.
pub fn run(
    feeds: Vec<RegionData>,
    resolver: &IdentResolver,
    config: &SynthesisConfig,
    sink: &mut dyn EntitySink,
) -> anyhow::Result<RunReport> {
    check_snapshot(&feeds)?;

    let mut instruction_feeds = Vec::with_capacity(feeds.len());
    let mut card_feeds = Vec::with_capacity(feeds.len());
    for feed in feeds {
        instruction_feeds.push((feed.region, feed.instructions));
        card_feeds.push((feed.region, feed.cards));
    }

    let arena = InstructionArena::link(merge_instructions(instruction_feeds));
    let composites = merge_cards(card_feeds, resolver);

    let mut report = RunReport {
        entities: composites.len(),
        ..RunReport::default()
    };

    let mut scripts = Vec::new();
    for composite in &composites {
        if !composite.has_behavior() {
            scripts.push(None);
            continue;
        }
        let mut script = Script::build(
            composite.behavior_refs(),
            &arena,
            config.is_zero_indexed(composite.card_id),
        );
        if composite.uses_old_ai() {
            script.inject_implicit_one_time(composite.counter(), &arena);
        }
        scripts.push(Some(script));
    }
    arena.audit_coverage(scripts.iter().flatten());

    for (composite, script) in composites.iter().zip(&scripts) {
        let Some(script) = script else {
            continue;
        };
        let record = reconstruct(composite, &arena, config, script);
        report.skipped_levels += record.skipped_levels.len();
        if !record.unused.is_empty() {
            tracing::info!(
                card = %record.card_id,
                unused = record.unused.len(),
                "entity has unreachable action instructions"
            );
            report.with_unused += 1;
        }
        report.emitted += 1;
        sink.upsert(record)?;
    }

    tracing::info!(
        entities = report.entities,
        emitted = report.emitted,
        skipped_levels = report.skipped_levels,
        "run complete"
    );
    Ok(report)
}
