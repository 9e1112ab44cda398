//! Cross-region reconstruction pipeline.
//!
//! `bestiary-pipeline` ties the pure core to the feed loaders: identity
//! resolution, region merging, per-entity synthesis orchestration, and the
//! storage seam. One [`run::run`] call is one batch over a fixed snapshot.

pub mod config;
pub mod ident;
pub mod merge;
pub mod run;
pub mod storage;
pub mod telemetry;

pub use config::SynthesisConfig;
pub use ident::{IdentError, IdentResolver, RangeRule};
pub use merge::{Composite, is_placeholder_name, merge_cards, merge_instructions, richness};
pub use run::{RunReport, run};
pub use storage::{BehaviorRecord, EntitySink, MemorySink};
