//! Pipeline configuration.

use std::collections::HashSet;

use serde::Deserialize;

use bestiary_core::{CardId, DEFAULT_TURN_BOUND};

/// Tunable synthesis parameters.
///
/// The defaults are the shipped values; a run can deserialize overrides from
/// configuration when an entity turns out to need them.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Turns unrolled per HP checkpoint before cycle detection gives up.
    pub turn_bound: usize,
    /// Bound used instead for entities on the allow-list.
    pub extended_turn_bound: usize,
    /// Entities known to need longer unrolling before periodicity shows.
    pub extended_entities: HashSet<CardId>,
    /// Entities whose scripts count slots from 0 instead of 1.
    pub zero_indexed_entities: HashSet<CardId>,
}

impl SynthesisConfig {
    pub const DEFAULT_EXTENDED_TURN_BOUND: usize = 60;

    /// The one known zero-indexed script.
    const ZERO_INDEXED: [u32; 1] = [565];

    pub fn new() -> Self {
        SynthesisConfig {
            turn_bound: DEFAULT_TURN_BOUND,
            extended_turn_bound: Self::DEFAULT_EXTENDED_TURN_BOUND,
            extended_entities: HashSet::new(),
            zero_indexed_entities: Self::ZERO_INDEXED.iter().map(|&id| CardId(id)).collect(),
        }
    }

    pub fn turn_bound_for(&self, card_id: CardId) -> usize {
        if self.extended_entities.contains(&card_id) {
            self.extended_turn_bound
        } else {
            self.turn_bound
        }
    }

    pub fn is_zero_indexed(&self, card_id: CardId) -> bool {
        self.zero_indexed_entities.contains(&card_id)
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_listed_entities_get_the_extended_bound() {
        let mut config = SynthesisConfig::new();
        config.extended_entities.insert(CardId(1234));
        assert_eq!(config.turn_bound_for(CardId(1234)), 60);
        assert_eq!(config.turn_bound_for(CardId(1)), DEFAULT_TURN_BOUND);
    }

    #[test]
    fn overrides_deserialize_over_defaults() {
        let config: SynthesisConfig =
            serde_json::from_str(r#"{"turn_bound": 30, "extended_entities": [99]}"#).unwrap();
        assert_eq!(config.turn_bound, 30);
        assert!(config.extended_entities.contains(&CardId(99)));
        // Untouched fields keep their defaults.
        assert!(config.is_zero_indexed(CardId(565)));
    }
}
