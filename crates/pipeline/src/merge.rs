//! Cross-region reconciliation.
//!
//! Each region contributes its own monster records and instruction exemplars.
//! Merging groups them by canonical id into composite records; reads fall
//! back through the authority order (JP, then NA, then KR) and regions that
//! lack an entity stay absent rather than being dropped or invented.

use std::collections::HashMap;

use bestiary_core::{
    BehaviorRef, CardId, CounterParams, Instruction, Params, Region,
};
use bestiary_feed::RawCard;

use crate::ident::IdentResolver;

/// Placeholder names mark rows published before localization; such a record
/// exists but must not win any conflict.
pub fn is_placeholder_name(name: &str) -> bool {
    ["***", "???"].iter().any(|marker| name.contains(marker))
}

/// How well-populated an instruction exemplar is: the count of filled
/// parameter slots. Regions that lag behind publish thinner exemplars of the
/// same instruction; the richer one carries more variant branches and wins.
pub fn richness(params: &Params) -> usize {
    (0..Params::SLOTS).filter(|&slot| params.get(slot).is_some()).count()
}

/// One canonical entity with up to one exemplar record per region.
#[derive(Clone, Debug)]
pub struct Composite {
    pub card_id: CardId,
    pub jp: Option<RawCard>,
    pub na: Option<RawCard>,
    pub kr: Option<RawCard>,
}

impl Composite {
    fn new(card_id: CardId) -> Composite {
        Composite {
            card_id,
            jp: None,
            na: None,
            kr: None,
        }
    }

    pub fn region(&self, region: Region) -> Option<&RawCard> {
        match region {
            Region::Jp => self.jp.as_ref(),
            Region::Na => self.na.as_ref(),
            Region::Kr => self.kr.as_ref(),
        }
    }

    fn slot_mut(&mut self, region: Region) -> &mut Option<RawCard> {
        match region {
            Region::Jp => &mut self.jp,
            Region::Na => &mut self.na,
            Region::Kr => &mut self.kr,
        }
    }

    fn by_authority(&self) -> impl Iterator<Item = (Region, &RawCard)> {
        Region::AUTHORITY_ORDER
            .iter()
            .filter_map(|&region| self.region(region).map(|card| (region, card)))
    }

    /// The exemplar reads default to: most authoritative populated region
    /// whose name is real, else most authoritative populated region.
    pub fn primary(&self) -> Option<(Region, &RawCard)> {
        self.by_authority()
            .find(|(_, card)| !is_placeholder_name(&card.name))
            .or_else(|| self.by_authority().next())
    }

    pub fn name(&self) -> &str {
        self.primary().map(|(_, card)| card.name.as_str()).unwrap_or("")
    }

    /// Counter parameters disagree when one region's balance patch lands
    /// first; the larger values win conservatively, element-wise.
    pub fn counter(&self) -> CounterParams {
        self.by_authority()
            .map(|(_, card)| card.counter)
            .fold(CounterParams::default(), |acc, c| acc.merged_with(c))
    }

    /// The behavior script to synthesize: the most authoritative populated
    /// region's. A region whose script disagrees in length or per-slot
    /// instruction with a more authoritative one is superseded wholesale, so
    /// the authoritative script is the merged script.
    pub fn behavior_refs(&self) -> &[BehaviorRef] {
        self.primary()
            .map(|(_, card)| card.behavior_refs.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_behavior(&self) -> bool {
        !self.behavior_refs().is_empty()
    }

    /// Whether the monster predates explicit one-time costs in any region
    /// that has it.
    pub fn uses_old_ai(&self) -> bool {
        self.by_authority().any(|(_, card)| !card.use_new_ai)
    }

    /// Whether the monster always fights alone, per the primary region.
    pub fn force_one_enemy(&self) -> bool {
        self.primary().map(|(_, card)| card.force_one_enemy).unwrap_or(false)
    }
}

/// Groups per-region monster records into composite records, one per
/// canonical id, ascending. A duplicate canonical id within one region keeps
/// the first record and logs the collision.
pub fn merge_cards(
    feeds: impl IntoIterator<Item = (Region, Vec<RawCard>)>,
    resolver: &IdentResolver,
) -> Vec<Composite> {
    let mut by_id: HashMap<CardId, Composite> = HashMap::new();

    for (region, cards) in feeds {
        for card in cards {
            let card_id = resolver.resolve(region, card.monster_no);
            let composite = by_id
                .entry(card_id)
                .or_insert_with(|| Composite::new(card_id));
            let slot = composite.slot_mut(region);
            if slot.is_some() {
                tracing::warn!(
                    %region,
                    card = %card_id,
                    local = %card.monster_no,
                    "duplicate canonical id within one region, keeping first"
                );
                continue;
            }
            *slot = Some(card);
        }
    }

    let mut composites: Vec<Composite> = by_id.into_values().collect();
    composites.sort_by_key(|c| c.card_id);
    composites
}

/// Merges per-region instruction feeds into one exemplar per id.
///
/// Conflicts between regions resolve by [`richness`]; ties keep the more
/// authoritative region, which feeds are iterated in.
pub fn merge_instructions(
    feeds: impl IntoIterator<Item = (Region, Vec<Instruction>)>,
) -> Vec<Instruction> {
    let mut order: Vec<bestiary_core::InstructionId> = Vec::new();
    let mut best: HashMap<bestiary_core::InstructionId, Instruction> = HashMap::new();

    for (region, instructions) in feeds {
        for ins in instructions {
            match best.get(&ins.id) {
                None => {
                    order.push(ins.id);
                    best.insert(ins.id, ins);
                }
                Some(current) => {
                    if richness(&ins.params) > richness(&current.params) {
                        tracing::debug!(
                            %region,
                            instruction = %ins.id,
                            "richer exemplar replaces an earlier region's"
                        );
                        best.insert(ins.id, ins);
                    }
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|id| best.remove(&id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bestiary_core::{InstructionId, MonsterNo, decode_row};

    fn card(no: u32, name: &str, refs: &[(u32, u32, u32)]) -> RawCard {
        RawCard {
            monster_no: MonsterNo(no),
            name: name.to_string(),
            enemy_max_level: 10,
            use_new_ai: true,
            force_one_enemy: false,
            counter: CounterParams::default(),
            behavior_refs: refs
                .iter()
                .map(|&(id, ai, rnd)| BehaviorRef::new(InstructionId(id), ai, rnd))
                .collect(),
        }
    }

    fn ins(fields: &[&str]) -> Instruction {
        let row: Vec<String> = fields.iter().map(|s| s.to_string()).collect();
        decode_row(&row).unwrap()
    }

    #[test]
    fn absent_region_falls_back_in_authority_order() {
        let resolver = IdentResolver::standard();
        let composites = merge_cards(
            [
                (Region::Na, vec![card(7, "Wyrm NA", &[(101, 100, 0)])]),
                (Region::Kr, vec![card(7, "Wyrm KR", &[])]),
            ],
            &resolver,
        );
        assert_eq!(composites.len(), 1);
        let c = &composites[0];
        assert!(c.jp.is_none());
        assert_eq!(c.name(), "Wyrm NA");
        assert_eq!(c.behavior_refs().len(), 1);
    }

    #[test]
    fn placeholder_names_lose_to_localized_regions() {
        let resolver = IdentResolver::standard();
        let composites = merge_cards(
            [
                (Region::Jp, vec![card(7, "***Debug***", &[])]),
                (Region::Na, vec![card(7, "Wyrm", &[])]),
            ],
            &resolver,
        );
        assert_eq!(composites[0].name(), "Wyrm");
        // The JP record itself is still there.
        assert!(composites[0].jp.is_some());
    }

    #[test]
    fn renumbered_regions_land_on_the_same_composite() {
        let resolver = IdentResolver::standard();
        let composites = merge_cards(
            [
                (Region::Jp, vec![card(669, "Kirin", &[])]),
                (Region::Na, vec![card(934, "Kirin", &[])]),
            ],
            &resolver,
        );
        assert_eq!(composites.len(), 1);
        assert_eq!(composites[0].card_id, CardId(669));
        assert!(composites[0].jp.is_some() && composites[0].na.is_some());
    }

    #[test]
    fn counter_params_merge_element_wise_max() {
        let resolver = IdentResolver::standard();
        let mut jp = card(7, "Wyrm", &[]);
        jp.counter = CounterParams::new(8, 0);
        let mut na = card(7, "Wyrm", &[]);
        na.counter = CounterParams::new(6, 2);
        let composites = merge_cards(
            [(Region::Jp, vec![jp]), (Region::Na, vec![na])],
            &resolver,
        );
        assert_eq!(composites[0].counter(), CounterParams::new(8, 2));
    }

    #[test]
    fn richer_instruction_exemplar_wins_ties_keep_authority() {
        // Same id: JP has two params populated, NA three.
        let jp = ins(&["5", "Strike", "15", "3", "1", "2"]);
        let na = ins(&["5", "Strike", "15", "B", "1", "2", "150"]);
        let merged = merge_instructions([
            (Region::Jp, vec![jp]),
            (Region::Na, vec![na.clone()]),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0], na);

        // Equal richness: the earlier (more authoritative) feed stays.
        let jp = ins(&["6", "Guard JP", "82", "0"]);
        let na = ins(&["6", "Guard NA", "82", "0"]);
        let merged = merge_instructions([
            (Region::Jp, vec![jp.clone()]),
            (Region::Na, vec![na]),
        ]);
        assert_eq!(merged[0], jp);
    }
}
