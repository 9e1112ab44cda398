//! End-to-end reconstruction scenario across three region feeds.
//!
//! The snapshot exercises the full path: JSON envelopes with pseudo-CSV
//! payloads, renumbered NA ids landing on the JP-canonical composite, a
//! region-exclusive entity, placeholder-name fallback, preemptive and death
//! extraction, flag-driven alternation, and a level branch producing two
//! behavior blocks.

use std::fs;
use std::path::PathBuf;

use serde_json::json;

use bestiary_core::{BehaviorGroup, CardId};
use bestiary_pipeline::{IdentResolver, MemorySink, SynthesisConfig, run};

/// Flat monster row with only the enemy-behavior fields populated.
fn card_row(no: u32, name: &str, refs: &[(u32, u32, u32)]) -> serde_json::Value {
    let mut row = vec![json!(0); 58];
    row[0] = json!(no);
    row[1] = json!(name);
    row[37] = json!(10); // enemy max level
    row[52] = json!(1); // new AI
    row[57] = json!(refs.len());
    for &(id, ai, rnd) in refs {
        row.push(json!(id));
        row.push(json!(ai));
        row.push(json!(rnd));
    }
    json!(row)
}

fn write_region(
    dir: &tempfile::TempDir,
    region: &str,
    blob: &str,
    cards: Vec<serde_json::Value>,
) -> (PathBuf, PathBuf) {
    let skills = dir.path().join(format!("{region}_skills.json"));
    let monsters = dir.path().join(format!("{region}_cards.json"));
    fs::write(&skills, json!({ "enemy_skills": blob, "v": 2 }).to_string()).unwrap();
    fs::write(&monsters, json!({ "card": cards, "v": 3 }).to_string()).unwrap();
    (skills, monsters)
}

const JP_BLOB: &str = "\
1,Bite,82,0\n\
2,Thrash,82,0\n\
3,CheckFlag,23,0\n\
4,SetFlag,22,0\n\
5,ClearFlag,24,0\n\
6,'Dies, dramatically',69,2,'See, you'\n\
7,Preemptive Guard,20,0\n\
8,Preempt,49,2,1\n\
9,LevelGate,33,0\n\
c,deadbeef\n";

/// Kirin: preemptive guard behind a consumed marker, then a two-turn
/// alternation driven by a second flag bit, then a death cry.
const KIRIN_REFS: &[(u32, u32, u32)] = &[
    (8, 0, 0),   // 1: preemptive marker, level 1
    (3, 1, 5),   // 2: skip the guard once flag 1 is set
    (4, 1, 0),   // 3: set flag 1
    (7, 100, 0), // 4: the guard itself
    (3, 2, 8),   // 5: alternation branch on flag 2
    (4, 2, 0),   // 6: set flag 2
    (1, 100, 0), // 7: Bite
    (5, 2, 0),   // 8: clear flag 2
    (2, 100, 0), // 9: Thrash
    (6, 0, 100), // 10: death cry
];

#[test]
fn three_region_snapshot_reconstructs_end_to_end() {
    let dir = tempfile::tempdir().unwrap();

    // JP: full instruction set; Kirin at its canonical number plus a
    // level-branching gargoyle.
    let (jp_skills, jp_cards) = write_region(
        &dir,
        "jp",
        JP_BLOB,
        vec![
            card_row(669, "Kirin", KIRIN_REFS),
            card_row(700, "Gargoyle", &[(9, 50, 3), (2, 100, 0), (1, 100, 0)]),
        ],
    );
    // NA: Kirin in the renumbered collab block, plus the NA-exclusive
    // Voltron in its relocated range.
    let (na_skills, na_cards) = write_region(
        &dir,
        "na",
        "1,Bite,82,0\n",
        vec![
            card_row(934, "Kirin NA", KIRIN_REFS),
            card_row(2601, "Voltron", &[(1, 100, 0)]),
        ],
    );
    // KR: lagging, still publishing a placeholder name.
    let (kr_skills, kr_cards) = write_region(
        &dir,
        "kr",
        "1,Bite,82,0\n",
        vec![card_row(669, "???", &[])],
    );

    let feeds = vec![
        bestiary_feed::load_region(bestiary_core::Region::Jp, &jp_skills, &jp_cards).unwrap(),
        bestiary_feed::load_region(bestiary_core::Region::Na, &na_skills, &na_cards).unwrap(),
        bestiary_feed::load_region(bestiary_core::Region::Kr, &kr_skills, &kr_cards).unwrap(),
    ];

    let mut sink = MemorySink::new();
    let report = run(
        feeds,
        &IdentResolver::standard(),
        &SynthesisConfig::new(),
        &mut sink,
    )
    .expect("snapshot should reconstruct");

    // Kirin (3 regions), Gargoyle (JP only), Voltron (NA only).
    assert_eq!(report.entities, 3);
    assert_eq!(report.emitted, 3);
    assert_eq!(report.skipped_levels, 0);

    // ── Kirin: all three regions on one composite, JP name wins over the
    // KR placeholder, NA's renumbered id resolved to the JP number.
    let kirin = sink.find(CardId(669)).expect("kirin record");
    assert_eq!(kirin.name, "Kirin");
    assert_eq!(kirin.behavior.levels.len(), 1);

    let groups = &kirin.behavior.levels[0].groups;
    assert!(
        matches!(&groups[0], BehaviorGroup::Preemptive { actions }
            if actions.len() == 1 && actions[0].name == "Preemptive Guard")
    );
    match &groups[1] {
        BehaviorGroup::Standard { hp, repeating, timed } => {
            assert_eq!(*hp, 100);
            assert!(timed.is_empty());
            assert_eq!(repeating.len(), 2);
            assert_eq!(repeating[0].interval, 2);
            assert_eq!(repeating[0].actions[0].name, "Bite");
            assert_eq!(repeating[1].actions[0].name, "Thrash");
        }
        other => panic!("expected standard group, got {other:?}"),
    }
    assert!(
        matches!(groups.last().unwrap(), BehaviorGroup::Death { actions }
            if actions[0].name == "Dies, dramatically")
    );

    // ── Gargoyle: the level branch splits behavior at level 50.
    let gargoyle = sink.find(CardId(700)).expect("gargoyle record");
    let levels: Vec<i64> = gargoyle.behavior.levels.iter().map(|l| l.level).collect();
    assert_eq!(levels, [1, 50]);

    // ── Voltron: NA-exclusive, relocated to the reserved range.
    let voltron = sink.find(CardId(12_601)).expect("voltron record");
    assert_eq!(voltron.name, "Voltron");
    assert_eq!(voltron.behavior.levels.len(), 1);
    assert!(voltron.unused.is_empty());
}

#[test]
fn region_missing_an_entity_stays_absent_not_defaulted() {
    let dir = tempfile::tempdir().unwrap();
    let (jp_skills, jp_cards) = write_region(
        &dir,
        "jp",
        "1,Bite,82,0\n",
        vec![card_row(7, "Wyrm", &[(1, 100, 0)])],
    );
    // NA publishes no monsters at all.
    let (na_skills, na_cards) = write_region(&dir, "na", "1,Bite,82,0\n", vec![]);

    let feeds = vec![
        bestiary_feed::load_region(bestiary_core::Region::Jp, &jp_skills, &jp_cards).unwrap(),
        bestiary_feed::load_region(bestiary_core::Region::Na, &na_skills, &na_cards).unwrap(),
    ];

    let mut sink = MemorySink::new();
    let report = run(
        feeds,
        &IdentResolver::standard(),
        &SynthesisConfig::new(),
        &mut sink,
    )
    .unwrap();

    assert_eq!(report.entities, 1);
    let record = sink.find(CardId(7)).unwrap();
    assert_eq!(record.name, "Wyrm");
    assert!(!record.behavior.is_empty());
}
