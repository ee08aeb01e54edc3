#[macro_use]
extern crate proptest;

use proptest::prelude::{Just, Strategy, any, prop};
use proptest::prop_oneof;
use rustc_hash::FxHashMap;
use loomresearch::channels::Channel;
use loomresearch::finding::Finding;
use loomresearch::runtimes::checkpointer::Checkpoint;
use loomresearch::runtimes::persistence::*;
use loomresearch::source::Source;
use loomresearch::state::ResearchState;
use loomresearch::types::NodeKind;
use loomresearch::utils::json_ext::JsonSerializable;

mod common;
use common::*;

#[test]
fn test_state_round_trip() {
    let mut state = research_state("hello");
    state
        .findings
        .get_mut()
        .push(Finding::new("f-1", "v1", "fixture", 0));
    state
        .sources
        .get_mut()
        .push(Source::new("https://a.example/", "n", 0));
    let persisted = PersistedState::from(&state);
    let json = persisted.to_json_string().unwrap();
    let back = PersistedState::from_json_str(&json).unwrap();
    let state2 = ResearchState::try_from(back).unwrap();
    assert_eq!(state.findings.snapshot(), state2.findings.snapshot());
    assert_eq!(state.sources.snapshot(), state2.sources.snapshot());
    assert_eq!(state.findings.version(), state2.findings.version());
    assert_eq!(state.sources.version(), state2.sources.version());
}

#[test]
fn test_state_deserialize_without_errors_channel() {
    let state = research_state("q");
    let persisted = PersistedState::from(&state);
    let mut value = serde_json::to_value(&persisted).unwrap();
    value.as_object_mut().unwrap().remove("errors");
    let json = serde_json::to_string(&value).unwrap();

    let restored: PersistedState = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.errors.version, 1);
    assert!(restored.errors.items.is_empty());
}

#[test]
fn test_checkpoint_round_trip() {
    let state = research_state("seed");
    let cp = Checkpoint {
        session_id: "sess123".into(),
        step: 7,
        state: state.clone(),
        frontier: vec![
            NodeKind::Start,
            NodeKind::Custom("X".into()),
            NodeKind::End,
        ],
        versions_seen: FxHashMap::from_iter([
            (
                "Start".into(),
                FxHashMap::from_iter([("findings".into(), 1_u64), ("sources".into(), 1_u64)]),
            ),
            (
                "Custom(\"X\")".into(),
                FxHashMap::from_iter([("findings".into(), 1_u64)]),
            ),
        ]),
        concurrency_limit: 4,
        created_at: chrono::Utc::now(),
        ran_nodes: vec![NodeKind::Start, NodeKind::Custom("X".into())],
        skipped_nodes: vec![NodeKind::End],
        updated_channels: vec!["findings".to_string(), "sources".to_string()],
    };
    let persisted = PersistedCheckpoint::from(&cp);
    let json = persisted.to_json_string().unwrap();
    let back = PersistedCheckpoint::from_json_str(&json).unwrap();
    let cp2 = Checkpoint::try_from(back).unwrap();
    assert_eq!(cp.session_id, cp2.session_id);
    assert_eq!(cp.step, cp2.step);
    assert_eq!(cp.state.findings.snapshot(), cp2.state.findings.snapshot());
    assert_eq!(cp.frontier.len(), cp2.frontier.len());
    assert_eq!(cp.concurrency_limit, cp2.concurrency_limit);
    assert_eq!(cp.versions_seen, cp2.versions_seen);
    assert_eq!(cp.ran_nodes, cp2.ran_nodes);
    assert_eq!(cp.skipped_nodes, cp2.skipped_nodes);
    assert_eq!(cp.updated_channels, cp2.updated_channels);
}

#[test]
fn test_nodekind_encode_decode() {
    let kinds = vec![
        NodeKind::Start,
        NodeKind::End,
        NodeKind::Custom("Alpha".into()),
        NodeKind::Custom("Custom:Nested".into()),
    ];
    for k in kinds {
        let enc = k.encode();
        let dec = NodeKind::decode(&enc);
        match (&k, &dec) {
            (NodeKind::Custom(orig), NodeKind::Custom(back)) => {
                assert_eq!(back, orig);
            }
            _ => assert_eq!(format!("{:?}", k), format!("{:?}", dec)),
        }
    }
}

fn nodekind_strategy() -> impl Strategy<Value = NodeKind> {
    let base = prop::collection::vec(any::<char>(), 0..16)
        .prop_map(|chars| chars.into_iter().collect::<String>());
    prop_oneof![
        Just(NodeKind::Start),
        Just(NodeKind::End),
        base.clone().prop_map(NodeKind::Custom),
        base.prop_map(|s| NodeKind::Custom(format!("Custom:{s}"))),
    ]
}

fn versions_seen_strategy() -> impl Strategy<Value = FxHashMap<String, FxHashMap<String, u64>>> {
    let inner = prop::collection::hash_map(
        prop::string::string_regex("[A-Za-z0-9:_]{0,8}").unwrap(),
        any::<u64>(),
        0..4,
    )
    .prop_map(|hm: std::collections::HashMap<String, u64>| FxHashMap::from_iter(hm));

    prop::collection::hash_map(
        prop::string::string_regex("[A-Za-z0-9:_]{0,8}").unwrap(),
        inner,
        0..4,
    )
    .prop_map(
        |hm: std::collections::HashMap<String, FxHashMap<String, u64>>| FxHashMap::from_iter(hm),
    )
}

proptest! {
    #[test]
    fn prop_nodekind_round_trip(kind in nodekind_strategy()) {
        let encoded = kind.encode();
        let decoded = NodeKind::decode(&encoded);
        prop_assert_eq!(decoded, kind);
    }

    #[test]
    fn prop_versions_seen_round_trip(map in versions_seen_strategy()) {
        let persisted = PersistedVersionsSeen::from(&map);
        let json = serde_json::to_string(&persisted).unwrap();
        let back: PersistedVersionsSeen = serde_json::from_str(&json).unwrap();
        let restored: FxHashMap<String, FxHashMap<String, u64>> = back.into();
        prop_assert_eq!(restored, map);
    }
}
