//! Load-time validation failures and their stable codes.

mod common;

use common::{write_scenario, REACTOR};
use irrepnet_core::domain::invariants::invariant_scenario;
use irrepnet_core::{load, load_str, ConfigError, Simulation};
use tempfile::TempDir;

fn code_for(doc: &str) -> &'static str {
    match load_str(doc) {
        Ok(_) => "OK",
        Err(err) => err.code(),
    }
}

#[test]
fn test_reactor_fixture_is_valid() {
    let scenario = load_str(REACTOR).unwrap();
    assert!(invariant_scenario(&scenario));
}

#[test]
fn test_rejections_carry_stable_codes() {
    let cases: &[(&str, &str, &str)] = &[
        ("kind: Zk, k: 4", "kind: Zn, k: 4", "E_PHASE_KIND"),
        ("kind: Zk, k: 4", "kind: Zk, k: 1", "E_PHASE_K_INVALID"),
        ("kind: Zk, k: 4", "kind: Zk, k: 257", "E_PHASE_K_INVALID"),
        ("{ id: 2, gauge_phase: 1 }", "{ id: 3 }", "E_NODE_ID_GAP"),
        ("{ id: 2, gauge_phase: 1 }", "{ id: 1 }", "E_DUP_NODE_ID"),
        ("{ id: 2, gauge_phase: 1 }", "{ id: 2, gauge_phase: 4 }", "E_GAUGE_PHASE_RANGE"),
        ("{ id: 2, src: 1, dst: 2,", "{ id: 1, src: 1, dst: 2,", "E_DUP_DIRECTED_EDGE_ID"),
        ("{ id: 2, src: 1, dst: 2,", "{ id: 2, src: 1, dst: 5,", "E_DIRECTED_EDGE_NODE_RANGE"),
        ("- { name: G, neutral: true }", "- { name: A }", "E_DUP_CHANNEL_NAME"),
        ("{ edge_id: 2, channel: G, allow_phases: [0, 1, 2, 3] }", "{ edge_id: 2, channel: G, allow_phases: [4] }", "E_FUSION_MASK_PHASE_RANGE"),
        ("{ edge_id: 2, channel: G, allow_phases: [0, 1, 2, 3] }", "{ edge_id: 2, channel: H, allow_phases: [0] }", "E_CHANNEL_UNKNOWN"),
        ("{ edge_id: 2, channel: G, allow_phases: [0, 1, 2, 3] }", "{ edge_id: 2, channel: 7, allow_phases: [0] }", "E_CHANNEL_INDEX_RANGE"),
        ("phase: 1, value: 3", "phase: 1, value: -3", "E_COUNTS_INIT_NEGATIVE_VALUE"),
        ("layers: [{ edges: [0] }]", "layers: [{ edges: [0, 0] }]", "E_DAG_LAYER_CONFLICT"),
        ("layers: [{ edges: [0] }]", "layers: [{ edges: [9] }]", "E_DAG_EDGE_UNKNOWN"),
        ("layers: [{ edges: [0] }]", "layers: []", "E_DAG_LAYERS_EMPTY"),
        ("readout_edges: [2] }", "readout_edges: [2], channels: A }", "E_MEASUREMENT_CHANNELS_FMT"),
        ("{ ch: B, add: 1 }", "{ ch: B, add: 2 }", "E_RULE_CHARGE_IMBALANCE"),
        ("in: [{ ch: A }]", "in: [{ ch: A, min: 2 }]", "E_RULE_MIN_UNSUPPORTED"),
        (r#"phase: { G: "fixed:2" }"#, r#"phase: { G: "spin" }"#, "E_PHASE_UNKNOWN"),
        (r#"phase: { G: "fixed:2" }"#, "phase: { G: { sum_from: [] } }", "E_PHASE_SUM_EMPTY"),
        ("counts_init:\n", "fusion_mask: []\ncounts_init:\n", "E_FUSION_MASK_MISSING"),
        ("fusion_mask_sparse:", "unused_mask:", "E_FUSION_MASK_MISSING"),
        ("layers: [{ edges: [0] }]", "layers: [{ edges: [0] }]\n  repeat: 0", "E_DAG_REPEAT_RANGE"),
        ("layers: [{ edges: [0] }]", "layers: [{ edges: [0] }, { edges: [] }]", "E_DAG_LAYER_EMPTY"),
        ("dag:\n  layers: [{ edges: [0] }]\n", "", "E_DAG_MISSING"),
        ("{ id: 2, src: 1, dst: 2, edge_ref: 0", "{ id: 2, src: 1, dst: 2, edge_ref: 5", "E_DIRECTED_EDGE_REF_INVALID"),
        ("readout_edges: [2] }", "readout_edges: [8] }", "E_MEASUREMENT_EDGE_UNKNOWN"),
        (
            "  - { edge: 0, channel: A, phase: 1, value: 3 }\n",
            "  - { edge: 0, channel: A, phase: 1, value: 9223372036854775807 }\n  - { edge: 0, channel: A, phase: 5, value: 9223372036854775807 }\n  - { edge: 0, channel: A, phase: 1, value: 2 }\n",
            "E_COUNTS_INIT_OVERFLOW",
        ),
    ];

    for (from, to, expected) in cases {
        assert!(REACTOR.contains(from), "fixture lacks {from:?}");
        let doc = REACTOR.replacen(from, to, 1);
        assert_eq!(code_for(&doc), *expected, "replacing {from:?} with {to:?}");
    }
}

#[test]
fn test_rejections_needing_several_edits() {
    let cases: &[(&[(&str, &str)], &str)] = &[
        (
            &[
                ("in: [{ ch: A }]", "in: [{ ch: A }, { ch: A }]"),
                ("out: [{ ch: B, add: 1 }", "out: [{ ch: A, add: 2 }"),
            ],
            "E_PHASE_DEFAULT_AMBIGUOUS",
        ),
        (
            &[
                ("in: [{ ch: A }]", "in: [{ ch: A }, { ch: B }]"),
                (r#"phase: { G: "fixed:2" }"#, "phase: { G: inherit }"),
            ],
            "E_PHASE_INHERIT_AMBIGUOUS",
        ),
        (
            &[
                ("{ id: 0, src: 0, dst: 1, edge_ref: 0 }", "{ id: 0, src: 0, dst: 1, edge_ref: 0, enabled: false }"),
                ("edge_ref: 0, tags: out }", "edge_ref: 0, tags: out, enabled: false }"),
                ("edge_ref: 0, tags: side }", "edge_ref: 0, tags: side, enabled: false }"),
            ],
            "E_DIRECTED_EDGES_DISABLED",
        ),
        (
            &[
                ("- { name: B, charge: 1 }", "- { name: B, charge: 9223372036854775807 }"),
                ("{ ch: B, add: 1 }", "{ ch: B, add: 2 }"),
            ],
            "E_RULE_CHARGE_OVERFLOW",
        ),
    ];

    for (edits, expected) in cases {
        let mut doc = REACTOR.to_string();
        for (from, to) in edits.iter() {
            assert!(doc.contains(from), "fixture lacks {from:?}");
            doc = doc.replacen(from, to, 1);
        }
        assert_eq!(code_for(&doc), *expected, "applying {edits:?}");
    }
}

/// Two edges, two channels, k = 2, dense mask.
const DENSE: &str = r#"
irrepnet_dm: "0.2"
phase_group: { kind: Zk, k: 2 }
nodes: [{ id: 0 }, { id: 1 }]
edges: [{ id: 0 }]
directed_edges:
  - { id: 0, src: 0, dst: 1, edge_ref: 0 }
  - { id: 1, src: 1, dst: 0, edge_ref: 0 }
channels: [{ name: A }, { name: B }]
fusion_mask:
  - [[1, 0], [0, true]]
  - [[1, 1], [1, 1]]
dag: { layers: [{ edges: [0] }] }
"#;

#[test]
fn test_dense_mask_rejections() {
    let scenario = load_str(DENSE).unwrap();
    assert!(scenario.fusion_mask.allows(0, 0, 0));
    assert!(!scenario.fusion_mask.allows(0, 0, 1));
    assert!(scenario.fusion_mask.allows(0, 1, 1));

    let cases: &[(&str, &str, &str)] = &[
        ("  - [[1, 1], [1, 1]]\n", "", "E_FUSION_MASK_SHAPE"),
        ("[[1, 1], [1, 1]]", "[[1, 1]]", "E_FUSION_MASK_CHANNEL"),
        ("[[1, 0], [0, true]]", "[[1, 0, 1], [0, true]]", "E_FUSION_MASK_PHASE"),
        ("[[1, 0], [0, true]]", "[[1, 0], [0, 2]]", "E_FUSION_MASK_VAL"),
    ];
    for (from, to, expected) in cases {
        assert!(DENSE.contains(from), "fixture lacks {from:?}");
        let doc = DENSE.replacen(from, to, 1);
        assert_eq!(code_for(&doc), *expected, "replacing {from:?} with {to:?}");
    }
}

#[test]
fn test_tags_preferred_over_tag() {
    let doc = REACTOR
        .replace("{ id: 1, tags: [reactor] }", "{ id: 1, tags: [reactor], tag: inert }")
        .replace("{ id: 2, gauge_phase: 1 }", "{ id: 2, gauge_phase: 1, tag: sink }");
    let scenario = load_str(&doc).unwrap();

    assert!(scenario.nodes[1].tags.contains("reactor"));
    assert!(!scenario.nodes[1].tags.contains("inert"));
    assert!(scenario.nodes[2].tags.contains("sink"));
}

#[test]
fn test_nonconservative_rule_accepted() {
    let doc = REACTOR
        .replace("{ ch: B, add: 1 }", "{ ch: B, add: 2 }")
        .replace("    phase: { G: \"fixed:2\" }", "    phase: { G: \"fixed:2\" }\n    nonconservative: true");
    let scenario = load_str(&doc).unwrap();
    assert_eq!(scenario.coupling_rules[0].charge_balance, 1);
    assert!(scenario.coupling_rules[0].nonconservative);
}

#[test]
fn test_unparseable_yaml_is_parse_error() {
    assert_eq!(code_for("irrepnet_dm: [unclosed"), "E_PARSE");
}

#[test]
fn test_load_from_file_matches_load_str() {
    let dir = TempDir::new().unwrap();
    let path = write_scenario(&dir, "reactor.yaml", REACTOR);
    assert_eq!(load(&path).unwrap(), load_str(REACTOR).unwrap());
}

#[test]
fn test_construct_surfaces_config_error() {
    let dir = TempDir::new().unwrap();
    let path = write_scenario(
        &dir,
        "bad.yaml",
        &REACTOR.replace("{ ch: B, add: 1 }", "{ ch: B, add: 2 }"),
    );
    let err = Simulation::construct(&path).err().unwrap();
    assert!(matches!(err, ConfigError::RuleChargeImbalance { balance: 1, .. }));
    assert!(err.to_string().contains("convert"));
}
