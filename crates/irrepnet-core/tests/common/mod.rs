//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Reactor node 1 converts A into B (delta) and G (fixed:2), emitting only on
/// out-edges tagged `out`. Node 2 sits at gauge 1 so delta emissions rotate.
pub const REACTOR: &str = r#"
irrepnet_dm: "0.2"
phase_group: { kind: Zk, k: 4 }
nodes:
  - { id: 0, tags: [source] }
  - { id: 1, tags: [reactor] }
  - { id: 2, gauge_phase: 1 }
edges: [{ id: 0 }]
directed_edges:
  - { id: 0, src: 0, dst: 1, edge_ref: 0 }
  - { id: 1, src: 1, dst: 2, edge_ref: 0, tags: out }
  - { id: 2, src: 1, dst: 2, edge_ref: 0, tags: side }
channels:
  - { name: A, charge: 1 }
  - { name: B, charge: 1 }
  - { name: G, neutral: true }
fusion_mask_sparse:
  - { edge_id: 0, channel: A, allow_phases: [0, 1, 2, 3] }
  - { edge_id: 0, channel: B, allow_phases: [0, 1, 2, 3] }
  - { edge_id: 0, channel: G, allow_phases: [0, 1, 2, 3] }
  - { edge_id: 1, channel: A, allow_phases: [0, 1, 2, 3] }
  - { edge_id: 1, channel: B, allow_phases: [0, 1, 2, 3] }
  - { edge_id: 1, channel: G, allow_phases: [0, 1, 2, 3] }
  - { edge_id: 2, channel: A, allow_phases: [0, 1, 2, 3] }
  - { edge_id: 2, channel: B, allow_phases: [0, 1, 2, 3] }
  - { edge_id: 2, channel: G, allow_phases: [0, 1, 2, 3] }
counts_init:
  - { edge: 0, channel: A, phase: 1, value: 3 }
dag:
  layers: [{ edges: [0] }]
measurement:
  outputs:
    - { name: out_b, readout_edges: [1], channels: [B] }
    - { name: side, readout_edges: [2] }
coupling_rules:
  - name: convert
    scope: { nodes_any: [reactor], out_edges_any: [out] }
    in: [{ ch: A }]
    out: [{ ch: B, add: 1 }, { ch: G, add: 1 }]
    phase: { G: "fixed:2" }
"#;

/// Straight chain 0 -> 1 -> 2 with one channel and an open mask.
pub fn chain(k: usize, offset: i64, phase: i64, value: u64, neutral: bool) -> String {
    let row = vec!["1"; k].join(", ");
    format!(
        r#"
irrepnet_dm: "0.2"
phase_group: {{ kind: Zk, k: {k} }}
nodes: [{{ id: 0 }}, {{ id: 1 }}, {{ id: 2 }}]
edges: [{{ id: 0 }}]
directed_edges:
  - {{ id: 0, src: 0, dst: 1, edge_ref: 0, phase_offset: {offset} }}
  - {{ id: 1, src: 1, dst: 2, edge_ref: 0 }}
channels: [{{ name: A, neutral: {neutral} }}]
fusion_mask: [[[{row}]], [[{row}]]]
counts_init: [{{ edge: 0, channel: A, phase: {phase}, value: {value} }}]
dag: {{ layers: [{{ edges: [0] }}] }}
"#
    )
}

/// Two-node loop 0 -e0-> 1 -e1-> 0. Reactor node 0 converts A into B and G,
/// node 1 turns B back into A, so every step carries rule output around.
pub fn coupled_loop(gauge: i64, phase: i64, value: u64) -> String {
    format!(
        r#"
irrepnet_dm: "0.2"
phase_group: {{ kind: Zk, k: 4 }}
nodes:
  - {{ id: 0, gauge_phase: {gauge}, tags: [reactor] }}
  - {{ id: 1 }}
edges: [{{ id: 0, phase_offset: 1 }}]
directed_edges:
  - {{ id: 0, src: 0, dst: 1, edge_ref: 0 }}
  - {{ id: 1, src: 1, dst: 0, edge_ref: 0 }}
channels:
  - {{ name: A, charge: 1 }}
  - {{ name: B, charge: 1 }}
  - {{ name: G, neutral: true }}
fusion_mask:
  - [[1, 1, 1, 1], [1, 1, 1, 1], [1, 0, 1, 1]]
  - [[1, 1, 1, 1], [1, 1, 1, 1], [1, 1, 1, 1]]
counts_init: [{{ edge: 1, channel: A, phase: {phase}, value: {value} }}]
dag: {{ layers: [{{ edges: [1] }}, {{ edges: [0] }}] }}
coupling_rules:
  - name: convert
    scope: {{ nodes_any: [reactor] }}
    in: [{{ ch: A }}]
    out: [{{ ch: B, add: 1 }}, {{ ch: G, add: 1 }}]
    phase: {{ G: "fixed:1" }}
  - name: revert
    in: [{{ ch: B }}]
    out: [{{ ch: A, add: 1 }}]
"#
    )
}

/// Write `contents` as `name` inside `dir`.
pub fn write_scenario(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("write scenario");
    path
}
