//! Raw scenario document as it appears on disk.
//!
//! These types only describe shape. Ranges, references and conservation are
//! checked in [`super::resolve`].

use serde::Deserialize;
use serde_yaml::Value;

/// Top-level scenario document (`irrepnet_dm: "0.2"`).
#[derive(Debug, Deserialize)]
pub struct RawDocument {
    pub phase_group: Option<RawPhaseGroup>,
    pub nodes: Option<Vec<RawNode>>,
    pub edges: Option<Vec<RawEdge>>,
    pub directed_edges: Option<Vec<RawDirectedEdge>>,
    pub channels: Option<Vec<RawChannel>>,
    pub fusion_mask: Option<Vec<Vec<Vec<MaskCell>>>>,
    pub fusion_mask_sparse: Option<Vec<RawSparseMaskEntry>>,
    pub counts_init: Option<Vec<RawCountInit>>,
    pub dag: Option<RawDag>,
    pub measurement: Option<RawMeasurement>,
    pub coupling_rules: Option<Vec<RawCouplingRule>>,
}

#[derive(Debug, Deserialize)]
pub struct RawPhaseGroup {
    pub kind: Option<String>,
    pub k: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RawNode {
    pub id: i64,
    pub gauge_phase: Option<i64>,
    pub tags: Option<RawTags>,
    /// Singular spelling, read only when `tags` is absent
    pub tag: Option<RawTags>,
}

impl RawNode {
    pub fn effective_tags(&self) -> Option<RawTags> {
        self.tags.clone().or_else(|| self.tag.clone())
    }
}

/// Undirected edge carrying the default offset and tags.
#[derive(Debug, Deserialize)]
pub struct RawEdge {
    pub id: i64,
    pub phase_offset: Option<i64>,
    pub tags: Option<RawTags>,
    pub tag: Option<RawTags>,
}

impl RawEdge {
    pub fn effective_tags(&self) -> Option<RawTags> {
        self.tags.clone().or_else(|| self.tag.clone())
    }
}

#[derive(Debug, Deserialize)]
pub struct RawDirectedEdge {
    pub id: i64,
    pub src: i64,
    pub dst: i64,
    pub edge_ref: i64,
    pub phase_offset: Option<i64>,
    pub tags: Option<RawTags>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct RawChannel {
    pub name: String,
    pub charge: Option<i64>,
    pub neutral: Option<bool>,
}

/// Dense mask cell; YAML booleans are accepted as 1/0.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum MaskCell {
    Int(i64),
    Bool(bool),
}

impl MaskCell {
    pub fn as_int(self) -> i64 {
        match self {
            MaskCell::Int(v) => v,
            MaskCell::Bool(b) => i64::from(b),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RawSparseMaskEntry {
    pub edge_id: i64,
    pub channel: ChannelRef,
    pub allow_phases: Option<Vec<i64>>,
}

#[derive(Debug, Deserialize)]
pub struct RawCountInit {
    pub edge: i64,
    pub channel: Option<ChannelRef>,
    pub phase: Option<i64>,
    pub value: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RawDag {
    pub layers: Option<Vec<RawLayer>>,
    pub repeat: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RawLayer {
    pub edges: Option<Vec<i64>>,
}

#[derive(Debug, Deserialize)]
pub struct RawMeasurement {
    pub outputs: Option<Vec<RawReadout>>,
}

#[derive(Debug, Deserialize)]
pub struct RawReadout {
    pub name: String,
    pub readout_edges: Option<Vec<i64>>,
    /// Kept untyped so a scalar can be reported with its own error code.
    pub channels: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RawCouplingRule {
    pub name: Option<String>,
    pub scope: Option<RawScope>,
    #[serde(rename = "in")]
    pub inputs: Option<Vec<RawRuleInput>>,
    #[serde(rename = "out")]
    pub outputs: Option<Vec<RawRuleOutput>>,
    /// Output channel (name or index) -> phase instruction
    pub phase: Option<serde_yaml::Mapping>,
    pub nonconservative: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct RawScope {
    pub nodes_any: Option<RawTags>,
    pub out_edges_any: Option<RawTags>,
}

#[derive(Debug, Deserialize)]
pub struct RawRuleInput {
    pub ch: ChannelRef,
    pub min: Option<i64>,
    pub sum_over_phases: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct RawRuleOutput {
    pub ch: ChannelRef,
    pub add: Option<i64>,
}

/// Channel reference: dense index or channel name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ChannelRef {
    Index(i64),
    Name(String),
}

impl ChannelRef {
    /// Interpret a YAML scalar (map key or list item) as a channel reference.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(ChannelRef::Index),
            Value::String(s) => Some(ChannelRef::Name(s.clone())),
            _ => None,
        }
    }
}

/// Tags given as one string or a list of scalars.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawTags {
    One(String),
    Many(Vec<Value>),
}

impl RawTags {
    /// Scalars rendered as strings; nulls and nested values dropped.
    pub fn into_strings(self) -> Vec<String> {
        match self {
            RawTags::One(tag) => vec![tag],
            RawTags::Many(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_ref_accepts_index_or_name() {
        let refs: Vec<ChannelRef> = serde_yaml::from_str("[0, photon]").unwrap();
        assert_eq!(
            refs,
            vec![ChannelRef::Index(0), ChannelRef::Name("photon".to_string())]
        );
    }

    #[test]
    fn test_tags_single_or_list() {
        let one: RawTags = serde_yaml::from_str("source").unwrap();
        assert_eq!(one.into_strings(), vec!["source".to_string()]);

        let many: RawTags = serde_yaml::from_str("[a, ~, 3]").unwrap();
        assert_eq!(many.into_strings(), vec!["a".to_string(), "3".to_string()]);
    }

    #[test]
    fn test_node_accepts_tag_alias() {
        let node: RawNode = serde_yaml::from_str("{id: 0, tag: X}").unwrap();
        assert_eq!(node.effective_tags().unwrap().into_strings(), vec!["X".to_string()]);
        assert!(node.gauge_phase.is_none());
    }

    #[test]
    fn test_tags_wins_over_tag() {
        let node: RawNode = serde_yaml::from_str("{id: 0, tags: [X, Y], tag: Z}").unwrap();
        assert_eq!(
            node.effective_tags().unwrap().into_strings(),
            vec!["X".to_string(), "Y".to_string()]
        );

        let edge: RawEdge = serde_yaml::from_str("{id: 3, tag: slow, tags: fast}").unwrap();
        assert_eq!(edge.effective_tags().unwrap().into_strings(), vec!["fast".to_string()]);
    }

    #[test]
    fn test_mask_cell_bool() {
        let cells: Vec<MaskCell> = serde_yaml::from_str("[1, 0, true]").unwrap();
        let ints: Vec<i64> = cells.into_iter().map(MaskCell::as_int).collect();
        assert_eq!(ints, vec![1, 0, 1]);
    }
}
