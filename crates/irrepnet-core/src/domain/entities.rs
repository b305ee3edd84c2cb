//! Core entities for the IRREPnet engine
//!
//! A [`Scenario`] is the validated, immutable model produced by the loader.
//! Every reference inside it is a dense index; no names are looked up while
//! stepping.

use super::errors::StepError;
use super::value_objects::{PhaseGroup, PhaseInstruction, TagSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Graph node with its gauge phase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: usize,
    /// Gauge phase in `[0, k)`
    pub gauge_phase: usize,
    pub tags: TagSet,
}

/// Enabled directed edge. Its position in [`Scenario::directed_edges`] is
/// the dense edge index used everywhere else.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectedEdge {
    /// Raw id from the document
    pub id: i64,
    pub src: usize,
    pub dst: usize,
    /// Id of the undirected edge it was derived from
    pub edge_ref: i64,
    /// Resolved offset in `[0, k)`
    pub phase_offset: usize,
    /// Own tags merged with the undirected edge's tags
    pub tags: TagSet,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub charge: i64,
    /// Neutral channels ignore gauge phases when shifting.
    pub neutral: bool,
}

/// Dense {0,1} admissibility table indexed by `[edge][channel][phase]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionMask {
    edges: usize,
    channels: usize,
    k: usize,
    cells: Vec<bool>,
}

impl FusionMask {
    /// All phases blocked.
    pub fn closed(edges: usize, channels: usize, k: usize) -> Self {
        Self {
            edges,
            channels,
            k,
            cells: vec![false; edges * channels * k],
        }
    }

    /// All phases admitted.
    pub fn open(edges: usize, channels: usize, k: usize) -> Self {
        Self {
            edges,
            channels,
            k,
            cells: vec![true; edges * channels * k],
        }
    }

    fn offset(&self, edge: usize, channel: usize, phase: usize) -> usize {
        (edge * self.channels + channel) * self.k + phase
    }

    pub fn allows(&self, edge: usize, channel: usize, phase: usize) -> bool {
        self.cells[self.offset(edge, channel, phase)]
    }

    pub fn set(&mut self, edge: usize, channel: usize, phase: usize, allowed: bool) {
        let idx = self.offset(edge, channel, phase);
        self.cells[idx] = allowed;
    }

    /// Admissibility flags of one `(edge, channel)` lane.
    pub fn lane(&self, edge: usize, channel: usize) -> &[bool] {
        let start = self.offset(edge, channel, 0);
        &self.cells[start..start + self.k]
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.edges, self.channels, self.k]
    }
}

/// One additive entry of the initial count state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountInit {
    pub edge: usize,
    pub channel: usize,
    pub phase: usize,
    pub value: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleInput {
    pub channel: usize,
    /// Tokens required per unit of multiplicity; always 1 today
    pub minimum: u64,
    /// Reserved, parsed but not honored
    pub sum_over_phases: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOutput {
    pub channel: usize,
    /// Tokens emitted per unit of multiplicity
    pub add: u64,
}

/// Node-local reaction consuming input tokens and emitting output tokens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouplingRule {
    pub name: String,
    pub inputs: Vec<RuleInput>,
    pub outputs: Vec<RuleOutput>,
    /// Phase instruction per output channel
    pub phase: BTreeMap<usize, PhaseInstruction>,
    /// Fires only on nodes carrying one of these tags
    pub node_tags_any: Option<TagSet>,
    /// Emits only on outgoing edges carrying one of these tags
    pub out_edge_tags_any: Option<TagSet>,
    pub nonconservative: bool,
    /// Σ charge·add over outputs − Σ charge·minimum over inputs
    pub charge_balance: i64,
}

impl CouplingRule {
    pub fn applies_to_node(&self, node_tags: &TagSet) -> bool {
        match &self.node_tags_any {
            Some(scope) => !scope.is_disjoint(node_tags),
            None => true,
        }
    }

    pub fn targets_edge(&self, edge_tags: &TagSet) -> bool {
        match &self.out_edge_tags_any {
            Some(scope) => !scope.is_disjoint(edge_tags),
            None => true,
        }
    }
}

/// Named readout projected onto the fundamental character.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementReadout {
    pub name: String,
    /// Dense edge indices; repeats are summed each time
    pub edges: Vec<usize>,
    /// `None` selects every channel
    pub channels: Option<Vec<usize>>,
}

/// Ordered DAG layers re-applied `repeat` times per step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagSchedule {
    pub layers: Vec<Vec<usize>>,
    pub repeat: u32,
}

/// Validated scenario model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub version: String,
    pub phase_group: PhaseGroup,
    pub nodes: Vec<Node>,
    pub directed_edges: Vec<DirectedEdge>,
    /// Raw directed-edge id -> dense edge index
    pub edge_index_by_id: BTreeMap<i64, usize>,
    pub fusion_mask: FusionMask,
    pub channels: Vec<Channel>,
    /// Channel name -> dense channel index
    pub channel_index: BTreeMap<String, usize>,
    pub counts_init: Vec<CountInit>,
    pub dag: DagSchedule,
    pub measurement: Vec<MeasurementReadout>,
    pub coupling_rules: Vec<CouplingRule>,
}

impl Scenario {
    pub fn k(&self) -> usize {
        self.phase_group.k()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.directed_edges.len()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Gauge phases in node order.
    pub fn gauge_phases(&self) -> Vec<usize> {
        self.nodes.iter().map(|n| n.gauge_phase).collect()
    }

    /// Outgoing dense edge indices per node, in declaration order.
    pub fn outgoing_index(&self) -> Vec<Vec<usize>> {
        let mut out = vec![Vec::new(); self.nodes.len()];
        for (idx, edge) in self.directed_edges.iter().enumerate() {
            out[edge.src].push(idx);
        }
        out
    }

    /// Step error for a count at dense `(edge, channel)` leaving the u64 range.
    pub fn count_overflow(&self, at: LaneOverflow) -> StepError {
        StepError::CountOverflow {
            edge: self.directed_edges[at.edge].id,
            channel: self.channels[at.channel].name.clone(),
        }
    }
}

/// Dense `(edge, channel)` whose count would pass `u64::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneOverflow {
    pub edge: usize,
    pub channel: usize,
}

/// `dst[i] + src[i]` for every slot, or the first overflowing slot. `dst` is
/// only written when every sum fits.
fn checked_add_into(dst: &mut [u64], src: &[u64]) -> Result<(), usize> {
    if let Some(slot) = dst
        .iter()
        .zip(src)
        .position(|(a, b)| a.checked_add(*b).is_none())
    {
        return Err(slot);
    }
    for (a, b) in dst.iter_mut().zip(src) {
        *a += *b;
    }
    Ok(())
}

/// Non-negative count array of shape `[edges, channels, k]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CountTensor {
    edges: usize,
    channels: usize,
    k: usize,
    data: Vec<u64>,
}

/// Modulus of the export checksum (2^31 - 1).
pub const CHECKSUM_MODULUS: u64 = 2_147_483_647;

impl CountTensor {
    pub fn zeros(edges: usize, channels: usize, k: usize) -> Self {
        Self {
            edges,
            channels,
            k,
            data: vec![0; edges * channels * k],
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.edges, self.channels, self.k]
    }

    fn offset(&self, edge: usize, channel: usize, phase: usize) -> usize {
        (edge * self.channels + channel) * self.k + phase
    }

    pub fn get(&self, edge: usize, channel: usize, phase: usize) -> u64 {
        self.data[self.offset(edge, channel, phase)]
    }

    pub fn add(
        &mut self,
        edge: usize,
        channel: usize,
        phase: usize,
        value: u64,
    ) -> Result<(), LaneOverflow> {
        let idx = self.offset(edge, channel, phase);
        self.data[idx] = self.data[idx]
            .checked_add(value)
            .ok_or(LaneOverflow { edge, channel })?;
        Ok(())
    }

    /// Phase histogram of one `(edge, channel)` lane.
    pub fn lane(&self, edge: usize, channel: usize) -> &[u64] {
        let start = self.offset(edge, channel, 0);
        &self.data[start..start + self.k]
    }

    /// Add a `[k]` histogram onto one lane. Nothing is written on overflow.
    pub fn add_lane(
        &mut self,
        edge: usize,
        channel: usize,
        hist: &[u64],
    ) -> Result<(), LaneOverflow> {
        let start = self.offset(edge, channel, 0);
        checked_add_into(&mut self.data[start..start + self.k], hist)
            .map_err(|_| LaneOverflow { edge, channel })
    }

    /// Add a `[channels * k]` block onto every lane of one edge. Nothing is
    /// written on overflow.
    pub fn add_edge_block(&mut self, edge: usize, block: &[u64]) -> Result<(), LaneOverflow> {
        let start = self.offset(edge, 0, 0);
        let len = self.channels * self.k;
        let k = self.k;
        checked_add_into(&mut self.data[start..start + len], block).map_err(|slot| LaneOverflow {
            edge,
            channel: slot / k,
        })
    }

    pub fn clear(&mut self) {
        self.data.iter_mut().for_each(|v| *v = 0);
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.data
    }

    /// Sum of every count.
    pub fn total(&self) -> u128 {
        self.data.iter().map(|&v| v as u128).sum()
    }

    /// `sum(counts) mod 2147483647`.
    pub fn checksum(&self) -> u64 {
        (self.total() % CHECKSUM_MODULUS as u128) as u64
    }
}
