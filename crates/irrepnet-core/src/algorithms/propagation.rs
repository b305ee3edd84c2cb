//! Gauge-modulated propagation of one DAG layer
//!
//! For every edge of the layer the phase axis is circularly shifted by the
//! edge's modular shift, masked by the fusion table, then broadcast in full
//! to every outgoing edge of the destination node. Nodes that received mass
//! run their coupling rules afterwards.

use super::coupling::apply_node_rules;
use crate::config::Backend;
use crate::domain::entities::{CountTensor, LaneOverflow, Scenario};
use crate::domain::errors::StepError;
use std::collections::HashMap;
use tracing::trace;

/// Read-only view of the static graph plus the live gauge for one layer.
pub struct LayerContext<'a> {
    pub scenario: &'a Scenario,
    /// Outgoing dense edge indices per node
    pub outgoing: &'a [Vec<usize>],
    /// Gauge phase per node
    pub gauge: &'a [usize],
}

impl LayerContext<'_> {
    /// Modular shift of `channel` across `edge`.
    pub fn shift(&self, edge: usize, channel: usize) -> usize {
        let e = &self.scenario.directed_edges[edge];
        self.scenario.phase_group.edge_shift(
            self.gauge[e.src],
            self.gauge[e.dst],
            e.phase_offset,
            self.scenario.channels[channel].neutral,
        )
    }
}

/// Shifted and masked `[channels * k]` block leaving `edge`.
pub fn gather_masked(ctx: &LayerContext<'_>, counts: &CountTensor, edge: usize) -> Vec<u64> {
    let k = ctx.scenario.k();
    let channels = ctx.scenario.channel_count();
    let mask = &ctx.scenario.fusion_mask;

    let mut block = vec![0u64; channels * k];
    for channel in 0..channels {
        let delta = ctx.shift(edge, channel);
        let lane = counts.lane(edge, channel);
        let allowed = mask.lane(edge, channel);
        let out = &mut block[channel * k..(channel + 1) * k];
        for phase in 0..k {
            if allowed[phase] {
                out[phase] = lane[(phase + k - delta) % k];
            }
        }
    }
    block
}

/// Gather every edge of the layer, in layer order.
fn gather_layer(
    ctx: &LayerContext<'_>,
    counts: &CountTensor,
    layer: &[usize],
    backend: Backend,
    parallel_min_edges: usize,
) -> Vec<Vec<u64>> {
    #[cfg(feature = "parallel")]
    {
        if backend == Backend::Parallel && layer.len() >= parallel_min_edges {
            use rayon::prelude::*;
            return layer
                .par_iter()
                .map(|&edge| gather_masked(ctx, counts, edge))
                .collect();
        }
    }
    #[cfg(not(feature = "parallel"))]
    let _ = (backend, parallel_min_edges);

    layer
        .iter()
        .map(|&edge| gather_masked(ctx, counts, edge))
        .collect()
}

/// Summary of one applied layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerReport {
    /// Nodes whose incoming accumulator was non-zero
    pub active_nodes: usize,
    /// Rule firings across all active nodes
    pub rules_fired: usize,
}

/// Apply one layer, writing only into `scratch`.
///
/// `counts` holds state finalized by earlier layers; it is never written.
pub fn apply_layer(
    ctx: &LayerContext<'_>,
    layer: &[usize],
    counts: &CountTensor,
    scratch: &mut CountTensor,
    backend: Backend,
    parallel_min_edges: usize,
) -> Result<LayerReport, StepError> {
    let blocks = gather_layer(ctx, counts, layer, backend, parallel_min_edges);

    // Per-node accumulators in first-touched order
    let mut slot_of: HashMap<usize, usize> = HashMap::new();
    let mut incoming: Vec<(usize, Vec<u64>)> = Vec::new();

    let k = ctx.scenario.k();
    for (&edge, block) in layer.iter().zip(&blocks) {
        let node = ctx.scenario.directed_edges[edge].dst;
        let slot = *slot_of.entry(node).or_insert_with(|| {
            incoming.push((node, vec![0u64; block.len()]));
            incoming.len() - 1
        });
        for (idx, (acc, value)) in incoming[slot].1.iter_mut().zip(block).enumerate() {
            *acc = acc.checked_add(*value).ok_or_else(|| {
                ctx.scenario.count_overflow(LaneOverflow {
                    edge,
                    channel: idx / k,
                })
            })?;
        }

        for &target in &ctx.outgoing[node] {
            scratch
                .add_edge_block(target, block)
                .map_err(|at| ctx.scenario.count_overflow(at))?;
        }
    }

    let mut report = LayerReport::default();
    if ctx.scenario.coupling_rules.is_empty() {
        report.active_nodes = incoming
            .iter()
            .filter(|(_, acc)| acc.iter().any(|&v| v > 0))
            .count();
        return Ok(report);
    }

    for (node, acc) in &incoming {
        if acc.iter().all(|&v| v == 0) {
            continue;
        }
        report.active_nodes += 1;
        report.rules_fired += apply_node_rules(ctx, *node, acc, scratch)?;
    }

    trace!(
        edges = layer.len(),
        active_nodes = report.active_nodes,
        rules_fired = report.rules_fired,
        "Layer applied"
    );
    Ok(report)
}
