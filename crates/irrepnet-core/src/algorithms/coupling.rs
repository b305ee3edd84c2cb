//! Node-local coupling rules
//!
//! Rules run against a working copy of the node's incoming accumulator, in
//! declared order, so earlier rules see less inventory than later ones.
//! Emissions from every rule are staged first and committed to the scratch
//! buffer only after all rules at the node succeeded.

use super::propagation::LayerContext;
use crate::domain::entities::{CountTensor, CouplingRule, LaneOverflow, Scenario};
use crate::domain::errors::StepError;
use crate::domain::value_objects::{PhaseGroup, PhaseInstruction};
use std::collections::HashMap;
use tracing::trace;

/// Working `[channels, k]` inventory of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inventory {
    k: usize,
    cells: Vec<u64>,
}

impl Inventory {
    pub fn new(k: usize, cells: Vec<u64>) -> Self {
        Self { k, cells }
    }

    pub fn lane(&self, channel: usize) -> &[u64] {
        &self.cells[channel * self.k..(channel + 1) * self.k]
    }

    fn lane_mut(&mut self, channel: usize) -> &mut [u64] {
        &mut self.cells[channel * self.k..(channel + 1) * self.k]
    }

    /// Sum over phases; a channel can hold more than `u64::MAX` in total.
    pub fn channel_total(&self, channel: usize) -> u128 {
        self.lane(channel).iter().map(|&v| v as u128).sum()
    }
}

/// How many times `rule` can fire: the smallest input total.
///
/// A rule without inputs has multiplicity 0. `None` when the multiplicity
/// itself does not fit in a `u64`.
pub fn multiplicity(inventory: &Inventory, rule: &CouplingRule) -> Option<u64> {
    let fires = rule
        .inputs
        .iter()
        .map(|input| inventory.channel_total(input.channel) / input.minimum.max(1) as u128)
        .min()
        .unwrap_or(0);
    u64::try_from(fires).ok()
}

/// Drain `amount` tokens from a lane, lowest phase first.
///
/// Returns the drained histogram and whatever could not be drained.
pub fn drain_ascending(lane: &mut [u64], amount: u64) -> (Vec<u64>, u64) {
    let mut taken = vec![0u64; lane.len()];
    let mut remaining = amount;
    for (slot, out) in lane.iter_mut().zip(taken.iter_mut()) {
        if remaining == 0 {
            break;
        }
        let take = (*slot).min(remaining);
        *slot -= take;
        *out = take;
        remaining -= take;
    }
    (taken, remaining)
}

/// Consumed histogram per input channel.
pub type Consumed = HashMap<usize, Vec<u64>>;

/// Drain every input of `rule` `multiplicity` times.
///
/// A channel listed twice drains twice; the second histogram replaces the first.
/// Overflow errors name `edge`, the first edge the rule emits on.
pub fn consume_inputs(
    inventory: &mut Inventory,
    rule: &CouplingRule,
    multiplicity: u64,
    scenario: &Scenario,
    edge: usize,
) -> Result<Consumed, StepError> {
    let mut consumed = Consumed::new();
    for input in &rule.inputs {
        let need = multiplicity
            .checked_mul(input.minimum.max(1))
            .ok_or_else(|| {
                scenario.count_overflow(LaneOverflow {
                    edge,
                    channel: input.channel,
                })
            })?;
        let (taken, missing) = drain_ascending(inventory.lane_mut(input.channel), need);
        if missing > 0 {
            return Err(StepError::ConsumptionDeficit {
                rule: rule.name.clone(),
                channel: scenario.channels[input.channel].name.clone(),
                missing,
            });
        }
        consumed.insert(input.channel, taken);
    }
    Ok(consumed)
}

/// One output histogram waiting to be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emission {
    pub channel: usize,
    pub histogram: Vec<u64>,
    /// Delta emissions pick up each target edge's shift at commit time
    pub rotate: bool,
}

/// Histogram for `total` tokens placed according to `instruction`.
pub fn materialize(
    instruction: &PhaseInstruction,
    total: u64,
    consumed: &Consumed,
    group: PhaseGroup,
    rule: &CouplingRule,
    scenario: &Scenario,
    at: LaneOverflow,
) -> Result<Vec<u64>, StepError> {
    let channel = at.channel;
    let mut hist = vec![0u64; group.k()];
    match instruction {
        PhaseInstruction::Inherit { source } => {
            let Some(source_hist) = consumed.get(source) else {
                return Ok(hist);
            };
            // consumed histograms sum to at most the multiplicity, a u64
            let source_total: u64 = source_hist.iter().sum();
            if source_total == 0 {
                return Ok(hist);
            }
            if total % source_total != 0 {
                return Err(StepError::InheritScale {
                    rule: rule.name.clone(),
                    channel: scenario.channels[channel].name.clone(),
                    total,
                    source_total,
                });
            }
            let factor = total / source_total;
            for (slot, value) in hist.iter_mut().zip(source_hist) {
                *slot = value
                    .checked_mul(factor)
                    .ok_or_else(|| scenario.count_overflow(at))?;
            }
        }
        PhaseInstruction::Fixed { value } => hist[group.reduce(*value)] = total,
        PhaseInstruction::Delta => hist[0] = total,
        PhaseInstruction::Sum { .. } => {
            return Err(StepError::UnsupportedPhaseInstruction {
                rule: rule.name.clone(),
                channel: scenario.channels[channel].name.clone(),
                kind: instruction.kind(),
            })
        }
    }
    Ok(hist)
}

/// Emissions of one rule firing `multiplicity` times. Overflow errors name
/// `edge`, the first edge the rule emits on.
pub fn build_emissions(
    rule: &CouplingRule,
    multiplicity: u64,
    consumed: &Consumed,
    scenario: &Scenario,
    edge: usize,
) -> Result<Vec<Emission>, StepError> {
    let mut emissions = Vec::with_capacity(rule.outputs.len());
    for output in &rule.outputs {
        let at = LaneOverflow {
            edge,
            channel: output.channel,
        };
        let total = multiplicity
            .checked_mul(output.add)
            .ok_or_else(|| scenario.count_overflow(at))?;
        if total == 0 {
            continue;
        }
        let Some(instruction) = rule.phase.get(&output.channel) else {
            continue;
        };
        let histogram = materialize(
            instruction,
            total,
            consumed,
            scenario.phase_group,
            rule,
            scenario,
            at,
        )?;
        emissions.push(Emission {
            channel: output.channel,
            histogram,
            rotate: instruction.rotates_per_edge(),
        });
    }
    Ok(emissions)
}

struct Staged {
    targets: Vec<usize>,
    emissions: Vec<Emission>,
}

/// Run every rule at `node` and commit the emissions into `scratch`.
///
/// Returns the number of rules that fired. Nothing is written if any rule fails;
/// an overflowing commit may leave `scratch` partly written, which only a failed
/// (and therefore poisoned) step can observe.
pub fn apply_node_rules(
    ctx: &LayerContext<'_>,
    node: usize,
    incoming: &[u64],
    scratch: &mut CountTensor,
) -> Result<usize, StepError> {
    let scenario = ctx.scenario;
    let outgoing = &ctx.outgoing[node];
    if outgoing.is_empty() {
        return Ok(0);
    }

    let node_tags = &scenario.nodes[node].tags;
    let mut inventory = Inventory::new(scenario.k(), incoming.to_vec());
    let mut staged: Vec<Staged> = Vec::new();
    let mut fired = 0;

    for rule in &scenario.coupling_rules {
        if !rule.applies_to_node(node_tags) {
            continue;
        }
        let targets: Vec<usize> = outgoing
            .iter()
            .copied()
            .filter(|&edge| rule.targets_edge(&scenario.directed_edges[edge].tags))
            .collect();
        if targets.is_empty() {
            continue;
        }

        let first_target = targets[0];
        let fires = multiplicity(&inventory, rule).ok_or_else(|| {
            scenario.count_overflow(LaneOverflow {
                edge: first_target,
                channel: rule.inputs[0].channel,
            })
        })?;
        if fires == 0 {
            continue;
        }

        let consumed = consume_inputs(&mut inventory, rule, fires, scenario, first_target)?;
        let emissions = build_emissions(rule, fires, &consumed, scenario, first_target)?;
        trace!(rule = %rule.name, node, multiplicity = fires, "Rule fired");
        fired += 1;
        if !emissions.is_empty() {
            staged.push(Staged { targets, emissions });
        }
    }

    commit(ctx, staged, scratch)?;
    Ok(fired)
}

fn commit(
    ctx: &LayerContext<'_>,
    staged: Vec<Staged>,
    scratch: &mut CountTensor,
) -> Result<(), StepError> {
    let group = ctx.scenario.phase_group;
    for Staged { targets, emissions } in staged {
        for emission in emissions {
            if emission.histogram.iter().all(|&v| v == 0) {
                continue;
            }
            for &edge in &targets {
                let added = if emission.rotate {
                    let shift = ctx.shift(edge, emission.channel);
                    let rotated = group.rotate(&emission.histogram, shift);
                    scratch.add_lane(edge, emission.channel, &rotated)
                } else {
                    scratch.add_lane(edge, emission.channel, &emission.histogram)
                };
                added.map_err(|at| ctx.scenario.count_overflow(at))?;
            }
        }
    }
    Ok(())
}
