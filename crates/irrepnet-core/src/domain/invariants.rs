//! Domain invariants for scenarios and count state
//!
//! The loader establishes these once; stepping relies on them without
//! re-checking.

use super::entities::{Channel, CountTensor, CouplingRule, DagSchedule, Scenario};
use std::collections::HashSet;

/// INVARIANT-1: Charge Conservation
/// A conservative rule emits exactly the charge it consumes per unit.
pub fn invariant_charge_conserved(rule: &CouplingRule, channels: &[Channel]) -> bool {
    if rule.nonconservative {
        return true;
    }
    let charge_in = weighted_charge(
        rule.inputs.iter().map(|inp| (inp.channel, inp.minimum)),
        channels,
    );
    let charge_out = weighted_charge(
        rule.outputs.iter().map(|out| (out.channel, out.add)),
        channels,
    );
    matches!((charge_in, charge_out), (Some(a), Some(b)) if a == b)
}

// i128 holds any single charge * amount product
fn weighted_charge(terms: impl Iterator<Item = (usize, u64)>, channels: &[Channel]) -> Option<i128> {
    let mut total = 0i128;
    for (channel, amount) in terms {
        total = total.checked_add(channels[channel].charge as i128 * amount as i128)?;
    }
    Some(total)
}

/// INVARIANT-2: Layer Uniqueness
/// No edge appears twice within one layer, and no layer is empty.
pub fn invariant_layers_unique(dag: &DagSchedule) -> bool {
    dag.repeat >= 1
        && !dag.layers.is_empty()
        && dag.layers.iter().all(|layer| {
            let mut seen = HashSet::new();
            !layer.is_empty() && layer.iter().all(|edge| seen.insert(*edge))
        })
}

/// INVARIANT-3: Dense References
/// Every edge/channel/node index stored in the scenario is in range.
pub fn invariant_dense_references(scenario: &Scenario) -> bool {
    let nodes = scenario.node_count();
    let edges = scenario.edge_count();
    let channels = scenario.channel_count();
    let k = scenario.k();

    let edges_ok = scenario
        .directed_edges
        .iter()
        .all(|e| e.src < nodes && e.dst < nodes && e.phase_offset < k);
    let gauges_ok = scenario.nodes.iter().all(|n| n.gauge_phase < k);
    let layers_ok = scenario
        .dag
        .layers
        .iter()
        .flatten()
        .all(|&e| e < edges);
    let init_ok = scenario
        .counts_init
        .iter()
        .all(|c| c.edge < edges && c.channel < channels && c.phase < k);
    let readouts_ok = scenario.measurement.iter().all(|r| {
        r.edges.iter().all(|&e| e < edges)
            && r
                .channels
                .as_ref()
                .map_or(true, |chs| chs.iter().all(|&c| c < channels))
    });
    let rules_ok = scenario.coupling_rules.iter().all(|rule| {
        rule.inputs.iter().all(|i| i.channel < channels)
            && rule.outputs.iter().all(|o| o.channel < channels)
            && rule
                .outputs
                .iter()
                .all(|o| rule.phase.contains_key(&o.channel))
    });
    let mask_ok = scenario.fusion_mask.shape() == [edges, channels, k];

    edges_ok && gauges_ok && layers_ok && init_ok && readouts_ok && rules_ok && mask_ok
}

/// INVARIANT-4: State Shape
/// The count array always has shape `[edges, channels, k]` of the scenario.
pub fn invariant_counts_shape(counts: &CountTensor, scenario: &Scenario) -> bool {
    counts.shape() == [scenario.edge_count(), scenario.channel_count(), scenario.k()]
}

/// All load-time invariants together.
pub fn invariant_scenario(scenario: &Scenario) -> bool {
    invariant_layers_unique(&scenario.dag)
        && invariant_dense_references(scenario)
        && scenario
            .coupling_rules
            .iter()
            .all(|rule| invariant_charge_conserved(rule, &scenario.channels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{RuleInput, RuleOutput};
    use std::collections::BTreeMap;

    fn channels() -> Vec<Channel> {
        vec![
            Channel {
                name: "plus".to_string(),
                charge: 1,
                neutral: false,
            },
            Channel {
                name: "minus".to_string(),
                charge: -1,
                neutral: false,
            },
            Channel {
                name: "photon".to_string(),
                charge: 0,
                neutral: true,
            },
        ]
    }

    fn rule(inputs: &[usize], outputs: &[(usize, u64)], nonconservative: bool) -> CouplingRule {
        CouplingRule {
            name: "r".to_string(),
            inputs: inputs
                .iter()
                .map(|&channel| RuleInput {
                    channel,
                    minimum: 1,
                    sum_over_phases: false,
                })
                .collect(),
            outputs: outputs
                .iter()
                .map(|&(channel, add)| RuleOutput { channel, add })
                .collect(),
            phase: BTreeMap::new(),
            node_tags_any: None,
            out_edge_tags_any: None,
            nonconservative,
            charge_balance: 0,
        }
    }

    #[test]
    fn test_annihilation_conserves_charge() {
        // plus + minus -> 2 photon
        let r = rule(&[0, 1], &[(2, 2)], false);
        assert!(invariant_charge_conserved(&r, &channels()));
    }

    #[test]
    fn test_imbalanced_rule_detected() {
        let r = rule(&[2], &[(0, 1)], false);
        assert!(!invariant_charge_conserved(&r, &channels()));

        let flagged = rule(&[2], &[(0, 1)], true);
        assert!(invariant_charge_conserved(&flagged, &channels()));
    }

    #[test]
    fn test_layer_uniqueness() {
        let ok = DagSchedule {
            layers: vec![vec![0, 1], vec![1]],
            repeat: 1,
        };
        assert!(invariant_layers_unique(&ok));

        let dup = DagSchedule {
            layers: vec![vec![0, 0]],
            repeat: 1,
        };
        assert!(!invariant_layers_unique(&dup));

        let empty = DagSchedule {
            layers: vec![vec![]],
            repeat: 1,
        };
        assert!(!invariant_layers_unique(&empty));
    }
}
