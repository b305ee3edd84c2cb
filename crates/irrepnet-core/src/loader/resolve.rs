//! Validation and dense-index resolution of a raw scenario document.
//!
//! Checks run in document order and fail fast on the first violation.

use super::document::*;
use crate::domain::entities::{
    Channel, CountInit, CouplingRule, DagSchedule, DirectedEdge, FusionMask, MeasurementReadout,
    Node, RuleInput, RuleOutput, Scenario,
};
use crate::domain::errors::ConfigError;
use crate::domain::value_objects::{PhaseGroup, PhaseInstruction, TagSet};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Document version accepted by this engine.
pub const SUPPORTED_VERSION: &str = "0.2";

const DEFAULT_RULE_NAME: &str = "unnamed_rule";

/// Render the `irrepnet_dm` tag the way it reads in the document.
pub fn document_version(document: &Value) -> String {
    match document.get("irrepnet_dm") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Resolve a raw document into a validated [`Scenario`].
pub fn resolve(doc: RawDocument) -> Result<Scenario, ConfigError> {
    let phase_group = resolve_phase_group(doc.phase_group)?;
    let nodes = resolve_nodes(doc.nodes.unwrap_or_default(), &phase_group)?;
    let undirected = index_undirected_edges(doc.edges.unwrap_or_default())?;
    let (directed_edges, edge_index_by_id) = resolve_directed_edges(
        doc.directed_edges.unwrap_or_default(),
        &undirected,
        nodes.len(),
        &phase_group,
    )?;
    let (channels, channel_index) = resolve_channels(doc.channels.unwrap_or_default())?;

    let resolver = ChannelResolver {
        channels: &channels,
        index: &channel_index,
    };

    let fusion_mask = resolve_fusion_mask(
        doc.fusion_mask,
        doc.fusion_mask_sparse,
        &edge_index_by_id,
        &resolver,
        &phase_group,
    )?;
    let counts_init = resolve_counts_init(
        doc.counts_init.unwrap_or_default(),
        &edge_index_by_id,
        &resolver,
        &phase_group,
    )?;
    let dag = resolve_dag(doc.dag, &edge_index_by_id)?;
    let measurement = resolve_measurement(doc.measurement, &edge_index_by_id, &resolver)?;
    let coupling_rules = resolve_coupling_rules(doc.coupling_rules.unwrap_or_default(), &resolver)?;

    Ok(Scenario {
        version: SUPPORTED_VERSION.to_string(),
        phase_group,
        nodes,
        directed_edges,
        edge_index_by_id,
        fusion_mask,
        channels,
        channel_index,
        counts_init,
        dag,
        measurement,
        coupling_rules,
    })
}

fn resolve_phase_group(raw: Option<RawPhaseGroup>) -> Result<PhaseGroup, ConfigError> {
    let raw = raw.unwrap_or(RawPhaseGroup { kind: None, k: None });
    let kind = raw.kind.unwrap_or_default();
    if kind != "Zk" {
        return Err(ConfigError::PhaseKind { found: kind });
    }
    let k = raw.k.unwrap_or(0);
    PhaseGroup::new(k).ok_or(ConfigError::PhaseModulusInvalid { k })
}

fn tag_set(raw: Option<RawTags>) -> TagSet {
    raw.map(RawTags::into_strings)
        .unwrap_or_default()
        .into_iter()
        .collect()
}

fn resolve_nodes(raw: Vec<RawNode>, group: &PhaseGroup) -> Result<Vec<Node>, ConfigError> {
    if raw.is_empty() {
        return Err(ConfigError::NodesEmpty);
    }

    let mut by_id: BTreeMap<i64, RawNode> = BTreeMap::new();
    for node in raw {
        let id = node.id;
        if by_id.insert(id, node).is_some() {
            return Err(ConfigError::DuplicateNodeId { id });
        }
    }

    // Sorted ids must be exactly 0..N
    for (expected, &found) in by_id.keys().enumerate() {
        if found != expected as i64 {
            return Err(ConfigError::NodeIdGap {
                expected: expected as i64,
                found,
            });
        }
    }

    by_id
        .into_values()
        .map(|node| {
            let phase = node.gauge_phase.unwrap_or(0);
            if !group.contains(phase) {
                return Err(ConfigError::GaugePhaseRange {
                    node: node.id,
                    phase,
                    k: group.k(),
                });
            }
            Ok(Node {
                id: node.id as usize,
                gauge_phase: phase as usize,
                tags: tag_set(node.effective_tags()),
            })
        })
        .collect()
}

fn index_undirected_edges(raw: Vec<RawEdge>) -> Result<HashMap<i64, RawEdge>, ConfigError> {
    if raw.is_empty() {
        return Err(ConfigError::EdgesEmpty);
    }
    let mut by_id = HashMap::with_capacity(raw.len());
    for edge in raw {
        let id = edge.id;
        if by_id.insert(id, edge).is_some() {
            return Err(ConfigError::DuplicateEdgeId { id });
        }
    }
    Ok(by_id)
}

fn resolve_directed_edges(
    raw: Vec<RawDirectedEdge>,
    undirected: &HashMap<i64, RawEdge>,
    node_count: usize,
    group: &PhaseGroup,
) -> Result<(Vec<DirectedEdge>, BTreeMap<i64, usize>), ConfigError> {
    if raw.is_empty() {
        return Err(ConfigError::DirectedEdgesEmpty);
    }

    let node_in_range = |node: i64| node >= 0 && (node as usize) < node_count;

    let mut edges = Vec::with_capacity(raw.len());
    let mut index_by_id = BTreeMap::new();

    for entry in raw {
        if !entry.enabled.unwrap_or(true) {
            continue;
        }
        if index_by_id.contains_key(&entry.id) {
            return Err(ConfigError::DuplicateDirectedEdgeId { id: entry.id });
        }
        for node in [entry.src, entry.dst] {
            if !node_in_range(node) {
                return Err(ConfigError::DirectedEdgeNodeRange {
                    edge: entry.id,
                    node,
                });
            }
        }
        let base = undirected
            .get(&entry.edge_ref)
            .ok_or(ConfigError::DirectedEdgeRefInvalid {
                edge: entry.id,
                edge_ref: entry.edge_ref,
            })?;

        let offset = entry.phase_offset.or(base.phase_offset).unwrap_or(0);
        let mut tags = tag_set(entry.tags);
        tags.extend(tag_set(base.effective_tags()));

        index_by_id.insert(entry.id, edges.len());
        edges.push(DirectedEdge {
            id: entry.id,
            src: entry.src as usize,
            dst: entry.dst as usize,
            edge_ref: entry.edge_ref,
            phase_offset: group.reduce(offset),
            tags,
        });
    }

    if edges.is_empty() {
        return Err(ConfigError::DirectedEdgesAllDisabled);
    }
    Ok((edges, index_by_id))
}

fn resolve_channels(
    raw: Vec<RawChannel>,
) -> Result<(Vec<Channel>, BTreeMap<String, usize>), ConfigError> {
    if raw.is_empty() {
        return Err(ConfigError::ChannelsEmpty);
    }
    let mut channels = Vec::with_capacity(raw.len());
    let mut index = BTreeMap::new();
    for entry in raw {
        if index.contains_key(&entry.name) {
            return Err(ConfigError::DuplicateChannelName { name: entry.name });
        }
        index.insert(entry.name.clone(), channels.len());
        channels.push(Channel {
            name: entry.name,
            charge: entry.charge.unwrap_or(0),
            neutral: entry.neutral.unwrap_or(false),
        });
    }
    Ok((channels, index))
}

/// Resolves channel references against the declared channel list.
struct ChannelResolver<'a> {
    channels: &'a [Channel],
    index: &'a BTreeMap<String, usize>,
}

impl ChannelResolver<'_> {
    fn resolve(&self, reference: &ChannelRef) -> Result<usize, ConfigError> {
        match reference {
            ChannelRef::Index(i) => {
                if *i < 0 || *i as usize >= self.channels.len() {
                    return Err(ConfigError::ChannelIndexRange {
                        index: *i,
                        count: self.channels.len(),
                    });
                }
                Ok(*i as usize)
            }
            ChannelRef::Name(name) => self
                .index
                .get(name)
                .copied()
                .ok_or_else(|| ConfigError::UnknownChannel { name: name.clone() }),
        }
    }

    fn name(&self, channel: usize) -> String {
        self.channels[channel].name.clone()
    }
}

fn resolve_fusion_mask(
    dense: Option<Vec<Vec<Vec<MaskCell>>>>,
    sparse: Option<Vec<RawSparseMaskEntry>>,
    edge_index_by_id: &BTreeMap<i64, usize>,
    resolver: &ChannelResolver<'_>,
    group: &PhaseGroup,
) -> Result<FusionMask, ConfigError> {
    let edge_count = edge_index_by_id.len();
    let channel_count = resolver.channels.len();
    let k = group.k();
    let mut mask = FusionMask::closed(edge_count, channel_count, k);

    match (dense, sparse) {
        (Some(dense), None) => {
            if dense.len() != edge_count {
                return Err(ConfigError::FusionMaskShape {
                    expected: edge_count,
                    found: dense.len(),
                });
            }
            for (edge, per_edge) in dense.into_iter().enumerate() {
                if per_edge.len() != channel_count {
                    return Err(ConfigError::FusionMaskChannel {
                        edge,
                        expected: channel_count,
                        found: per_edge.len(),
                    });
                }
                for (channel, phases) in per_edge.into_iter().enumerate() {
                    if phases.len() != k {
                        return Err(ConfigError::FusionMaskPhase {
                            edge,
                            channel,
                            expected: k,
                            found: phases.len(),
                        });
                    }
                    for (phase, cell) in phases.into_iter().enumerate() {
                        match cell.as_int() {
                            0 => {}
                            1 => mask.set(edge, channel, phase, true),
                            value => {
                                return Err(ConfigError::FusionMaskValue {
                                    edge,
                                    channel,
                                    phase,
                                    value,
                                })
                            }
                        }
                    }
                }
            }
            Ok(mask)
        }
        (None, Some(entries)) => {
            for entry in entries {
                let edge = *edge_index_by_id
                    .get(&entry.edge_id)
                    .ok_or(ConfigError::FusionMaskEdgeUnknown {
                        edge: entry.edge_id,
                    })?;
                let channel = resolver.resolve(&entry.channel)?;
                let phases = entry
                    .allow_phases
                    .ok_or(ConfigError::FusionMaskPhasesInvalid {
                        edge: entry.edge_id,
                    })?;
                for phase in phases {
                    if !group.contains(phase) {
                        return Err(ConfigError::FusionMaskPhaseRange {
                            edge: entry.edge_id,
                            phase,
                            k,
                        });
                    }
                    mask.set(edge, channel, phase as usize, true);
                }
            }
            Ok(mask)
        }
        _ => Err(ConfigError::FusionMaskMissing),
    }
}

fn resolve_counts_init(
    raw: Vec<RawCountInit>,
    edge_index_by_id: &BTreeMap<i64, usize>,
    resolver: &ChannelResolver<'_>,
    group: &PhaseGroup,
) -> Result<Vec<CountInit>, ConfigError> {
    let mut entries = Vec::with_capacity(raw.len());
    // Entries for the same cell add up; the sum must stay a valid count.
    let mut cells: HashMap<(usize, usize, usize), u64> = HashMap::new();
    for entry in raw {
        let edge = *edge_index_by_id
            .get(&entry.edge)
            .ok_or(ConfigError::CountsInitEdgeUnknown { edge: entry.edge })?;
        let channel = entry
            .channel
            .as_ref()
            .ok_or(ConfigError::CountsInitChannelRequired { edge: entry.edge })
            .and_then(|reference| resolver.resolve(reference))?;
        let value = entry.value.unwrap_or(0);
        if value < 0 {
            return Err(ConfigError::CountsInitNegative {
                edge: entry.edge,
                value,
            });
        }
        let init = CountInit {
            edge,
            channel,
            phase: group.reduce(entry.phase.unwrap_or(0)),
            value: value as u64,
        };

        let cell = cells.entry((edge, channel, init.phase)).or_insert(0);
        *cell = cell
            .checked_add(init.value)
            .ok_or_else(|| ConfigError::CountsInitOverflow {
                edge: entry.edge,
                channel: resolver.channels[channel].name.clone(),
            })?;
        entries.push(init);
    }
    Ok(entries)
}

fn resolve_dag(
    raw: Option<RawDag>,
    edge_index_by_id: &BTreeMap<i64, usize>,
) -> Result<DagSchedule, ConfigError> {
    let raw = raw.ok_or(ConfigError::DagMissing)?;
    let layers_raw = raw.layers.unwrap_or_default();
    if layers_raw.is_empty() {
        return Err(ConfigError::DagLayersEmpty);
    }

    let mut layers = Vec::with_capacity(layers_raw.len());
    for (layer_idx, layer) in layers_raw.into_iter().enumerate() {
        let edges = layer.edges.unwrap_or_default();
        if edges.is_empty() {
            return Err(ConfigError::DagLayerEmpty { layer: layer_idx });
        }
        let mut seen = HashSet::with_capacity(edges.len());
        let mut converted = Vec::with_capacity(edges.len());
        for edge_id in edges {
            let idx = *edge_index_by_id
                .get(&edge_id)
                .ok_or(ConfigError::DagEdgeUnknown {
                    layer: layer_idx,
                    edge: edge_id,
                })?;
            if !seen.insert(idx) {
                return Err(ConfigError::DagLayerConflict {
                    layer: layer_idx,
                    edge: edge_id,
                });
            }
            converted.push(idx);
        }
        layers.push(converted);
    }

    let repeat = raw.repeat.unwrap_or(1);
    let repeat = u32::try_from(repeat)
        .ok()
        .filter(|r| *r >= 1)
        .ok_or(ConfigError::DagRepeatRange { repeat })?;

    Ok(DagSchedule { layers, repeat })
}

fn resolve_measurement(
    raw: Option<RawMeasurement>,
    edge_index_by_id: &BTreeMap<i64, usize>,
    resolver: &ChannelResolver<'_>,
) -> Result<Vec<MeasurementReadout>, ConfigError> {
    let outputs = raw.and_then(|m| m.outputs).unwrap_or_default();
    outputs
        .into_iter()
        .map(|entry| {
            let edges = entry
                .readout_edges
                .unwrap_or_default()
                .into_iter()
                .map(|edge_id| {
                    edge_index_by_id.get(&edge_id).copied().ok_or_else(|| {
                        ConfigError::MeasurementEdgeUnknown {
                            readout: entry.name.clone(),
                            edge: edge_id,
                        }
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let channels = match entry.channels {
                None | Some(Value::Null) => None,
                Some(Value::Sequence(items)) => Some(
                    items
                        .iter()
                        .map(|item| {
                            let reference = ChannelRef::from_value(item).ok_or_else(|| {
                                ConfigError::MeasurementChannelsFormat {
                                    readout: entry.name.clone(),
                                }
                            })?;
                            resolver.resolve(&reference)
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                ),
                Some(_) => {
                    return Err(ConfigError::MeasurementChannelsFormat {
                        readout: entry.name,
                    })
                }
            };

            Ok(MeasurementReadout {
                name: entry.name,
                edges,
                channels,
            })
        })
        .collect()
}

fn resolve_coupling_rules(
    raw: Vec<RawCouplingRule>,
    resolver: &ChannelResolver<'_>,
) -> Result<Vec<CouplingRule>, ConfigError> {
    raw.into_iter()
        .map(|rule| resolve_coupling_rule(rule, resolver))
        .collect()
}

fn resolve_coupling_rule(
    rule: RawCouplingRule,
    resolver: &ChannelResolver<'_>,
) -> Result<CouplingRule, ConfigError> {
    let name = rule.name.unwrap_or_else(|| DEFAULT_RULE_NAME.to_string());
    let (node_tags_any, out_edge_tags_any) = match rule.scope {
        Some(scope) => (tag_set(scope.nodes_any), tag_set(scope.out_edges_any)),
        None => (TagSet::new(), TagSet::new()),
    };

    let inputs_raw = rule.inputs.unwrap_or_default();
    let outputs_raw = rule.outputs.unwrap_or_default();
    if outputs_raw.is_empty() {
        return Err(ConfigError::RuleOutputEmpty { rule: name });
    }

    let mut inputs = Vec::with_capacity(inputs_raw.len());
    for entry in inputs_raw {
        let channel = resolver.resolve(&entry.ch)?;
        let min = entry.min.unwrap_or(1);
        if min != 1 {
            return Err(ConfigError::RuleMinUnsupported { rule: name, min });
        }
        inputs.push(RuleInput {
            channel,
            minimum: 1,
            sum_over_phases: entry.sum_over_phases.unwrap_or(false),
        });
    }

    let mut outputs = Vec::with_capacity(outputs_raw.len());
    for entry in outputs_raw {
        let channel = resolver.resolve(&entry.ch)?;
        let add = entry.add.unwrap_or(0);
        if add < 0 {
            return Err(ConfigError::RuleOutputNegative {
                rule: name,
                channel: resolver.name(channel),
                add,
            });
        }
        outputs.push(RuleOutput {
            channel,
            add: add as u64,
        });
    }

    let mut phase = BTreeMap::new();
    for (key, instruction) in rule.phase.unwrap_or_default() {
        let reference = ChannelRef::from_value(&key).ok_or_else(|| ConfigError::PhaseInvalid {
            rule: name.clone(),
            detail: format!("phase key {key:?} is not a channel"),
        })?;
        let channel = resolver.resolve(&reference)?;
        let parsed = parse_phase_instruction(&instruction, &inputs, resolver, &name)?;
        phase.insert(channel, parsed);
    }

    for output in &outputs {
        if !phase.contains_key(&output.channel) {
            let default = default_phase_instruction(output.channel, &inputs, resolver, &name)?;
            phase.insert(output.channel, default);
        }
    }

    let charge_balance = charge_balance(&inputs, &outputs, resolver).ok_or_else(|| {
        ConfigError::RuleChargeOverflow { rule: name.clone() }
    })?;
    let nonconservative = rule.nonconservative.unwrap_or(false);
    if charge_balance != 0 && !nonconservative {
        return Err(ConfigError::RuleChargeImbalance {
            rule: name,
            balance: charge_balance,
        });
    }

    Ok(CouplingRule {
        name,
        inputs,
        outputs,
        phase,
        node_tags_any: (!node_tags_any.is_empty()).then_some(node_tags_any),
        out_edge_tags_any: (!out_edge_tags_any.is_empty()).then_some(out_edge_tags_any),
        nonconservative,
        charge_balance,
    })
}

/// `Σ charge·add − Σ charge·min`, or `None` if any term leaves the i64 range.
fn charge_balance(
    inputs: &[RuleInput],
    outputs: &[RuleOutput],
    resolver: &ChannelResolver<'_>,
) -> Option<i64> {
    let weighted = |channel: usize, amount: u64| -> Option<i64> {
        resolver.channels[channel]
            .charge
            .checked_mul(i64::try_from(amount).ok()?)
    };
    let charge_in = inputs.iter().try_fold(0i64, |acc, inp| {
        acc.checked_add(weighted(inp.channel, inp.minimum)?)
    })?;
    let charge_out = outputs.iter().try_fold(0i64, |acc, out| {
        acc.checked_add(weighted(out.channel, out.add)?)
    })?;
    charge_out.checked_sub(charge_in)
}

/// Parse `inherit`, `inherit_from:<ch>`, `delta`, `fixed:<v>` or `{sum_from: [...]}`.
fn parse_phase_instruction(
    raw: &Value,
    inputs: &[RuleInput],
    resolver: &ChannelResolver<'_>,
    rule: &str,
) -> Result<PhaseInstruction, ConfigError> {
    match raw {
        Value::String(text) => {
            if text == "inherit" {
                if inputs.len() != 1 {
                    return Err(ConfigError::PhaseInheritAmbiguous {
                        rule: rule.to_string(),
                        inputs: inputs.len(),
                    });
                }
                return Ok(PhaseInstruction::Inherit {
                    source: inputs[0].channel,
                });
            }
            if let Some(source) = text.strip_prefix("inherit_from:") {
                let source = resolver.resolve(&ChannelRef::Name(source.to_string()))?;
                return Ok(PhaseInstruction::Inherit { source });
            }
            if text == "delta" {
                return Ok(PhaseInstruction::Delta);
            }
            if let Some(value) = text.strip_prefix("fixed:") {
                let value = value
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| ConfigError::PhaseInvalid {
                        rule: rule.to_string(),
                        detail: format!("'{text}' is not fixed:<integer>"),
                    })?;
                return Ok(PhaseInstruction::Fixed { value });
            }
            Err(ConfigError::PhaseUnknown {
                rule: rule.to_string(),
                instruction: text.clone(),
            })
        }
        Value::Mapping(map) if map.contains_key("sum_from") => {
            let sources = match map.get("sum_from") {
                Some(Value::Sequence(items)) => items
                    .iter()
                    .map(|item| {
                        let reference =
                            ChannelRef::from_value(item).ok_or_else(|| ConfigError::PhaseInvalid {
                                rule: rule.to_string(),
                                detail: format!("sum_from entry {item:?} is not a channel"),
                            })?;
                        resolver.resolve(&reference)
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                _ => Vec::new(),
            };
            if sources.is_empty() {
                return Err(ConfigError::PhaseSumEmpty {
                    rule: rule.to_string(),
                });
            }
            Ok(PhaseInstruction::Sum { sources })
        }
        other => Err(ConfigError::PhaseInvalid {
            rule: rule.to_string(),
            detail: format!("{other:?}"),
        }),
    }
}

/// Inherit from the single same-channel input, delta when none matches.
fn default_phase_instruction(
    channel: usize,
    inputs: &[RuleInput],
    resolver: &ChannelResolver<'_>,
    rule: &str,
) -> Result<PhaseInstruction, ConfigError> {
    match inputs.iter().filter(|inp| inp.channel == channel).count() {
        0 => Ok(PhaseInstruction::Delta),
        1 => Ok(PhaseInstruction::Inherit { source: channel }),
        _ => Err(ConfigError::PhaseDefaultAmbiguous {
            rule: rule.to_string(),
            channel: resolver.name(channel),
        }),
    }
}
