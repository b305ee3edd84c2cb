//! Error types for the IRREPnet engine
//!
//! Two families: [`ConfigError`] is raised only while loading a scenario,
//! [`StepError`] only while stepping. A `StepError` poisons the simulation.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading and validating a scenario document.
///
/// Every variant maps to a stable machine-readable code via [`ConfigError::code`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read scenario {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scenario document: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("irrepnet_dm must be '0.2', got '{found}'")]
    VersionMismatch { found: String },

    #[error("phase_group.kind must be 'Zk', got '{found}'")]
    PhaseKind { found: String },

    #[error("phase_group.k must be in [2..256], got {k}")]
    PhaseModulusInvalid { k: i64 },

    #[error("nodes must not be empty")]
    NodesEmpty,

    #[error("duplicate node id {id}")]
    DuplicateNodeId { id: i64 },

    #[error("node ids must be contiguous from 0: expected {expected}, found {found}")]
    NodeIdGap { expected: i64, found: i64 },

    #[error("node {node} gauge_phase {phase} outside [0, {k})")]
    GaugePhaseRange { node: i64, phase: i64, k: usize },

    #[error("unknown node {node}")]
    NodeUnknown { node: i64 },

    #[error("edges must not be empty")]
    EdgesEmpty,

    #[error("duplicate edge id {id}")]
    DuplicateEdgeId { id: i64 },

    #[error("directed_edges must not be empty")]
    DirectedEdgesEmpty,

    #[error("every directed edge is disabled")]
    DirectedEdgesAllDisabled,

    #[error("duplicate directed edge id {id}")]
    DuplicateDirectedEdgeId { id: i64 },

    #[error("directed edge {edge} references unknown node {node}")]
    DirectedEdgeNodeRange { edge: i64, node: i64 },

    #[error("directed edge {edge} references unknown edge {edge_ref}")]
    DirectedEdgeRefInvalid { edge: i64, edge_ref: i64 },

    #[error("channels must not be empty")]
    ChannelsEmpty,

    #[error("duplicate channel name '{name}'")]
    DuplicateChannelName { name: String },

    #[error("channel index {index} out of range (have {count} channels)")]
    ChannelIndexRange { index: i64, count: usize },

    #[error("unknown channel '{name}'")]
    UnknownChannel { name: String },

    #[error("provide exactly one of fusion_mask or fusion_mask_sparse")]
    FusionMaskMissing,

    #[error("fusion_mask has {found} edge rows, expected {expected}")]
    FusionMaskShape { expected: usize, found: usize },

    #[error("fusion_mask edge {edge} has {found} channel rows, expected {expected}")]
    FusionMaskChannel {
        edge: usize,
        expected: usize,
        found: usize,
    },

    #[error("fusion_mask edge {edge} channel {channel} has {found} phases, expected {expected}")]
    FusionMaskPhase {
        edge: usize,
        channel: usize,
        expected: usize,
        found: usize,
    },

    #[error("fusion_mask value {value} at [{edge}][{channel}][{phase}] is not 0 or 1")]
    FusionMaskValue {
        edge: usize,
        channel: usize,
        phase: usize,
        value: i64,
    },

    #[error("fusion_mask_sparse references unknown edge {edge}")]
    FusionMaskEdgeUnknown { edge: i64 },

    #[error("fusion_mask_sparse entry for edge {edge} needs an allow_phases list")]
    FusionMaskPhasesInvalid { edge: i64 },

    #[error("fusion_mask_sparse edge {edge} allows phase {phase} outside [0, {k})")]
    FusionMaskPhaseRange { edge: i64, phase: i64, k: usize },

    #[error("counts_init references unknown edge {edge}")]
    CountsInitEdgeUnknown { edge: i64 },

    #[error("counts_init entry for edge {edge} is missing a channel")]
    CountsInitChannelRequired { edge: i64 },

    #[error("counts_init entry for edge {edge} has negative value {value}")]
    CountsInitNegative { edge: i64, value: i64 },

    #[error("counts_init entries for edge {edge}, channel '{channel}' sum past u64::MAX")]
    CountsInitOverflow { edge: i64, channel: String },

    #[error("dag section is missing")]
    DagMissing,

    #[error("dag.layers must be a non-empty list")]
    DagLayersEmpty,

    #[error("dag layer {layer} has no edges")]
    DagLayerEmpty { layer: usize },

    #[error("dag layer {layer} references unknown edge {edge}")]
    DagEdgeUnknown { layer: usize, edge: i64 },

    #[error("edge {edge} duplicated in dag layer {layer}")]
    DagLayerConflict { layer: usize, edge: i64 },

    #[error("dag.repeat must be >= 1, got {repeat}")]
    DagRepeatRange { repeat: i64 },

    #[error("readout '{readout}' references unknown edge {edge}")]
    MeasurementEdgeUnknown { readout: String, edge: i64 },

    #[error("readout '{readout}' channels must be a list")]
    MeasurementChannelsFormat { readout: String },

    #[error("rule '{rule}' declares no outputs")]
    RuleOutputEmpty { rule: String },

    #[error("rule '{rule}' requires min=1 (got {min})")]
    RuleMinUnsupported { rule: String, min: i64 },

    #[error("rule '{rule}' output '{channel}' has negative add {add}")]
    RuleOutputNegative {
        rule: String,
        channel: String,
        add: i64,
    },

    #[error("rule '{rule}' uses 'inherit' but has {inputs} inputs")]
    PhaseInheritAmbiguous { rule: String, inputs: usize },

    #[error("rule '{rule}' has unknown phase instruction '{instruction}'")]
    PhaseUnknown { rule: String, instruction: String },

    #[error("rule '{rule}' has malformed phase instruction: {detail}")]
    PhaseInvalid { rule: String, detail: String },

    #[error("rule '{rule}' sum_from lists no channels")]
    PhaseSumEmpty { rule: String },

    #[error("rule '{rule}' output '{channel}' matches several inputs; declare its phase instruction")]
    PhaseDefaultAmbiguous { rule: String, channel: String },

    #[error("rule '{rule}' is conservative but its charge balance is {balance}")]
    RuleChargeImbalance { rule: String, balance: i64 },

    #[error("rule '{rule}' charge balance does not fit in i64")]
    RuleChargeOverflow { rule: String },

    #[error("invalid engine configuration: {0}")]
    EngineConfig(String),
}

impl ConfigError {
    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Io { .. } => "E_IO",
            ConfigError::Parse(_) => "E_PARSE",
            ConfigError::VersionMismatch { .. } => "E_VERSION_MISMATCH",
            ConfigError::PhaseKind { .. } => "E_PHASE_KIND",
            ConfigError::PhaseModulusInvalid { .. } => "E_PHASE_K_INVALID",
            ConfigError::NodesEmpty => "E_NODES_EMPTY",
            ConfigError::DuplicateNodeId { .. } => "E_DUP_NODE_ID",
            ConfigError::NodeIdGap { .. } => "E_NODE_ID_GAP",
            ConfigError::GaugePhaseRange { .. } => "E_GAUGE_PHASE_RANGE",
            ConfigError::NodeUnknown { .. } => "E_NODE_UNKNOWN",
            ConfigError::EdgesEmpty => "E_EDGES_EMPTY",
            ConfigError::DuplicateEdgeId { .. } => "E_DUP_EDGE_ID",
            ConfigError::DirectedEdgesEmpty => "E_DIRECTED_EDGES_EMPTY",
            ConfigError::DirectedEdgesAllDisabled => "E_DIRECTED_EDGES_DISABLED",
            ConfigError::DuplicateDirectedEdgeId { .. } => "E_DUP_DIRECTED_EDGE_ID",
            ConfigError::DirectedEdgeNodeRange { .. } => "E_DIRECTED_EDGE_NODE_RANGE",
            ConfigError::DirectedEdgeRefInvalid { .. } => "E_DIRECTED_EDGE_REF_INVALID",
            ConfigError::ChannelsEmpty => "E_CHANNELS_EMPTY",
            ConfigError::DuplicateChannelName { .. } => "E_DUP_CHANNEL_NAME",
            ConfigError::ChannelIndexRange { .. } => "E_CHANNEL_INDEX_RANGE",
            ConfigError::UnknownChannel { .. } => "E_CHANNEL_UNKNOWN",
            ConfigError::FusionMaskMissing => "E_FUSION_MASK_MISSING",
            ConfigError::FusionMaskShape { .. } => "E_FUSION_MASK_SHAPE",
            ConfigError::FusionMaskChannel { .. } => "E_FUSION_MASK_CHANNEL",
            ConfigError::FusionMaskPhase { .. } => "E_FUSION_MASK_PHASE",
            ConfigError::FusionMaskValue { .. } => "E_FUSION_MASK_VAL",
            ConfigError::FusionMaskEdgeUnknown { .. } => "E_FUSION_MASK_EDGE_UNKNOWN",
            ConfigError::FusionMaskPhasesInvalid { .. } => "E_FUSION_MASK_PHASES_INVALID",
            ConfigError::FusionMaskPhaseRange { .. } => "E_FUSION_MASK_PHASE_RANGE",
            ConfigError::CountsInitEdgeUnknown { .. } => "E_COUNTS_INIT_EDGE_UNKNOWN",
            ConfigError::CountsInitChannelRequired { .. } => "E_COUNTS_INIT_CHANNEL_REQUIRED",
            ConfigError::CountsInitNegative { .. } => "E_COUNTS_INIT_NEGATIVE_VALUE",
            ConfigError::CountsInitOverflow { .. } => "E_COUNTS_INIT_OVERFLOW",
            ConfigError::DagMissing => "E_DAG_MISSING",
            ConfigError::DagLayersEmpty => "E_DAG_LAYERS_EMPTY",
            ConfigError::DagLayerEmpty { .. } => "E_DAG_LAYER_EMPTY",
            ConfigError::DagEdgeUnknown { .. } => "E_DAG_EDGE_UNKNOWN",
            ConfigError::DagLayerConflict { .. } => "E_DAG_LAYER_CONFLICT",
            ConfigError::DagRepeatRange { .. } => "E_DAG_REPEAT_RANGE",
            ConfigError::MeasurementEdgeUnknown { .. } => "E_MEASUREMENT_EDGE_UNKNOWN",
            ConfigError::MeasurementChannelsFormat { .. } => "E_MEASUREMENT_CHANNELS_FMT",
            ConfigError::RuleOutputEmpty { .. } => "E_RULE_OUTPUT_EMPTY",
            ConfigError::RuleMinUnsupported { .. } => "E_RULE_MIN_UNSUPPORTED",
            ConfigError::RuleOutputNegative { .. } => "E_RULE_OUTPUT_NEGATIVE",
            ConfigError::PhaseInheritAmbiguous { .. } => "E_PHASE_INHERIT_AMBIGUOUS",
            ConfigError::PhaseUnknown { .. } => "E_PHASE_UNKNOWN",
            ConfigError::PhaseInvalid { .. } => "E_PHASE_INVALID",
            ConfigError::PhaseSumEmpty { .. } => "E_PHASE_SUM_EMPTY",
            ConfigError::PhaseDefaultAmbiguous { .. } => "E_PHASE_DEFAULT_AMBIGUOUS",
            ConfigError::RuleChargeImbalance { .. } => "E_RULE_CHARGE_IMBALANCE",
            ConfigError::RuleChargeOverflow { .. } => "E_RULE_CHARGE_OVERFLOW",
            ConfigError::EngineConfig(_) => "E_ENGINE_CONFIG",
        }
    }
}

/// Fatal invariant violations raised while stepping.
///
/// The simulation that produced one must be reset or discarded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error("rule '{rule}' could not drain channel '{channel}': {missing} tokens short")]
    ConsumptionDeficit {
        rule: String,
        channel: String,
        missing: u64,
    },

    #[error("rule '{rule}' cannot scale inherited phases for '{channel}': {total} not a multiple of {source_total}")]
    InheritScale {
        rule: String,
        channel: String,
        total: u64,
        source_total: u64,
    },

    #[error("rule '{rule}' uses phase instruction '{kind}' for '{channel}', which is not supported")]
    UnsupportedPhaseInstruction {
        rule: String,
        channel: String,
        kind: &'static str,
    },

    /// A count on `edge` would exceed `u64::MAX`. `edge` is the raw edge id.
    #[error("token count on edge {edge}, channel '{channel}' exceeds u64::MAX")]
    CountOverflow { edge: i64, channel: String },

    #[error("simulation is poisoned by an earlier step failure; reset it")]
    Poisoned,
}

impl StepError {
    pub fn code(&self) -> &'static str {
        match self {
            StepError::ConsumptionDeficit { .. } => "E_RULE_CONSUME_DEFICIT",
            StepError::InheritScale { .. } => "E_PHASE_INHERIT_SCALE",
            StepError::UnsupportedPhaseInstruction { .. } => "E_PHASE_UNSUPPORTED",
            StepError::CountOverflow { .. } => "E_COUNT_OVERFLOW",
            StepError::Poisoned => "E_POISONED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display_includes_identifier() {
        let err = ConfigError::DuplicateChannelName {
            name: "photon".to_string(),
        };
        assert_eq!(err.to_string(), "duplicate channel name 'photon'");
        assert_eq!(err.code(), "E_DUP_CHANNEL_NAME");
    }

    #[test]
    fn test_charge_imbalance_error() {
        let err = ConfigError::RuleChargeImbalance {
            rule: "split".to_string(),
            balance: -2,
        };
        assert_eq!(
            err.to_string(),
            "rule 'split' is conservative but its charge balance is -2"
        );
        assert_eq!(err.code(), "E_RULE_CHARGE_IMBALANCE");
    }

    #[test]
    fn test_step_error_names_rule() {
        let err = StepError::UnsupportedPhaseInstruction {
            rule: "fuse".to_string(),
            channel: "B".to_string(),
            kind: "sum",
        };
        assert!(err.to_string().contains("'fuse'"));
        assert_eq!(err.code(), "E_PHASE_UNSUPPORTED");
    }

    #[test]
    fn test_count_overflow_names_edge_and_channel() {
        let err = StepError::CountOverflow {
            edge: 7,
            channel: "G".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "token count on edge 7, channel 'G' exceeds u64::MAX"
        );
        assert_eq!(err.code(), "E_COUNT_OVERFLOW");
    }
}
