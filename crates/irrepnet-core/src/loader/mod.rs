//! Scenario loader
//!
//! Parses a YAML scenario document (JSON works too) into a validated
//! [`Scenario`]. All validation happens here; nothing is re-checked while
//! stepping.
//!
//! ```yaml
//! irrepnet_dm: "0.2"
//! phase_group: { kind: Zk, k: 4 }
//! nodes:
//!   - { id: 0, gauge_phase: 0, tags: [source] }
//!   - { id: 1, gauge_phase: 1 }
//! edges:
//!   - { id: 0, phase_offset: 1 }
//! directed_edges:
//!   - { id: 0, src: 0, dst: 1, edge_ref: 0 }
//! channels:
//!   - { name: A, charge: 0, neutral: true }
//! fusion_mask_sparse:
//!   - { edge_id: 0, channel: A, allow_phases: [0, 1, 2, 3] }
//! dag:
//!   layers: [{ edges: [0] }]
//!   repeat: 1
//! ```

pub mod document;
pub mod resolve;

use crate::domain::entities::Scenario;
use crate::domain::errors::ConfigError;
use crate::domain::invariants::invariant_scenario;
use document::RawDocument;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

pub use resolve::SUPPORTED_VERSION;

/// Load and validate a scenario file.
pub fn load(path: impl AsRef<Path>) -> Result<Scenario, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = contents.len(), "Read scenario document");
    load_str(&contents)
}

/// Validate a scenario document held in memory.
pub fn load_str(contents: &str) -> Result<Scenario, ConfigError> {
    let document: serde_yaml::Value = serde_yaml::from_str(contents)?;

    // Version gate runs before any structural parsing.
    let version = resolve::document_version(&document);
    if version != SUPPORTED_VERSION {
        return Err(ConfigError::VersionMismatch { found: version });
    }

    let raw: RawDocument = serde_yaml::from_value(document)?;
    let scenario = resolve::resolve(raw)?;
    debug_assert!(invariant_scenario(&scenario));

    info!(
        k = scenario.k(),
        nodes = scenario.node_count(),
        edges = scenario.edge_count(),
        channels = scenario.channel_count(),
        layers = scenario.dag.layers.len(),
        repeat = scenario.dag.repeat,
        rules = scenario.coupling_rules.len(),
        "Scenario loaded"
    );

    Ok(scenario)
}
