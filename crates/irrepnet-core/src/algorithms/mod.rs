//! Stepping algorithms
//!
//! - Layer propagation (edge shift, fusion mask, broadcast)
//! - Node-local coupling rules
//! - Character readout

pub mod coupling;
pub mod measurement;
pub mod propagation;

pub use coupling::apply_node_rules;
pub use measurement::measure_counts;
pub use propagation::{apply_layer, LayerContext, LayerReport};
