//! Value objects for the IRREPnet engine
//!
//! Z_k phase arithmetic and the phase-instruction sum type.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Sorted, deduplicated set of string tags.
pub type TagSet = BTreeSet<String>;

/// Smallest accepted phase modulus.
pub const MIN_PHASE_MODULUS: i64 = 2;
/// Largest accepted phase modulus.
pub const MAX_PHASE_MODULUS: i64 = 256;

/// The cyclic phase group Z_k.
///
/// All reductions use the Euclidean remainder, so results always lie in `[0, k)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhaseGroup {
    k: usize,
}

impl PhaseGroup {
    /// Returns `None` when `k` lies outside `[2, 256]`.
    pub fn new(k: i64) -> Option<Self> {
        if (MIN_PHASE_MODULUS..=MAX_PHASE_MODULUS).contains(&k) {
            Some(Self { k: k as usize })
        } else {
            None
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Reduce an arbitrary integer into `[0, k)`.
    pub fn reduce(&self, value: i64) -> usize {
        value.rem_euclid(self.k as i64) as usize
    }

    /// Whether `value` already lies in `[0, k)`.
    pub fn contains(&self, value: i64) -> bool {
        value >= 0 && value < self.k as i64
    }

    /// Modular shift applied when mass crosses an edge.
    ///
    /// Neutral channels only see the edge offset; charged channels also see
    /// the gauge difference between source and destination.
    pub fn edge_shift(&self, gauge_src: usize, gauge_dst: usize, offset: usize, neutral: bool) -> usize {
        if neutral {
            return offset % self.k;
        }
        self.reduce(gauge_src as i64 - gauge_dst as i64 + offset as i64)
    }

    /// Circular shift: `out[p] = hist[(p - by) mod k]`.
    ///
    /// Mass sitting at phase `p` ends up at phase `p + by`.
    pub fn rotate(&self, hist: &[u64], by: usize) -> Vec<u64> {
        let k = self.k;
        let by = by % k;
        let mut out = vec![0u64; k];
        for (p, slot) in out.iter_mut().enumerate() {
            *slot = hist[(p + k - by) % k];
        }
        out
    }
}

/// Policy deciding the phase distribution of a rule's emitted tokens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseInstruction {
    /// Copy the shape of one input channel's consumed histogram, scaled.
    Inherit { source: usize },
    /// Place all mass at a single phase (reduced mod k at emission time).
    Fixed { value: i64 },
    /// Place all mass at phase 0; rotated by each target edge's own shift.
    Delta,
    /// Combine several inputs. Parsed but not supported while stepping.
    Sum { sources: Vec<usize> },
}

impl PhaseInstruction {
    pub fn kind(&self) -> &'static str {
        match self {
            PhaseInstruction::Inherit { .. } => "inherit",
            PhaseInstruction::Fixed { .. } => "fixed",
            PhaseInstruction::Delta => "delta",
            PhaseInstruction::Sum { .. } => "sum",
        }
    }

    /// Whether committed histograms are rotated per target edge.
    pub fn rotates_per_edge(&self) -> bool {
        matches!(self, PhaseInstruction::Delta)
    }
}

/// Summary of a simulation's live state, suitable for regression dumps.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateExport {
    pub k: usize,
    /// `[edges, channels, k]`
    pub counts_shape: [usize; 3],
    /// Sum of all counts mod 2147483647
    pub counts_checksum: u64,
    pub backend_label: String,
}

impl StateExport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
