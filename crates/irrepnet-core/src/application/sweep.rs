//! Gauge phase sweep
//!
//! Runs the scenario once per phase of one node's gauge and records a readout.

use super::simulation::Simulation;
use crate::domain::errors::{ConfigError, StepError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SweepError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("step failed at gauge phase {phase}: {source}")]
    Step {
        phase: usize,
        #[source]
        source: StepError,
    },
}

/// Readout value observed with the swept node at `phase`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GaugeScanPoint {
    pub phase: usize,
    pub value: f64,
}

/// For each phase in `0..k`: reset, override `node`'s gauge, run `steps`
/// steps and read `readout` (0.0 if no readout has that name).
///
/// The simulation is left in the state of the last phase.
pub fn scan_gauge_phase(
    sim: &mut Simulation,
    node: usize,
    readout: &str,
    steps: u32,
) -> Result<Vec<GaugeScanPoint>, SweepError> {
    let k = sim.k();
    let mut points = Vec::with_capacity(k);

    for phase in 0..k {
        sim.reset()?;
        sim.set_gauge_phase(node, phase as i64)?;
        for _ in 0..steps {
            sim.step()
                .map_err(|source| SweepError::Step { phase, source })?;
        }
        let value = sim.measure_readout(readout).unwrap_or(0.0);
        debug!(node, phase, value, "Gauge scan point");
        points.push(GaugeScanPoint { phase, value });
    }

    Ok(points)
}
